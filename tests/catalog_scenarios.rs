//! Catalog browsing, visibility toggles and beat counters.
mod common;

use common::{Fixture, register};
use don_records::access::Role;
use don_records::cart::Cart;
use don_records::catalog::{ItemKind, Visibility};
use don_records::error::ServiceError;
use don_records::store::Page;

#[test]
fn browse_shows_only_published_items() -> anyhow::Result<()> {
    let fx = Fixture::new("browse")?;
    let first = fx.beat("One", 10)?;
    let second = fx.beat("Two", 15)?;
    fx.beat("Three", 20)?;
    let hoodie = fx.merch("Hoodie", 40, 3)?;
    let cap = fx.merch("Cap", 15, 3)?;

    fx.market.set_beat_visibility(
        &fx.producer,
        &second.id,
        Visibility {
            is_published: Some(false),
            ..Visibility::default()
        },
    )?;
    fx.market.set_merchandise_visibility(
        &fx.admin,
        &cap.id,
        Visibility {
            is_published: Some(false),
            ..Visibility::default()
        },
    )?;

    let beats = fx.market.published_beats(Page::new(1, 1))?;
    assert_eq!(beats.total, 2);
    assert_eq!(beats.items.len(), 1);
    assert_eq!(beats.pages(), 2);
    assert!(beats.items.iter().all(|b| b.id != second.id));

    let merch = fx.market.published_merchandise(Page::default())?;
    assert_eq!(merch.total, 1);
    assert_eq!(merch.items[0].id, hoodie.id);

    // featuring an unpublished item keeps it off the homepage
    let featured = Visibility {
        is_featured: Some(true),
        ..Visibility::default()
    };
    fx.market.set_beat_visibility(&fx.admin, &first.id, featured)?;
    fx.market.set_beat_visibility(&fx.producer, &second.id, featured)?;
    fx.market.set_merchandise_visibility(&fx.producer, &hoodie.id, featured)?;
    let (beats, merch) = fx.market.featured()?;
    assert_eq!(beats.len(), 1);
    assert_eq!(beats[0].id, first.id);
    assert_eq!(merch.len(), 1);
    Ok(())
}

/// Only the owning producer or an admin can touch a listing.
#[test]
fn listings_belong_to_their_owner() -> anyhow::Result<()> {
    let fx = Fixture::new("ownership")?;
    let beat = fx.beat("Mine", 10)?;
    let hoodie = fx.merch("Hoodie", 40, 3)?;

    let rival = register(&fx.market, "rival", Role::Producer, ("Ri", "Val"))?;
    fx.market.approve_user(&fx.admin, &rival)?;
    let rival = fx.market.login(&rival)?;

    let hide = Visibility {
        is_published: Some(false),
        ..Visibility::default()
    };
    let err = fx
        .market
        .set_beat_visibility(&rival, &beat.id, hide)
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied(_)));
    let err = fx.market.restock(&rival, &hoodie.id, 50).unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied(_)));
    let err = fx.market.restock(&fx.artist, &hoodie.id, 50).unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied(_)));

    let err = fx.market.restock(&fx.producer, &hoodie.id, -1).unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let restocked = fx.market.restock(&fx.admin, &hoodie.id, 12)?;
    assert_eq!(restocked.stock_quantity, 12);

    let err = fx
        .market
        .set_beat_visibility(&fx.producer, "beat1missing", hide)
        .unwrap_err();
    assert!(matches!(err, ServiceError::NotFound { .. }));
    Ok(())
}

#[test]
fn beat_counters_only_grow() -> anyhow::Result<()> {
    let fx = Fixture::new("counters")?;
    let beat = fx.beat("Loop", 10)?;

    fx.market.record_play(&beat.id)?;
    let played = fx.market.record_play(&beat.id)?;
    assert_eq!(played.play_count, 2);
    assert_eq!(played.download_count, 0);

    let downloaded = fx.market.record_download(&beat.id)?;
    assert_eq!(downloaded.download_count, 1);
    assert_eq!(fx.market.beat(&beat.id)?.play_count, 2);

    assert!(matches!(
        fx.market.record_play("beat1missing"),
        Err(ServiceError::NotFound { .. })
    ));
    Ok(())
}

#[test]
fn removing_a_line_drops_it_from_the_quote() -> anyhow::Result<()> {
    let fx = Fixture::new("remove_line")?;
    let beat = fx.beat("Keep", 10)?;
    let hoodie = fx.merch("Hoodie", 40, 3)?;

    let mut cart = Cart::new();
    fx.market.add_to_cart(&mut cart, ItemKind::Beat, &beat.id, 1)?;
    fx.market
        .add_to_cart(&mut cart, ItemKind::Merchandise, &hoodie.id, 2)?;
    assert_eq!(fx.market.quote_cart(&cart)?.total.0, 9_000);

    fx.market
        .remove_from_cart(&mut cart, ItemKind::Merchandise, &hoodie.id);
    let quote = fx.market.quote_cart(&cart)?;
    assert_eq!(quote.lines.len(), 1);
    assert_eq!(quote.total.0, 1_000);
    Ok(())
}
