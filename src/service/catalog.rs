use tracing::{debug, info, warn};

use super::Marketplace;
use crate::access::{Caller, Role, authorize, authorize_owner_or_admin};
use crate::cart::{Cart, CartQuote, PricedLine};
use crate::catalog::{Beat, ItemKind, Merchandise, NewBeat, NewMerchandise, Visibility};
use crate::error::{ServiceResult, ValidationError};
use crate::store::{self, Page, Paginated, key, tx_fetch, tx_put};
use crate::utils::{BEAT_HRP, MERCH_HRP, new_record_id};

impl Marketplace {
    pub fn publish_beat(&self, caller: &Caller, form: NewBeat) -> ServiceResult<Beat> {
        authorize(caller, &[Role::Producer], None)?;
        let beat = form.validate_and_finalise(new_record_id(BEAT_HRP), caller.user_id.clone())?;
        self.store.put(&key(store::BEAT, &beat.id), &beat)?;

        info!(beat_id = %beat.id, producer_id = %caller.user_id, price = %beat.price, "published beat");
        Ok(beat)
    }

    pub fn list_merchandise(&self, caller: &Caller, form: NewMerchandise) -> ServiceResult<Merchandise> {
        authorize(caller, &[Role::Producer, Role::Admin], None)?;
        let merch = form.validate_and_finalise(new_record_id(MERCH_HRP), caller.user_id.clone())?;
        self.store.put(&key(store::MERCH, &merch.id), &merch)?;

        info!(merchandise_id = %merch.id, stock = merch.stock_quantity, "listed merchandise");
        Ok(merch)
    }

    pub fn beat(&self, beat_id: &str) -> ServiceResult<Beat> {
        self.store.fetch("beat", store::BEAT, beat_id)
    }

    pub fn merchandise(&self, merchandise_id: &str) -> ServiceResult<Merchandise> {
        self.store.fetch("merchandise", store::MERCH, merchandise_id)
    }

    pub fn set_beat_visibility(
        &self,
        caller: &Caller,
        beat_id: &str,
        visibility: Visibility,
    ) -> ServiceResult<Beat> {
        let current = self.beat(beat_id)?;
        authorize_owner_or_admin(caller, &[Role::Producer, Role::Admin], Some(&current.producer_id))?;

        self.store.transact(|tx| {
            let mut beat: Beat = tx_fetch(tx, "beat", store::BEAT, beat_id)?;
            if let Some(published) = visibility.is_published {
                beat.is_published = published;
            }
            if let Some(featured) = visibility.is_featured {
                beat.is_featured = featured;
            }
            tx_put(tx, &key(store::BEAT, beat_id), &beat)?;
            Ok(beat)
        })
    }

    pub fn set_merchandise_visibility(
        &self,
        caller: &Caller,
        merchandise_id: &str,
        visibility: Visibility,
    ) -> ServiceResult<Merchandise> {
        let current = self.merchandise(merchandise_id)?;
        authorize_owner_or_admin(caller, &[Role::Producer, Role::Admin], Some(&current.seller_id))?;

        self.store.transact(|tx| {
            let mut merch: Merchandise = tx_fetch(tx, "merchandise", store::MERCH, merchandise_id)?;
            if let Some(published) = visibility.is_published {
                merch.is_published = published;
            }
            if let Some(featured) = visibility.is_featured {
                merch.is_featured = featured;
            }
            tx_put(tx, &key(store::MERCH, merchandise_id), &merch)?;
            Ok(merch)
        })
    }

    /// Sets the stock level outright.
    pub fn restock(&self, caller: &Caller, merchandise_id: &str, quantity: i64) -> ServiceResult<Merchandise> {
        let current = self.merchandise(merchandise_id)?;
        authorize_owner_or_admin(caller, &[Role::Producer, Role::Admin], Some(&current.seller_id))?;
        if quantity < 0 {
            return Err(ValidationError::invalid("stock quantity", quantity.to_string()).into());
        }

        let merch = self.store.transact(|tx| {
            let mut merch: Merchandise = tx_fetch(tx, "merchandise", store::MERCH, merchandise_id)?;
            merch.stock_quantity = quantity;
            tx_put(tx, &key(store::MERCH, merchandise_id), &merch)?;
            Ok(merch)
        })?;

        info!(merchandise_id, stock = quantity, "restocked merchandise");
        Ok(merch)
    }

    pub fn record_play(&self, beat_id: &str) -> ServiceResult<Beat> {
        self.store.transact(|tx| {
            let mut beat: Beat = tx_fetch(tx, "beat", store::BEAT, beat_id)?;
            beat.record_play();
            tx_put(tx, &key(store::BEAT, beat_id), &beat)?;
            Ok(beat)
        })
    }

    pub fn record_download(&self, beat_id: &str) -> ServiceResult<Beat> {
        self.store.transact(|tx| {
            let mut beat: Beat = tx_fetch(tx, "beat", store::BEAT, beat_id)?;
            beat.record_download();
            tx_put(tx, &key(store::BEAT, beat_id), &beat)?;
            Ok(beat)
        })
    }

    /// Published beats, newest first.
    pub fn published_beats(&self, page: Page) -> ServiceResult<Paginated<Beat>> {
        let mut beats: Vec<Beat> = self.store.scan(store::BEAT, |b: &Beat| b.is_published)?;
        beats.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Paginated::from_sorted(beats, page))
    }

    /// Published merchandise, newest first.
    pub fn published_merchandise(&self, page: Page) -> ServiceResult<Paginated<Merchandise>> {
        let mut items: Vec<Merchandise> =
            self.store.scan(store::MERCH, |m: &Merchandise| m.is_published)?;
        items.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Paginated::from_sorted(items, page))
    }

    /// Featured and published items of both kinds.
    pub fn featured(&self) -> ServiceResult<(Vec<Beat>, Vec<Merchandise>)> {
        let beats = self
            .store
            .scan(store::BEAT, |b: &Beat| b.is_published && b.is_featured)?;
        let merch = self
            .store
            .scan(store::MERCH, |m: &Merchandise| m.is_published && m.is_featured)?;
        Ok((beats, merch))
    }

    pub fn add_to_cart(&self, cart: &mut Cart, kind: ItemKind, item_id: &str, quantity: u32) -> ServiceResult<()> {
        if quantity == 0 {
            return Err(ValidationError::ZeroQuantity.into());
        }
        match kind {
            ItemKind::Beat => {
                self.beat(item_id)?;
            }
            ItemKind::Merchandise => {
                let merch = self.merchandise(item_id)?;
                // only the requested quantity is checked, not what is already in the cart
                if !merch.has_stock_for(quantity) {
                    return Err(ValidationError::InsufficientStock {
                        item: merch.name,
                        available: merch.stock_quantity,
                    }
                    .into());
                }
            }
        }
        cart.add(kind, item_id, quantity);
        debug!(%kind, item_id, quantity, "added to cart");
        Ok(())
    }

    /// Zero drops the line. Merchandise quantities are clamped to what is in stock.
    pub fn update_cart(&self, cart: &mut Cart, kind: ItemKind, item_id: &str, quantity: u32) -> ServiceResult<()> {
        let quantity = match kind {
            ItemKind::Merchandise if quantity > 0 => {
                let merch = self.merchandise(item_id)?;
                let available = u32::try_from(merch.stock_quantity.max(0)).unwrap_or(u32::MAX);
                quantity.min(available)
            }
            _ => quantity,
        };
        cart.set_quantity(kind, item_id, quantity);
        Ok(())
    }

    pub fn remove_from_cart(&self, cart: &mut Cart, kind: ItemKind, item_id: &str) {
        cart.remove(kind, item_id);
    }

    pub fn quote_cart(&self, cart: &Cart) -> ServiceResult<CartQuote> {
        Ok(CartQuote::from_lines(self.resolve_cart(cart)?))
    }

    /// Prices every line from the live catalog. Missing or unpublished items are dropped.
    pub(crate) fn resolve_cart(&self, cart: &Cart) -> ServiceResult<Vec<PricedLine>> {
        let mut lines = Vec::with_capacity(cart.lines().len());
        for line in cart.lines() {
            let resolved = match line.kind {
                ItemKind::Beat => self
                    .store
                    .get::<Beat>(&key(store::BEAT, &line.item_id))?
                    .filter(|b| b.is_published)
                    .map(|b| (b.title, b.price)),
                ItemKind::Merchandise => self
                    .store
                    .get::<Merchandise>(&key(store::MERCH, &line.item_id))?
                    .filter(|m| m.is_published)
                    .map(|m| (m.name, m.price)),
            };
            match resolved {
                Some((title, unit_price)) => lines.push(PricedLine {
                    kind: line.kind,
                    item_id: line.item_id.clone(),
                    title,
                    unit_price,
                    quantity: line.quantity,
                }),
                None => warn!(kind = %line.kind, item_id = %line.item_id, "dropping unavailable cart line"),
            }
        }
        Ok(lines)
    }
}

