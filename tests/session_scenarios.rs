//! Session booking, cancellation and session payment scenarios.
mod common;

use std::thread;

use chrono::{Days, Utc};
use common::{Fixture, register};
use don_records::access::Role;
use don_records::booking::{BookingRequest, SessionStatus};
use don_records::error::{ServiceError, ValidationError};
use don_records::message::Mailbox;
use don_records::payment::{PaymentKind, TransactionStatus};
use don_records::store::Page;
use don_records::types::{CalendarDate, Cents};
use serde_json::json;

fn future_date(days: u64) -> String {
    (Utc::now().date_naive() + Days::new(days))
        .format("%Y-%m-%d")
        .to_string()
}

fn request(fx: &Fixture, date: &str, start: &str, end: &str) -> BookingRequest {
    BookingRequest::new()
        .set_producer(&fx.producer.user_id)
        .set_date(date)
        .set_start(start)
        .set_end(end)
        .set_purpose("Vocal tracking")
}

/// 10:00-12:00 is booked, 11:00-13:00 on the same day is refused.
#[test]
fn overlapping_request_is_refused() -> anyhow::Result<()> {
    let fx = Fixture::new("overlap")?;
    let date = future_date(7);
    let today = CalendarDate::today();

    let first = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "10:00", "12:00"), today)?;
    assert_eq!(first.status, SessionStatus::Requested);
    assert_eq!(first.price, Cents(10_000));

    let err = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "11:00", "13:00"), today)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    // back to back is fine
    fx.market
        .book_session(&fx.artist, request(&fx, &date, "12:00", "13:00"), today)?;

    let listed = fx
        .market
        .list_sessions(&fx.producer, None, Page::default())?;
    assert_eq!(listed.total, 2);

    let inbox = fx
        .market
        .inbox(&fx.producer, Mailbox::Received, Page::default())?;
    let requests = inbox
        .items
        .iter()
        .filter(|m| m.subject == "New Session Booking Request")
        .count();
    assert_eq!(requests, 2);
    Ok(())
}

/// Two overlapping requests racing each other produce exactly one booking.
#[test]
fn concurrent_overlapping_requests_book_once() -> anyhow::Result<()> {
    let fx = Fixture::new("overlap_race")?;
    let date = future_date(3);
    let today = CalendarDate::today();

    let shared = &fx;
    let results: Vec<_> = thread::scope(|s| {
        let handles: Vec<_> = [("09:00", "11:00"), ("10:00", "12:00")]
            .into_iter()
            .map(|(start, end)| {
                let req = request(shared, &date, start, end);
                s.spawn(move || shared.market.book_session(&shared.artist, req, today))
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
    assert!(results
        .iter()
        .any(|r| matches!(r, Err(ServiceError::Conflict(_)))));
    assert_eq!(
        fx.market
            .list_sessions(&fx.artist, None, Page::default())?
            .total,
        1
    );
    Ok(())
}

#[test]
fn pricing_has_a_two_hour_minimum() -> anyhow::Result<()> {
    let fx = Fixture::new("pricing")?;
    let date = future_date(10);
    let today = CalendarDate::today();

    let short = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "08:00", "09:00"), today)?;
    assert_eq!(short.price, Cents(10_000));

    let odd = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "10:00", "12:05"), today)?;
    assert_eq!(odd.price, Cents(10_417));

    let long = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "13:00", "17:00"), today)?;
    assert_eq!(long.price, Cents(20_000));
    Ok(())
}

#[test]
fn booking_validation() -> anyhow::Result<()> {
    let fx = Fixture::new("booking_validation")?;
    let today = CalendarDate::today();
    let date = future_date(5);

    let yesterday = (Utc::now().date_naive() - Days::new(1))
        .format("%Y-%m-%d")
        .to_string();
    let err = fx
        .market
        .book_session(&fx.artist, request(&fx, &yesterday, "10:00", "12:00"), today)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::DateInPast)));

    let err = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "12:00", "10:00"), today)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::EndBeforeStart)));

    let err = fx
        .market
        .book_session(&fx.artist, request(&fx, "next tuesday", "10:00", "12:00"), today)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(ValidationError::InvalidValue { .. })));

    // an unapproved producer cannot be booked
    let pending = register(&fx.market, "newprod", Role::Producer, ("New", "Prod"))?;
    let req = request(&fx, &date, "10:00", "12:00").set_producer(&pending);
    let err = fx
        .market
        .book_session(&fx.artist, req, today)
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::ProducerUnavailable)
    ));

    // an artist is not a producer
    let req = request(&fx, &date, "10:00", "12:00").set_producer(&fx.customer.user_id);
    let err = fx.market.book_session(&fx.artist, req, today).unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::ProducerUnavailable)
    ));

    let err = fx
        .market
        .book_session(&fx.customer, request(&fx, &date, "10:00", "12:00"), today)
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied(_)));
    Ok(())
}

/// Cancelling frees the slot, finished sessions cannot be cancelled.
#[test]
fn cancellation_rules() -> anyhow::Result<()> {
    let fx = Fixture::new("cancellation")?;
    let date = future_date(4);
    let today = CalendarDate::today();

    let session = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "14:00", "16:00"), today)?;
    let cancelled = fx.market.cancel_session(&fx.artist, &session.id)?;
    assert_eq!(cancelled.status, SessionStatus::Cancelled);

    let err = fx
        .market
        .cancel_session(&fx.artist, &session.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let rebooked = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "14:00", "16:00"), today)?;
    fx.market
        .update_session_status(&fx.producer, &rebooked.id, "confirmed", None)?;
    fx.market
        .update_session_status(&fx.producer, &rebooked.id, "completed", Some("Great session"))?;

    let err = fx
        .market
        .cancel_session(&fx.artist, &rebooked.id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    let unchanged = fx.market.get_session(&fx.artist, &rebooked.id)?;
    assert_eq!(unchanged.status, SessionStatus::Completed);
    assert_eq!(unchanged.notes.as_deref(), Some("Great session"));

    let producer_inbox = fx
        .market
        .inbox(&fx.producer, Mailbox::Received, Page::default())?;
    assert!(producer_inbox
        .items
        .iter()
        .any(|m| m.subject == "Session Booking Cancelled"));
    Ok(())
}

#[test]
fn producer_status_updates() -> anyhow::Result<()> {
    let fx = Fixture::new("producer_updates")?;
    let date = future_date(6);
    let today = CalendarDate::today();
    let session = fx
        .market
        .book_session(&fx.artist, request(&fx, &date, "10:00", "12:00"), today)?;

    let err = fx
        .market
        .update_session_status(&fx.producer, &session.id, "completed", None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));

    let err = fx
        .market
        .update_session_status(&fx.producer, &session.id, "postponed", None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Validation(_)));

    let other = register(&fx.market, "otherprod", Role::Producer, ("Other", "Prod"))?;
    fx.market.approve_user(&fx.admin, &other)?;
    let other = fx.market.login(&other)?;
    let err = fx
        .market
        .update_session_status(&other, &session.id, "confirmed", None)
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied(_)));

    let confirmed = fx
        .market
        .update_session_status(&fx.producer, &session.id, "confirmed", Some("Bring stems"))?;
    assert_eq!(confirmed.status, SessionStatus::Confirmed);

    let inbox = fx
        .market
        .inbox(&fx.artist, Mailbox::Received, Page::default())?;
    let update = inbox
        .items
        .iter()
        .find(|m| m.subject == "Session Status Updated: Confirmed")
        .expect("artist notified");
    assert!(update.body.contains("10:00 AM"));
    assert!(update.body.ends_with("Bring stems"));

    // producer side cancellation frees the slot too
    fx.market
        .update_session_status(&fx.producer, &session.id, "cancelled", None)?;
    fx.market
        .book_session(&fx.artist, request(&fx, &date, "11:00", "12:00"), today)?;
    Ok(())
}

/// The artist pays through the session webhook; both parties are told.
#[test]
fn session_payment_flow() -> anyhow::Result<()> {
    let fx = Fixture::new("session_payment")?;
    let date = future_date(8);
    let session = fx.market.book_session(
        &fx.artist,
        request(&fx, &date, "10:00", "12:00"),
        CalendarDate::today(),
    )?;

    let err = fx
        .market
        .begin_session_payment(&fx.producer, &session.id, "mpesa")
        .unwrap_err();
    assert!(matches!(err, ServiceError::AccessDenied(_)));

    let txn = fx
        .market
        .begin_session_payment(&fx.artist, &session.id, "mpesa")?;
    assert_eq!(txn.amount, session.price);
    assert_eq!(txn.status, TransactionStatus::Pending);
    fx.market.payment_for(&fx.artist, &txn.transaction_id)?;

    // posted to the goods endpoint by mistake
    let err = fx
        .market
        .handle_webhook(
            json!({"transaction_id": txn.transaction_id, "status": "completed"}),
            PaymentKind::Goods,
        )
        .unwrap_err();
    assert!(matches!(
        err,
        ServiceError::Validation(ValidationError::WrongPaymentFlow)
    ));

    fx.market.handle_webhook(
        json!({"transaction_id": txn.transaction_id, "status": "completed"}),
        PaymentKind::Session,
    )?;
    let paid = fx.market.get_session(&fx.artist, &session.id)?;
    assert!(paid.is_paid);
    assert_eq!(paid.status, SessionStatus::Requested);

    let artist_inbox = fx
        .market
        .inbox(&fx.artist, Mailbox::Received, Page::default())?;
    assert!(artist_inbox
        .items
        .iter()
        .any(|m| m.subject == "Session Payment Confirmed"));
    let producer_inbox = fx
        .market
        .inbox(&fx.producer, Mailbox::Received, Page::default())?;
    assert!(producer_inbox
        .items
        .iter()
        .any(|m| m.subject == "Session Payment Received" && m.body.contains("Art Ist")));

    let err = fx
        .market
        .begin_session_payment(&fx.artist, &session.id, "mpesa")
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    let err = fx
        .market
        .payment_for(&fx.artist, &txn.transaction_id)
        .unwrap_err();
    assert!(matches!(err, ServiceError::Conflict(_)));
    Ok(())
}
