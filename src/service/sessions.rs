use tracing::{debug, info, warn};

use super::{Marketplace, Notice, hold};
use crate::access::{AccessDenied, Caller, Role, authorize};
use crate::account::{Held, User};
use crate::booking::{BookingRequest, DaySchedule, SessionBooking, SessionStatus, session_price};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::store::{self, Page, Paginated, abort, key, schedule_key, tx_fetch, tx_get, tx_put};
use crate::types::{CalendarDate, TimeStamp};
use crate::utils::{SESSION_HRP, new_record_id};

impl Marketplace {
    /// Books a studio session with a producer.
    ///
    /// The overlap check runs against the producer's schedule for that day inside the
    /// same commit that stores the booking, so two overlapping requests cannot both win.
    pub fn book_session(
        &self,
        caller: &Caller,
        request: BookingRequest,
        today: CalendarDate,
    ) -> ServiceResult<SessionBooking> {
        authorize(caller, &[Role::Artist], None)?;
        let booking = request.validate(today)?;
        if booking.producer_id == caller.user_id {
            return Err(ValidationError::SelfBooking.into());
        }

        let producer: Option<User> = self.store.get(&key(store::USER, &booking.producer_id))?;
        let available = producer
            .as_ref()
            .is_some_and(|p| p.role == Role::Producer && p.is_approved && p.is_active);
        if !available {
            return Err(ValidationError::ProducerUnavailable.into());
        }
        let artist = self.user(&caller.user_id)?;

        let slot = booking.slot;
        let now = TimeStamp::new();
        let session = SessionBooking {
            id: new_record_id(SESSION_HRP),
            artist_id: caller.user_id.clone(),
            producer_id: booking.producer_id.clone(),
            slot,
            purpose: booking.purpose.clone(),
            status: SessionStatus::Requested,
            price: session_price(&slot),
            is_paid: false,
            notes: None,
            created_at: now.clone(),
            updated_at: now,
            history: Vec::new(),
        };
        let day_key = schedule_key(&session.producer_id, &slot.date);

        self.store.transact(|tx| {
            let mut schedule: DaySchedule = tx_get(tx, &day_key)?.unwrap_or_default();
            if let Some(taken) = schedule.conflict_with(&slot) {
                return abort(ServiceError::conflict(format!(
                    "producer is already booked from {} to {} on {}",
                    taken.slot.start, taken.slot.end, taken.slot.date
                )));
            }
            schedule.reserve(&session.id, slot);
            tx_put(tx, &day_key, &schedule)?;
            tx_put(tx, &key(store::SESSION, &session.id), &session)?;
            hold(tx, &session.artist_id, Held::Session, &session.id)?;
            hold(tx, &session.producer_id, Held::Session, &session.id)?;

            Notice::new(
                &caller.user_id,
                &session.producer_id,
                "New Session Booking Request".to_string(),
                format!(
                    "You have a new session booking request from {} for {} from {} to {}.\n\nPurpose: {}",
                    artist.full_name(),
                    slot.date,
                    slot.start,
                    slot.end,
                    session.purpose
                ),
            )
            .write(tx)
        })
        .inspect_err(|e| warn!(producer_id = %session.producer_id, date = %slot.date, error = %e, "booking refused"))?;

        info!(
            session_id = %session.id,
            producer_id = %session.producer_id,
            date = %slot.date,
            price = %session.price,
            "session requested"
        );
        Ok(session)
    }

    pub fn session(&self, session_id: &str) -> ServiceResult<SessionBooking> {
        self.store.fetch("session", store::SESSION, session_id)
    }

    /// Readable by the two parties of the booking and by admins.
    pub fn get_session(&self, caller: &Caller, session_id: &str) -> ServiceResult<SessionBooking> {
        authorize(caller, &[Role::Admin, Role::Producer, Role::Artist], None)?;
        let session = self.session(session_id)?;
        let party = caller.user_id == session.artist_id || caller.user_id == session.producer_id;
        if !party && caller.role != Role::Admin {
            return Err(AccessDenied::Forbidden.into());
        }
        debug!(session_id, "read session");
        Ok(session)
    }

    /// Producer side status change. The artist is notified even when the status is unchanged.
    pub fn update_session_status(
        &self,
        caller: &Caller,
        session_id: &str,
        status: &str,
        notes: Option<&str>,
    ) -> ServiceResult<SessionBooking> {
        authorize(caller, &[Role::Producer], None)?;
        let next: SessionStatus = status.parse()?;
        let current = self.session(session_id)?;
        authorize(caller, &[Role::Producer], Some(&current.producer_id))?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        let session = self.store.transact(|tx| {
            let mut session: SessionBooking = tx_fetch(tx, "session", store::SESSION, session_id)?;
            let from = session.status;
            if !session.apply_status(next, &caller.user_id) {
                return abort(ServiceError::conflict(format!(
                    "session cannot move from {from} to {next}"
                )));
            }
            if let Some(notes) = notes {
                session.notes = Some(notes.to_string());
            }
            if from != next && next == SessionStatus::Cancelled {
                release_slot(tx, &session)?;
            }
            tx_put(tx, &key(store::SESSION, session_id), &session)?;

            let slot = session.slot;
            Notice::new(
                &caller.user_id,
                &session.artist_id,
                format!("Session Status Updated: {}", next.capitalized()),
                format!(
                    "Your session booking for {} from {} to {} has been updated to {}.\n\n{}",
                    slot.date.long(),
                    slot.start.twelve_hour(),
                    slot.end.twelve_hour(),
                    next.capitalized(),
                    notes.unwrap_or_default()
                ),
            )
            .write(tx)?;
            Ok(session)
        })?;

        info!(session_id, status = %next, producer_id = %caller.user_id, "updated session status");
        Ok(session)
    }

    /// Artist side cancellation of a session that has not happened yet.
    pub fn cancel_session(&self, caller: &Caller, session_id: &str) -> ServiceResult<SessionBooking> {
        authorize(caller, &[Role::Artist], None)?;
        let current = self.session(session_id)?;
        authorize(caller, &[Role::Artist], Some(&current.artist_id))?;

        let session = self.store.transact(|tx| {
            let mut session: SessionBooking = tx_fetch(tx, "session", store::SESSION, session_id)?;
            if session.status.is_terminal() {
                return abort(ServiceError::conflict(format!(
                    "a {} session cannot be cancelled",
                    session.status
                )));
            }
            session.apply_status(SessionStatus::Cancelled, &caller.user_id);
            release_slot(tx, &session)?;
            tx_put(tx, &key(store::SESSION, session_id), &session)?;

            let slot = session.slot;
            Notice::new(
                &caller.user_id,
                &session.producer_id,
                "Session Booking Cancelled".to_string(),
                format!(
                    "The session booking for {} from {} to {} has been cancelled by the artist.",
                    slot.date, slot.start, slot.end
                ),
            )
            .write(tx)?;
            Ok(session)
        })?;

        info!(session_id, artist_id = %caller.user_id, "session cancelled");
        Ok(session)
    }

    /// Bookings seen from the caller's side, latest slot first.
    pub fn list_sessions(
        &self,
        caller: &Caller,
        status: Option<SessionStatus>,
        page: Page,
    ) -> ServiceResult<Paginated<SessionBooking>> {
        authorize(caller, &[Role::Admin, Role::Producer, Role::Artist], None)?;
        let role = caller.role;
        let user_id = caller.user_id.as_str();

        let mut sessions: Vec<SessionBooking> = self.store.scan(store::SESSION, |s: &SessionBooking| {
            let visible = match role {
                Role::Artist => s.artist_id == user_id,
                Role::Producer => s.producer_id == user_id,
                _ => true,
            };
            visible && status.is_none_or(|wanted| s.status == wanted)
        })?;
        sessions.sort_by(|a, b| (b.slot.date, b.slot.start).cmp(&(a.slot.date, a.slot.start)));
        Ok(Paginated::from_sorted(sessions, page))
    }
}

/// Drops the booking from its producer's day schedule.
pub(super) fn release_slot(
    tx: &sled::transaction::TransactionalTree,
    session: &SessionBooking,
) -> sled::transaction::ConflictableTransactionResult<(), ServiceError> {
    let key = schedule_key(&session.producer_id, &session.slot.date);
    if let Some(mut schedule) = tx_get::<DaySchedule>(tx, &key)? {
        schedule.release(&session.id);
        tx_put(tx, &key, &schedule)?;
    }
    Ok(())
}
