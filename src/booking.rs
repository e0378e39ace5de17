//! Studio session bookings between an artist and a producer
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::account::required;
use crate::error::ValidationError;
use crate::types::{CalendarDate, Cents, ClockTime, TimeStamp};

/// Hourly studio rate.
pub const HOURLY_RATE: Cents = Cents::from_dollars(50);
/// Sessions are billed for at least this many minutes.
pub const MINIMUM_BILLED_MINUTES: u64 = 120;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SessionStatus {
    #[n(0)]
    Requested,
    #[n(1)]
    Confirmed,
    #[n(2)]
    Completed,
    #[n(3)]
    Cancelled,
}

impl SessionStatus {
    pub const ALL: [SessionStatus; 4] = [
        SessionStatus::Requested,
        SessionStatus::Confirmed,
        SessionStatus::Completed,
        SessionStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Requested => "requested",
            SessionStatus::Confirmed => "confirmed",
            SessionStatus::Completed => "completed",
            SessionStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, SessionStatus::Completed | SessionStatus::Cancelled)
    }

    /// Re-entering the current status is always allowed.
    pub fn can_transition_to(&self, next: SessionStatus) -> bool {
        use SessionStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Requested, Confirmed) | (Confirmed, Completed) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }

    pub fn capitalized(&self) -> String {
        let s = self.as_str();
        let mut chars = s.chars();
        match chars.next() {
            Some(first) => first.to_uppercase().chain(chars).collect(),
            None => String::new(),
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        SessionStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::invalid("session status", s))
    }
}

/// Half open interval `[start, end)` on one calendar day.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq)]
pub struct TimeSlot {
    #[n(0)]
    pub date: CalendarDate,
    #[n(1)]
    pub start: ClockTime,
    #[n(2)]
    pub end: ClockTime,
}

impl TimeSlot {
    pub fn duration_minutes(&self) -> u64 {
        u64::from(
            self.end
                .minutes_from_midnight()
                .saturating_sub(self.start.minutes_from_midnight()),
        )
    }

    /// Matches when the other slot's start or end falls inside this one, or this one
    /// contains it entirely.
    pub fn overlaps(&self, other: &TimeSlot) -> bool {
        if self.date != other.date {
            return false;
        }
        let (s, e) = (self.start, self.end);
        let (os, oe) = (other.start, other.end);

        let start_inside = s <= os && e > os;
        let end_inside = s < oe && e >= oe;
        let contains = s >= os && e <= oe;
        start_inside || end_inside || contains
    }
}

/// `max(2, hours) * $50`, rounded half up to the cent.
pub fn session_price(slot: &TimeSlot) -> Cents {
    let minutes = slot.duration_minutes().max(MINIMUM_BILLED_MINUTES);
    Cents((minutes * HOURLY_RATE.0 + 30) / 60)
}

/// One entry of the status history, appended on every status update.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SessionChange {
    #[n(0)]
    pub actor: String,
    #[n(1)]
    pub from: SessionStatus,
    #[n(2)]
    pub to: SessionStatus,
    #[n(3)]
    pub at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct SessionBooking {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub artist_id: String,
    #[n(2)]
    pub producer_id: String,
    #[n(3)]
    pub slot: TimeSlot,
    #[n(4)]
    pub purpose: String,
    #[n(5)]
    pub status: SessionStatus,
    #[n(6)]
    pub price: Cents,
    #[n(7)]
    pub is_paid: bool, // independent of any transaction status
    #[n(8)]
    pub notes: Option<String>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
    #[n(11)]
    pub history: Vec<SessionChange>,
}

impl SessionBooking {
    /// Returns false without touching the booking when the table forbids the move.
    pub fn apply_status(&mut self, next: SessionStatus, actor: &str) -> bool {
        let current = self.status;
        if !current.can_transition_to(next) {
            return false;
        }
        let now = TimeStamp::new();
        self.status = next;
        self.updated_at = now.clone();
        self.history.push(SessionChange {
            actor: actor.to_string(),
            from: current,
            to: next,
            at: now,
        });
        true
    }

    pub fn holds_slot(&self) -> bool {
        self.status != SessionStatus::Cancelled
    }
}

/// The non-cancelled bookings of one producer on one day.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Default, PartialEq, Eq)]
pub struct DaySchedule {
    #[n(0)]
    pub entries: Vec<ScheduleEntry>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct ScheduleEntry {
    #[n(0)]
    pub session_id: String,
    #[n(1)]
    pub slot: TimeSlot,
}

impl DaySchedule {
    pub fn conflict_with(&self, slot: &TimeSlot) -> Option<&ScheduleEntry> {
        self.entries.iter().find(|entry| entry.slot.overlaps(slot))
    }
    pub fn reserve(&mut self, session_id: &str, slot: TimeSlot) {
        self.entries.push(ScheduleEntry {
            session_id: session_id.to_string(),
            slot,
        });
    }
    pub fn release(&mut self, session_id: &str) {
        self.entries.retain(|entry| entry.session_id != session_id);
    }
}

// Booking form as submitted by an artist
#[derive(Debug, Default, Clone)]
pub struct BookingRequest {
    pub producer_id: Option<String>,
    pub session_date: Option<String>,
    pub start_time: Option<String>,
    pub end_time: Option<String>,
    pub purpose: Option<String>,
}

impl BookingRequest {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_producer(mut self, producer_id: &str) -> Self {
        self.producer_id = Some(producer_id.to_string());
        self
    }
    pub fn set_date(mut self, date: &str) -> Self {
        self.session_date = Some(date.to_string());
        self
    }
    pub fn set_start(mut self, time: &str) -> Self {
        self.start_time = Some(time.to_string());
        self
    }
    pub fn set_end(mut self, time: &str) -> Self {
        self.end_time = Some(time.to_string());
        self
    }
    pub fn set_purpose(mut self, purpose: &str) -> Self {
        self.purpose = Some(purpose.to_string());
        self
    }

    /// Field presence, formats, `date >= today` and `start < end`.
    pub fn validate(self, today: CalendarDate) -> Result<ValidBooking, ValidationError> {
        let producer_id = required(self.producer_id, "producer")?;
        let date = required(self.session_date, "session date")?;
        let start = required(self.start_time, "start time")?;
        let end = required(self.end_time, "end time")?;
        let purpose = required(self.purpose, "purpose")?;

        let date = CalendarDate::parse(&date).ok_or(ValidationError::invalid("session date", date))?;
        let start = ClockTime::parse(&start).ok_or(ValidationError::invalid("start time", start))?;
        let end = ClockTime::parse(&end).ok_or(ValidationError::invalid("end time", end))?;

        if date < today {
            return Err(ValidationError::DateInPast);
        }
        if start >= end {
            return Err(ValidationError::EndBeforeStart);
        }

        Ok(ValidBooking {
            producer_id,
            slot: TimeSlot { date, start, end },
            purpose,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidBooking {
    pub producer_id: String,
    pub slot: TimeSlot,
    pub purpose: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn slot(start: &str, end: &str) -> TimeSlot {
        TimeSlot {
            date: CalendarDate::from_ymd(2024, 6, 1).unwrap(),
            start: ClockTime::parse(start).unwrap(),
            end: ClockTime::parse(end).unwrap(),
        }
    }

    #[test]
    fn overlapping_slots_conflict() {
        let booked = slot("10:00", "12:00");
        assert!(booked.overlaps(&slot("11:00", "13:00")));
        assert!(booked.overlaps(&slot("09:00", "11:00")));
        assert!(booked.overlaps(&slot("10:30", "11:30")));
        assert!(booked.overlaps(&slot("09:00", "13:00")));
    }

    #[test]
    fn adjacent_slots_do_not_conflict() {
        let booked = slot("10:00", "12:00");
        assert!(!booked.overlaps(&slot("12:00", "14:00")));
        assert!(!booked.overlaps(&slot("08:00", "10:00")));
    }

    #[test]
    fn two_hour_minimum() {
        assert_eq!(session_price(&slot("10:00", "11:00")), Cents::from_dollars(100));
        assert_eq!(session_price(&slot("10:00", "12:00")), Cents::from_dollars(100));
        assert_eq!(session_price(&slot("10:00", "13:30")), Cents::from_dollars(175));
        // 125 minutes is 104.1666..
        assert_eq!(session_price(&slot("10:00", "12:05")), Cents(10417));
    }

    #[test]
    fn completed_and_cancelled_cannot_be_cancelled_again() {
        assert!(!SessionStatus::Completed.can_transition_to(SessionStatus::Cancelled));
        assert!(SessionStatus::Cancelled.can_transition_to(SessionStatus::Cancelled));
        assert!(SessionStatus::Requested.can_transition_to(SessionStatus::Cancelled));
        assert!(SessionStatus::Confirmed.can_transition_to(SessionStatus::Cancelled));
        assert!(!SessionStatus::Requested.can_transition_to(SessionStatus::Completed));
    }

    #[test]
    fn booking_in_the_past_rejected() {
        let today = CalendarDate::from_ymd(2024, 6, 2).unwrap();
        let res = BookingRequest::new()
            .set_producer("user1p")
            .set_date("2024-06-01")
            .set_start("10:00")
            .set_end("12:00")
            .set_purpose("mixdown")
            .validate(today);
        assert_eq!(res, Err(ValidationError::DateInPast));
    }

    #[test]
    fn end_must_follow_start() {
        let today = CalendarDate::from_ymd(2024, 6, 1).unwrap();
        let res = BookingRequest::new()
            .set_producer("user1p")
            .set_date("2024-06-01")
            .set_start("12:00")
            .set_end("12:00")
            .set_purpose("mixdown")
            .validate(today);
        assert_eq!(res, Err(ValidationError::EndBeforeStart));
    }

    #[test]
    fn status_label_is_capitalized() {
        assert_eq!(SessionStatus::Confirmed.capitalized(), "Confirmed");
    }
}
