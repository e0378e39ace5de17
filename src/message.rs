//! Internal mail
use chrono::Utc;

use crate::types::TimeStamp;

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Message {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub sender_id: String,
    #[n(2)]
    pub recipient_id: String,
    #[n(3)]
    pub subject: String,
    #[n(4)]
    pub body: String,
    #[n(5)]
    pub created_at: TimeStamp<Utc>,
    #[n(6)]
    pub is_read: bool,
    #[n(7)]
    pub read_at: Option<TimeStamp<Utc>>,
}

impl Message {
    pub fn new(id: String, sender_id: &str, recipient_id: &str, subject: String, body: String) -> Self {
        Self {
            id,
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            subject,
            body,
            created_at: TimeStamp::new(),
            is_read: false,
            read_at: None,
        }
    }

    /// `is_read` and `read_at` flip together, once.
    pub fn mark_as_read(&mut self) -> bool {
        if self.is_read {
            return false;
        }
        self.is_read = true;
        self.read_at = Some(TimeStamp::new());
        true
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Mailbox {
    Received,
    Sent,
}
