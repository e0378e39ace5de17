use tracing::{debug, info};

use super::{Marketplace, Notice};
use crate::access::{AccessDenied, Caller, Role, authorize};
use crate::account::User;
use crate::error::{ServiceResult, ValidationError};
use crate::message::{Mailbox, Message};
use crate::store::{self, Page, Paginated, key, tx_fetch, tx_put};

/// Who a sender of the given role may write to directly.
pub fn may_message(sender: Role, recipient: Role) -> bool {
    match sender {
        Role::Admin => true,
        Role::Artist => matches!(recipient, Role::Producer | Role::Admin),
        Role::Producer => matches!(recipient, Role::Artist | Role::Admin),
        Role::User => recipient == Role::Admin,
    }
}

impl Marketplace {
    pub fn send_message(
        &self,
        caller: &Caller,
        recipient_id: &str,
        subject: &str,
        body: &str,
    ) -> ServiceResult<Message> {
        authorize(caller, &Role::ALL, None)?;
        let subject = subject.trim();
        let body = body.trim();
        if recipient_id.trim().is_empty() {
            return Err(ValidationError::MissingField("recipient").into());
        }
        if subject.is_empty() {
            return Err(ValidationError::MissingField("subject").into());
        }
        if body.is_empty() {
            return Err(ValidationError::MissingField("message body").into());
        }

        let recipient: Option<User> = self.store.get(&key(store::USER, recipient_id))?;
        match recipient {
            Some(r) if may_message(caller.role, r.role) => {}
            _ => return Err(ValidationError::InvalidRecipient.into()),
        }

        let notice = Notice::new(&caller.user_id, recipient_id, subject.to_string(), body.to_string());
        self.store.transact(|tx| notice.write(tx))?;
        let message: Message = self.store.fetch("message", store::MESSAGE, &notice.id)?;

        info!(message_id = %message.id, sender_id = %caller.user_id, recipient_id, "sent message");
        Ok(message)
    }

    /// Received or sent messages, newest first.
    pub fn inbox(&self, caller: &Caller, mailbox: Mailbox, page: Page) -> ServiceResult<Paginated<Message>> {
        authorize(caller, &Role::ALL, None)?;
        let me = caller.user_id.as_str();

        let mut messages: Vec<Message> = self.store.scan(store::MESSAGE, |m: &Message| match mailbox {
            Mailbox::Received => m.recipient_id == me,
            Mailbox::Sent => m.sender_id == me,
        })?;
        messages.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Paginated::from_sorted(messages, page))
    }

    pub fn unread_count(&self, caller: &Caller) -> ServiceResult<usize> {
        authorize(caller, &Role::ALL, None)?;
        let unread = self.store.scan(store::MESSAGE, |m: &Message| {
            m.recipient_id == caller.user_id && !m.is_read
        })?;
        Ok(unread.len())
    }

    /// Opens a message. The first read by its recipient marks it as read.
    pub fn read_message(&self, caller: &Caller, message_id: &str) -> ServiceResult<Message> {
        authorize(caller, &Role::ALL, None)?;
        let current: Message = self.store.fetch("message", store::MESSAGE, message_id)?;
        if current.sender_id != caller.user_id && current.recipient_id != caller.user_id {
            return Err(AccessDenied::Forbidden.into());
        }
        if current.recipient_id != caller.user_id || current.is_read {
            debug!(message_id, "read message");
            return Ok(current);
        }

        self.store.transact(|tx| {
            let mut message: Message = tx_fetch(tx, "message", store::MESSAGE, message_id)?;
            if message.mark_as_read() {
                tx_put(tx, &key(store::MESSAGE, message_id), &message)?;
            }
            Ok(message)
        })
    }
}
