//! Service layer API for the order, payment and booking workflows
//!
//! Each operation authorizes the [`Caller`](crate::access::Caller) explicitly, applies the
//! pure transition from the entity module and commits the new state together with any
//! notification in a single store transaction.
use sled::transaction::{ConflictableTransactionResult, TransactionalTree};

use crate::access::Role;
use crate::account::{Held, Holdings, User};
use crate::config::Config;
use crate::error::{ServiceError, ServiceResult};
use crate::message::Message;
use crate::store::{self, Store};
use crate::utils::{MESSAGE_HRP, new_record_id};

mod accounts;
mod catalog;
mod messages;
mod orders;
mod payments;
mod sessions;

pub use orders::CheckoutReceipt;
pub use payments::WebhookOutcome;

pub struct Marketplace {
    store: Store,
    system_sender: Option<String>,
    currency: String,
}

impl Marketplace {
    pub fn new(store: Store) -> Self {
        let defaults = Config::default();
        Self {
            store,
            system_sender: defaults.system_sender,
            currency: defaults.currency,
        }
    }

    pub fn with_config(store: Store, config: &Config) -> Self {
        Self {
            store,
            system_sender: config.system_sender.clone(),
            currency: config.currency.clone(),
        }
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Who automated notifications come from: the configured sender, else the oldest admin.
    pub fn system_sender(&self) -> ServiceResult<String> {
        if let Some(sender) = &self.system_sender {
            return Ok(sender.clone());
        }
        self.store
            .scan(store::USER, |u: &User| u.role == Role::Admin)?
            .into_iter()
            .min_by(|a, b| a.created_at.cmp(&b.created_at))
            .map(|admin| admin.id)
            .ok_or_else(|| ServiceError::not_found("user", "admin"))
    }
}

/// A notification waiting to be written alongside the transition that produced it.
#[derive(Debug, Clone)]
pub(crate) struct Notice {
    pub id: String,
    pub sender_id: String,
    pub recipient_id: String,
    pub subject: String,
    pub body: String,
}

impl Notice {
    pub fn new(sender_id: &str, recipient_id: &str, subject: String, body: String) -> Self {
        Self {
            id: new_record_id(MESSAGE_HRP),
            sender_id: sender_id.to_string(),
            recipient_id: recipient_id.to_string(),
            subject,
            body,
        }
    }

    pub fn write(&self, tx: &TransactionalTree) -> ConflictableTransactionResult<(), ServiceError> {
        hold(tx, &self.recipient_id, Held::Message, &self.id)?;
        // a configured system sender need not be an account
        if store::tx_get::<User>(tx, &store::key(store::USER, &self.sender_id))?.is_some() {
            hold(tx, &self.sender_id, Held::Message, &self.id)?;
        }
        let message = Message::new(
            self.id.clone(),
            &self.sender_id,
            &self.recipient_id,
            self.subject.clone(),
            self.body.clone(),
        );
        store::tx_put(tx, &store::key(store::MESSAGE, &self.id), &message)
    }
}

/// Ties a new record to an account. Aborts with not found when the account is gone.
pub(crate) fn hold(
    tx: &TransactionalTree,
    user_id: &str,
    kind: Held,
    record_id: &str,
) -> ConflictableTransactionResult<(), ServiceError> {
    let user: User = store::tx_fetch(tx, "user", store::USER, user_id)?;
    // admin accounts are never deleted
    if user.role == Role::Admin {
        return Ok(());
    }
    let holdings_key = store::key(store::HOLDINGS, user_id);
    let mut holdings: Holdings = store::tx_get(tx, &holdings_key)?.unwrap_or_default();
    holdings.add(kind, record_id);
    store::tx_put(tx, &holdings_key, &holdings)
}
