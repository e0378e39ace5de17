use serde_json::Value;
use tracing::{info, warn};

use super::{Marketplace, Notice};
use crate::access::{Caller, Role, authorize};
use crate::account::User;
use crate::booking::{SessionBooking, SessionStatus};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::order::{Order, OrderStatus};
use crate::payment::{
    PaymentKind, PaymentMethod, PaymentPurpose, Transaction, TransactionStatus, WebhookPayload,
    WebhookStatus,
};
use crate::store::{self, abort, key, tx_fetch, tx_get, tx_put};
use crate::utils::new_transaction_id;

/// What a webhook call did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookOutcome {
    Applied(WebhookStatus),
    /// The transaction had already settled with the same status.
    Replayed,
    /// Payment was recorded but the order could no longer move to paid.
    OrderNotPayable,
}

impl Marketplace {
    pub fn transaction(&self, transaction_id: &str) -> ServiceResult<Transaction> {
        self.store.fetch("transaction", store::TRANSACTION, transaction_id)
    }

    /// The pending transaction the caller is about to pay.
    pub fn payment_for(&self, caller: &Caller, transaction_id: &str) -> ServiceResult<Transaction> {
        let transaction = self.transaction(transaction_id)?;
        let owner = match &transaction.purpose {
            PaymentPurpose::Order { order_id } => {
                let order: Order = self.store.fetch("order", store::ORDER, order_id)?;
                order.customer_id.unwrap_or_default()
            }
            PaymentPurpose::Session { session_id } => {
                let session: SessionBooking = self.store.fetch("session", store::SESSION, session_id)?;
                session.artist_id
            }
        };
        authorize(caller, &Role::ALL, Some(&owner))?;

        if transaction.status != TransactionStatus::Pending {
            return Err(ServiceError::conflict("this payment has already been processed"));
        }
        Ok(transaction)
    }

    /// Opens a pending transaction for an unpaid session.
    pub fn begin_session_payment(
        &self,
        caller: &Caller,
        session_id: &str,
        payment_method: &str,
    ) -> ServiceResult<Transaction> {
        authorize(caller, &[Role::Artist], None)?;
        let session: SessionBooking = self.store.fetch("session", store::SESSION, session_id)?;
        authorize(caller, &[Role::Artist], Some(&session.artist_id))?;

        if session.is_paid {
            return Err(ServiceError::conflict("this session has already been paid for"));
        }
        if session.status == SessionStatus::Cancelled {
            return Err(ServiceError::conflict("a cancelled session cannot be paid for"));
        }
        let method: PaymentMethod = payment_method.parse()?;

        let transaction = Transaction::new(
            new_transaction_id(),
            session.price,
            &self.currency,
            method,
            PaymentPurpose::Session {
                session_id: session.id.clone(),
            },
        );
        self.store.put(
            &key(store::TRANSACTION, &transaction.transaction_id),
            &transaction,
        )?;

        info!(
            transaction_id = %transaction.transaction_id,
            session_id,
            amount = %transaction.amount,
            "opened session payment"
        );
        Ok(transaction)
    }

    /// Applies a processor callback arriving on the endpoint for `kind`.
    ///
    /// A callback repeating the status the transaction already settled with is a no-op.
    /// A callback contradicting a settled transaction is a conflict.
    pub fn handle_webhook(&self, raw: Value, kind: PaymentKind) -> ServiceResult<WebhookOutcome> {
        let payload = WebhookPayload::from_json(raw)?;
        let transaction = self.transaction(&payload.transaction_id)?;
        if transaction.purpose.kind() != kind {
            warn!(transaction_id = %payload.transaction_id, ?kind, "webhook for the wrong payment flow");
            return Err(ValidationError::WrongPaymentFlow.into());
        }
        match &transaction.purpose {
            PaymentPurpose::Order { order_id } => {
                self.store.fetch::<Order>("order", store::ORDER, order_id)?;
            }
            PaymentPurpose::Session { session_id } => {
                self.store
                    .fetch::<SessionBooking>("session", store::SESSION, session_id)?;
            }
        }
        let status = payload.status()?;
        let raw_payload = serde_json::to_string(&payload.raw)?;
        let sender = self.system_sender()?;

        let outcome = self.store.transact(|tx| {
            let mut transaction: Transaction =
                tx_fetch(tx, "transaction", store::TRANSACTION, &payload.transaction_id)?;
            if transaction.status.is_terminal() {
                if transaction.status == status.as_transaction_status() {
                    return Ok(WebhookOutcome::Replayed);
                }
                return abort(ServiceError::conflict(format!(
                    "transaction already {}",
                    transaction.status
                )));
            }
            transaction.settle(status, raw_payload.clone());
            tx_put(tx, &key(store::TRANSACTION, &transaction.transaction_id), &transaction)?;

            if status == WebhookStatus::Failed {
                return Ok(WebhookOutcome::Applied(status));
            }

            match &transaction.purpose {
                PaymentPurpose::Order { order_id } => {
                    let mut order: Order = tx_fetch(tx, "order", store::ORDER, order_id)?;
                    // fulfilment already moved past paid, leave the status alone
                    if !order.status.is_past_paid() {
                        if !order.apply_status(OrderStatus::Paid, &sender) {
                            return Ok(WebhookOutcome::OrderNotPayable);
                        }
                        tx_put(tx, &key(store::ORDER, order_id), &order)?;
                    }

                    if let Some(customer_id) = &order.customer_id {
                        let number = &order.order_number;
                        Notice::new(
                            &sender,
                            customer_id,
                            format!("Order {number} Payment Confirmed"),
                            format!(
                                "Your payment for order {number} has been confirmed. Thank you for your purchase!"
                            ),
                        )
                        .write(tx)?;
                    }
                }
                PaymentPurpose::Session { session_id } => {
                    let mut session: SessionBooking = tx_fetch(tx, "session", store::SESSION, session_id)?;
                    session.is_paid = true;
                    tx_put(tx, &key(store::SESSION, session_id), &session)?;

                    let artist_name = tx_get::<User>(tx, &key(store::USER, &session.artist_id))?
                        .map(|artist| artist.full_name())
                        .unwrap_or_else(|| session.artist_id.clone());
                    let date = session.slot.date;
                    Notice::new(
                        &sender,
                        &session.artist_id,
                        "Session Payment Confirmed".to_string(),
                        format!("Your payment for the session on {date} has been confirmed."),
                    )
                    .write(tx)?;
                    Notice::new(
                        &sender,
                        &session.producer_id,
                        "Session Payment Received".to_string(),
                        format!("Payment has been received for the session with {artist_name} on {date}."),
                    )
                    .write(tx)?;
                }
            }
            Ok(WebhookOutcome::Applied(status))
        })?;

        match outcome {
            WebhookOutcome::Replayed => {
                info!(transaction_id = %payload.transaction_id, ?status, "webhook replay ignored")
            }
            WebhookOutcome::OrderNotPayable => warn!(
                transaction_id = %payload.transaction_id,
                "payment completed for an order that can no longer be paid"
            ),
            WebhookOutcome::Applied(_) => {
                info!(transaction_id = %payload.transaction_id, ?status, "applied payment webhook")
            }
        }
        Ok(outcome)
    }
}
