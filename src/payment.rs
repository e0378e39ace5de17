//! Payment transactions and webhook payloads
use std::fmt;
use std::str::FromStr;

use chrono::Utc;
use hmac::{Hmac, Mac};
use serde_json::Value;
use sha2::Sha256;

use crate::error::ValidationError;
use crate::types::{Cents, TimeStamp};

pub const SIGNATURE_HEADER: &str = "x-webhook-signature";

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PaymentMethod {
    #[n(0)]
    Paypal,
    #[n(1)]
    Mpesa,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Paypal => "paypal",
            PaymentMethod::Mpesa => "mpesa",
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for PaymentMethod {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "paypal" => Ok(PaymentMethod::Paypal),
            "mpesa" => Ok(PaymentMethod::Mpesa),
            other => Err(ValidationError::invalid("payment method", other)),
        }
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransactionStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Completed,
    #[n(2)]
    Failed,
    #[n(3)]
    Refunded,
}

impl TransactionStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionStatus::Pending => "pending",
            TransactionStatus::Completed => "completed",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Refunded => "refunded",
        }
    }
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a transaction pays for.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum PaymentPurpose {
    #[n(0)]
    Order {
        #[n(0)]
        order_id: String,
    },
    #[n(1)]
    Session {
        #[n(0)]
        session_id: String,
    },
}

impl PaymentPurpose {
    pub fn kind(&self) -> PaymentKind {
        match self {
            PaymentPurpose::Order { .. } => PaymentKind::Goods,
            PaymentPurpose::Session { .. } => PaymentKind::Session,
        }
    }
}

/// Which webhook endpoint a callback arrived on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentKind {
    Goods,
    Session,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Transaction {
    #[n(0)]
    pub transaction_id: String, // uuid7, handed to the processor
    #[n(1)]
    pub amount: Cents,
    #[n(2)]
    pub currency: String,
    #[n(3)]
    pub payment_method: PaymentMethod,
    #[n(4)]
    pub status: TransactionStatus,
    #[n(5)]
    pub purpose: PaymentPurpose,
    #[n(6)]
    pub payment_details: Option<String>, // verbatim json from the processor
    #[n(7)]
    pub payload_digest: Option<String>, // sha256 of payment_details
    #[n(8)]
    pub created_at: TimeStamp<Utc>,
    #[n(9)]
    pub updated_at: TimeStamp<Utc>,
}

impl Transaction {
    pub fn new(
        transaction_id: String,
        amount: Cents,
        currency: &str,
        payment_method: PaymentMethod,
        purpose: PaymentPurpose,
    ) -> Self {
        let now = TimeStamp::new();
        Self {
            transaction_id,
            amount,
            currency: currency.to_string(),
            payment_method,
            status: TransactionStatus::Pending,
            purpose,
            payment_details: None,
            payload_digest: None,
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Records the processor's verdict together with the raw payload.
    pub fn settle(&mut self, outcome: WebhookStatus, raw_payload: String) {
        self.status = outcome.as_transaction_status();
        if outcome == WebhookStatus::Completed {
            self.payload_digest = Some(sha256::digest(raw_payload.as_str()));
            self.payment_details = Some(raw_payload);
        }
        self.updated_at = TimeStamp::new();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WebhookStatus {
    Completed,
    Failed,
}

impl WebhookStatus {
    pub fn as_transaction_status(&self) -> TransactionStatus {
        match self {
            WebhookStatus::Completed => TransactionStatus::Completed,
            WebhookStatus::Failed => TransactionStatus::Failed,
        }
    }
}

/// A processor callback: `{transaction_id, status, ...details}`.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookPayload {
    pub transaction_id: String,
    pub raw: Value,
}

impl WebhookPayload {
    pub fn from_json(raw: Value) -> Result<Self, ValidationError> {
        let transaction_id = raw
            .get("transaction_id")
            .and_then(Value::as_str)
            .filter(|id| !id.is_empty())
            .ok_or(ValidationError::MissingField("transaction ID"))?
            .to_string();

        Ok(Self {
            transaction_id,
            raw,
        })
    }

    /// Only `completed` and `failed` are meaningful to us.
    pub fn status(&self) -> Result<WebhookStatus, ValidationError> {
        match self.raw.get("status").and_then(Value::as_str) {
            Some("completed") => Ok(WebhookStatus::Completed),
            Some("failed") => Ok(WebhookStatus::Failed),
            other => Err(ValidationError::invalid("status", other.unwrap_or_default())),
        }
    }
}

type HmacSha256 = Hmac<Sha256>;

/// Hex encoded HMAC-SHA256 of the raw request body.
pub fn sign_payload(secret: &[u8], body: &[u8]) -> String {
    // HMAC accepts keys of any length
    let mut mac = match HmacSha256::new_from_slice(secret) {
        Ok(mac) => mac,
        Err(_) => return String::new(),
    };
    mac.update(body);
    hex::encode(mac.finalize().into_bytes())
}

/// Constant time comparison of a hex signature against the body.
pub fn verify_signature(secret: &[u8], body: &[u8], signature_hex: &str) -> bool {
    let Ok(signature) = hex::decode(signature_hex.trim()) else {
        return false;
    };
    let Ok(mut mac) = HmacSha256::new_from_slice(secret) else {
        return false;
    };
    mac.update(body);
    mac.verify_slice(&signature).is_ok()
}
