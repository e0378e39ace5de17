use crate::access::AccessDenied;

pub type ServiceResult<T> = Result<T, ServiceError>;

#[derive(thiserror::Error, Debug)]
pub enum ServiceError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error("{resource} {key} not found")]
    NotFound { resource: &'static str, key: String },
    #[error(transparent)]
    AccessDenied(#[from] AccessDenied),
    #[error("{0}")]
    Conflict(String),
    #[error("storage failure: {0}")]
    Storage(#[from] sled::Error),
    #[error("failed to encode record: {0}")]
    Encode(String),
    #[error("failed to decode record: {0}")]
    Decode(#[from] minicbor::decode::Error),
    #[error("malformed json: {0}")]
    Json(#[from] serde_json::Error),
}

impl ServiceError {
    pub fn not_found(resource: &'static str, key: impl Into<String>) -> Self {
        Self::NotFound {
            resource,
            key: key.into(),
        }
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }
}

impl<W: std::fmt::Display> From<minicbor::encode::Error<W>> for ServiceError {
    fn from(value: minicbor::encode::Error<W>) -> Self {
        Self::Encode(value.to_string())
    }
}

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{0} is required")]
    MissingField(&'static str),
    #[error("invalid {field}: {value}")]
    InvalidValue { field: &'static str, value: String },
    #[error("cart is empty")]
    EmptyCart,
    #[error("quantity must be at least 1")]
    ZeroQuantity,
    #[error("only {available} of {item} in stock")]
    InsufficientStock { item: String, available: i64 },
    #[error("session date cannot be in the past")]
    DateInPast,
    #[error("end time must be after start time")]
    EndBeforeStart,
    #[error("selected producer is not available")]
    ProducerUnavailable,
    #[error("an artist cannot book a session with themselves")]
    SelfBooking,
    #[error("invalid recipient")]
    InvalidRecipient,
    #[error("transaction does not belong to this payment flow")]
    WrongPaymentFlow,
}

impl ValidationError {
    pub fn invalid(field: &'static str, value: impl Into<String>) -> Self {
        Self::InvalidValue {
            field,
            value: value.into(),
        }
    }
}
