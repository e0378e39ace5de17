//! Orders and their status machine
use std::fmt;
use std::str::FromStr;

use chrono::Utc;

use crate::account::required;
use crate::catalog::ItemKind;
use crate::error::ValidationError;
use crate::payment::PaymentMethod;
use crate::types::{Cents, TimeStamp};

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum OrderStatus {
    #[n(0)]
    Pending,
    #[n(1)]
    Paid,
    #[n(2)]
    Shipped,
    #[n(3)]
    Delivered,
    #[n(4)]
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 5] = [
        OrderStatus::Pending,
        OrderStatus::Paid,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::Pending => "pending",
            OrderStatus::Paid => "paid",
            OrderStatus::Shipped => "shipped",
            OrderStatus::Delivered => "delivered",
            OrderStatus::Cancelled => "cancelled",
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    /// Shipped and delivered orders were paid on the way there.
    pub fn is_past_paid(&self) -> bool {
        matches!(self, OrderStatus::Shipped | OrderStatus::Delivered)
    }

    /// Re-entering the current status is always allowed.
    pub fn can_transition_to(&self, next: OrderStatus) -> bool {
        use OrderStatus::*;

        if *self == next {
            return true;
        }
        match (self, next) {
            (Pending, Paid) | (Paid, Shipped) | (Shipped, Delivered) => true,
            (from, Cancelled) => !from.is_terminal(),
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OrderStatus {
    type Err = ValidationError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        OrderStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == s)
            .ok_or_else(|| ValidationError::invalid("order status", s))
    }
}

/// Immutable snapshot of a purchased line.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderItem {
    #[n(0)]
    pub item: PurchasedItem,
    #[n(1)]
    pub title: String,
    #[n(2)]
    pub price: Cents, // price at time of purchase
    #[n(3)]
    pub quantity: u32,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub enum PurchasedItem {
    #[n(0)]
    Beat {
        #[n(0)]
        beat_id: String,
    },
    #[n(1)]
    Merchandise {
        #[n(0)]
        merchandise_id: String,
    },
}

impl PurchasedItem {
    pub fn new(kind: ItemKind, item_id: &str) -> Self {
        match kind {
            ItemKind::Beat => PurchasedItem::Beat {
                beat_id: item_id.to_string(),
            },
            ItemKind::Merchandise => PurchasedItem::Merchandise {
                merchandise_id: item_id.to_string(),
            },
        }
    }
    pub fn kind(&self) -> ItemKind {
        match self {
            PurchasedItem::Beat { .. } => ItemKind::Beat,
            PurchasedItem::Merchandise { .. } => ItemKind::Merchandise,
        }
    }
}

impl OrderItem {
    pub fn subtotal(&self) -> Cents {
        self.price.times(self.quantity)
    }
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Shipping {
    #[n(0)]
    pub address: String,
    #[n(1)]
    pub city: String,
    #[n(2)]
    pub country: String,
    #[n(3)]
    pub postal_code: String,
}

/// One entry of the status history, appended on every status update.
#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct OrderChange {
    #[n(0)]
    pub actor: String,
    #[n(1)]
    pub from: OrderStatus,
    #[n(2)]
    pub to: OrderStatus,
    #[n(3)]
    pub at: TimeStamp<Utc>,
}

#[derive(minicbor::Encode, minicbor::Decode, Debug, Clone, PartialEq, Eq)]
pub struct Order {
    #[n(0)]
    pub id: String,
    #[n(1)]
    pub order_number: String,
    #[n(2)]
    pub customer_id: Option<String>, // None once the customer account is deleted
    #[n(3)]
    pub status: OrderStatus,
    #[n(4)]
    pub total_amount: Cents,
    #[n(5)]
    pub shipping: Shipping,
    #[n(6)]
    pub shipping_fee: Cents,
    #[n(7)]
    pub notes: Option<String>,
    #[n(8)]
    pub items: Vec<OrderItem>,
    #[n(9)]
    pub created_at: TimeStamp<Utc>,
    #[n(10)]
    pub updated_at: TimeStamp<Utc>,
    #[n(11)]
    pub paid_at: Option<TimeStamp<Utc>>,
    #[n(12)]
    pub shipped_at: Option<TimeStamp<Utc>>,
    #[n(13)]
    pub delivered_at: Option<TimeStamp<Utc>>,
    #[n(14)]
    pub history: Vec<OrderChange>,
}

impl Order {
    /// Moves the order to `next`, stamping the transition timestamp on first entry.
    /// Returns false without touching the order when the table forbids the move.
    pub fn apply_status(&mut self, next: OrderStatus, actor: &str) -> bool {
        let current = self.status;
        if !current.can_transition_to(next) {
            return false;
        }

        let now = TimeStamp::new();
        if current != next {
            let slot = match next {
                OrderStatus::Paid => Some(&mut self.paid_at),
                OrderStatus::Shipped => Some(&mut self.shipped_at),
                OrderStatus::Delivered => Some(&mut self.delivered_at),
                _ => None,
            };
            if let Some(slot) = slot {
                if slot.is_none() {
                    *slot = Some(now.clone());
                }
            }
        }

        self.status = next;
        self.updated_at = now.clone();
        self.history.push(OrderChange {
            actor: actor.to_string(),
            from: current,
            to: next,
            at: now,
        });
        true
    }

    pub fn items_total(&self) -> Cents {
        self.items.iter().map(OrderItem::subtotal).sum()
    }
}

// Checkout form, built up field by field by the web layer
#[derive(Debug, Default, Clone)]
pub struct CheckoutForm {
    pub shipping_address: Option<String>,
    pub shipping_city: Option<String>,
    pub shipping_country: Option<String>,
    pub shipping_postal_code: Option<String>,
    pub payment_method: Option<String>,
    pub notes: Option<String>,
}

impl CheckoutForm {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn set_address(mut self, address: &str) -> Self {
        self.shipping_address = Some(address.to_string());
        self
    }
    pub fn set_city(mut self, city: &str) -> Self {
        self.shipping_city = Some(city.to_string());
        self
    }
    pub fn set_country(mut self, country: &str) -> Self {
        self.shipping_country = Some(country.to_string());
        self
    }
    pub fn set_postal_code(mut self, code: &str) -> Self {
        self.shipping_postal_code = Some(code.to_string());
        self
    }
    pub fn set_payment_method(mut self, method: &str) -> Self {
        self.payment_method = Some(method.to_string());
        self
    }
    pub fn set_notes(mut self, notes: &str) -> Self {
        self.notes = Some(notes.to_string());
        self
    }

    pub fn validate(self) -> Result<(Shipping, PaymentMethod, Option<String>), ValidationError> {
        let shipping = Shipping {
            address: required(self.shipping_address, "shipping address")?,
            city: required(self.shipping_city, "shipping city")?,
            country: required(self.shipping_country, "shipping country")?,
            postal_code: required(self.shipping_postal_code, "shipping postal code")?,
        };
        let method = required(self.payment_method, "payment method")?.parse()?;
        let notes = self.notes.filter(|n| !n.trim().is_empty());

        Ok((shipping, method, notes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn order() -> Order {
        let now = TimeStamp::new();
        Order {
            id: "order1a".into(),
            order_number: "DR202406011000abcdef".into(),
            customer_id: Some("user1c".into()),
            status: OrderStatus::Pending,
            total_amount: Cents(2000),
            shipping: Shipping {
                address: "1 Main St".into(),
                city: "Nairobi".into(),
                country: "KE".into(),
                postal_code: "00100".into(),
            },
            shipping_fee: Cents(0),
            notes: None,
            items: vec![],
            created_at: now.clone(),
            updated_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            history: vec![],
        }
    }

    #[test]
    fn forward_chain_is_allowed() {
        let mut o = order();
        assert!(o.apply_status(OrderStatus::Paid, "admin"));
        assert!(o.apply_status(OrderStatus::Shipped, "admin"));
        assert!(o.apply_status(OrderStatus::Delivered, "admin"));
        assert!(o.paid_at.is_some() && o.shipped_at.is_some() && o.delivered_at.is_some());
        assert_eq!(o.history.len(), 3);
    }

    #[test]
    fn skipping_states_is_rejected() {
        let mut o = order();
        assert!(!o.apply_status(OrderStatus::Delivered, "admin"));
        assert_eq!(o.status, OrderStatus::Pending);
        assert!(o.delivered_at.is_none());
        assert!(o.history.is_empty());
    }

    #[test]
    fn reentry_keeps_first_timestamp() {
        let mut o = order();
        o.apply_status(OrderStatus::Paid, "admin");
        let first = o.paid_at.clone();
        assert!(o.apply_status(OrderStatus::Paid, "admin"));
        assert_eq!(o.paid_at, first);
    }

    #[test]
    fn cancelled_and_delivered_are_terminal() {
        for terminal in [OrderStatus::Delivered, OrderStatus::Cancelled] {
            for next in OrderStatus::ALL {
                assert_eq!(terminal.can_transition_to(next), next == terminal);
            }
        }
    }

    #[test]
    fn checkout_form_requires_all_shipping_fields() {
        let res = CheckoutForm::new()
            .set_address("1 Main St")
            .set_city("Nairobi")
            .set_country("KE")
            .set_payment_method("paypal")
            .validate();
        assert_eq!(
            res.unwrap_err(),
            ValidationError::MissingField("shipping postal code")
        );
    }

    #[test]
    fn checkout_form_rejects_unknown_payment_method() {
        let res = CheckoutForm::new()
            .set_address("1 Main St")
            .set_city("Nairobi")
            .set_country("KE")
            .set_postal_code("00100")
            .set_payment_method("cash")
            .validate();
        assert!(matches!(res, Err(ValidationError::InvalidValue { .. })));
    }
}
