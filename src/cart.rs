//! Per-visitor cart. The web layer keeps it between requests and hands it to checkout.
use serde::{Deserialize, Serialize};

use crate::catalog::ItemKind;
use crate::types::Cents;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CartLine {
    pub kind: ItemKind,
    pub item_id: String,
    pub quantity: u32,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cart {
    lines: Vec<CartLine>,
}

impl Cart {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn lines(&self) -> &[CartLine] {
        &self.lines
    }

    pub fn is_empty(&self) -> bool {
        self.lines.is_empty()
    }

    pub fn clear(&mut self) {
        self.lines.clear();
    }

    pub fn quantity_of(&self, kind: ItemKind, item_id: &str) -> u32 {
        self.find(kind, item_id).map(|l| l.quantity).unwrap_or(0)
    }

    fn find(&self, kind: ItemKind, item_id: &str) -> Option<&CartLine> {
        self.lines
            .iter()
            .find(|l| l.kind == kind && l.item_id == item_id)
    }

    /// Adds to an existing line or appends a new one.
    pub(crate) fn add(&mut self, kind: ItemKind, item_id: &str, quantity: u32) {
        match self
            .lines
            .iter_mut()
            .find(|l| l.kind == kind && l.item_id == item_id)
        {
            Some(line) => line.quantity = line.quantity.saturating_add(quantity),
            None => self.lines.push(CartLine {
                kind,
                item_id: item_id.to_string(),
                quantity,
            }),
        }
    }

    /// Sets the quantity of an existing line, zero drops it. Unknown lines are ignored.
    pub(crate) fn set_quantity(&mut self, kind: ItemKind, item_id: &str, quantity: u32) {
        if quantity == 0 {
            self.remove(kind, item_id);
            return;
        }
        if let Some(line) = self
            .lines
            .iter_mut()
            .find(|l| l.kind == kind && l.item_id == item_id)
        {
            line.quantity = quantity;
        }
    }

    pub fn remove(&mut self, kind: ItemKind, item_id: &str) {
        self.lines
            .retain(|l| !(l.kind == kind && l.item_id == item_id));
    }
}

/// A cart line resolved against the live catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PricedLine {
    pub kind: ItemKind,
    pub item_id: String,
    pub title: String,
    pub unit_price: Cents,
    pub quantity: u32,
}

impl PricedLine {
    pub fn subtotal(&self) -> Cents {
        self.unit_price.times(self.quantity)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CartQuote {
    pub lines: Vec<PricedLine>,
    pub total: Cents,
}

impl CartQuote {
    pub fn from_lines(lines: Vec<PricedLine>) -> Self {
        let total = lines.iter().map(PricedLine::subtotal).sum();
        Self { lines, total }
    }
}
