use tracing::{debug, info, warn};

use super::{Marketplace, Notice, hold};
use crate::access::{Caller, Role, authorize, authorize_owner_or_admin};
use crate::account::Held;
use crate::cart::{Cart, CartQuote};
use crate::catalog::{ItemKind, Merchandise};
use crate::error::{ServiceError, ServiceResult, ValidationError};
use crate::order::{CheckoutForm, Order, OrderItem, OrderStatus, PurchasedItem};
use crate::payment::{PaymentPurpose, Transaction};
use crate::store::{self, Page, Paginated, abort, key, tx_fetch, tx_put};
use crate::types::{Cents, TimeStamp};
use crate::utils::{ORDER_HRP, new_order_number, new_record_id, new_transaction_id};

/// A freshly placed order and the transaction id to hand to the payment processor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutReceipt {
    pub order: Order,
    pub transaction_id: String,
}

impl Marketplace {
    /// Turns the cart into a pending order with one pending transaction.
    ///
    /// Lines whose item disappeared or was unpublished are dropped. Stock is checked
    /// again and decremented inside the commit, so an oversold line aborts the whole
    /// checkout. The cart is only cleared once everything is stored.
    pub fn checkout(
        &self,
        caller: &Caller,
        cart: &mut Cart,
        form: CheckoutForm,
    ) -> ServiceResult<CheckoutReceipt> {
        authorize(caller, &Role::ALL, None)?;
        if cart.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }
        let (shipping, payment_method, notes) = form.validate()?;

        let quote = CartQuote::from_lines(self.resolve_cart(cart)?);
        if quote.lines.is_empty() {
            return Err(ValidationError::EmptyCart.into());
        }

        let now = TimeStamp::new();
        let order = Order {
            id: new_record_id(ORDER_HRP),
            order_number: new_order_number(),
            customer_id: Some(caller.user_id.clone()),
            status: OrderStatus::Pending,
            total_amount: quote.total,
            shipping,
            shipping_fee: Cents::default(),
            notes,
            items: quote
                .lines
                .iter()
                .map(|line| OrderItem {
                    item: PurchasedItem::new(line.kind, &line.item_id),
                    title: line.title.clone(),
                    price: line.unit_price,
                    quantity: line.quantity,
                })
                .collect(),
            created_at: now.clone(),
            updated_at: now,
            paid_at: None,
            shipped_at: None,
            delivered_at: None,
            history: Vec::new(),
        };
        let transaction = Transaction::new(
            new_transaction_id(),
            order.total_amount,
            &self.currency,
            payment_method,
            PaymentPurpose::Order {
                order_id: order.id.clone(),
            },
        );

        self.store.transact(|tx| {
            for line in quote.lines.iter().filter(|l| l.kind == ItemKind::Merchandise) {
                let mut merch: Merchandise = tx_fetch(tx, "merchandise", store::MERCH, &line.item_id)?;
                if !merch.has_stock_for(line.quantity) {
                    return abort(ValidationError::InsufficientStock {
                        item: merch.name,
                        available: merch.stock_quantity,
                    });
                }
                merch.take_stock(line.quantity);
                tx_put(tx, &key(store::MERCH, &line.item_id), &merch)?;
            }

            let number_key = key(store::ORDER_NUMBER, &order.order_number);
            if tx.get(number_key.as_bytes())?.is_some() {
                return abort(ServiceError::conflict("order number collision, retry checkout"));
            }
            tx.insert(number_key.as_bytes(), order.id.as_bytes())?;
            tx_put(tx, &key(store::ORDER, &order.id), &order)?;
            hold(tx, &caller.user_id, Held::Order, &order.id)?;
            tx_put(tx, &key(store::TRANSACTION, &transaction.transaction_id), &transaction)
        })?;

        cart.clear();
        info!(
            order_number = %order.order_number,
            customer_id = %caller.user_id,
            total = %order.total_amount,
            items = order.items.len(),
            "placed order"
        );
        Ok(CheckoutReceipt {
            order,
            transaction_id: transaction.transaction_id,
        })
    }

    /// Admin status change. The customer is told about it even when the status is unchanged.
    pub fn update_order_status(
        &self,
        caller: &Caller,
        order_number: &str,
        status: &str,
        notes: Option<&str>,
    ) -> ServiceResult<Order> {
        authorize(caller, &[Role::Admin], None)?;
        let next: OrderStatus = status.parse()?;
        let order_id = self.order_id(order_number)?;
        let notes = notes.map(str::trim).filter(|n| !n.is_empty());

        let order = self.store.transact(|tx| {
            let mut order: Order = tx_fetch(tx, "order", store::ORDER, &order_id)?;
            let from = order.status;
            if !order.apply_status(next, &caller.user_id) {
                return abort(ServiceError::conflict(format!(
                    "order {order_number} cannot move from {from} to {next}"
                )));
            }
            if let Some(notes) = notes {
                order.notes = Some(notes.to_string());
            }
            tx_put(tx, &key(store::ORDER, &order_id), &order)?;

            if let Some(customer_id) = &order.customer_id {
                let mut body = format!(
                    "Your order status has been updated to: {}\n\n",
                    next.as_str().to_uppercase()
                );
                if let Some(notes) = notes {
                    body.push_str(&format!("Notes: {notes}"));
                }
                Notice::new(
                    &caller.user_id,
                    customer_id,
                    format!("Order {order_number} Status Update"),
                    body,
                )
                .write(tx)?;
            }
            Ok(order)
        })?;

        if order.customer_id.is_none() {
            warn!(order_number, "customer account is gone, status update not delivered");
        }
        info!(order_number, status = %next, admin = %caller.user_id, "updated order status");
        Ok(order)
    }

    pub fn get_order(&self, caller: &Caller, order_number: &str) -> ServiceResult<Order> {
        let order: Order = self.store.fetch("order", store::ORDER, &self.order_id(order_number)?)?;
        // orphaned orders are visible to admins only
        let owner = order.customer_id.as_deref().unwrap_or_default();
        authorize_owner_or_admin(caller, &Role::ALL, Some(owner))?;
        debug!(order_number, "read order");
        Ok(order)
    }

    /// The caller's own orders, every order for admins. Newest first.
    pub fn list_orders(
        &self,
        caller: &Caller,
        status: Option<OrderStatus>,
        page: Page,
    ) -> ServiceResult<Paginated<Order>> {
        authorize(caller, &Role::ALL, None)?;
        let is_admin = caller.role == Role::Admin;

        let mut orders: Vec<Order> = self.store.scan(store::ORDER, |o: &Order| {
            let visible = is_admin || o.customer_id.as_deref() == Some(caller.user_id.as_str());
            visible && status.is_none_or(|s| o.status == s)
        })?;
        orders.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(Paginated::from_sorted(orders, page))
    }

    pub fn transactions_for_order(&self, caller: &Caller, order_number: &str) -> ServiceResult<Vec<Transaction>> {
        let order = self.get_order(caller, order_number)?;
        let mut transactions: Vec<Transaction> = self.store.scan(store::TRANSACTION, |t: &Transaction| {
            matches!(&t.purpose, PaymentPurpose::Order { order_id } if *order_id == order.id)
        })?;
        transactions.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(transactions)
    }

    fn order_id(&self, order_number: &str) -> ServiceResult<String> {
        self.store
            .lookup(store::ORDER_NUMBER, order_number)?
            .ok_or_else(|| ServiceError::not_found("order", order_number))
    }
}
