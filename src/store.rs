//! sled backed record storage
//!
//! Every record lives in the default tree as CBOR under a `kind/id` key. Unique
//! secondary keys (usernames, emails, order numbers) are index records pointing at
//! the primary id. Multi-record writes go through [`Store::transact`] so they commit
//! together or not at all.
use std::sync::Arc;

use sled::transaction::{
    ConflictableTransactionError, ConflictableTransactionResult, TransactionError,
    TransactionalTree,
};
use sled::Db;

use crate::error::{ServiceError, ServiceResult};

pub const USER: &str = "user/";
pub const USERNAME: &str = "idx/username/";
pub const HOLDINGS: &str = "holdings/";
pub const EMAIL: &str = "idx/email/";
pub const BEAT: &str = "beat/";
pub const MERCH: &str = "merch/";
pub const ORDER: &str = "order/";
pub const ORDER_NUMBER: &str = "idx/order_number/";
pub const TRANSACTION: &str = "txn/";
pub const SESSION: &str = "session/";
pub const SCHEDULE: &str = "schedule/";
pub const MESSAGE: &str = "msg/";

pub fn key(prefix: &str, id: &str) -> String {
    format!("{prefix}{id}")
}

pub fn schedule_key(producer_id: &str, date: &crate::types::CalendarDate) -> String {
    format!("{SCHEDULE}{producer_id}/{date}")
}

pub fn encode<T: minicbor::Encode<()>>(value: &T) -> ServiceResult<Vec<u8>> {
    Ok(minicbor::to_vec(value)?)
}

pub fn decode<T>(bytes: &[u8]) -> ServiceResult<T>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    Ok(minicbor::decode(bytes)?)
}

#[derive(Clone)]
pub struct Store {
    instance: Arc<Db>,
}

impl Store {
    pub fn new(instance: Arc<Db>) -> Self {
        Self { instance }
    }

    pub fn open(path: impl AsRef<std::path::Path>) -> ServiceResult<Self> {
        Ok(Self::new(Arc::new(sled::open(path)?)))
    }

    pub fn get<T>(&self, key: &str) -> ServiceResult<Option<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        match self.instance.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(decode(&bytes)?)),
            None => Ok(None),
        }
    }

    pub fn fetch<T>(&self, resource: &'static str, prefix: &str, id: &str) -> ServiceResult<T>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
    {
        self.get(&key(prefix, id))?
            .ok_or_else(|| ServiceError::not_found(resource, id))
    }

    pub fn put<T: minicbor::Encode<()>>(&self, key: &str, value: &T) -> ServiceResult<()> {
        self.instance.insert(key.as_bytes(), encode(value)?)?;
        Ok(())
    }

    /// Follows an index record to the id it points at.
    pub fn lookup(&self, index: &str, unique_key: &str) -> ServiceResult<Option<String>> {
        match self.instance.get(key(index, unique_key).as_bytes())? {
            Some(bytes) => Ok(Some(String::from_utf8_lossy(&bytes).into_owned())),
            None => Ok(None),
        }
    }

    /// Decodes every record under `prefix` that matches `filter`.
    pub fn scan<T, F>(&self, prefix: &str, mut filter: F) -> ServiceResult<Vec<T>>
    where
        T: for<'b> minicbor::Decode<'b, ()>,
        F: FnMut(&T) -> bool,
    {
        let mut found = Vec::new();
        for entry in self.instance.scan_prefix(prefix.as_bytes()) {
            let (_, bytes) = entry?;
            let record: T = decode(&bytes)?;
            if filter(&record) {
                found.push(record);
            }
        }
        Ok(found)
    }

    /// Runs `f` as one atomic sled transaction. sled retries `f` on write conflicts,
    /// so it must not have side effects outside the transactional tree.
    pub fn transact<A, F>(&self, f: F) -> ServiceResult<A>
    where
        F: Fn(&TransactionalTree) -> ConflictableTransactionResult<A, ServiceError>,
    {
        self.instance.transaction(f).map_err(|e| match e {
            TransactionError::Abort(e) => e,
            TransactionError::Storage(e) => ServiceError::Storage(e),
        })
    }

    pub fn flush(&self) -> ServiceResult<()> {
        self.instance.flush()?;
        Ok(())
    }
}

/// Aborts the surrounding transaction with `err`.
pub fn abort<T>(err: impl Into<ServiceError>) -> ConflictableTransactionResult<T, ServiceError> {
    Err(ConflictableTransactionError::Abort(err.into()))
}

pub fn tx_get<T>(tx: &TransactionalTree, key: &str) -> ConflictableTransactionResult<Option<T>, ServiceError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx.get(key.as_bytes())? {
        Some(bytes) => match decode(&bytes) {
            Ok(value) => Ok(Some(value)),
            Err(e) => abort(e),
        },
        None => Ok(None),
    }
}

pub fn tx_fetch<T>(
    tx: &TransactionalTree,
    resource: &'static str,
    prefix: &str,
    id: &str,
) -> ConflictableTransactionResult<T, ServiceError>
where
    T: for<'b> minicbor::Decode<'b, ()>,
{
    match tx_get(tx, &key(prefix, id))? {
        Some(value) => Ok(value),
        None => abort(ServiceError::not_found(resource, id)),
    }
}

pub fn tx_put<T: minicbor::Encode<()>>(
    tx: &TransactionalTree,
    key: &str,
    value: &T,
) -> ConflictableTransactionResult<(), ServiceError> {
    let bytes = match encode(value) {
        Ok(bytes) => bytes,
        Err(e) => return abort(e),
    };
    tx.insert(key.as_bytes(), bytes)?;
    Ok(())
}

pub fn tx_remove(tx: &TransactionalTree, key: &str) -> ConflictableTransactionResult<(), ServiceError> {
    tx.remove(key.as_bytes())?;
    Ok(())
}

/// 1-based page request.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Page {
    number: usize,
    per_page: usize,
}

impl Default for Page {
    fn default() -> Self {
        Self {
            number: 1,
            per_page: 10,
        }
    }
}

impl Page {
    pub fn new(number: usize, per_page: usize) -> Self {
        Self {
            number: number.max(1),
            per_page: per_page.max(1),
        }
    }

    /// One-based page number.
    pub fn number(&self) -> usize {
        self.number
    }

    pub fn per_page(&self) -> usize {
        self.per_page
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paginated<T> {
    pub items: Vec<T>,
    pub page: usize,
    pub per_page: usize,
    pub total: usize,
}

impl<T> Paginated<T> {
    /// Slices an already ordered list.
    pub fn from_sorted(items: Vec<T>, page: Page) -> Self {
        let total = items.len();
        let items = items
            .into_iter()
            .skip(page.number.saturating_sub(1).saturating_mul(page.per_page))
            .take(page.per_page)
            .collect();
        Self {
            items,
            page: page.number,
            per_page: page.per_page,
            total,
        }
    }

    pub fn pages(&self) -> usize {
        self.total.div_ceil(self.per_page)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn paginates_in_order() {
        let page = Paginated::from_sorted((1..=25).collect::<Vec<_>>(), Page::new(3, 10));
        assert_eq!(page.items, vec![21, 22, 23, 24, 25]);
        assert_eq!(page.pages(), 3);
        assert_eq!(page.total, 25);
    }

    #[test]
    fn page_numbers_start_at_one() {
        assert_eq!(Page::new(0, 0), Page::new(1, 1));
        assert_eq!(Page::new(0, 5).number(), 1);
    }

    #[test]
    fn pages_past_the_end_are_empty() {
        let items: Vec<u32> = (1..=5).collect();
        let page = Paginated::from_sorted(items.clone(), Page::new(usize::MAX, usize::MAX));
        assert!(page.items.is_empty());
        assert_eq!(page.total, 5);

        let page = Paginated::from_sorted(items, Page::new(4, 2));
        assert!(page.items.is_empty());
        assert_eq!(page.pages(), 3);
    }
}
