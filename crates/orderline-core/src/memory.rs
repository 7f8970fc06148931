//! In-memory order store
//!
//! Keeps orders in a `BTreeMap` behind a mutex. Useful for embedding and for
//! tests that need to count writes or inject store failures.

use async_trait::async_trait;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use crate::{
    Error, Result,
    order::Order,
    store::{OrderStore, PutOutcome},
};

/// In-memory `OrderStore`
#[derive(Clone, Default)]
pub struct MemoryOrderStore {
    orders: Arc<Mutex<BTreeMap<String, Order>>>,
    put_calls: Arc<AtomicUsize>,
    created: Arc<AtomicUsize>,
    fail_writes: Arc<AtomicBool>,
    fail_reads: Arc<AtomicBool>,
}

impl MemoryOrderStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a store pre-populated with `orders`
    pub fn with_orders(orders: impl IntoIterator<Item = Order>) -> Self {
        let store = Self::new();
        {
            let mut map = store.lock();
            for order in orders {
                map.insert(order.order_uid.clone(), order);
            }
        }
        store
    }

    /// Number of `put` calls made, including failed and duplicate ones
    pub fn put_calls(&self) -> usize {
        self.put_calls.load(Ordering::SeqCst)
    }

    /// Number of `put` calls that actually wrote an order
    pub fn created_count(&self) -> usize {
        self.created.load(Ordering::SeqCst)
    }

    /// Make every subsequent `put` fail with `StoreWriteFailed`
    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Make every subsequent read fail with `StoreUnavailable`
    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, BTreeMap<String, Order>> {
        self.orders.lock().unwrap_or_else(|e| e.into_inner())
    }

    fn check_reads(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(Error::StoreUnavailable(
                "memory store reads disabled".to_string(),
            ));
        }
        Ok(())
    }
}

#[async_trait]
impl OrderStore for MemoryOrderStore {
    async fn put(&self, order: &Order) -> Result<PutOutcome> {
        self.put_calls.fetch_add(1, Ordering::SeqCst);

        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(Error::StoreWriteFailed(format!(
                "memory store writes disabled (order {})",
                order.order_uid
            )));
        }

        let mut orders = self.lock();
        if orders.contains_key(&order.order_uid) {
            return Ok(PutOutcome::AlreadyExists);
        }
        orders.insert(order.order_uid.clone(), order.clone());
        self.created.fetch_add(1, Ordering::SeqCst);

        Ok(PutOutcome::Created)
    }

    async fn get_by_key(&self, order_uid: &str) -> Result<Option<Order>> {
        self.check_reads()?;
        Ok(self.lock().get(order_uid).cloned())
    }

    async fn scan_all(&self) -> Result<Vec<Order>> {
        self.check_reads()?;
        Ok(self.lock().values().cloned().collect())
    }
}
