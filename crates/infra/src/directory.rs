//! Lookups the engine needs from the rest of the platform.
//!
//! Orders, locations and the inventory-number sequence live outside the
//! package aggregate. The engine only reads them through these traits.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Mutex, RwLock};

use goodstock_core::{LocationId, OrderId};
use goodstock_inventory::OrderSummary;

pub trait OrderDirectory: Send + Sync {
    fn order(&self, order_id: OrderId) -> Option<OrderSummary>;
}

pub trait LocationDirectory: Send + Sync {
    fn contains(&self, location_id: LocationId) -> bool;

    /// Stockit's id for a location, if it has one.
    fn stockit_id(&self, location_id: LocationId) -> Option<i64>;

    /// Stockit id of the pseudo-location dispatched items are filed under.
    fn dispatch_location(&self) -> Option<i64>;

    /// Stockit id of the pseudo-location for items spread over several locations.
    fn multiple_location(&self) -> Option<i64>;
}

/// Source of inventory numbers.
pub trait InventoryNumbers: Send + Sync {
    fn next(&self) -> String;

    /// Give a number back once its package is gone.
    fn release(&self, number: &str);
}

#[derive(Debug, Default)]
pub struct InMemoryOrderDirectory {
    orders: RwLock<HashMap<OrderId, OrderSummary>>,
}

impl InMemoryOrderDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn upsert(&self, order: OrderSummary) {
        if let Ok(mut orders) = self.orders.write() {
            orders.insert(order.id, order);
        }
    }
}

impl OrderDirectory for InMemoryOrderDirectory {
    fn order(&self, order_id: OrderId) -> Option<OrderSummary> {
        self.orders.read().ok()?.get(&order_id).cloned()
    }
}

#[derive(Debug, Default)]
pub struct InMemoryLocationDirectory {
    locations: RwLock<HashMap<LocationId, Option<i64>>>,
    dispatch: Option<i64>,
    multiple: Option<i64>,
}

impl InMemoryLocationDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the Stockit ids of the dispatch and "multiple" pseudo-locations.
    pub fn with_pseudo_locations(mut self, dispatch: i64, multiple: i64) -> Self {
        self.dispatch = Some(dispatch);
        self.multiple = Some(multiple);
        self
    }

    pub fn add(&self, location_id: LocationId, stockit_id: Option<i64>) {
        if let Ok(mut locations) = self.locations.write() {
            locations.insert(location_id, stockit_id);
        }
    }

    /// Register a fresh location and return its id.
    pub fn create(&self, stockit_id: Option<i64>) -> LocationId {
        let id = LocationId::new();
        self.add(id, stockit_id);
        id
    }
}

impl LocationDirectory for InMemoryLocationDirectory {
    fn contains(&self, location_id: LocationId) -> bool {
        self.locations
            .read()
            .map(|l| l.contains_key(&location_id))
            .unwrap_or(false)
    }

    fn stockit_id(&self, location_id: LocationId) -> Option<i64> {
        self.locations.read().ok()?.get(&location_id).copied().flatten()
    }

    fn dispatch_location(&self) -> Option<i64> {
        self.dispatch
    }

    fn multiple_location(&self) -> Option<i64> {
        self.multiple
    }
}

/// Six-digit sequential inventory numbers; released numbers are handed out again first.
#[derive(Debug)]
pub struct SequentialInventoryNumbers {
    next: AtomicU64,
    released: Mutex<BTreeSet<String>>,
}

impl SequentialInventoryNumbers {
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
            released: Mutex::new(BTreeSet::new()),
        }
    }
}

impl Default for SequentialInventoryNumbers {
    fn default() -> Self {
        Self::new()
    }
}

impl InventoryNumbers for SequentialInventoryNumbers {
    fn next(&self) -> String {
        if let Ok(mut released) = self.released.lock() {
            if let Some(number) = released.pop_first() {
                return number;
            }
        }
        let n = self.next.fetch_add(1, Ordering::SeqCst);
        format!("{n:06}")
    }

    fn release(&self, number: &str) {
        if number.trim().is_empty() {
            return;
        }
        if let Ok(mut released) = self.released.lock() {
            released.insert(number.to_string());
        }
    }
}
