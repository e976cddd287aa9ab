//! Boundary to the catalog and account systems.
//!
//! Buyers and items are owned elsewhere; the gate only needs to know that they
//! exist, what an item costs, and where the money should go.

use crate::config::GateConfig;
use crate::session::{BuyerId, ItemId};
use rust_decimal::Decimal;
use std::collections::{HashMap, HashSet};

/// What the gate needs to know about a sellable item.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CatalogItem {
    /// Current price.
    pub price: Decimal,
    /// Account the buyer transfers to.
    pub payee_account: String,
}

/// Lookup of externally owned buyers and items.
pub trait Catalog: Send + Sync {
    /// Returns true if the buyer exists.
    fn buyer_exists(&self, buyer_id: BuyerId) -> bool;

    /// Item details, if the item exists and has a price.
    fn item(&self, item_id: ItemId) -> Option<CatalogItem>;
}

/// Catalog defined up front, typically from the configuration file.
#[derive(Debug, Default, Clone)]
pub struct StaticCatalog {
    buyers: HashSet<BuyerId>,
    items: HashMap<ItemId, CatalogItem>,
}

impl StaticCatalog {
    /// Create an empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the catalog from the `[[buyers]]` and `[[items]]` tables.
    #[must_use]
    pub fn from_config(config: &GateConfig) -> Self {
        let mut catalog = Self::new();
        for buyer in &config.buyers {
            catalog.buyers.insert(buyer.id);
        }
        for item in &config.items {
            catalog.items.insert(
                item.id,
                CatalogItem {
                    price: item.price,
                    payee_account: item.payee_account.clone(),
                },
            );
        }
        catalog
    }

    /// Add a buyer.
    #[must_use]
    pub fn with_buyer(mut self, buyer_id: BuyerId) -> Self {
        self.buyers.insert(buyer_id);
        self
    }

    /// Add an item.
    #[must_use]
    pub fn with_item(mut self, item_id: ItemId, price: Decimal, payee_account: &str) -> Self {
        self.items.insert(
            item_id,
            CatalogItem {
                price,
                payee_account: payee_account.to_string(),
            },
        );
        self
    }
}

impl Catalog for StaticCatalog {
    fn buyer_exists(&self, buyer_id: BuyerId) -> bool {
        self.buyers.contains(&buyer_id)
    }

    fn item(&self, item_id: ItemId) -> Option<CatalogItem> {
        self.items.get(&item_id).cloned()
    }
}
