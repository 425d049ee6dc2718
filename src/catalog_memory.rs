//! In-memory [`Catalog`] implementation for tests and embedding.
//!
//! Items and collections are kept per institution key in `HashMap`s behind
//! `std::sync::RwLock`. Harvest queries scan every item of the institution.

use std::collections::HashMap;
use std::sync::RwLock;

use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::catalog::{matches, Catalog, HarvestPage};
use crate::identifier::Handle;
use crate::models::{Collection, InstitutionScope, Item};
use crate::query::SelectiveHarvestCriteria;

#[derive(Default)]
struct Tenant {
    items: HashMap<Handle, Item>,
    collections: Vec<Collection>,
}

/// In-memory catalog.
pub struct InMemoryCatalog {
    tenants: RwLock<HashMap<String, Tenant>>,
}

impl InMemoryCatalog {
    pub fn new() -> Self {
        Self {
            tenants: RwLock::new(HashMap::new()),
        }
    }

    /// Insert or replace an item for the institution `key`.
    pub fn insert_item(&self, key: &str, item: Item) -> Result<()> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        tenants
            .entry(key.to_string())
            .or_default()
            .items
            .insert(item.handle.clone(), item);
        Ok(())
    }

    /// Insert or replace a collection for the institution `key`.
    pub fn insert_collection(&self, key: &str, collection: Collection) -> Result<()> {
        let mut tenants = self.tenants.write().map_err(|_| poisoned())?;
        let tenant = tenants.entry(key.to_string()).or_default();
        tenant
            .collections
            .retain(|existing| existing.handle != collection.handle);
        tenant.collections.push(collection);
        tenant.collections.sort_by(|a, b| a.handle.cmp(&b.handle));
        Ok(())
    }
}

impl Default for InMemoryCatalog {
    fn default() -> Self {
        Self::new()
    }
}

fn poisoned() -> anyhow::Error {
    anyhow!("in-memory catalog lock poisoned")
}

#[async_trait]
impl Catalog for InMemoryCatalog {
    async fn find_item(&self, scope: &InstitutionScope, handle: &Handle) -> Result<Option<Item>> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        Ok(tenants
            .get(&scope.key)
            .and_then(|tenant| tenant.items.get(handle))
            .cloned())
    }

    async fn harvest(
        &self,
        scope: &InstitutionScope,
        criteria: &SelectiveHarvestCriteria,
    ) -> Result<HarvestPage> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        let tenant = match tenants.get(&scope.key) {
            Some(t) => t,
            None => return Ok(HarvestPage::default()),
        };

        let mut matching: Vec<&Item> = tenant
            .items
            .values()
            .filter(|item| matches(item, criteria))
            .collect();
        matching.sort_by(|a, b| {
            a.updated_at
                .cmp(&b.updated_at)
                .then_with(|| a.handle.cmp(&b.handle))
        });

        Ok(HarvestPage {
            total: matching.len(),
            items: matching
                .into_iter()
                .skip(criteria.offset)
                .take(criteria.page_size)
                .cloned()
                .collect(),
        })
    }

    async fn collections(&self, scope: &InstitutionScope) -> Result<Vec<Collection>> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        Ok(tenants
            .get(&scope.key)
            .map(|tenant| tenant.collections.clone())
            .unwrap_or_default())
    }

    async fn earliest_datestamp(&self, scope: &InstitutionScope) -> Result<Option<DateTime<Utc>>> {
        let tenants = self.tenants.read().map_err(|_| poisoned())?;
        Ok(tenants
            .get(&scope.key)
            .and_then(|tenant| tenant.items.values().map(|item| item.updated_at).min()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::HarvestFilter;
    use chrono::TimeZone;

    fn scope(key: &str) -> InstitutionScope {
        InstitutionScope {
            key: key.to_string(),
            fqdn: format!("{}.example.edu", key),
            repository_name: key.to_string(),
            base_url: format!("https://{}.example.edu/oai-pmh", key),
            admin_email: format!("admin@{}.example.edu", key),
        }
    }

    fn item(suffix: &str, hour: u32) -> Item {
        Item {
            handle: Handle::new("2142", suffix),
            updated_at: Utc.with_ymd_and_hms(2022, 2, 2, hour, 0, 0).unwrap(),
            collections: vec![],
            withdrawn: false,
            item_type: None,
            elements: vec![],
        }
    }

    fn all(page_size: usize, offset: usize) -> SelectiveHarvestCriteria {
        SelectiveHarvestCriteria {
            filter: HarvestFilter::default(),
            offset,
            page_size,
            item_types: None,
        }
    }

    #[tokio::test]
    async fn test_harvest_orders_by_datestamp_then_handle() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_item("a", item("9", 3)).unwrap();
        catalog.insert_item("a", item("2", 1)).unwrap();
        catalog.insert_item("a", item("1", 3)).unwrap();

        let page = catalog.harvest(&scope("a"), &all(10, 0)).await.unwrap();
        let handles: Vec<String> = page.items.iter().map(|i| i.handle.to_string()).collect();
        assert_eq!(handles, vec!["2142/2", "2142/1", "2142/9"]);

        let page = catalog.harvest(&scope("a"), &all(1, 1)).await.unwrap();
        assert_eq!(page.total, 3);
        assert_eq!(page.items[0].handle, Handle::new("2142", "1"));
    }

    #[tokio::test]
    async fn test_tenants_are_isolated() {
        let catalog = InMemoryCatalog::new();
        catalog.insert_item("a", item("1", 1)).unwrap();

        assert!(catalog
            .find_item(&scope("b"), &Handle::new("2142", "1"))
            .await
            .unwrap()
            .is_none());
        assert_eq!(catalog.harvest(&scope("b"), &all(10, 0)).await.unwrap().total, 0);
        assert!(catalog.earliest_datestamp(&scope("b")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_collections_are_replaced_and_sorted() {
        let catalog = InMemoryCatalog::new();
        for (suffix, title) in [("9", "Nine"), ("1", "One"), ("9", "Nine again")] {
            catalog
                .insert_collection(
                    "a",
                    Collection {
                        handle: Handle::new("2142", suffix),
                        title: title.to_string(),
                        description: None,
                    },
                )
                .unwrap();
        }
        let sets = catalog.collections(&scope("a")).await.unwrap();
        let titles: Vec<&str> = sets.iter().map(|c| c.title.as_str()).collect();
        assert_eq!(titles, vec!["One", "Nine again"]);
    }
}
