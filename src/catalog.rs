//! The item catalog collaborator.
//!
//! The responder never owns item storage. It talks to a [`Catalog`], which
//! answers handle lookups, executes selective-harvest queries, lists the
//! collections exposed as sets, and reports the earliest datestamp. Two
//! implementations ship with the crate:
//!
//! | Backend | Module | Use |
//! |---------|--------|-----|
//! | SQLite | [`catalog_sqlite`](crate::catalog_sqlite) | `oai serve`, `oai request` |
//! | in-memory | [`catalog_memory`](crate::catalog_memory) | tests, embedding |
//!
//! All operations are read-only and async. Implementations must be
//! `Send + Sync`; one instance serves every request concurrently.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};

use crate::identifier::{parse_set_spec, Handle};
use crate::models::{Collection, InstitutionScope, Item};
use crate::query::SelectiveHarvestCriteria;

/// One page of a selective-harvest query.
#[derive(Debug, Clone, Default)]
pub struct HarvestPage {
    /// Items on this page, ordered by datestamp then handle.
    pub items: Vec<Item>,
    /// Number of items matching the criteria across all pages.
    pub total: usize,
}

/// Read-only access to an institution's items and collections.
///
/// # Operations
///
/// | Method | Purpose |
/// |--------|---------|
/// | [`find_item`](Catalog::find_item) | Resolve a handle (`GetRecord`, `ListMetadataFormats`) |
/// | [`harvest`](Catalog::harvest) | Execute a selective-harvest page query |
/// | [`collections`](Catalog::collections) | Enumerate sets (`ListSets`) |
/// | [`earliest_datestamp`](Catalog::earliest_datestamp) | `Identify` |
#[async_trait]
pub trait Catalog: Send + Sync {
    /// Look up a harvestable item by handle.
    async fn find_item(&self, scope: &InstitutionScope, handle: &Handle) -> Result<Option<Item>>;

    /// Execute one page of a selective-harvest query.
    ///
    /// `from` and `until` are inclusive; `set` matches items belonging to the
    /// collection with that setSpec; `item_types` restricts to the listed
    /// types (case-insensitive). Results are ordered by datestamp then
    /// handle so that offsets are stable across pages.
    async fn harvest(
        &self,
        scope: &InstitutionScope,
        criteria: &SelectiveHarvestCriteria,
    ) -> Result<HarvestPage>;

    /// All collections of the institution, in a stable order.
    async fn collections(&self, scope: &InstitutionScope) -> Result<Vec<Collection>>;

    /// Datestamp of the oldest harvestable item, if there is any.
    async fn earliest_datestamp(&self, scope: &InstitutionScope) -> Result<Option<DateTime<Utc>>>;
}

/// Whether `item` satisfies the filter part of `criteria`.
///
/// Backends that cannot push the filter down into a query language use this
/// predicate directly.
pub fn matches(item: &Item, criteria: &SelectiveHarvestCriteria) -> bool {
    if !criteria.covers(&item.updated_at) {
        return false;
    }
    if let Some(spec) = &criteria.filter.set {
        match parse_set_spec(spec) {
            Some(handle) if item.collections.contains(&handle) => {}
            _ => return false,
        }
    }
    if let Some(types) = &criteria.item_types {
        let types: Vec<&str> = types.iter().map(String::as_str).collect();
        if !item.has_type(&types) {
            return false;
        }
    }
    true
}
