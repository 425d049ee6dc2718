//! Catalog loading from JSON.
//!
//! `oai import <file>` reads a document of the form
//!
//! ```json
//! {
//!   "institution": "demo",
//!   "collections": [{ "handle": "2142/1", "title": "Research" }],
//!   "items": [{
//!     "handle": "2142/5",
//!     "updated_at": "2024-03-01T12:00:00Z",
//!     "collections": ["2142/1"],
//!     "item_type": "Article",
//!     "elements": [{ "name": "dc:title", "value": "On Harvesting" }]
//!   }]
//! }
//! ```
//!
//! and upserts every collection and item into the SQLite catalog. Importing
//! the same file twice leaves the catalog unchanged.

use std::collections::HashSet;
use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::Deserialize;
use tracing::{info, warn};

use crate::catalog_sqlite::SqliteCatalog;
use crate::config::Config;
use crate::migrate;
use crate::models::{Collection, Item};

#[derive(Debug, Deserialize)]
pub struct ImportDocument {
    /// Key of an `[institutions.*]` section.
    pub institution: String,
    #[serde(default)]
    pub collections: Vec<Collection>,
    #[serde(default)]
    pub items: Vec<Item>,
}

#[derive(Debug, Default, PartialEq, Eq)]
pub struct ImportSummary {
    pub collections: usize,
    pub items: usize,
    pub withdrawn: usize,
}

pub fn parse_document(content: &str) -> Result<ImportDocument> {
    serde_json::from_str(content).context("Failed to parse import document")
}

/// Writes `document` into `catalog`.
pub async fn import_document(
    config: &Config,
    catalog: &SqliteCatalog,
    document: &ImportDocument,
) -> Result<ImportSummary> {
    if !config.institutions.contains_key(&document.institution) {
        bail!(
            "Unknown institution '{}'. Configured: {}",
            document.institution,
            config
                .institutions
                .keys()
                .cloned()
                .collect::<Vec<_>>()
                .join(", ")
        );
    }

    let mut summary = ImportSummary::default();
    let known: HashSet<_> = document.collections.iter().map(|c| &c.handle).collect();

    for collection in &document.collections {
        catalog
            .upsert_collection(&document.institution, collection)
            .await
            .with_context(|| format!("importing collection {}", collection.handle))?;
        summary.collections += 1;
    }

    for item in &document.items {
        for membership in &item.collections {
            if !known.contains(membership) {
                warn!(item = %item.handle, collection = %membership, "item references a collection not in this document");
            }
        }
        catalog
            .upsert_item(&document.institution, item)
            .await
            .with_context(|| format!("importing item {}", item.handle))?;
        summary.items += 1;
        if item.withdrawn {
            summary.withdrawn += 1;
        }
    }

    info!(
        institution = %document.institution,
        collections = summary.collections,
        items = summary.items,
        "import complete"
    );
    Ok(summary)
}

/// CLI entry point for `oai import`.
pub async fn run_import(config: &Config, path: &Path) -> Result<()> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read import file: {}", path.display()))?;
    let document = parse_document(&content)?;

    migrate::run_migrations(config).await?;
    let catalog = SqliteCatalog::connect(config).await?;
    let summary = import_document(config, &catalog, &document).await?;
    catalog.pool().close().await;

    println!(
        "Imported {} collections and {} items ({} withdrawn) for '{}'",
        summary.collections, summary.items, summary.withdrawn, document.institution
    );
    Ok(())
}
