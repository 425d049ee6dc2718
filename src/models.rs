//! Core data models used throughout the responder.
//!
//! Items and collections come from the catalog; harvest records are built
//! from them per request and never stored.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::identifier::Handle;

/// One qualified metadata value, e.g. `dc:title` or `thesis:degree.name`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct MetadataElement {
    pub name: String,
    pub value: String,
}

impl MetadataElement {
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
        }
    }
}

/// A catalog item as the responder sees it.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct Item {
    pub handle: Handle,
    /// Last modification time; the OAI datestamp.
    pub updated_at: DateTime<Utc>,
    /// Handles of the collections the item belongs to.
    #[serde(default)]
    pub collections: Vec<Handle>,
    /// Withdrawn items are harvested as deleted records.
    #[serde(default)]
    pub withdrawn: bool,
    #[serde(default)]
    pub item_type: Option<String>,
    #[serde(default)]
    pub elements: Vec<MetadataElement>,
}

impl Item {
    /// Values of all elements named `name`, in order.
    pub fn values<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a str> + 'a {
        self.elements
            .iter()
            .filter(move |e| e.name == name)
            .map(|e| e.value.as_str())
    }

    pub fn set_specs(&self) -> Vec<String> {
        self.collections.iter().map(Handle::set_spec).collect()
    }

    /// Case-insensitive match of the item type against `types`.
    pub fn has_type(&self, types: &[&str]) -> bool {
        self.item_type
            .as_deref()
            .map(|t| types.iter().any(|candidate| candidate.eq_ignore_ascii_case(t)))
            .unwrap_or(false)
    }
}

/// A collection, exposed as an OAI set.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct Collection {
    pub handle: Handle,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
}

/// A record header plus optional rendered metadata, built per request.
#[derive(Debug, Clone, PartialEq)]
pub struct HarvestRecord {
    pub identifier: String,
    pub datestamp: DateTime<Utc>,
    pub set_specs: Vec<String>,
    pub deleted: bool,
    /// Rendered metadata fragment; absent for headers and deleted records.
    pub metadata: Option<String>,
}

/// The institution a request was addressed to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InstitutionScope {
    /// Configuration key; also the tenant key in the catalog.
    pub key: String,
    pub fqdn: String,
    pub repository_name: String,
    pub base_url: String,
    pub admin_email: String,
}
