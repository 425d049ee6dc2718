//! OAI identifiers, handles and set specs.
//!
//! Items and collections are addressed by persistent handles
//! (`{prefix}/{suffix}`). The OAI identifier of an item is
//! `oai:{fqdn}:{handle}` where `fqdn` is the institution's host name, and a
//! collection's setSpec is `col_{prefix}_{suffix}`.

use anyhow::Result;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::catalog::Catalog;
use crate::models::{InstitutionScope, Item};

/// Resolver for handle URLs embedded in rendered metadata.
pub const HANDLE_SERVER: &str = "http://hdl.handle.net/";

/// A persistent handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Handle {
    pub prefix: String,
    pub suffix: String,
}

impl Handle {
    pub fn new(prefix: impl Into<String>, suffix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            suffix: suffix.into(),
        }
    }

    /// Parses `{prefix}/{suffix}`. Both parts must be non-empty and the
    /// prefix may not itself contain a slash.
    pub fn parse(value: &str) -> Option<Handle> {
        let (prefix, suffix) = value.split_once('/')?;
        if prefix.is_empty() || suffix.is_empty() || suffix.contains('/') {
            return None;
        }
        Some(Handle::new(prefix, suffix))
    }

    /// The setSpec of a collection with this handle.
    pub fn set_spec(&self) -> String {
        format!("col_{}_{}", self.prefix, self.suffix)
    }

    pub fn url(&self) -> String {
        format!("{}{}", HANDLE_SERVER, self)
    }
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.prefix, self.suffix)
    }
}

impl TryFrom<String> for Handle {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Handle::parse(&value).ok_or_else(|| format!("invalid handle: {}", value))
    }
}

impl From<Handle> for String {
    fn from(handle: Handle) -> String {
        handle.to_string()
    }
}

/// Recovers the collection handle from a `col_{prefix}_{suffix}` setSpec.
///
/// The prefix ends at the first underscore; the suffix keeps any later ones.
pub fn parse_set_spec(spec: &str) -> Option<Handle> {
    let rest = spec.strip_prefix("col_")?;
    let (prefix, suffix) = rest.split_once('_')?;
    if prefix.is_empty() || suffix.is_empty() || suffix.contains('/') {
        return None;
    }
    Some(Handle::new(prefix, suffix))
}

/// Builds and parses `oai:{fqdn}:{handle}` identifiers for one institution.
#[derive(Debug, Clone)]
pub struct IdentifierCodec {
    fqdn: String,
}

impl IdentifierCodec {
    pub fn new(fqdn: impl Into<String>) -> Self {
        Self { fqdn: fqdn.into() }
    }

    pub fn for_scope(scope: &InstitutionScope) -> Self {
        Self::new(scope.fqdn.clone())
    }

    pub fn encode(&self, handle: &Handle) -> String {
        format!("oai:{}:{}", self.fqdn, handle)
    }

    /// Returns the handle named by `identifier`, or `None` when the
    /// identifier is malformed or belongs to another repository.
    pub fn decode(&self, identifier: &str) -> Option<Handle> {
        let rest = identifier.strip_prefix("oai:")?;
        let rest = rest.strip_prefix(self.fqdn.as_str())?;
        let handle = rest.strip_prefix(':')?;
        Handle::parse(handle)
    }

    /// Decodes `identifier` and looks its handle up in the catalog.
    ///
    /// `Ok(None)` means the identifier is illegal or unknown; `Err` is a
    /// catalog failure.
    pub async fn resolve(
        &self,
        identifier: &str,
        catalog: &dyn Catalog,
        scope: &InstitutionScope,
    ) -> Result<Option<Item>> {
        match self.decode(identifier) {
            Some(handle) => catalog.find_item(scope, &handle).await,
            None => Ok(None),
        }
    }

    /// The `<sampleIdentifier>` advertised by `Identify`.
    pub fn sample(&self) -> String {
        self.encode(&Handle::new("123456789", "1"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identifier_roundtrip() {
        let codec = IdentifierCodec::new("demo.example.edu");
        let handle = Handle::new("2142", "105");
        let id = codec.encode(&handle);
        assert_eq!(id, "oai:demo.example.edu:2142/105");
        assert_eq!(codec.decode(&id), Some(handle));
    }

    #[test]
    fn test_identifier_from_other_host_is_rejected() {
        let codec = IdentifierCodec::new("demo.example.edu");
        assert_eq!(codec.decode("oai:other.example.edu:2142/105"), None);
        assert_eq!(codec.decode("oai:demo.example.edu.evil:2142/105"), None);
    }

    #[test]
    fn test_malformed_identifiers() {
        let codec = IdentifierCodec::new("demo.example.edu");
        for bad in ["cats", "oai:demo.example.edu", "oai:demo.example.edu:2142", "oai:demo.example.edu:/5", "2142/5"] {
            assert_eq!(codec.decode(bad), None, "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_set_spec_roundtrip() {
        let handle = Handle::new("2142", "77");
        assert_eq!(handle.set_spec(), "col_2142_77");
        assert_eq!(parse_set_spec("col_2142_77"), Some(handle));
        assert_eq!(parse_set_spec("unit_2142_77"), None);
        assert_eq!(parse_set_spec("col_2142"), None);

        let theses = Handle::new("2142", "theses_2020");
        assert_eq!(theses.set_spec(), "col_2142_theses_2020");
        assert_eq!(parse_set_spec(&theses.set_spec()), Some(theses));
    }

    #[test]
    fn test_handle_serde_as_string() {
        let handle: Handle = serde_json::from_str("\"2142/9\"").unwrap();
        assert_eq!(handle, Handle::new("2142", "9"));
        assert!(serde_json::from_str::<Handle>("\"nope\"").is_err());
        assert_eq!(serde_json::to_string(&handle).unwrap(), "\"2142/9\"");
    }
}
