//! Selective-harvest query construction.
//!
//! Turns a validated [`Request`] into the [`SelectiveHarvestCriteria`] the
//! catalog executes. Pure translation: no I/O happens here.
//!
//! A continuation request carries only a resumption token, so in that case
//! the filter and offset come from the decoded token rather than from the
//! request arguments.

use chrono::{DateTime, Utc};

use crate::formats::MetadataFormatRegistry;
use crate::protocol::Datestamp;
use crate::validate::Request;

/// The part of a harvest query that a resumption token must carry.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct HarvestFilter {
    /// Absent only for `ListSets` continuations.
    pub metadata_prefix: Option<String>,
    pub from: Option<Datestamp>,
    pub until: Option<Datestamp>,
    pub set: Option<String>,
}

/// Query contract handed to the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SelectiveHarvestCriteria {
    pub filter: HarvestFilter,
    pub offset: usize,
    pub page_size: usize,
    /// Item types the requested format is restricted to; `None` means all.
    pub item_types: Option<Vec<String>>,
}

impl SelectiveHarvestCriteria {
    /// Inclusive lower datestamp bound, if any.
    pub fn from_bound(&self) -> Option<DateTime<Utc>> {
        self.filter.from.map(|d| d.lower_bound())
    }

    /// Inclusive upper datestamp bound, if any.
    pub fn until_bound(&self) -> Option<DateTime<Utc>> {
        self.filter.until.map(|d| d.upper_bound())
    }

    /// Whether an item datestamp falls inside the requested window.
    pub fn covers(&self, datestamp: &DateTime<Utc>) -> bool {
        self.from_bound().map_or(true, |from| *datestamp >= from)
            && self.until_bound().map_or(true, |until| *datestamp <= until)
    }
}

/// Filter described by the request: the token's filter when resuming,
/// otherwise the fresh arguments.
pub fn filter_for(request: &Request) -> HarvestFilter {
    if let Some(token) = &request.resumption {
        return token.filter.clone();
    }
    HarvestFilter {
        metadata_prefix: request.metadata_prefix.clone(),
        from: request.from,
        until: request.until,
        set: request.set.clone(),
    }
}

/// Offset of the page requested.
pub fn offset_for(request: &Request) -> usize {
    request.resumption.as_ref().map_or(0, |t| t.offset)
}

/// Builds the catalog query for `ListIdentifiers` / `ListRecords`.
pub fn build(
    request: &Request,
    formats: &MetadataFormatRegistry,
    page_size: usize,
) -> SelectiveHarvestCriteria {
    let filter = filter_for(request);
    let item_types = filter
        .metadata_prefix
        .as_deref()
        .and_then(|prefix| formats.lookup(prefix))
        .and_then(|format| format.item_types())
        .map(|types| types.iter().map(|t| t.to_string()).collect());

    SelectiveHarvestCriteria {
        filter,
        offset: offset_for(request),
        page_size,
        item_types,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::protocol::{Arguments, Verb};
    use crate::resumption::ResumptionToken;

    fn request(verb: Verb) -> Request {
        Request {
            verb,
            arguments: Arguments::new(),
            item: None,
            metadata_prefix: None,
            from: None,
            until: None,
            set: None,
            resumption: None,
        }
    }

    #[test]
    fn test_fresh_request_defaults() {
        let mut req = request(Verb::ListRecords);
        req.metadata_prefix = Some("oai_dc".to_string());

        let criteria = build(&req, &MetadataFormatRegistry::with_builtins(), 50);
        assert_eq!(criteria.offset, 0);
        assert_eq!(criteria.page_size, 50);
        assert_eq!(criteria.filter.metadata_prefix.as_deref(), Some("oai_dc"));
        assert!(criteria.filter.from.is_none());
        assert!(criteria.filter.set.is_none());
        assert!(criteria.item_types.is_none());
        assert!(criteria.covers(&Utc::now()));
    }

    #[test]
    fn test_resumption_overrides_arguments() {
        let filter = HarvestFilter {
            metadata_prefix: Some("qdc".to_string()),
            from: Datestamp::parse("2021-01-01"),
            until: None,
            set: Some("col_2142_3".to_string()),
        };
        let mut req = request(Verb::ListIdentifiers);
        req.resumption = Some(ResumptionToken::new(filter.clone(), 200));

        let criteria = build(&req, &MetadataFormatRegistry::with_builtins(), 100);
        assert_eq!(criteria.filter, filter);
        assert_eq!(criteria.offset, 200);
    }

    #[test]
    fn test_etdms_restricts_item_types() {
        let mut req = request(Verb::ListRecords);
        req.metadata_prefix = Some("etdms".to_string());

        let criteria = build(&req, &MetadataFormatRegistry::with_builtins(), 10);
        let types = criteria.item_types.unwrap();
        assert!(types.iter().any(|t| t == "Thesis"));
    }

    #[test]
    fn test_window_is_inclusive() {
        let mut req = request(Verb::ListRecords);
        req.metadata_prefix = Some("oai_dc".to_string());
        req.from = Datestamp::parse("2020-01-01");
        req.until = Datestamp::parse("2020-01-31");
        let criteria = build(&req, &MetadataFormatRegistry::with_builtins(), 10);

        let first = Datestamp::parse("2020-01-01T00:00:00Z").unwrap().lower_bound();
        let last = Datestamp::parse("2020-01-31T23:59:59Z").unwrap().lower_bound();
        let after = Datestamp::parse("2020-02-01T00:00:00Z").unwrap().lower_bound();
        assert!(criteria.covers(&first));
        assert!(criteria.covers(&last));
        assert!(!criteria.covers(&after));
    }
}
