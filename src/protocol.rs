//! OAI-PMH 2.0 protocol vocabulary.
//!
//! Verbs, the eight error codes with their exact wire messages, the ordered
//! request argument list, and UTC datestamps in the two granularities the
//! protocol allows.

use chrono::{DateTime, Duration, NaiveDate, NaiveDateTime, TimeZone, Utc};
use std::fmt;

/// Value of `<protocolVersion>` in `Identify`.
pub const PROTOCOL_VERSION: &str = "2.0";
/// Value of `<deletedRecord>` in `Identify`.
pub const DELETED_RECORD: &str = "persistent";
/// Finest datestamp granularity this repository supports.
pub const GRANULARITY: &str = "YYYY-MM-DDThh:mm:ssZ";

pub const OAI_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/";
pub const OAI_SCHEMA_LOCATION: &str =
    "http://www.openarchives.org/OAI/2.0/ http://www.openarchives.org/OAI/2.0/OAI-PMH.xsd";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// Media type of every protocol response, success or error.
pub const CONTENT_TYPE: &str = "text/xml; charset=UTF-8";

pub const VERB: &str = "verb";
pub const IDENTIFIER: &str = "identifier";
pub const METADATA_PREFIX: &str = "metadataPrefix";
pub const FROM: &str = "from";
pub const UNTIL: &str = "until";
pub const SET: &str = "set";
pub const RESUMPTION_TOKEN: &str = "resumptionToken";

// ============ Verbs ============

/// The six OAI-PMH verbs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Verb {
    Identify,
    GetRecord,
    ListIdentifiers,
    ListMetadataFormats,
    ListRecords,
    ListSets,
}

impl Verb {
    pub const ALL: [Verb; 6] = [
        Verb::Identify,
        Verb::GetRecord,
        Verb::ListIdentifiers,
        Verb::ListMetadataFormats,
        Verb::ListRecords,
        Verb::ListSets,
    ];

    /// Parses a verb argument. Verbs are case-sensitive.
    pub fn parse(value: &str) -> Option<Verb> {
        Verb::ALL.into_iter().find(|v| v.as_str() == value)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Verb::Identify => "Identify",
            Verb::GetRecord => "GetRecord",
            Verb::ListIdentifiers => "ListIdentifiers",
            Verb::ListMetadataFormats => "ListMetadataFormats",
            Verb::ListRecords => "ListRecords",
            Verb::ListSets => "ListSets",
        }
    }

    /// Arguments that must be present (and non-blank) unless the request is
    /// a resumption.
    pub fn required_arguments(&self) -> &'static [&'static str] {
        match self {
            Verb::GetRecord => &[IDENTIFIER, METADATA_PREFIX],
            Verb::ListIdentifiers | Verb::ListRecords => &[METADATA_PREFIX],
            Verb::Identify | Verb::ListMetadataFormats | Verb::ListSets => &[],
        }
    }

    pub fn optional_arguments(&self) -> &'static [&'static str] {
        match self {
            Verb::ListIdentifiers | Verb::ListRecords => &[FROM, UNTIL, SET, RESUMPTION_TOKEN],
            Verb::ListMetadataFormats => &[IDENTIFIER],
            Verb::ListSets => &[RESUMPTION_TOKEN],
            Verb::Identify | Verb::GetRecord => &[],
        }
    }

    /// Whether `name` may appear in a request for this verb.
    pub fn accepts(&self, name: &str) -> bool {
        name == VERB
            || self.required_arguments().contains(&name)
            || self.optional_arguments().contains(&name)
    }

    pub fn accepts_resumption_token(&self) -> bool {
        self.optional_arguments().contains(&RESUMPTION_TOKEN)
    }
}

impl fmt::Display for Verb {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============ Errors ============

/// The OAI-PMH error taxonomy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    BadVerb,
    BadArgument,
    BadResumptionToken,
    CannotDisseminateFormat,
    IdDoesNotExist,
    NoRecordsMatch,
    NoMetadataFormats,
    NoSetHierarchy,
}

impl ErrorCode {
    /// The value of the `code` attribute on `<error>`.
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::BadVerb => "badVerb",
            ErrorCode::BadArgument => "badArgument",
            ErrorCode::BadResumptionToken => "badResumptionToken",
            ErrorCode::CannotDisseminateFormat => "cannotDisseminateFormat",
            ErrorCode::IdDoesNotExist => "idDoesNotExist",
            ErrorCode::NoRecordsMatch => "noRecordsMatch",
            ErrorCode::NoMetadataFormats => "noMetadataFormats",
            ErrorCode::NoSetHierarchy => "noSetHierarchy",
        }
    }
}

/// A protocol-level error, rendered as an `<error>` element in an HTTP 200
/// response. The message text is part of the external contract.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProtocolError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProtocolError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn missing_verb() -> Self {
        Self::new(ErrorCode::BadVerb, "Missing verb argument.")
    }

    pub fn illegal_verb() -> Self {
        Self::new(ErrorCode::BadVerb, "Illegal verb argument.")
    }

    pub fn exclusive_resumption_token() -> Self {
        Self::new(
            ErrorCode::BadArgument,
            "resumptionToken is an exclusive argument.",
        )
    }

    pub fn illegal_argument(name: &str) -> Self {
        Self::new(ErrorCode::BadArgument, format!("Illegal argument: {}", name))
    }

    pub fn repeated_argument(name: &str) -> Self {
        Self::new(
            ErrorCode::BadArgument,
            format!("Illegal repeated argument: {}", name),
        )
    }

    pub fn missing_argument(name: &str) -> Self {
        Self::new(ErrorCode::BadArgument, format!("Missing {} argument.", name))
    }

    pub fn illegal_datestamp(name: &str) -> Self {
        Self::new(ErrorCode::BadArgument, format!("Illegal {} argument.", name))
    }

    pub fn mixed_granularity() -> Self {
        Self::new(
            ErrorCode::BadArgument,
            "The from and until arguments must have the same granularity.",
        )
    }

    pub fn inverted_date_range() -> Self {
        Self::new(
            ErrorCode::BadArgument,
            "The from argument must be less than or equal to the until argument.",
        )
    }

    pub fn unsupported_content_type() -> Self {
        Self::new(
            ErrorCode::BadArgument,
            "Content-Type of POST requests must be 'application/x-www-form-urlencoded'",
        )
    }

    pub fn bad_resumption_token() -> Self {
        Self::new(
            ErrorCode::BadResumptionToken,
            "The value of the resumptionToken argument is invalid or expired.",
        )
    }

    pub fn cannot_disseminate_format() -> Self {
        Self::new(
            ErrorCode::CannotDisseminateFormat,
            "The metadata format identified by the metadataPrefix argument is not \
             supported by this repository.",
        )
    }

    pub fn id_does_not_exist() -> Self {
        Self::new(
            ErrorCode::IdDoesNotExist,
            "The value of the identifier argument is unknown or illegal in this repository.",
        )
    }

    pub fn no_records_match() -> Self {
        Self::new(ErrorCode::NoRecordsMatch, "No matching records.")
    }

    pub fn no_metadata_formats() -> Self {
        Self::new(
            ErrorCode::NoMetadataFormats,
            "There are no metadata formats available for the specified item.",
        )
    }

    pub fn no_set_hierarchy() -> Self {
        Self::new(
            ErrorCode::NoSetHierarchy,
            "This repository does not support sets.",
        )
    }
}

impl fmt::Display for ProtocolError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.as_str(), self.message)
    }
}

// ============ Arguments ============

/// Request arguments in the order the harvester sent them.
///
/// Repeated names are kept so the validator can report them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Arguments {
    pairs: Vec<(String, String)>,
}

impl Arguments {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decodes an `application/x-www-form-urlencoded` payload (a query
    /// string or a POST body).
    pub fn parse_form(input: &[u8]) -> Self {
        url::form_urlencoded::parse(input)
            .map(|(k, v)| (k.into_owned(), v.into_owned()))
            .collect()
    }

    pub fn push(&mut self, name: impl Into<String>, value: impl Into<String>) {
        self.pairs.push((name.into(), value.into()));
    }

    /// Value of the first occurrence of `name`, or `None` when absent or blank.
    pub fn get(&self, name: &str) -> Option<&str> {
        self.pairs
            .iter()
            .find(|(k, _)| k == name)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.trim().is_empty())
    }

    /// True when `name` is present with a non-blank value.
    pub fn contains(&self, name: &str) -> bool {
        self.get(name).is_some()
    }

    pub fn count(&self, name: &str) -> usize {
        self.pairs.iter().filter(|(k, _)| k == name).count()
    }

    /// Distinct argument names in first-seen order.
    pub fn names(&self) -> Vec<&str> {
        let mut seen: Vec<&str> = Vec::new();
        for (k, _) in &self.pairs {
            if !seen.contains(&k.as_str()) {
                seen.push(k);
            }
        }
        seen
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.pairs.iter().map(|(k, v)| (k.as_str(), v.as_str()))
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }
}

impl<K: Into<String>, V: Into<String>> FromIterator<(K, V)> for Arguments {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Self {
            pairs: iter
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }
}

// ============ Datestamps ============

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Granularity {
    /// `YYYY-MM-DD`
    Day,
    /// `YYYY-MM-DDThh:mm:ssZ`
    Second,
}

/// A `from`/`until` argument value.
///
/// Keeps the granularity it was written in so it can be echoed back and
/// embedded in resumption tokens unchanged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Datestamp {
    instant: DateTime<Utc>,
    granularity: Granularity,
}

impl Datestamp {
    pub fn parse(value: &str) -> Option<Datestamp> {
        if value.len() == 10 {
            let date = NaiveDate::parse_from_str(value, "%Y-%m-%d").ok()?;
            let midnight = date.and_hms_opt(0, 0, 0)?;
            return Some(Datestamp {
                instant: Utc.from_utc_datetime(&midnight),
                granularity: Granularity::Day,
            });
        }
        if value.len() == 20 {
            let naive = NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SZ").ok()?;
            return Some(Datestamp {
                instant: Utc.from_utc_datetime(&naive),
                granularity: Granularity::Second,
            });
        }
        None
    }

    pub fn granularity(&self) -> Granularity {
        self.granularity
    }

    /// Earliest instant covered by this datestamp.
    pub fn lower_bound(&self) -> DateTime<Utc> {
        self.instant
    }

    /// Latest instant covered. A day-granularity value covers the whole day.
    pub fn upper_bound(&self) -> DateTime<Utc> {
        match self.granularity {
            Granularity::Day => self.instant + Duration::seconds(86_399),
            Granularity::Second => self.instant,
        }
    }
}

impl fmt::Display for Datestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.granularity {
            Granularity::Day => write!(f, "{}", self.instant.format("%Y-%m-%d")),
            Granularity::Second => f.write_str(&format_datestamp(&self.instant)),
        }
    }
}

/// Formats an instant at the repository's granularity.
pub fn format_datestamp(instant: &DateTime<Utc>) -> String {
    instant.format("%Y-%m-%dT%H:%M:%SZ").to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_verb_parse_is_case_sensitive() {
        assert_eq!(Verb::parse("ListRecords"), Some(Verb::ListRecords));
        assert_eq!(Verb::parse("listrecords"), None);
        assert_eq!(Verb::parse("bogus"), None);
    }

    #[test]
    fn test_verb_argument_table() {
        assert!(Verb::GetRecord.accepts("identifier"));
        assert!(!Verb::GetRecord.accepts("from"));
        assert!(Verb::ListSets.accepts_resumption_token());
        assert!(!Verb::Identify.accepts_resumption_token());
        assert_eq!(
            Verb::GetRecord.required_arguments(),
            &["identifier", "metadataPrefix"]
        );
    }

    #[test]
    fn test_arguments_preserve_order_and_repeats() {
        let args = Arguments::parse_form(b"verb=ListSets&dogs=1&cats=2&dogs=3");
        assert_eq!(args.names(), vec!["verb", "dogs", "cats"]);
        assert_eq!(args.count("dogs"), 2);
        assert_eq!(args.get("dogs"), Some("1"));
    }

    #[test]
    fn test_blank_argument_is_absent() {
        let args = Arguments::parse_form(b"verb=GetRecord&identifier=%20");
        assert!(!args.contains("identifier"));
        assert_eq!(args.count("identifier"), 1);
    }

    #[test]
    fn test_form_decoding() {
        let args = Arguments::parse_form(b"identifier=oai%3Ahost%3A2142%2F5&set=col_2142_1");
        assert_eq!(args.get("identifier"), Some("oai:host:2142/5"));
    }

    #[test]
    fn test_datestamp_day_granularity() {
        let d = Datestamp::parse("2020-03-04").unwrap();
        assert_eq!(d.granularity(), Granularity::Day);
        assert_eq!(format_datestamp(&d.lower_bound()), "2020-03-04T00:00:00Z");
        assert_eq!(format_datestamp(&d.upper_bound()), "2020-03-04T23:59:59Z");
        assert_eq!(d.to_string(), "2020-03-04");
    }

    #[test]
    fn test_datestamp_second_granularity() {
        let d = Datestamp::parse("2020-03-04T05:06:07Z").unwrap();
        assert_eq!(d.granularity(), Granularity::Second);
        assert_eq!(d.lower_bound(), d.upper_bound());
        assert_eq!(d.to_string(), "2020-03-04T05:06:07Z");
    }

    #[test]
    fn test_datestamp_rejects_garbage() {
        for bad in ["", "2020", "2020-13-01", "2020-03-04T05:06:07", "yesterday", "2020-03-04T05:06:07+01:00"] {
            assert!(Datestamp::parse(bad).is_none(), "accepted {:?}", bad);
        }
    }

    #[test]
    fn test_error_codes_render_camel_case() {
        assert_eq!(ProtocolError::illegal_verb().code.as_str(), "badVerb");
        assert_eq!(
            ProtocolError::no_records_match().to_string(),
            "noRecordsMatch: No matching records."
        );
    }
}
