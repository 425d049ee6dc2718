//! Request validation.
//!
//! Validation runs in three phases. Within a phase every check runs and all
//! failures are collected; a failing phase ends validation.
//!
//! ```text
//! Received ─▶ verb ─▶ shape ─▶ values ─▶ Request
//!              │        │        │
//!              ▼        ▼        ▼
//!           [badVerb] [badArgument…] [cannotDisseminateFormat, idDoesNotExist, …]
//! ```
//!
//! - **verb**: `verb` missing or not one of the six verbs. Always a single
//!   error.
//! - **shape**: argument names against the verb's table. A resumption token
//!   must stand alone; otherwise unknown, repeated and missing arguments are
//!   all reported together.
//! - **values**: metadata prefix, identifier, resumption token and date
//!   window are checked independently.

use crate::catalog::Catalog;
use crate::error::ResponderError;
use crate::formats::MetadataFormatRegistry;
use crate::identifier::IdentifierCodec;
use crate::models::{InstitutionScope, Item};
use crate::protocol::{
    Arguments, Datestamp, ProtocolError, Verb, FROM, IDENTIFIER, METADATA_PREFIX,
    RESUMPTION_TOKEN, SET, UNTIL, VERB,
};
use crate::resumption::ResumptionToken;

/// A request that passed validation, with its argument values resolved.
#[derive(Debug, Clone)]
pub struct Request {
    pub verb: Verb,
    /// The arguments as received, in order.
    pub arguments: Arguments,
    /// The item named by `identifier`.
    pub item: Option<Item>,
    pub metadata_prefix: Option<String>,
    pub from: Option<Datestamp>,
    pub until: Option<Datestamp>,
    pub set: Option<String>,
    pub resumption: Option<ResumptionToken>,
}

/// Outcome of validation: a request, or every protocol error found.
pub type Validation = Result<Request, Vec<ProtocolError>>;

/// Validates request arguments for one institution.
pub struct ArgumentValidator<'a> {
    formats: &'a MetadataFormatRegistry,
    catalog: &'a dyn Catalog,
    scope: &'a InstitutionScope,
}

impl<'a> ArgumentValidator<'a> {
    pub fn new(
        formats: &'a MetadataFormatRegistry,
        catalog: &'a dyn Catalog,
        scope: &'a InstitutionScope,
    ) -> Self {
        Self {
            formats,
            catalog,
            scope,
        }
    }

    /// Runs all phases.
    ///
    /// The outer `Result` carries catalog failures during identifier
    /// resolution; protocol errors are in the inner [`Validation`].
    pub async fn validate(&self, arguments: &Arguments) -> Result<Validation, ResponderError> {
        let verb = match check_verb(arguments) {
            Ok(verb) => verb,
            Err(error) => return Ok(Err(vec![error])),
        };

        let shape_errors = check_shape(verb, arguments);
        if !shape_errors.is_empty() {
            return Ok(Err(shape_errors));
        }

        self.check_values(verb, arguments).await
    }

    async fn check_values(
        &self,
        verb: Verb,
        arguments: &Arguments,
    ) -> Result<Validation, ResponderError> {
        let mut errors = Vec::new();
        let mut request = Request {
            verb,
            arguments: arguments.clone(),
            item: None,
            metadata_prefix: None,
            from: None,
            until: None,
            set: arguments.get(SET).map(String::from),
            resumption: None,
        };

        if let Some(token) = arguments.get(RESUMPTION_TOKEN) {
            match self.check_resumption_token(verb, token) {
                Ok(decoded) => request.resumption = Some(decoded),
                Err(error) => errors.push(error),
            }
        }

        let mut format_known = false;
        if let Some(prefix) = arguments.get(METADATA_PREFIX) {
            if self.formats.lookup(prefix).is_some() {
                format_known = true;
                request.metadata_prefix = Some(prefix.to_string());
            } else {
                errors.push(ProtocolError::cannot_disseminate_format());
            }
        }

        if let Some(identifier) = arguments.get(IDENTIFIER) {
            let codec = IdentifierCodec::for_scope(self.scope);
            let item = codec
                .resolve(identifier, self.catalog, self.scope)
                .await
                .map_err(ResponderError::Catalog)?;
            match item {
                Some(item) => request.item = Some(item),
                None => errors.push(ProtocolError::id_does_not_exist()),
            }
        }

        match check_window(arguments) {
            Ok((from, until)) => {
                request.from = from;
                request.until = until;
            }
            Err(window_errors) => errors.extend(window_errors),
        }

        if verb == Verb::GetRecord && format_known {
            if let (Some(item), Some(prefix)) = (&request.item, &request.metadata_prefix) {
                let available = self
                    .formats
                    .lookup(prefix)
                    .map_or(false, |format| format.available(item));
                if !available {
                    errors.push(ProtocolError::cannot_disseminate_format());
                }
            }
        }

        if errors.is_empty() {
            Ok(Ok(request))
        } else {
            Ok(Err(errors))
        }
    }

    /// Decodes a token and checks it belongs to the verb's family: harvest
    /// tokens carry a registered metadata prefix, `ListSets` tokens carry
    /// none.
    fn check_resumption_token(&self, verb: Verb, token: &str) -> Result<ResumptionToken, ProtocolError> {
        let decoded = ResumptionToken::decode(token)?;
        let prefix = decoded.filter.metadata_prefix.as_deref();
        let fits = match verb {
            Verb::ListSets => prefix.is_none(),
            _ => prefix.map_or(false, |p| self.formats.lookup(p).is_some()),
        };
        if fits {
            Ok(decoded)
        } else {
            Err(ProtocolError::bad_resumption_token())
        }
    }
}

/// Phase 0: exactly one known verb.
pub fn check_verb(arguments: &Arguments) -> Result<Verb, ProtocolError> {
    let value = arguments.get(VERB).ok_or_else(ProtocolError::missing_verb)?;
    if arguments.count(VERB) > 1 {
        return Err(ProtocolError::illegal_verb());
    }
    Verb::parse(value).ok_or_else(ProtocolError::illegal_verb)
}

/// Phase 1: argument names against the verb's table.
pub fn check_shape(verb: Verb, arguments: &Arguments) -> Vec<ProtocolError> {
    let names = arguments.names();

    if verb.accepts_resumption_token() && arguments.contains(RESUMPTION_TOKEN) {
        let exclusive = names
            .iter()
            .all(|name| *name == VERB || *name == RESUMPTION_TOKEN);
        if !exclusive {
            return vec![ProtocolError::exclusive_resumption_token()];
        }
        if arguments.count(RESUMPTION_TOKEN) > 1 {
            return vec![ProtocolError::repeated_argument(RESUMPTION_TOKEN)];
        }
        return Vec::new();
    }

    let mut errors: Vec<ProtocolError> = names
        .iter()
        .filter(|name| !verb.accepts(name))
        .map(|name| ProtocolError::illegal_argument(name))
        .collect();

    errors.extend(
        names
            .iter()
            .filter(|name| **name != VERB && verb.accepts(name) && arguments.count(name) > 1)
            .map(|name| ProtocolError::repeated_argument(name)),
    );

    errors.extend(
        verb.required_arguments()
            .iter()
            .filter(|name| !arguments.contains(name))
            .map(|name| ProtocolError::missing_argument(name)),
    );

    errors
}

/// The `from`/`until` window: both parse, share a granularity, and are
/// ordered.
fn check_window(
    arguments: &Arguments,
) -> Result<(Option<Datestamp>, Option<Datestamp>), Vec<ProtocolError>> {
    let mut errors = Vec::new();
    let mut parse = |name: &str| -> Option<Datestamp> {
        let value = arguments.get(name)?;
        let parsed = Datestamp::parse(value);
        if parsed.is_none() {
            errors.push(ProtocolError::illegal_datestamp(name));
        }
        parsed
    };
    let from = parse(FROM);
    let until = parse(UNTIL);

    if let (Some(from), Some(until)) = (from, until) {
        if from.granularity() != until.granularity() {
            errors.push(ProtocolError::mixed_granularity());
        } else if from.lower_bound() > until.lower_bound() {
            errors.push(ProtocolError::inverted_date_range());
        }
    }

    if errors.is_empty() {
        Ok((from, until))
    } else {
        Err(errors)
    }
}
