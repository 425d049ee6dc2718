//! The request pipeline.
//!
//! [`Responder`] takes the decoded arguments of one request and the
//! institution it was addressed to, and produces a complete OAI-PMH
//! document:
//!
//! 1. validate arguments ([`ArgumentValidator`])
//! 2. dispatch on the verb, querying the [`Catalog`]
//! 3. assemble the XML ([`crate::assemble`])
//!
//! Protocol errors end up inside the document. Only infrastructure failures
//! surface as [`ResponderError`]. The responder holds no per-request state;
//! one instance is shared by every request task.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::{debug, warn};

use crate::assemble::{
    assemble_error, assemble_success, FormatDescriptor, ListPage, ResponseBody,
    ResumptionElement, SetEntry,
};
use crate::catalog::Catalog;
use crate::error::ResponderError;
use crate::formats::{MetadataFormat, MetadataFormatRegistry};
use crate::identifier::IdentifierCodec;
use crate::models::{HarvestRecord, InstitutionScope, Item};
use crate::protocol::{Arguments, ProtocolError, Verb};
use crate::query::{self, HarvestFilter};
use crate::resumption;
use crate::validate::{ArgumentValidator, Request};

/// A response body, or the protocol errors that replace it.
type Outcome = Result<ResponseBody, Vec<ProtocolError>>;

/// Answers OAI-PMH requests against a catalog.
pub struct Responder {
    catalog: Arc<dyn Catalog>,
    formats: Arc<MetadataFormatRegistry>,
    page_size: usize,
    timeout: Duration,
}

impl Responder {
    pub fn new(
        catalog: Arc<dyn Catalog>,
        formats: Arc<MetadataFormatRegistry>,
        page_size: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            catalog,
            formats,
            page_size,
            timeout,
        }
    }

    /// Answers one request, stamped with the current time.
    ///
    /// The whole pipeline runs under the configured timeout. Nothing is
    /// returned until the document is complete.
    pub async fn respond(
        &self,
        scope: &InstitutionScope,
        arguments: &Arguments,
    ) -> Result<String, ResponderError> {
        tokio::time::timeout(self.timeout, self.respond_at(scope, arguments, Utc::now()))
            .await
            .map_err(|_| {
                warn!(institution = %scope.key, "request exceeded {:?}", self.timeout);
                ResponderError::Timeout
            })?
    }

    /// Answers one request with an explicit `responseDate`.
    pub async fn respond_at(
        &self,
        scope: &InstitutionScope,
        arguments: &Arguments,
        response_date: DateTime<Utc>,
    ) -> Result<String, ResponderError> {
        let validator = ArgumentValidator::new(&self.formats, self.catalog.as_ref(), scope);
        let outcome = match validator.validate(arguments).await? {
            Ok(request) => self.dispatch(scope, &request).await?,
            Err(errors) => Err(errors),
        };

        match outcome {
            Ok(body) => assemble_success(scope, &body, arguments, &response_date),
            Err(errors) => {
                debug!(
                    institution = %scope.key,
                    errors = errors.len(),
                    first = %errors[0],
                    "protocol error"
                );
                assemble_error(scope, &errors, arguments, &response_date)
            }
        }
        .map_err(ResponderError::Render)
    }

    /// Renders an error document for requests rejected before validation,
    /// such as a POST with the wrong content type.
    pub fn reject(
        &self,
        scope: &InstitutionScope,
        errors: &[ProtocolError],
        arguments: &Arguments,
    ) -> Result<String, ResponderError> {
        assemble_error(scope, errors, arguments, &Utc::now()).map_err(ResponderError::Render)
    }

    async fn dispatch(
        &self,
        scope: &InstitutionScope,
        request: &Request,
    ) -> Result<Outcome, ResponderError> {
        debug!(institution = %scope.key, verb = %request.verb, "dispatch");
        match request.verb {
            Verb::Identify => self.identify(scope).await,
            Verb::GetRecord => self.get_record(scope, request),
            Verb::ListIdentifiers | Verb::ListRecords => self.list_records(scope, request).await,
            Verb::ListMetadataFormats => Ok(self.list_metadata_formats(request)),
            Verb::ListSets => self.list_sets(scope, request).await,
        }
    }

    // ============ Identify ============

    async fn identify(&self, scope: &InstitutionScope) -> Result<Outcome, ResponderError> {
        let earliest = self
            .catalog
            .earliest_datestamp(scope)
            .await
            .map_err(ResponderError::Catalog)?
            .unwrap_or_default();
        Ok(Ok(ResponseBody::Identify {
            earliest_datestamp: earliest,
        }))
    }

    // ============ GetRecord ============

    fn get_record(
        &self,
        scope: &InstitutionScope,
        request: &Request,
    ) -> Result<Outcome, ResponderError> {
        let (Some(item), Some(format)) = (
            request.item.as_ref(),
            request
                .metadata_prefix
                .as_deref()
                .and_then(|p| self.formats.lookup(p)),
        ) else {
            return Ok(Err(vec![ProtocolError::cannot_disseminate_format()]));
        };
        let codec = IdentifierCodec::for_scope(scope);
        let record = harvest_record(&codec, item, Some(format))?;
        Ok(Ok(ResponseBody::GetRecord(record)))
    }

    // ============ ListIdentifiers / ListRecords ============

    async fn list_records(
        &self,
        scope: &InstitutionScope,
        request: &Request,
    ) -> Result<Outcome, ResponderError> {
        let criteria = query::build(request, &self.formats, self.page_size);
        let page = self
            .catalog
            .harvest(scope, &criteria)
            .await
            .map_err(ResponderError::Catalog)?;

        if page.total == 0 {
            return Ok(Err(vec![ProtocolError::no_records_match()]));
        }
        if criteria.offset >= page.total {
            return Ok(Err(vec![ProtocolError::bad_resumption_token()]));
        }

        let format = match request.verb {
            Verb::ListRecords => criteria
                .filter
                .metadata_prefix
                .as_deref()
                .and_then(|p| self.formats.lookup(p)),
            _ => None,
        };
        let codec = IdentifierCodec::for_scope(scope);
        let records = page
            .items
            .iter()
            .map(|item| harvest_record(&codec, item, format))
            .collect::<Result<Vec<_>, _>>()?;

        let list = ListPage {
            resumption: self.resumption(
                &criteria.filter,
                criteria.offset,
                records.len(),
                page.total,
            ),
            entries: records,
        };
        Ok(Ok(match request.verb {
            Verb::ListRecords => ResponseBody::ListRecords(list),
            _ => ResponseBody::ListIdentifiers(list),
        }))
    }

    // ============ ListMetadataFormats ============

    fn list_metadata_formats(&self, request: &Request) -> Outcome {
        let formats = self.formats.formats_for(request.item.as_ref());
        if formats.is_empty() {
            return Err(vec![ProtocolError::no_metadata_formats()]);
        }
        Ok(ResponseBody::ListMetadataFormats(
            formats
                .into_iter()
                .map(|f| FormatDescriptor {
                    prefix: f.prefix().to_string(),
                    schema: f.schema().to_string(),
                    namespace: f.namespace().to_string(),
                })
                .collect(),
        ))
    }

    // ============ ListSets ============

    async fn list_sets(
        &self,
        scope: &InstitutionScope,
        request: &Request,
    ) -> Result<Outcome, ResponderError> {
        let collections = self
            .catalog
            .collections(scope)
            .await
            .map_err(ResponderError::Catalog)?;
        if collections.is_empty() {
            return Ok(Err(vec![ProtocolError::no_set_hierarchy()]));
        }

        let offset = query::offset_for(request);
        if offset >= collections.len() {
            return Ok(Err(vec![ProtocolError::bad_resumption_token()]));
        }

        let entries: Vec<SetEntry> = collections
            .iter()
            .skip(offset)
            .take(self.page_size)
            .map(|c| SetEntry {
                spec: c.handle.set_spec(),
                name: c.title.clone(),
                description: c.description.clone(),
            })
            .collect();

        Ok(Ok(ResponseBody::ListSets(ListPage {
            resumption: self.resumption(
                &HarvestFilter::default(),
                offset,
                entries.len(),
                collections.len(),
            ),
            entries,
        })))
    }

    /// The `<resumptionToken>` for a page starting at `offset` with `shown`
    /// entries out of `total`.
    ///
    /// Incomplete lists get a token for the next page. The last page of a
    /// list that was split gets an empty element; unsplit lists get none.
    fn resumption(
        &self,
        filter: &HarvestFilter,
        offset: usize,
        shown: usize,
        total: usize,
    ) -> Option<ResumptionElement> {
        if offset + shown < total {
            Some(ResumptionElement {
                token: Some(resumption::encode(filter, offset + self.page_size)),
                complete_list_size: total,
                cursor: offset,
            })
        } else if offset > 0 {
            Some(ResumptionElement {
                token: None,
                complete_list_size: total,
                cursor: offset,
            })
        } else {
            None
        }
    }
}

/// Header plus, when `format` is given, rendered metadata. Withdrawn items
/// never carry metadata.
fn harvest_record(
    codec: &IdentifierCodec,
    item: &Item,
    format: Option<&dyn MetadataFormat>,
) -> Result<HarvestRecord, ResponderError> {
    let metadata = match format {
        Some(format) if !item.withdrawn => {
            Some(format.render(item).map_err(ResponderError::Render)?)
        }
        _ => None,
    };
    Ok(HarvestRecord {
        identifier: codec.encode(&item.handle),
        datestamp: item.updated_at,
        set_specs: item.set_specs(),
        deleted: item.withdrawn,
        metadata,
    })
}
