//! OAI-PMH response documents.
//!
//! Every response, success or error, is wrapped in the same envelope:
//!
//! ```xml
//! <?xml version="1.0" encoding="UTF-8"?>
//! <OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/" ...>
//!   <responseDate>2024-05-01T12:00:00Z</responseDate>
//!   <request verb="ListRecords" metadataPrefix="oai_dc">https://…/oai-pmh</request>
//!   <ListRecords>…</ListRecords>        <!-- or one or more <error> -->
//! </OAI-PMH>
//! ```
//!
//! Documents are built entirely in memory and returned as a `String`.

use anyhow::Result;
use chrono::{DateTime, Utc};

use crate::identifier::IdentifierCodec;
use crate::models::{HarvestRecord, InstitutionScope};
use crate::protocol::{
    format_datestamp, Arguments, ErrorCode, ProtocolError, Verb, DELETED_RECORD, GRANULARITY,
    OAI_NAMESPACE, OAI_SCHEMA_LOCATION, PROTOCOL_VERSION, XSI_NAMESPACE,
};
use crate::xml::XmlWriter;

const OAI_IDENTIFIER_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai-identifier";
const OAI_IDENTIFIER_SCHEMA_LOCATION: &str = "http://www.openarchives.org/OAI/2.0/oai-identifier \
     http://www.openarchives.org/OAI/2.0/oai-identifier.xsd";
const OAI_DC_NAMESPACE: &str = "http://www.openarchives.org/OAI/2.0/oai_dc/";
const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const OAI_DC_SCHEMA_LOCATION: &str =
    "http://www.openarchives.org/OAI/2.0/oai_dc/ http://www.openarchives.org/OAI/2.0/oai_dc.xsd";

/// The `<resumptionToken>` element closing a partial list.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResumptionElement {
    /// `None` renders an empty element: the list is complete.
    pub token: Option<String>,
    pub complete_list_size: usize,
    pub cursor: usize,
}

/// One page of a list response.
#[derive(Debug, Clone, PartialEq)]
pub struct ListPage<T> {
    pub entries: Vec<T>,
    pub resumption: Option<ResumptionElement>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SetEntry {
    pub spec: String,
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FormatDescriptor {
    pub prefix: String,
    pub schema: String,
    pub namespace: String,
}

/// Verb-specific content of a successful response.
#[derive(Debug, Clone, PartialEq)]
pub enum ResponseBody {
    Identify { earliest_datestamp: DateTime<Utc> },
    GetRecord(HarvestRecord),
    ListIdentifiers(ListPage<HarvestRecord>),
    ListRecords(ListPage<HarvestRecord>),
    ListMetadataFormats(Vec<FormatDescriptor>),
    ListSets(ListPage<SetEntry>),
}

impl ResponseBody {
    pub fn verb(&self) -> Verb {
        match self {
            ResponseBody::Identify { .. } => Verb::Identify,
            ResponseBody::GetRecord(_) => Verb::GetRecord,
            ResponseBody::ListIdentifiers(_) => Verb::ListIdentifiers,
            ResponseBody::ListRecords(_) => Verb::ListRecords,
            ResponseBody::ListMetadataFormats(_) => Verb::ListMetadataFormats,
            ResponseBody::ListSets(_) => Verb::ListSets,
        }
    }
}

/// Renders an error response carrying every error in `errors`.
///
/// The `<request>` element echoes the arguments unless a `badVerb` or
/// `badArgument` error is among them.
pub fn assemble_error(
    scope: &InstitutionScope,
    errors: &[ProtocolError],
    arguments: &Arguments,
    response_date: &DateTime<Utc>,
) -> Result<String> {
    let echo = !errors
        .iter()
        .any(|e| matches!(e.code, ErrorCode::BadVerb | ErrorCode::BadArgument));

    let mut w = XmlWriter::new();
    open_envelope(&mut w, scope, echo.then_some(arguments), response_date)?;
    for error in errors {
        w.element("error", &[("code", error.code.as_str())], &error.message)?;
    }
    close_envelope(w)
}

/// Renders a successful response.
pub fn assemble_success(
    scope: &InstitutionScope,
    body: &ResponseBody,
    arguments: &Arguments,
    response_date: &DateTime<Utc>,
) -> Result<String> {
    let mut w = XmlWriter::new();
    open_envelope(&mut w, scope, Some(arguments), response_date)?;

    let verb = body.verb().as_str();
    w.start(verb, &[])?;
    match body {
        ResponseBody::Identify { earliest_datestamp } => {
            write_identify(&mut w, scope, earliest_datestamp)?
        }
        ResponseBody::GetRecord(record) => write_record(&mut w, record)?,
        ResponseBody::ListIdentifiers(page) => {
            for record in &page.entries {
                write_header(&mut w, record)?;
            }
            write_resumption(&mut w, page.resumption.as_ref())?;
        }
        ResponseBody::ListRecords(page) => {
            for record in &page.entries {
                write_record(&mut w, record)?;
            }
            write_resumption(&mut w, page.resumption.as_ref())?;
        }
        ResponseBody::ListMetadataFormats(formats) => {
            for format in formats {
                w.start("metadataFormat", &[])?;
                w.element("metadataPrefix", &[], &format.prefix)?;
                w.element("schema", &[], &format.schema)?;
                w.element("metadataNamespace", &[], &format.namespace)?;
                w.end("metadataFormat")?;
            }
        }
        ResponseBody::ListSets(page) => {
            for set in &page.entries {
                write_set(&mut w, set)?;
            }
            write_resumption(&mut w, page.resumption.as_ref())?;
        }
    }
    w.end(verb)?;

    close_envelope(w)
}

// ============ Envelope ============

fn open_envelope(
    w: &mut XmlWriter,
    scope: &InstitutionScope,
    arguments: Option<&Arguments>,
    response_date: &DateTime<Utc>,
) -> Result<()> {
    w.declaration()?;
    w.start(
        "OAI-PMH",
        &[
            ("xmlns", OAI_NAMESPACE),
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xsi:schemaLocation", OAI_SCHEMA_LOCATION),
        ],
    )?;
    w.element("responseDate", &[], &format_datestamp(response_date))?;

    let attrs = arguments.map(request_attributes).unwrap_or_default();
    w.element("request", &attrs, &scope.base_url)
}

fn close_envelope(mut w: XmlWriter) -> Result<String> {
    w.end("OAI-PMH")?;
    w.finish()
}

/// First non-blank value of each argument, in received order.
fn request_attributes(arguments: &Arguments) -> Vec<(&str, &str)> {
    arguments
        .names()
        .into_iter()
        .filter_map(|name| arguments.get(name).map(|value| (name, value)))
        .collect()
}

// ============ Verb bodies ============

fn write_identify(
    w: &mut XmlWriter,
    scope: &InstitutionScope,
    earliest_datestamp: &DateTime<Utc>,
) -> Result<()> {
    w.element("repositoryName", &[], &scope.repository_name)?;
    w.element("baseURL", &[], &scope.base_url)?;
    w.element("protocolVersion", &[], PROTOCOL_VERSION)?;
    w.element("adminEmail", &[], &scope.admin_email)?;
    w.element("earliestDatestamp", &[], &format_datestamp(earliest_datestamp))?;
    w.element("deletedRecord", &[], DELETED_RECORD)?;
    w.element("granularity", &[], GRANULARITY)?;

    let codec = IdentifierCodec::for_scope(scope);
    w.start("description", &[])?;
    w.start(
        "oai-identifier",
        &[
            ("xmlns", OAI_IDENTIFIER_NAMESPACE),
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xsi:schemaLocation", OAI_IDENTIFIER_SCHEMA_LOCATION),
        ],
    )?;
    w.element("scheme", &[], "oai")?;
    w.element("repositoryIdentifier", &[], &scope.fqdn)?;
    w.element("delimiter", &[], ":")?;
    w.element("sampleIdentifier", &[], &codec.sample())?;
    w.end("oai-identifier")?;
    w.end("description")
}

fn write_header(w: &mut XmlWriter, record: &HarvestRecord) -> Result<()> {
    if record.deleted {
        w.start("header", &[("status", "deleted")])?;
    } else {
        w.start("header", &[])?;
    }
    w.element("identifier", &[], &record.identifier)?;
    w.element("datestamp", &[], &format_datestamp(&record.datestamp))?;
    for spec in &record.set_specs {
        w.element("setSpec", &[], spec)?;
    }
    w.end("header")
}

fn write_record(w: &mut XmlWriter, record: &HarvestRecord) -> Result<()> {
    w.start("record", &[])?;
    write_header(w, record)?;
    if let (false, Some(metadata)) = (record.deleted, &record.metadata) {
        w.start("metadata", &[])?;
        w.raw(metadata)?;
        w.end("metadata")?;
    }
    w.end("record")
}

fn write_set(w: &mut XmlWriter, set: &SetEntry) -> Result<()> {
    w.start("set", &[])?;
    w.element("setSpec", &[], &set.spec)?;
    w.element("setName", &[], &set.name)?;
    if let Some(description) = &set.description {
        w.start("setDescription", &[])?;
        w.start(
            "oai_dc:dc",
            &[
                ("xmlns:oai_dc", OAI_DC_NAMESPACE),
                ("xmlns:dc", DC_NAMESPACE),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", OAI_DC_SCHEMA_LOCATION),
            ],
        )?;
        w.element("dc:description", &[], description)?;
        w.end("oai_dc:dc")?;
        w.end("setDescription")?;
    }
    w.end("set")
}

fn write_resumption(w: &mut XmlWriter, resumption: Option<&ResumptionElement>) -> Result<()> {
    let Some(resumption) = resumption else {
        return Ok(());
    };
    let size = resumption.complete_list_size.to_string();
    let cursor = resumption.cursor.to_string();
    let attrs = [("completeListSize", size.as_str()), ("cursor", cursor.as_str())];
    match &resumption.token {
        Some(token) => w.element("resumptionToken", &attrs, token),
        None => w.empty("resumptionToken", &attrs),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;

    fn scope() -> InstitutionScope {
        InstitutionScope {
            key: "demo".to_string(),
            fqdn: "demo.example.edu".to_string(),
            repository_name: "Demo Repository".to_string(),
            base_url: "https://demo.example.edu/oai-pmh".to_string(),
            admin_email: "admin@example.edu".to_string(),
        }
    }

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 5, 1, 12, 0, 0).unwrap()
    }

    fn record(deleted: bool) -> HarvestRecord {
        HarvestRecord {
            identifier: "oai:demo.example.edu:2142/5".to_string(),
            datestamp: Utc.with_ymd_and_hms(2023, 3, 4, 5, 6, 7).unwrap(),
            set_specs: vec!["col_2142_1".to_string()],
            deleted,
            metadata: Some("<dc>x</dc>".to_string()),
        }
    }

    #[test]
    fn test_error_envelope_omits_request_attributes_for_bad_argument() {
        let args = Arguments::parse_form(b"verb=Identify&cats=1");
        let xml = assemble_error(
            &scope(),
            &[ProtocolError::illegal_argument("cats")],
            &args,
            &now(),
        )
        .unwrap();

        assert!(xml.starts_with("<?xml version=\"1.0\" encoding=\"UTF-8\"?>"));
        assert!(xml.contains("<responseDate>2024-05-01T12:00:00Z</responseDate>"));
        assert!(xml.contains("<request>https://demo.example.edu/oai-pmh</request>"));
        assert!(xml.contains("<error code=\"badArgument\">Illegal argument: cats</error>"));
    }

    #[test]
    fn test_error_envelope_echoes_arguments_for_other_codes() {
        let args = Arguments::parse_form(b"verb=GetRecord&identifier=x&metadataPrefix=oai_dc");
        let xml = assemble_error(&scope(), &[ProtocolError::id_does_not_exist()], &args, &now())
            .unwrap();
        assert!(xml.contains(
            "<request verb=\"GetRecord\" identifier=\"x\" metadataPrefix=\"oai_dc\">"
        ));
        assert!(xml.contains("<error code=\"idDoesNotExist\">"));
    }

    #[test]
    fn test_multiple_errors_in_order() {
        let args = Arguments::parse_form(b"verb=GetRecord");
        let xml = assemble_error(
            &scope(),
            &[
                ProtocolError::missing_argument("identifier"),
                ProtocolError::missing_argument("metadataPrefix"),
            ],
            &args,
            &now(),
        )
        .unwrap();
        let first = xml.find("Missing identifier argument.").unwrap();
        let second = xml.find("Missing metadataPrefix argument.").unwrap();
        assert!(first < second);
    }

    #[test]
    fn test_identify_body() {
        let args = Arguments::parse_form(b"verb=Identify");
        let body = ResponseBody::Identify {
            earliest_datestamp: Utc.with_ymd_and_hms(2009, 1, 2, 3, 4, 5).unwrap(),
        };
        let xml = assemble_success(&scope(), &body, &args, &now()).unwrap();

        for expected in [
            "<request verb=\"Identify\">",
            "<repositoryName>Demo Repository</repositoryName>",
            "<baseURL>https://demo.example.edu/oai-pmh</baseURL>",
            "<protocolVersion>2.0</protocolVersion>",
            "<adminEmail>admin@example.edu</adminEmail>",
            "<earliestDatestamp>2009-01-02T03:04:05Z</earliestDatestamp>",
            "<deletedRecord>persistent</deletedRecord>",
            "<granularity>YYYY-MM-DDThh:mm:ssZ</granularity>",
            "<repositoryIdentifier>demo.example.edu</repositoryIdentifier>",
            "<sampleIdentifier>oai:demo.example.edu:123456789/1</sampleIdentifier>",
        ] {
            assert!(xml.contains(expected), "missing {} in\n{}", expected, xml);
        }
    }

    #[test]
    fn test_deleted_record_has_no_metadata() {
        let args = Arguments::parse_form(b"verb=GetRecord");
        let xml =
            assemble_success(&scope(), &ResponseBody::GetRecord(record(true)), &args, &now())
                .unwrap();
        assert!(xml.contains("<header status=\"deleted\">"));
        assert!(!xml.contains("<metadata>"));

        let xml =
            assemble_success(&scope(), &ResponseBody::GetRecord(record(false)), &args, &now())
                .unwrap();
        assert!(xml.contains("<metadata><dc>x</dc></metadata>"));
        assert!(xml.contains("<setSpec>col_2142_1</setSpec>"));
        assert!(xml.contains("<datestamp>2023-03-04T05:06:07Z</datestamp>"));
    }

    #[test]
    fn test_resumption_token_rendering() {
        let args = Arguments::parse_form(b"verb=ListIdentifiers&metadataPrefix=oai_dc");
        let page = ListPage {
            entries: vec![record(false)],
            resumption: Some(ResumptionElement {
                token: Some("abc".to_string()),
                complete_list_size: 3,
                cursor: 0,
            }),
        };
        let xml = assemble_success(&scope(), &ResponseBody::ListIdentifiers(page), &args, &now())
            .unwrap();
        assert!(xml.contains(
            "<resumptionToken completeListSize=\"3\" cursor=\"0\">abc</resumptionToken>"
        ));
        assert!(!xml.contains("<record>"));

        let closing = ListPage {
            entries: vec![record(false)],
            resumption: Some(ResumptionElement {
                token: None,
                complete_list_size: 3,
                cursor: 2,
            }),
        };
        let xml = assemble_success(&scope(), &ResponseBody::ListRecords(closing), &args, &now())
            .unwrap();
        assert!(xml.contains("<resumptionToken completeListSize=\"3\" cursor=\"2\"/>"));
    }

    #[test]
    fn test_list_sets_and_formats() {
        let args = Arguments::parse_form(b"verb=ListSets");
        let page = ListPage {
            entries: vec![SetEntry {
                spec: "col_2142_1".to_string(),
                name: "Theses & Dissertations".to_string(),
                description: Some("Graduate work".to_string()),
            }],
            resumption: None,
        };
        let xml = assemble_success(&scope(), &ResponseBody::ListSets(page), &args, &now()).unwrap();
        assert!(xml.contains("<setName>Theses &amp; Dissertations</setName>"));
        assert!(xml.contains("<dc:description>Graduate work</dc:description>"));
        assert!(!xml.contains("resumptionToken"));

        let args = Arguments::parse_form(b"verb=ListMetadataFormats");
        let formats = vec![FormatDescriptor {
            prefix: "oai_dc".to_string(),
            schema: "http://www.openarchives.org/OAI/2.0/oai_dc.xsd".to_string(),
            namespace: "http://www.openarchives.org/OAI/2.0/oai_dc/".to_string(),
        }];
        let xml = assemble_success(
            &scope(),
            &ResponseBody::ListMetadataFormats(formats),
            &args,
            &now(),
        )
        .unwrap();
        assert_eq!(xml.matches("<metadataFormat>").count(), 1);
        assert!(xml.contains("<metadataPrefix>oai_dc</metadataPrefix>"));
    }
}
