//! Metadata formats and crosswalks.
//!
//! Each format implements [`MetadataFormat`]: a descriptor (prefix, schema,
//! namespace), an availability check, and a renderer that turns an item's
//! qualified metadata into an XML fragment. Formats live in a
//! [`MetadataFormatRegistry`] built once at startup and shared read-only.
//!
//! # Built-in formats
//!
//! | Prefix | Crosswalk | Available for |
//! |--------|-----------|---------------|
//! | `oai_dc` | qualified elements folded into the 15 simple DC elements | every item |
//! | `qdc` | `dc:*` and `dcterms:*` elements as stored | every item |
//! | `native` | every stored element, unmapped | every item |
//! | `etdms` | ETD-MS 1.0 with degree information | theses and dissertations |

use anyhow::Result;

use crate::models::Item;
use crate::protocol::XSI_NAMESPACE;
use crate::xml::XmlWriter;

const DC_NAMESPACE: &str = "http://purl.org/dc/elements/1.1/";
const DCTERMS_NAMESPACE: &str = "http://purl.org/dc/terms/";

/// The fifteen simple Dublin Core elements.
const DC_ELEMENTS: [&str; 15] = [
    "title",
    "creator",
    "subject",
    "description",
    "publisher",
    "contributor",
    "date",
    "type",
    "format",
    "identifier",
    "source",
    "language",
    "relation",
    "coverage",
    "rights",
];

/// A metadata format the repository can disseminate.
///
/// # Example
///
/// ```rust
/// use anyhow::Result;
/// use oai_responder::formats::{MetadataFormat, MetadataFormatRegistry};
/// use oai_responder::models::Item;
///
/// struct TitlesOnly;
///
/// impl MetadataFormat for TitlesOnly {
///     fn prefix(&self) -> &str { "titles" }
///     fn schema(&self) -> &str { "https://example.org/titles.xsd" }
///     fn namespace(&self) -> &str { "https://example.org/titles" }
///
///     fn render(&self, item: &Item) -> Result<String> {
///         Ok(item.values("dc:title").collect::<Vec<_>>().join("\n"))
///     }
/// }
///
/// let mut formats = MetadataFormatRegistry::with_builtins();
/// formats.register(Box::new(TitlesOnly));
/// assert!(formats.lookup("titles").is_some());
/// ```
pub trait MetadataFormat: Send + Sync {
    /// The `metadataPrefix` harvesters use to request this format.
    fn prefix(&self) -> &str;

    /// URL of the XML schema the rendered fragment validates against.
    fn schema(&self) -> &str;

    /// Namespace of the fragment's root element.
    fn namespace(&self) -> &str;

    /// Item types this format is limited to. `None` means every item.
    ///
    /// The restriction is also forwarded to the catalog so list requests only
    /// count items the format can describe.
    fn item_types(&self) -> Option<&'static [&'static str]> {
        None
    }

    /// Whether `item` can be disseminated in this format.
    fn available(&self, item: &Item) -> bool {
        self.item_types().map_or(true, |types| item.has_type(types))
    }

    /// Renders the `<metadata>` payload for `item`.
    fn render(&self, item: &Item) -> Result<String>;
}

// ============ oai_dc ============

/// Simple Dublin Core, mandatory for every OAI-PMH repository.
pub struct OaiDc;

impl OaiDc {
    /// Simple DC element a stored element folds into, if any.
    fn crosswalk(name: &str) -> Option<&'static str> {
        let (namespace, local) = name.split_once(':')?;
        let local = local.split('.').next().unwrap_or(local);
        if namespace != "dc" && namespace != "dcterms" {
            return None;
        }
        if let Some(simple) = DC_ELEMENTS.iter().copied().find(|e| *e == local) {
            return Some(simple);
        }
        if namespace != "dcterms" {
            return None;
        }
        let simple = match local {
            "alternative" => "title",
            "abstract" | "tableOfContents" => "description",
            "issued" | "created" | "available" | "modified" | "dateSubmitted"
            | "dateAccepted" | "dateCopyrighted" | "valid" => "date",
            "extent" | "medium" => "format",
            "bibliographicCitation" => "identifier",
            "isPartOf" | "hasPart" | "isVersionOf" | "hasVersion" | "isFormatOf"
            | "hasFormat" | "references" | "isReferencedBy" | "replaces" | "isReplacedBy"
            | "requires" | "isRequiredBy" | "conformsTo" => "relation",
            "spatial" | "temporal" => "coverage",
            "license" | "accessRights" => "rights",
            _ => return None,
        };
        Some(simple)
    }
}

impl MetadataFormat for OaiDc {
    fn prefix(&self) -> &str {
        "oai_dc"
    }

    fn schema(&self) -> &str {
        "http://www.openarchives.org/OAI/2.0/oai_dc.xsd"
    }

    fn namespace(&self) -> &str {
        "http://www.openarchives.org/OAI/2.0/oai_dc/"
    }

    fn render(&self, item: &Item) -> Result<String> {
        let location = format!("{} {}", self.namespace(), self.schema());
        let mut w = XmlWriter::new();
        w.start(
            "oai_dc:dc",
            &[
                ("xmlns:oai_dc", self.namespace()),
                ("xmlns:dc", DC_NAMESPACE),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", location.as_str()),
            ],
        )?;
        for element in &item.elements {
            if let Some(simple) = Self::crosswalk(&element.name) {
                w.element(&format!("dc:{}", simple), &[], &element.value)?;
            }
        }
        w.element("dc:identifier", &[], &item.handle.url())?;
        w.end("oai_dc:dc")?;
        w.finish()
    }
}

// ============ qdc ============

/// Qualified Dublin Core: `dc:` and `dcterms:` elements as stored.
pub struct QualifiedDc;

impl MetadataFormat for QualifiedDc {
    fn prefix(&self) -> &str {
        "qdc"
    }

    fn schema(&self) -> &str {
        "http://dublincore.org/schemas/xmls/qdc/2008/02/11/qualifieddc.xsd"
    }

    fn namespace(&self) -> &str {
        "http://dspace.org/qualifieddc/"
    }

    fn render(&self, item: &Item) -> Result<String> {
        let location = format!("{} {}", self.namespace(), self.schema());
        let mut w = XmlWriter::new();
        w.start(
            "qdc:qualifieddc",
            &[
                ("xmlns:qdc", self.namespace()),
                ("xmlns:dc", DC_NAMESPACE),
                ("xmlns:dcterms", DCTERMS_NAMESPACE),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", location.as_str()),
            ],
        )?;
        for element in &item.elements {
            let qualified = element.name.starts_with("dc:") || element.name.starts_with("dcterms:");
            if qualified && !element.name.contains('.') {
                w.element(&element.name, &[], &element.value)?;
            }
        }
        w.element("dcterms:identifier", &[], &item.handle.url())?;
        w.end("qdc:qualifieddc")?;
        w.finish()
    }
}

// ============ native ============

/// Every stored element without any mapping.
pub struct Native;

impl MetadataFormat for Native {
    fn prefix(&self) -> &str {
        "native"
    }

    fn schema(&self) -> &str {
        "https://schemas.oai-responder.dev/native/1.0/native.xsd"
    }

    fn namespace(&self) -> &str {
        "https://schemas.oai-responder.dev/native/1.0/"
    }

    fn render(&self, item: &Item) -> Result<String> {
        let location = format!("{} {}", self.namespace(), self.schema());
        let handle = item.handle.to_string();
        let mut attrs = vec![
            ("xmlns:native", self.namespace()),
            ("xmlns:xsi", XSI_NAMESPACE),
            ("xsi:schemaLocation", location.as_str()),
            ("handle", handle.as_str()),
        ];
        if let Some(item_type) = item.item_type.as_deref() {
            attrs.push(("type", item_type));
        }

        let mut w = XmlWriter::new();
        w.start("native:item", &attrs)?;
        for element in &item.elements {
            w.element("native:element", &[("name", element.name.as_str())], &element.value)?;
        }
        w.end("native:item")?;
        w.finish()
    }
}

// ============ etdms ============

/// ETD-MS 1.0, for electronic theses and dissertations.
pub struct Etdms;

/// Item types ETD-MS describes.
const THESIS_TYPES: &[&str] = &["Thesis", "Dissertation"];

impl Etdms {
    fn write_all(w: &mut XmlWriter, tag: &str, item: &Item, sources: &[&str]) -> Result<()> {
        for source in sources {
            for value in item.values(source) {
                w.element(tag, &[], value)?;
            }
        }
        Ok(())
    }
}

impl MetadataFormat for Etdms {
    fn prefix(&self) -> &str {
        "etdms"
    }

    fn schema(&self) -> &str {
        "http://www.ndltd.org/standards/metadata/etdms/1.0/etdms.xsd"
    }

    fn namespace(&self) -> &str {
        "http://www.ndltd.org/standards/metadata/etdms/1.0/"
    }

    fn item_types(&self) -> Option<&'static [&'static str]> {
        Some(THESIS_TYPES)
    }

    fn render(&self, item: &Item) -> Result<String> {
        let location = format!("{} {}", self.namespace(), self.schema());
        let mut w = XmlWriter::new();
        w.start(
            "thesis",
            &[
                ("xmlns", self.namespace()),
                ("xmlns:xsi", XSI_NAMESPACE),
                ("xsi:schemaLocation", location.as_str()),
            ],
        )?;

        // ETD-MS is a sequence; element order matters.
        Self::write_all(&mut w, "title", item, &["dc:title"])?;
        Self::write_all(&mut w, "alternativeTitle", item, &["dcterms:alternative"])?;
        Self::write_all(&mut w, "creator", item, &["dc:creator"])?;
        Self::write_all(&mut w, "subject", item, &["dc:subject"])?;
        Self::write_all(&mut w, "description", item, &["dcterms:abstract", "dc:description"])?;
        Self::write_all(&mut w, "publisher", item, &["dc:publisher"])?;
        Self::write_all(&mut w, "contributor", item, &["dc:contributor"])?;
        let date = ["dcterms:issued", "dc:date", "dcterms:created"]
            .iter()
            .find_map(|source| item.values(source).next());
        if let Some(date) = date {
            w.element("date", &[], date)?;
        }
        Self::write_all(&mut w, "type", item, &["dc:type"])?;
        Self::write_all(&mut w, "format", item, &["dc:format"])?;
        w.element("identifier", &[], &item.handle.url())?;
        Self::write_all(&mut w, "language", item, &["dc:language"])?;
        Self::write_all(&mut w, "coverage", item, &["dc:coverage", "dcterms:spatial"])?;
        Self::write_all(&mut w, "rights", item, &["dc:rights", "dcterms:license"])?;

        let degree_fields = [
            ("name", "thesis:degree.name"),
            ("level", "thesis:degree.level"),
            ("discipline", "thesis:degree.discipline"),
            ("grantor", "thesis:degree.grantor"),
        ];
        if degree_fields
            .iter()
            .any(|(_, source)| item.values(source).next().is_some())
        {
            w.start("degree", &[])?;
            for (tag, source) in degree_fields {
                Self::write_all(&mut w, tag, item, &[source])?;
            }
            w.end("degree")?;
        }

        w.end("thesis")?;
        w.finish()
    }
}

// ============ Registry ============

/// Registry of formats, keyed by prefix.
///
/// Built once at startup with [`with_builtins`](MetadataFormatRegistry::with_builtins)
/// and never mutated afterwards, so it can be shared across request tasks
/// behind an `Arc` without locking.
pub struct MetadataFormatRegistry {
    formats: Vec<Box<dyn MetadataFormat>>,
}

impl MetadataFormatRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            formats: Vec::new(),
        }
    }

    /// Create a registry holding `oai_dc`, `qdc`, `native` and `etdms`.
    pub fn with_builtins() -> Self {
        let mut registry = Self::new();
        registry.register(Box::new(OaiDc));
        registry.register(Box::new(QualifiedDc));
        registry.register(Box::new(Native));
        registry.register(Box::new(Etdms));
        registry
    }

    /// Register a format. A later registration with the same prefix shadows
    /// nothing; lookups return the first match.
    pub fn register(&mut self, format: Box<dyn MetadataFormat>) {
        self.formats.push(format);
    }

    pub fn lookup(&self, prefix: &str) -> Option<&dyn MetadataFormat> {
        self.formats
            .iter()
            .find(|f| f.prefix() == prefix)
            .map(|f| f.as_ref())
    }

    /// All formats, or only those available for `item` when one is given.
    pub fn formats_for(&self, item: Option<&Item>) -> Vec<&dyn MetadataFormat> {
        self.formats
            .iter()
            .map(|f| f.as_ref())
            .filter(|f| item.map_or(true, |item| f.available(item)))
            .collect()
    }
}

impl Default for MetadataFormatRegistry {
    fn default() -> Self {
        Self::new()
    }
}
