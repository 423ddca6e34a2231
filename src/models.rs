//! Core value types that flow through the harvesting pipeline.
//!
//! The record lifecycle is:
//!
//! ```text
//! OAI response ──▶ Record{is_envelope} ──▶ Split ──▶ Record ──▶ Strip
//!                                                       │
//!                                              Transform│
//!                                                       ▼
//!                                                     Save
//! ```
//!
//! A [`Record`] starts as a whole response envelope (`is_envelope = true`,
//! `is_list = true`) when it comes out of a list harvest, or as a single
//! record document when it comes out of `GetRecord`. Once both flags are
//! false the document contains exactly one `<record>` element and `id` is
//! non-empty.

/// Descriptor of a metadata format an action sequence consumes.
///
/// `prefix` is the OAI metadata prefix (`oai_dc`, `cmdi`, ...); `schema` and
/// `namespace` are informational and not matched against the endpoint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MetadataFormat {
    pub prefix: String,
    pub schema: Option<String>,
    pub namespace: Option<String>,
}

impl MetadataFormat {
    pub fn new(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            schema: None,
            namespace: None,
        }
    }
}

/// One metadata record (or response envelope) moving through the pipeline.
#[derive(Debug, Clone)]
pub struct Record {
    /// Identifier, unique within a provider and prefix. Empty while the
    /// document is still an unsplit envelope.
    pub id: String,
    /// Metadata prefix the record was harvested with.
    pub prefix: String,
    /// The XML document. Owned text; every consumer parses its own copy, so
    /// records never share parser state.
    pub document: String,
    /// Name of the provider the record came from.
    pub origin: String,
    /// True while the document still wraps records in the OAI response
    /// envelope.
    pub is_envelope: bool,
    /// True while a list response has not yet been split.
    pub is_list: bool,
}

impl Record {
    /// A response envelope as produced by `ListRecords` or a static archive.
    pub fn envelope(prefix: impl Into<String>, document: String, origin: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            prefix: prefix.into(),
            document,
            origin: origin.into(),
            is_envelope: true,
            is_list: true,
        }
    }

    /// A single, already unwrapped record document.
    pub fn single(
        id: impl Into<String>,
        prefix: impl Into<String>,
        document: String,
        origin: impl Into<String>,
    ) -> Self {
        Self {
            id: id.into(),
            prefix: prefix.into(),
            document,
            origin: origin.into(),
            is_envelope: false,
            is_list: false,
        }
    }
}
