//! XML helpers for OAI-PMH documents.
//!
//! Element selection matches on `local_name()` so it works regardless of the
//! namespace prefixes a provider happens to emit. Subtree extraction captures
//! the verbatim byte range of the element from the source text, so an
//! extracted record is an independently owned document with the exact
//! serialization the provider sent.

use quick_xml::events::Event;
use quick_xml::Reader;

/// Extract every top-most element with local name `record`, each as its own
/// document. Records nested inside a captured record (which a conforming
/// response never contains) are not matched again.
pub fn record_elements(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    elements_by_local_name(xml, b"record")
}

/// Extract every top-most element with the given local name.
pub fn elements_by_local_name(
    xml: &str,
    local: &[u8],
) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut capture_start: Option<usize> = None;
    let mut depth = 0usize;
    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) => {
                if capture_start.is_some() {
                    depth += 1;
                } else if e.local_name().as_ref() == local {
                    capture_start = Some(pos);
                    depth = 1;
                }
            }
            Event::End(_) => {
                if let Some(start) = capture_start {
                    depth -= 1;
                    if depth == 0 {
                        out.push(xml[start..reader.buffer_position() as usize].to_string());
                        capture_start = None;
                    }
                }
            }
            Event::Empty(e) => {
                if capture_start.is_none() && e.local_name().as_ref() == local {
                    out.push(xml[pos..reader.buffer_position() as usize].to_string());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Extract the first element with the given local name carrying the given
/// attribute value. Attribute names are matched on their local part as well.
pub fn element_with_attr(
    xml: &str,
    local: &[u8],
    attr: &[u8],
    value: &str,
) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut capture_start: Option<usize> = None;
    let mut depth = 0usize;
    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) => {
                if capture_start.is_some() {
                    depth += 1;
                } else if e.local_name().as_ref() == local && has_attr(&e, attr, value) {
                    capture_start = Some(pos);
                    depth = 1;
                }
            }
            Event::End(_) => {
                if capture_start.is_some() {
                    depth -= 1;
                    if depth == 0 {
                        let start = capture_start.take().unwrap_or(pos);
                        return Ok(Some(
                            xml[start..reader.buffer_position() as usize].to_string(),
                        ));
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(None)
}

fn has_attr(e: &quick_xml::events::BytesStart<'_>, attr: &[u8], value: &str) -> bool {
    e.attributes().any(|a| {
        a.as_ref()
            .map(|a| {
                a.key.local_name().as_ref() == attr
                    && a.unescape_value()
                        .map(|v| v.as_ref() == value)
                        .unwrap_or(false)
            })
            .unwrap_or(false)
    })
}

/// Text content of the first element with the given local name.
pub fn first_text(xml: &str, local: &[u8]) -> Option<String> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == local => {
                return match reader.read_event() {
                    Ok(Event::Text(t)) => Some(t.unescape().unwrap_or_default().into_owned()),
                    _ => Some(String::new()),
                };
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

/// Identifier texts found inside `header` elements, in document order.
pub fn header_identifiers(xml: &str) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    let mut header_depth = 0usize;
    loop {
        match reader.read_event()? {
            Event::Start(e) => {
                if e.local_name().as_ref() == b"header" {
                    header_depth += 1;
                } else if header_depth > 0 && e.local_name().as_ref() == b"identifier" {
                    if let Ok(Event::Text(t)) = reader.read_event() {
                        out.push(t.unescape().unwrap_or_default().into_owned());
                    }
                }
            }
            Event::End(e) => {
                if e.local_name().as_ref() == b"header" && header_depth > 0 {
                    header_depth -= 1;
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// Identifier of a single record document: the first `identifier` inside its
/// `header`.
pub fn header_identifier(record_xml: &str) -> Option<String> {
    header_identifiers(record_xml)
        .ok()
        .and_then(|ids| ids.into_iter().next())
}

/// The payload inside a record's `metadata` element: the first child element,
/// captured as its own document. `None` when the record has no `metadata`
/// element or the metadata is empty.
pub fn metadata_payload(record_xml: &str) -> Result<Option<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(record_xml);
    let mut in_metadata = false;
    let mut capture_start: Option<usize> = None;
    let mut depth = 0usize;
    loop {
        let pos = reader.buffer_position() as usize;
        match reader.read_event()? {
            Event::Start(e) => {
                if !in_metadata {
                    if e.local_name().as_ref() == b"metadata" {
                        in_metadata = true;
                    }
                } else if capture_start.is_none() {
                    capture_start = Some(pos);
                    depth = 1;
                } else {
                    depth += 1;
                }
            }
            Event::Empty(_) => {
                if in_metadata && capture_start.is_none() {
                    return Ok(Some(
                        record_xml[pos..reader.buffer_position() as usize].to_string(),
                    ));
                }
            }
            Event::End(_) => {
                if let Some(start) = capture_start {
                    depth -= 1;
                    if depth == 0 {
                        return Ok(Some(
                            record_xml[start..reader.buffer_position() as usize].to_string(),
                        ));
                    }
                } else if in_metadata {
                    // </metadata> before any child element
                    return Ok(None);
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(None)
}

/// The resumption token of a list response. An empty or whitespace-only
/// token element closes the list, so it maps to `None`.
pub fn resumption_token(xml: &str) -> Option<String> {
    first_text(xml, b"resumptionToken")
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
}

/// Values of an attribute over every element with the given local name.
pub fn attribute_values(
    xml: &str,
    local: &[u8],
    attr: &[u8],
) -> Result<Vec<String>, quick_xml::Error> {
    let mut reader = Reader::from_str(xml);
    let mut out = Vec::new();
    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == local => {
                if let Some(value) = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == attr)
                    .and_then(|a| a.unescape_value().ok())
                {
                    out.push(value.into_owned());
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(out)
}

/// OAI protocol error of a response, as `(code, message)`.
pub fn oai_error(xml: &str) -> Option<(String, String)> {
    let mut reader = Reader::from_str(xml);
    loop {
        match reader.read_event() {
            Ok(Event::Start(e)) if e.local_name().as_ref() == b"error" => {
                let code = e
                    .attributes()
                    .flatten()
                    .find(|a| a.key.local_name().as_ref() == b"code")
                    .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
                    .unwrap_or_default();
                let message = match reader.read_event() {
                    Ok(Event::Text(t)) => t.unescape().unwrap_or_default().into_owned(),
                    _ => String::new(),
                };
                return Some((code, message));
            }
            Ok(Event::Eof) | Err(_) => return None,
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ENVELOPE: &str = r#"<OAI-PMH xmlns="http://www.openarchives.org/OAI/2.0/">
<ListRecords>
<record><header><identifier>a</identifier></header><metadata><dc>one</dc></metadata></record>
<record><header><identifier>b</identifier></header><metadata><dc>two</dc></metadata></record>
<record><header><identifier>c</identifier></header><metadata><dc>three</dc></metadata></record>
<resumptionToken>page-2</resumptionToken>
</ListRecords>
</OAI-PMH>"#;

    #[test]
    fn record_elements_are_verbatim_and_ordered() {
        let records = record_elements(ENVELOPE).unwrap();
        assert_eq!(records.len(), 3);
        assert!(records[0].starts_with("<record>"));
        assert!(records[0].ends_with("</record>"));
        assert_eq!(header_identifier(&records[0]).as_deref(), Some("a"));
        assert_eq!(header_identifier(&records[1]).as_deref(), Some("b"));
        assert_eq!(header_identifier(&records[2]).as_deref(), Some("c"));
    }

    #[test]
    fn record_elements_matches_prefixed_names() {
        let xml = r#"<oai:ListRecords xmlns:oai="urn:x"><oai:record><oai:header/></oai:record></oai:ListRecords>"#;
        let records = record_elements(xml).unwrap();
        assert_eq!(records.len(), 1);
        assert!(records[0].starts_with("<oai:record>"));
    }

    #[test]
    fn empty_envelope_yields_no_records() {
        let xml = r#"<OAI-PMH><ListRecords></ListRecords></OAI-PMH>"#;
        assert!(record_elements(xml).unwrap().is_empty());
    }

    #[test]
    fn metadata_payload_unwraps_first_child() {
        let records = record_elements(ENVELOPE).unwrap();
        let payload = metadata_payload(&records[0]).unwrap();
        assert_eq!(payload.as_deref(), Some("<dc>one</dc>"));
    }

    #[test]
    fn metadata_payload_none_without_metadata() {
        let xml = "<record><header><identifier>x</identifier></header></record>";
        assert_eq!(metadata_payload(xml).unwrap(), None);
    }

    #[test]
    fn resumption_token_empty_element_is_none() {
        assert_eq!(resumption_token(ENVELOPE).as_deref(), Some("page-2"));
        let closed = "<ListRecords><resumptionToken></resumptionToken></ListRecords>";
        assert_eq!(resumption_token(closed), None);
        let blank = "<ListRecords><resumptionToken>  </resumptionToken></ListRecords>";
        assert_eq!(resumption_token(blank), None);
    }

    #[test]
    fn oai_error_reports_code_and_message() {
        let xml = r#"<OAI-PMH><error code="badVerb">what is that</error></OAI-PMH>"#;
        assert_eq!(
            oai_error(xml),
            Some(("badVerb".to_string(), "what is that".to_string()))
        );
        assert_eq!(oai_error(ENVELOPE), None);
    }

    #[test]
    fn element_with_attr_finds_section() {
        let xml = r#"<Repository>
<ListRecords metadataPrefix="oai_dc"><record>1</record></ListRecords>
<ListRecords metadataPrefix="cmdi"><record>2</record></ListRecords>
</Repository>"#;
        let section = element_with_attr(xml, b"ListRecords", b"metadataPrefix", "cmdi")
            .unwrap()
            .unwrap();
        assert!(section.contains("<record>2</record>"));
        assert!(
            element_with_attr(xml, b"ListRecords", b"metadataPrefix", "marc21")
                .unwrap()
                .is_none()
        );
    }

    #[test]
    fn header_identifiers_collects_in_order() {
        let ids = header_identifiers(ENVELOPE).unwrap();
        assert_eq!(ids, vec!["a", "b", "c"]);
    }
}
