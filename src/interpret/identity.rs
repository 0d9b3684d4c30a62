//! Parser for the Plex `/identity` document.
//!
//! ```xml
//! <MediaContainer size="0" claimed="1" machineIdentifier="ee2e..." version="1.32.5.7516-8f4248874"/>
//! ```

use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use thiserror::Error;

/// Name of the root element every identity document carries.
pub const ROOT_ELEMENT: &str = "MediaContainer";

/// Raw-body marker used by the cheap liveness check.
pub const ROOT_MARKER: &str = "<MediaContainer";

#[derive(Debug, Error)]
pub enum IdentityParseError {
    #[error("body is not valid UTF-8: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    #[error("malformed XML at byte {position}: {source}")]
    Xml {
        position: u64,
        #[source]
        source: quick_xml::Error,
    },

    #[error("invalid attribute: {0}")]
    Attribute(String),

    #[error("text outside of the root element")]
    StrayText,

    #[error("document has no root element")]
    MissingRoot,

    #[error("unexpected root element <{0}>")]
    UnexpectedRoot(String),

    #[error("root element is never closed")]
    Unclosed,
}

/// Attributes of the `MediaContainer` root. Every field is optional; an
/// attribute that is missing or not in the expected shape is `None`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IdentityDocument {
    pub size: Option<u64>,
    pub claimed: Option<bool>,
    pub machine_identifier: Option<String>,
    pub version: Option<String>,
}

impl IdentityDocument {
    fn from_root(root: &BytesStart<'_>) -> Result<Self, IdentityParseError> {
        let mut doc = IdentityDocument::default();
        for attr in root.attributes() {
            let attr = attr.map_err(|e| IdentityParseError::Attribute(e.to_string()))?;
            let value = attr
                .unescape_value()
                .map_err(|e| IdentityParseError::Attribute(e.to_string()))?;
            match attr.key.as_ref() {
                b"size" => doc.size = value.trim().parse().ok(),
                b"claimed" => doc.claimed = parse_flag(&value),
                b"machineIdentifier" => doc.machine_identifier = Some(value.into_owned()),
                b"version" => doc.version = Some(value.into_owned()),
                _ => {}
            }
        }
        Ok(doc)
    }
}

fn parse_flag(value: &str) -> Option<bool> {
    match value.trim() {
        "1" | "true" => Some(true),
        "0" | "false" => Some(false),
        _ => None,
    }
}

/// Parse an identity document. The document must be well formed up to the end
/// of its `MediaContainer` root; anything after the root is ignored.
pub fn parse_identity(body: &[u8]) -> Result<IdentityDocument, IdentityParseError> {
    let text = std::str::from_utf8(body)?;
    let mut reader = Reader::from_str(text);

    let mut doc: Option<IdentityDocument> = None;
    let mut depth = 0usize;

    loop {
        let event = reader.read_event().map_err(|source| IdentityParseError::Xml {
            position: reader.buffer_position() as u64,
            source,
        })?;

        match event {
            Event::Start(e) => {
                if doc.is_none() {
                    doc = Some(root_document(&e)?);
                }
                depth += 1;
            }
            Event::Empty(e) => {
                if doc.is_none() {
                    return root_document(&e);
                }
            }
            Event::End(_) => {
                depth = depth.saturating_sub(1);
                if depth == 0 {
                    break;
                }
            }
            Event::Text(t) if doc.is_none() => {
                if !t.iter().all(u8::is_ascii_whitespace) {
                    return Err(IdentityParseError::StrayText);
                }
            }
            Event::Eof => {
                if doc.is_some() {
                    return Err(IdentityParseError::Unclosed);
                }
                return Err(IdentityParseError::MissingRoot);
            }
            _ => {}
        }
    }

    doc.ok_or(IdentityParseError::MissingRoot)
}

fn root_document(root: &BytesStart<'_>) -> Result<IdentityDocument, IdentityParseError> {
    let name = root.name();
    if name.as_ref() != ROOT_ELEMENT.as_bytes() {
        return Err(IdentityParseError::UnexpectedRoot(
            String::from_utf8_lossy(name.as_ref()).into_owned(),
        ));
    }
    IdentityDocument::from_root(root)
}
