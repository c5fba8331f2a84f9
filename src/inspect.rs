//! Lightweight XML inspection with `quick-xml`.
//!
//! Reads just enough of a schema file or instance document to route it:
//! a schema's target namespace and global elements, a document's root
//! element, its `xsi` location hints and any inline schemas. Full
//! validation stays with libxml2.

use std::borrow::Cow;
use std::path::Path;

use quick_xml::NsReader;
use quick_xml::events::{BytesStart, Event};
use quick_xml::name::ResolveResult;

use crate::error::{Result, ValidationError};

pub const XSD_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema";
pub const XSI_NAMESPACE: &str = "http://www.w3.org/2001/XMLSchema-instance";

/// What a schema file declares at top level.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SchemaHeader {
    pub target_namespace: Option<String>,
    /// Names of the top-level `xs:element` declarations
    pub global_elements: Vec<String>,
}

impl SchemaHeader {
    /// Read the header of the schema file at `path`. Fails when the file is
    /// not XML or its root is not `xs:schema`.
    pub fn read(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path).map_err(|e| unreadable(path, e.to_string()))?;
        Self::parse(&bytes).map_err(|reason| unreadable(path, reason))
    }

    pub fn parse(bytes: &[u8]) -> std::result::Result<Self, String> {
        let mut reader = NsReader::from_reader(bytes);
        let mut buf = Vec::new();
        let mut header: Option<SchemaHeader> = None;
        let mut depth = 0usize;

        loop {
            let (ns, event) = reader
                .read_resolved_event_into(&mut buf)
                .map_err(|e| e.to_string())?;
            let ns = namespace_of(ns);

            match event {
                Event::Start(ref e) | Event::Empty(ref e) => {
                    let is_empty = matches!(event, Event::Empty(_));
                    if depth == 0 {
                        if ns.as_deref() != Some(XSD_NAMESPACE)
                            || e.local_name().as_ref() != b"schema"
                        {
                            return Err(format!(
                                "root element '{}' is not an XML Schema",
                                String::from_utf8_lossy(e.name().as_ref())
                            ));
                        }
                        header = Some(SchemaHeader {
                            target_namespace: attribute(e, b"targetNamespace")
                                .filter(|t| !t.is_empty()),
                            global_elements: Vec::new(),
                        });
                    } else if depth == 1
                        && ns.as_deref() == Some(XSD_NAMESPACE)
                        && e.local_name().as_ref() == b"element"
                        && let (Some(header), Some(name)) = (header.as_mut(), attribute(e, b"name"))
                    {
                        header.global_elements.push(name);
                    }
                    if !is_empty {
                        depth += 1;
                    }
                }
                Event::End(_) => {
                    depth = depth.saturating_sub(1);
                    if depth == 0 {
                        break;
                    }
                }
                Event::Eof => break,
                _ => {}
            }
            buf.clear();
        }

        header.ok_or_else(|| "document has no root element".to_string())
    }

    pub fn declares(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.target_namespace.as_deref() == namespace
            && self.global_elements.iter().any(|e| e == local_name)
    }
}

/// The document element of an instance document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RootElement {
    pub namespace: Option<String>,
    pub local_name: String,
    pub line: u32,
    pub column: u32,
}

impl RootElement {
    /// `{namespace}local` or just `local`.
    pub fn expanded_name(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{}:{}", ns, self.local_name),
            None => self.local_name.clone(),
        }
    }
}

/// An `xsi:schemaLocation` pair or `xsi:noNamespaceSchemaLocation` hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SchemaLocationHint {
    pub namespace: Option<String>,
    pub location: String,
}

/// A schema embedded in an instance document, re-rooted so it can be
/// compiled on its own.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InlineSchema {
    pub source: Vec<u8>,
    pub line: u32,
    pub column: u32,
}

/// Routing information gathered from an instance document.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentOutline {
    pub root: Option<RootElement>,
    pub location_hints: Vec<SchemaLocationHint>,
    pub inline_schemas: Vec<InlineSchema>,
}

struct InlineCapture {
    start: usize,
    depth: usize,
    qname: Vec<u8>,
    inherited: Vec<(String, String)>,
    line: u32,
    column: u32,
}

/// Outline a document. Only the root element is read unless
/// `scan_inline_schemas` is set. Broken markup simply ends the scan; the
/// validator reports it authoritatively.
pub fn outline_document(bytes: &[u8], scan_inline_schemas: bool) -> DocumentOutline {
    let mut outline = DocumentOutline::default();
    let mut reader = NsReader::from_reader(bytes);
    let mut buf = Vec::new();
    let mut scopes: Vec<Vec<(String, String)>> = Vec::new();
    let mut capture: Option<InlineCapture> = None;

    loop {
        let start = reader.buffer_position() as usize;
        let Ok((ns, event)) = reader.read_resolved_event_into(&mut buf) else {
            break;
        };
        let ns = namespace_of(ns);

        match event {
            Event::Start(ref e) | Event::Empty(ref e) => {
                let is_empty = matches!(event, Event::Empty(_));
                let (line, column) = line_column_at(bytes, start);

                if outline.root.is_none() {
                    outline.root = Some(RootElement {
                        namespace: ns.clone(),
                        local_name: String::from_utf8_lossy(e.local_name().as_ref()).into_owned(),
                        line,
                        column,
                    });
                    outline.location_hints = location_hints(&reader, e);
                    if !scan_inline_schemas {
                        break;
                    }
                } else if capture.is_none()
                    && !is_empty
                    && ns.as_deref() == Some(XSD_NAMESPACE)
                    && e.local_name().as_ref() == b"schema"
                {
                    let own = namespace_declarations(e);
                    capture = Some(InlineCapture {
                        start,
                        depth: scopes.len(),
                        qname: e.name().as_ref().to_vec(),
                        inherited: inherited_declarations(&scopes, &own),
                        line,
                        column,
                    });
                }

                if !is_empty {
                    scopes.push(namespace_declarations(e));
                }
            }
            Event::End(_) => {
                scopes.pop();
                if let Some(c) = capture.as_ref()
                    && scopes.len() == c.depth
                {
                    let end = reader.buffer_position() as usize;
                    outline.inline_schemas.push(InlineSchema {
                        source: reroot_inline_schema(&bytes[c.start..end], c),
                        line: c.line,
                        column: c.column,
                    });
                    capture = None;
                }
            }
            Event::Eof => break,
            _ => {}
        }
        buf.clear();
    }

    outline
}

/// Re-emit the captured element with the namespace bindings it inherited
/// from its ancestors.
fn reroot_inline_schema(slice: &[u8], capture: &InlineCapture) -> Vec<u8> {
    let head = 1 + capture.qname.len();
    let mut source = Vec::with_capacity(slice.len() + 64);
    source.extend_from_slice(&slice[..head]);
    for (key, value) in &capture.inherited {
        source.extend_from_slice(format!(" {}=\"{}\"", key, escape_attribute(value)).as_bytes());
    }
    source.extend_from_slice(&slice[head..]);
    source
}

fn inherited_declarations(
    scopes: &[Vec<(String, String)>],
    own: &[(String, String)],
) -> Vec<(String, String)> {
    let mut merged: Vec<(String, String)> = Vec::new();
    for (key, value) in scopes.iter().flatten() {
        if let Some(slot) = merged.iter_mut().find(|(k, _)| k == key) {
            slot.1 = value.clone();
        } else {
            merged.push((key.clone(), value.clone()));
        }
    }
    merged.retain(|(k, _)| !own.iter().any(|(o, _)| o == k));
    merged
}

fn namespace_declarations(e: &BytesStart<'_>) -> Vec<(String, String)> {
    e.attributes()
        .flatten()
        .filter(|a| {
            let key = a.key.as_ref();
            key == b"xmlns" || key.starts_with(b"xmlns:")
        })
        .map(|a| {
            (
                String::from_utf8_lossy(a.key.as_ref()).into_owned(),
                a.unescape_value()
                    .map(Cow::into_owned)
                    .unwrap_or_default(),
            )
        })
        .collect()
}

fn location_hints<R>(reader: &NsReader<R>, e: &BytesStart<'_>) -> Vec<SchemaLocationHint> {
    let mut hints = Vec::new();

    for attr in e.attributes().flatten() {
        let (ns, local) = reader.resolve_attribute(attr.key);
        if namespace_of(ns).as_deref() != Some(XSI_NAMESPACE) {
            continue;
        }
        let Ok(value) = attr.unescape_value() else {
            continue;
        };

        match local.as_ref() {
            b"schemaLocation" => {
                let tokens: Vec<&str> = value.split_whitespace().collect();
                for pair in tokens.chunks_exact(2) {
                    hints.push(SchemaLocationHint {
                        namespace: Some(pair[0].to_string()),
                        location: pair[1].to_string(),
                    });
                }
            }
            b"noNamespaceSchemaLocation" => {
                if let Some(location) = value.split_whitespace().next() {
                    hints.push(SchemaLocationHint {
                        namespace: None,
                        location: location.to_string(),
                    });
                }
            }
            _ => {}
        }
    }

    hints
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(Cow::into_owned))
}

fn namespace_of(ns: ResolveResult<'_>) -> Option<String> {
    match ns {
        ResolveResult::Bound(ns) => Some(String::from_utf8_lossy(ns.as_ref()).into_owned()),
        _ => None,
    }
}

fn escape_attribute(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('"', "&quot;")
        .replace('<', "&lt;")
}

/// 1-based line and column of a byte offset.
pub fn line_column_at(bytes: &[u8], offset: usize) -> (u32, u32) {
    let offset = offset.min(bytes.len());
    let before = &bytes[..offset];
    let line = before.iter().filter(|&&b| b == b'\n').count() + 1;
    let line_start = before
        .iter()
        .rposition(|&b| b == b'\n')
        .map_or(0, |p| p + 1);
    (line as u32, (offset - line_start + 1) as u32)
}

fn unreadable(path: &Path, reason: String) -> ValidationError {
    ValidationError::SchemaFileUnreadable {
        path: path.to_path_buf(),
        reason,
    }
}
