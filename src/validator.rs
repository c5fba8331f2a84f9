//! Streaming validation of one document against a compiled schema bundle.
//!
//! The document element picks the bundle member to validate with. libxml2
//! then drives a text reader over the whole input with that member's
//! validation context plugged in, and every warning and error is collected
//! as a `ViolationEvent` in encounter order. Only a document that is not
//! well-formed aborts the run.

use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::compiler::{BundleMember, CompileIssue, SchemaBundle, SchemaSetCompiler};
use crate::error::{Result, ValidationError};
use crate::inspect::{DocumentOutline, RootElement, outline_document};
use crate::libxml2::{ErrorLevel, LibXml2Wrapper, StreamValidation, XmlDiagnostic};
use crate::schema_loader::SchemaSource;

static IDENTITY_CONSTRAINT_REGEX: OnceLock<Regex> = OnceLock::new();

fn identity_constraint_regex() -> &'static Regex {
    IDENTITY_CONSTRAINT_REGEX.get_or_init(|| {
        Regex::new(r"(?i)key-sequence|identity-constraint|keyref")
            .expect("Failed to compile identity constraint regex")
    })
}

/// Switches for the optional parts of validation. All are on by default.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationOptions {
    /// Compile `xs:schema` elements embedded in the document
    pub process_inline_schema: bool,
    /// Follow `xsi:schemaLocation` and `xsi:noNamespaceSchemaLocation`
    pub process_schema_location: bool,
    /// Report key, keyref and unique violations
    pub process_identity_constraints: bool,
    /// Report warnings as well as errors
    pub report_warnings: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            process_inline_schema: true,
            process_schema_location: true,
            process_identity_constraints: true,
            report_warnings: true,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Warning => write!(f, "Warning"),
            Severity::Error => write!(f, "Error"),
        }
    }
}

/// A single schema finding. `line` is 1-based and never 0.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ViolationEvent {
    pub severity: Severity,
    pub message: String,
    pub line: u32,
    pub column: u32,
}

impl ViolationEvent {
    pub fn new(severity: Severity, message: impl Into<String>, line: u32, column: u32) -> Self {
        Self {
            severity,
            message: message.into(),
            line: line.max(1),
            column,
        }
    }

    pub fn warning(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::new(Severity::Warning, message, line, column)
    }

    pub fn error(message: impl Into<String>, line: u32, column: u32) -> Self {
        Self::new(Severity::Error, message, line, column)
    }

    fn from_diagnostic(diagnostic: &XmlDiagnostic) -> Self {
        let severity = if diagnostic.level >= ErrorLevel::Error {
            Severity::Error
        } else {
            Severity::Warning
        };
        Self::new(
            severity,
            diagnostic.message.clone(),
            clamp_position(diagnostic.line),
            clamp_position(diagnostic.column),
        )
    }

    pub fn is_error(&self) -> bool {
        self.severity == Severity::Error
    }

    pub fn is_identity_constraint(&self) -> bool {
        identity_constraint_regex().is_match(&self.message)
    }
}

/// Accumulates events in order, dropping the kinds the options switch off.
#[derive(Debug, Clone)]
pub struct ViolationCollector {
    options: ValidationOptions,
    events: Vec<ViolationEvent>,
}

impl ViolationCollector {
    pub fn new(options: ValidationOptions) -> Self {
        Self {
            options,
            events: Vec::new(),
        }
    }

    pub fn record(&mut self, event: ViolationEvent) {
        if event.severity == Severity::Warning && !self.options.report_warnings {
            return;
        }
        if !self.options.process_identity_constraints && event.is_identity_constraint() {
            return;
        }
        self.events.push(event);
    }

    pub fn len(&self) -> usize {
        self.events.len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    pub fn into_events(self) -> Vec<ViolationEvent> {
        self.events
    }
}

/// Where the schema for a document came from.
enum Resolved<'a> {
    Bundle(&'a BundleMember),
    Adhoc(BundleMember),
    Unresolved,
}

impl Resolved<'_> {
    fn member(&self) -> Option<&BundleMember> {
        match self {
            Resolved::Bundle(member) => Some(member),
            Resolved::Adhoc(member) => Some(member),
            Resolved::Unresolved => None,
        }
    }
}

/// Validates documents against schema bundles.
///
/// Holds no per-run state, so one validator can serve any number of
/// concurrent runs.
pub struct StreamingValidator {
    libxml2: LibXml2Wrapper,
    compiler: SchemaSetCompiler,
    options: ValidationOptions,
}

impl StreamingValidator {
    pub fn new(options: ValidationOptions) -> Self {
        Self {
            libxml2: LibXml2Wrapper::new(),
            compiler: SchemaSetCompiler::default(),
            options,
        }
    }

    pub fn options(&self) -> &ValidationOptions {
        &self.options
    }

    /// Read `input` to the end and validate it. The reader is left at the
    /// end of the stream.
    pub fn validate<R: Read + ?Sized>(
        &self,
        bundle: &SchemaBundle,
        input: &mut R,
    ) -> Result<Vec<ViolationEvent>> {
        let mut bytes = Vec::new();
        input.read_to_end(&mut bytes)?;
        self.validate_bytes(bundle, &bytes)
    }

    /// Validate a complete document held in memory.
    pub fn validate_bytes(&self, bundle: &SchemaBundle, bytes: &[u8]) -> Result<Vec<ViolationEvent>> {
        let outline = outline_document(bytes, self.options.process_inline_schema);
        let mut collector = ViolationCollector::new(self.options);

        let Some(root) = outline.root.clone() else {
            let stream = self.libxml2.validate_stream(None, bytes, None).ok();
            let reported = stream.as_ref().and_then(malformed);
            return Err(reported.unwrap_or_else(|| ValidationError::MalformedDocument {
                line: 1,
                column: 1,
                message: "Root element is missing.".to_string(),
            }));
        };

        let resolved = self.resolve(bundle, &outline, &root, &mut collector);
        let member = resolved.member();
        match member {
            Some(member) => debug!(
                root = %root.expanded_name(),
                schema = %member.path.display(),
                "Validating document"
            ),
            None => collector.record(ViolationEvent::warning(
                format!(
                    "Could not find schema information for the element '{}'.",
                    root.expanded_name()
                ),
                root.line,
                root.column,
            )),
        }

        let stream = self
            .libxml2
            .validate_stream(member.map(|m| &m.schema), bytes, None)?;

        if let Some(err) = malformed(&stream) {
            return Err(err);
        }
        if !stream.completed {
            // With a schema plugged in, libxml2 swallows the parser's fatal
            // error; a schema-less pass reports it.
            if member.is_some() {
                let bare = self.libxml2.validate_stream(None, bytes, None)?;
                if let Some(err) = malformed(&bare) {
                    return Err(err);
                }
            }
            return Err(ValidationError::LibXml2Internal {
                details: "text reader stopped before the end of the document".to_string(),
            });
        }

        for diagnostic in &stream.diagnostics {
            if diagnostic.level > ErrorLevel::None {
                collector.record(ViolationEvent::from_diagnostic(diagnostic));
            }
        }

        debug!(
            root = %root.expanded_name(),
            events = collector.len(),
            "Validation finished"
        );
        Ok(collector.into_events())
    }

    /// A global declaration in the bundle wins; then inline schemas, then
    /// location hints, then any bundle member sharing the namespace.
    fn resolve<'a>(
        &self,
        bundle: &'a SchemaBundle,
        outline: &DocumentOutline,
        root: &RootElement,
        collector: &mut ViolationCollector,
    ) -> Resolved<'a> {
        let namespace = root.namespace.as_deref();

        if bundle.declares(namespace, &root.local_name)
            && let Some(member) = bundle.member_for(namespace, &root.local_name)
        {
            return Resolved::Bundle(member);
        }

        if self.options.process_inline_schema
            && let Some(member) = self.inline_member(outline, root, collector)
        {
            return Resolved::Adhoc(member);
        }

        if self.options.process_schema_location
            && let Some(member) = self.hinted_member(bundle.directory(), outline, root, collector)
        {
            return Resolved::Adhoc(member);
        }

        match bundle.member_for(namespace, &root.local_name) {
            Some(member) => Resolved::Bundle(member),
            None => Resolved::Unresolved,
        }
    }

    fn inline_member(
        &self,
        outline: &DocumentOutline,
        root: &RootElement,
        collector: &mut ViolationCollector,
    ) -> Option<BundleMember> {
        for inline in &outline.inline_schemas {
            let label = PathBuf::from(format!("<inline schema at line {}>", inline.line));
            let (member, issues) = self.compiler.compile_bytes(&inline.source, &label, None);
            record_compile_issues(collector, &issues, inline.line, inline.column);

            if let Some(member) = member
                && member
                    .header
                    .declares(root.namespace.as_deref(), &root.local_name)
            {
                return Some(member);
            }
        }
        None
    }

    fn hinted_member(
        &self,
        base: &Path,
        outline: &DocumentOutline,
        root: &RootElement,
        collector: &mut ViolationCollector,
    ) -> Option<BundleMember> {
        let hints = outline
            .location_hints
            .iter()
            .filter(|hint| hint.namespace == root.namespace);

        for hint in hints {
            let location = hint.location.as_str();
            if location.starts_with("http://") || location.starts_with("https://") {
                warn!(location, "Remote schema location hint ignored");
                collector.record(ViolationEvent::warning(
                    format!(
                        "Cannot load the schema from the location '{}'. Remote schemas are not retrieved.",
                        location
                    ),
                    root.line,
                    root.column,
                ));
                continue;
            }

            let path = resolve_location(base, location);
            if !path.is_file() {
                collector.record(ViolationEvent::warning(
                    format!(
                        "Cannot load the schema for the namespace '{}' - Could not find file '{}'.",
                        hint.namespace.as_deref().unwrap_or_default(),
                        path.display()
                    ),
                    root.line,
                    root.column,
                ));
                continue;
            }

            let (member, issues) = self.compiler.compile_source(SchemaSource::Path(path));
            record_compile_issues(collector, &issues, root.line, root.column);

            if let Some(member) = member {
                return Some(member);
            }
        }
        None
    }
}

impl Default for StreamingValidator {
    fn default() -> Self {
        Self::new(ValidationOptions::default())
    }
}

fn resolve_location(base: &Path, location: &str) -> PathBuf {
    let location = location.strip_prefix("file://").unwrap_or(location);
    let path = Path::new(location);
    if path.is_absolute() {
        path.to_path_buf()
    } else {
        base.join(path)
    }
}

/// Schemas supplied by the document itself report their compile problems
/// as events at the place they were declared.
fn record_compile_issues(
    collector: &mut ViolationCollector,
    issues: &[CompileIssue],
    line: u32,
    column: u32,
) {
    for issue in issues {
        let severity = if issue.level >= ErrorLevel::Error {
            Severity::Error
        } else {
            Severity::Warning
        };
        collector.record(ViolationEvent::new(
            severity,
            issue.message.clone(),
            line,
            column,
        ));
    }
}

fn malformed(stream: &StreamValidation) -> Option<ValidationError> {
    stream
        .well_formedness_error()
        .map(|d| ValidationError::MalformedDocument {
            line: clamp_position(d.line).max(1),
            column: clamp_position(d.column),
            message: d.message.clone(),
        })
}

fn clamp_position(value: i32) -> u32 {
    u32::try_from(value).unwrap_or(0)
}
