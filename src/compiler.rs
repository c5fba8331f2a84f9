//! Compiling loaded schema files into a dispatchable bundle.
//!
//! libxml2 compiles one root schema at a time, so a bundle holds one
//! compiled member per file, each tagged with its target namespace and
//! global element names. Imports and includes are resolved by libxml2 from
//! each member's location.

use std::path::{Path, PathBuf};
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::{Result, ValidationError};
use crate::inspect::SchemaHeader;
use crate::libxml2::{
    ErrorLevel, LibXml2Wrapper, SchemaCompilation, XmlDiagnostic, XmlSchemaPtr, file_url_to_path,
};
use crate::schema_loader::{LoadedSchemas, SchemaSource, SkippedSchema};

static UNRESOLVED_REFERENCE_REGEX: OnceLock<Regex> = OnceLock::new();

fn unresolved_reference_regex() -> &'static Regex {
    UNRESOLVED_REFERENCE_REGEX.get_or_init(|| {
        Regex::new(r"(?i)src-resolve|failed to locate|failed to load|could not load|skipping the import")
            .expect("Failed to compile unresolved reference regex")
    })
}

/// Whether compile issues can fail a bundle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum CompileStrictness {
    /// Record every issue; only an empty bundle is an error.
    #[default]
    Lenient,
    /// Additionally fail on unresolved imports, includes and references.
    Strict,
}

/// A problem libxml2 reported while compiling one schema file.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileIssue {
    pub path: PathBuf,
    pub level: ErrorLevel,
    pub message: String,
    pub line: i32,
}

impl CompileIssue {
    fn from_diagnostic(source: &Path, diagnostic: XmlDiagnostic) -> Self {
        Self {
            path: diagnostic
                .file
                .as_deref()
                .map(file_url_to_path)
                .unwrap_or_else(|| source.to_path_buf()),
            level: diagnostic.level,
            message: diagnostic.message,
            line: diagnostic.line,
        }
    }

    /// Issues that point at a missing import, include or component.
    pub fn is_unresolved_reference(&self) -> bool {
        unresolved_reference_regex().is_match(&self.message)
    }
}

/// One compiled schema file.
#[derive(Debug, Clone)]
pub struct BundleMember {
    pub path: PathBuf,
    pub header: SchemaHeader,
    pub schema: XmlSchemaPtr,
}

impl BundleMember {
    pub fn target_namespace(&self) -> Option<&str> {
        self.header.target_namespace.as_deref()
    }
}

/// An immutable compiled schema set.
#[derive(Debug, Clone)]
pub struct SchemaBundle {
    directory: PathBuf,
    members: Vec<BundleMember>,
    issues: Vec<CompileIssue>,
    skipped: Vec<SkippedSchema>,
}

impl SchemaBundle {
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    pub fn members(&self) -> &[BundleMember] {
        &self.members
    }

    pub fn issues(&self) -> &[CompileIssue] {
        &self.issues
    }

    pub fn skipped(&self) -> &[SkippedSchema] {
        &self.skipped
    }

    /// The member that should validate a document element: one declaring
    /// that element globally, else the first in the same namespace.
    pub fn member_for(&self, namespace: Option<&str>, local_name: &str) -> Option<&BundleMember> {
        self.members
            .iter()
            .find(|m| m.header.declares(namespace, local_name))
            .or_else(|| {
                self.members
                    .iter()
                    .find(|m| m.target_namespace() == namespace)
            })
    }

    /// Only an exact global declaration counts as coverage.
    pub fn declares(&self, namespace: Option<&str>, local_name: &str) -> bool {
        self.members
            .iter()
            .any(|m| m.header.declares(namespace, local_name))
    }
}

/// Compiles a directory's loaded schemas into a `SchemaBundle`.
pub struct SchemaSetCompiler {
    libxml2: LibXml2Wrapper,
    strictness: CompileStrictness,
}

impl SchemaSetCompiler {
    pub fn new(strictness: CompileStrictness) -> Self {
        Self {
            libxml2: LibXml2Wrapper::new(),
            strictness,
        }
    }

    pub fn strictness(&self) -> CompileStrictness {
        self.strictness
    }

    /// Compile all loaded sources. Fails when no member compiles, or in
    /// strict mode when a reference cannot be resolved.
    pub fn compile(&self, directory: &Path, loaded: LoadedSchemas) -> Result<SchemaBundle> {
        let LoadedSchemas { sources, skipped } = loaded;
        let source_count = sources.len();

        let mut members = Vec::new();
        let mut issues = Vec::new();

        for source in sources {
            let (member, mut source_issues) = self.compile_source(source);
            issues.append(&mut source_issues);
            if let Some(member) = member {
                members.push(member);
            }
        }

        for issue in &issues {
            debug!(
                path = %issue.path.display(),
                line = issue.line,
                message = %issue.message,
                "Schema compile issue"
            );
        }

        if self.strictness == CompileStrictness::Strict
            && let Some(issue) = issues.iter().find(|i| i.is_unresolved_reference())
        {
            return Err(ValidationError::SchemaCompileFailed {
                path: issue.path.clone(),
                details: issue.message.clone(),
            });
        }

        if members.is_empty() {
            let details = if source_count == 0 {
                "no schema files found".to_string()
            } else {
                let first = issues
                    .iter()
                    .find(|i| i.level >= ErrorLevel::Error)
                    .map(|i| format!(": {}", i.message))
                    .unwrap_or_default();
                format!("none of {} schema files compiled{}", source_count, first)
            };
            return Err(ValidationError::SchemaAssemblyFailed {
                directory: directory.to_path_buf(),
                details,
            });
        }

        if !issues.is_empty() {
            warn!(
                directory = %directory.display(),
                issues = issues.len(),
                "Schema bundle compiled with issues"
            );
        }
        info!(
            directory = %directory.display(),
            members = members.len(),
            skipped = skipped.len(),
            "Compiled schema bundle"
        );

        Ok(SchemaBundle {
            directory: directory.to_path_buf(),
            members,
            issues,
            skipped,
        })
    }

    /// Compile one source. A source that does not compile yields no member;
    /// the reason is in the returned issues.
    pub fn compile_source(&self, source: SchemaSource) -> (Option<BundleMember>, Vec<CompileIssue>) {
        match source {
            SchemaSource::Path(path) => {
                let compilation = self.libxml2.compile_schema_file(&path);
                finish_member(path, None, compilation)
            }
            SchemaSource::Parsed {
                path,
                document,
                header,
            } => {
                let compilation = self.libxml2.compile_schema_document(document, &path);
                finish_member(path, Some(header), compilation)
            }
        }
    }

    /// Compile a schema held in memory, such as one embedded in a document.
    /// `base` anchors relative imports.
    pub fn compile_bytes(
        &self,
        bytes: &[u8],
        label: &Path,
        base: Option<&str>,
    ) -> (Option<BundleMember>, Vec<CompileIssue>) {
        let header = match SchemaHeader::parse(bytes) {
            Ok(header) => header,
            Err(reason) => {
                let issue = CompileIssue {
                    path: label.to_path_buf(),
                    level: ErrorLevel::Error,
                    message: reason,
                    line: 0,
                };
                return (None, vec![issue]);
            }
        };
        let compilation = self.libxml2.parse_schema_from_memory(bytes, base);
        finish_member(label.to_path_buf(), Some(header), compilation)
    }
}

impl Default for SchemaSetCompiler {
    fn default() -> Self {
        Self::new(CompileStrictness::default())
    }
}

fn finish_member(
    path: PathBuf,
    header: Option<SchemaHeader>,
    compilation: SchemaCompilation,
) -> (Option<BundleMember>, Vec<CompileIssue>) {
    let SchemaCompilation {
        schema,
        diagnostics,
    } = compilation;

    let mut issues: Vec<CompileIssue> = diagnostics
        .into_iter()
        .map(|d| CompileIssue::from_diagnostic(&path, d))
        .collect();

    let schema = match schema {
        Ok(schema) => schema,
        Err(e) => {
            if issues.is_empty() {
                issues.push(CompileIssue {
                    path: path.clone(),
                    level: ErrorLevel::Error,
                    message: e.to_string(),
                    line: 0,
                });
            }
            return (None, issues);
        }
    };

    let header = match header.map_or_else(|| SchemaHeader::read(&path), Ok) {
        Ok(header) => header,
        Err(e) => {
            issues.push(CompileIssue {
                path: path.clone(),
                level: ErrorLevel::Warning,
                message: e.to_string(),
                line: 0,
            });
            SchemaHeader::default()
        }
    };

    (
        Some(BundleMember {
            path,
            header,
            schema,
        }),
        issues,
    )
}
