//! # einvoice-xsd
//!
//! Schema conformance checking for electronic invoices in the CII and UBL
//! dialects. A case (standard version, profile, dialect) selects a directory
//! of official XSD files; the directory is compiled into a cached schema
//! bundle, documents are validated against it in one streaming pass, and
//! every violation is rendered with its location and the surrounding source
//! lines.
//!
//! ```no_run
//! use einvoice_xsd::{CaseKey, Config, ConformanceEngine, Dialect, DocumentKind, Profile, StandardVersion};
//!
//! # fn main() -> einvoice_xsd::error::Result<()> {
//! let engine = ConformanceEngine::new(&Config::default())?;
//! let key = CaseKey::new(StandardVersion::Version23, Profile::Minimum, Dialect::Cii);
//! let producer = |_: &CaseKey, _: DocumentKind| -> anyhow::Result<Vec<u8>> {
//!     Ok(std::fs::read("invoice.xml")?)
//! };
//!
//! let report = engine.check(&key, DocumentKind::Invoice, &producer)?;
//! if !report.is_conformant() {
//!     eprintln!("{}", report.render());
//! }
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod cases;
pub mod compiler;
pub mod config;
pub mod diagnostics;
pub mod discovery;
pub mod engine;
pub mod error;
pub mod inspect;
pub mod libxml2;
pub mod schema_loader;
pub mod validator;

pub use cache::{BundleCache, BundleKey, CacheStats};
pub use cases::{
    CaseEntry, CaseKey, CaseTable, ConformanceCase, Dialect, DocumentKind, Profile,
    StandardVersion, normalize_path,
};
pub use compiler::{BundleMember, CompileIssue, CompileStrictness, SchemaBundle, SchemaSetCompiler};
pub use config::{Config, ConfigError, ConfigManager, EnvProvider};
pub use diagnostics::{DiagnosticFormatter, DiagnosticReport, SourceLineIndex, wrap_text};
pub use discovery::SchemaDiscovery;
pub use engine::{CaseOutcome, ConformanceEngine, DocumentProducer};
pub use error::ValidationError;
pub use libxml2::{LibXml2Wrapper, XmlSchemaPtr};
pub use schema_loader::{
    LoadPolicy, LoadPolicySet, LoadedSchemas, PolicyRule, SchemaFileLoader, SchemaSource,
    SkippedSchema,
};
pub use validator::{
    Severity, StreamingValidator, ValidationOptions, ViolationCollector, ViolationEvent,
};
