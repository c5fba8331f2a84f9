use std::path::PathBuf;

use thiserror::Error;

/// Main error type for the conformance pipeline.
///
/// Schema rule violations are never represented here: they are data
/// (`ViolationEvent`) and flow to the caller inside a `DiagnosticReport`.
/// Only bundle assembly and malformed input abort a run.
#[derive(Error, Debug)]
pub enum ValidationError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Schema file unreadable: {path} - {reason}")]
    SchemaFileUnreadable { path: PathBuf, reason: String },

    #[error("Schema assembly failed: {directory} - {details}")]
    SchemaAssemblyFailed { directory: PathBuf, details: String },

    #[error("Schema compilation failed: {path} - {details}")]
    SchemaCompileFailed { path: PathBuf, details: String },

    #[error("Malformed document at line {line}, column {column}: {message}")]
    MalformedDocument {
        line: u32,
        column: u32,
        message: String,
    },

    #[error("No schema directory configured for case {key}")]
    UnknownCase { key: String },

    #[error("Document production failed: {0}")]
    DocumentProduction(#[from] anyhow::Error),

    #[error("Cache error: {0}")]
    Cache(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("LibXML2 internal error: {details}")]
    LibXml2Internal { details: String },

    #[error("File system traversal error: {path} - {reason}")]
    FileSystemTraversal { path: PathBuf, reason: String },
}

impl ValidationError {
    /// Whether this error aborts the pipeline as opposed to being recovered
    /// locally by the loader.
    pub fn is_fatal(&self) -> bool {
        !matches!(self, ValidationError::SchemaFileUnreadable { .. })
    }
}

/// LibXML2-specific error types
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum LibXml2Error {
    #[error("Schema parsing failed: null pointer returned")]
    SchemaParseFailed,

    #[error("Schema parser context creation failed: {source_name}")]
    ParserContextCreationFailed { source_name: String },

    #[error("Validation context creation failed")]
    ValidationContextCreationFailed,

    #[error("Text reader creation failed")]
    ReaderCreationFailed,

    #[error("Document parsing failed: {path}")]
    DocumentParseFailed { path: PathBuf },

    #[error("Path is not representable as a C string: {path}")]
    InvalidPath { path: PathBuf },

    #[error("Input of {size} bytes exceeds the libxml2 buffer limit")]
    InputTooLarge { size: usize },
}

impl From<LibXml2Error> for ValidationError {
    fn from(err: LibXml2Error) -> Self {
        ValidationError::LibXml2Internal {
            details: err.to_string(),
        }
    }
}

impl From<crate::config::ConfigError> for ValidationError {
    fn from(err: crate::config::ConfigError) -> Self {
        ValidationError::Config(err.to_string())
    }
}

/// Result type alias for convenience
pub type Result<T> = std::result::Result<T, ValidationError>;

/// LibXML2 result type alias
pub type LibXml2Result<T> = std::result::Result<T, LibXml2Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_validation_error_display() {
        let io_error = ValidationError::Io(std::io::Error::new(
            std::io::ErrorKind::NotFound,
            "File not found",
        ));
        assert!(io_error.to_string().contains("IO error"));

        let assembly = ValidationError::SchemaAssemblyFailed {
            directory: PathBuf::from("/schemas/zugferd23"),
            details: "no usable schemas".to_string(),
        };
        assert!(assembly.to_string().contains("Schema assembly failed"));
        assert!(assembly.to_string().contains("/schemas/zugferd23"));
        assert!(assembly.to_string().contains("no usable schemas"));

        let malformed = ValidationError::MalformedDocument {
            line: 12,
            column: 7,
            message: "Opening and ending tag mismatch".to_string(),
        };
        assert!(malformed.to_string().contains("line 12"));
        assert!(malformed.to_string().contains("column 7"));
    }

    #[test]
    fn test_libxml2_error_display() {
        let parse_failed = LibXml2Error::SchemaParseFailed;
        assert!(parse_failed.to_string().contains("Schema parsing failed"));

        let too_large = LibXml2Error::InputTooLarge { size: 42 };
        assert!(too_large.to_string().contains("42 bytes"));
    }

    #[test]
    fn test_libxml2_error_conversion() {
        let validation_error: ValidationError = LibXml2Error::SchemaParseFailed.into();

        match validation_error {
            ValidationError::LibXml2Internal { details } => {
                assert!(details.contains("Schema parsing failed"))
            }
            _ => panic!("Expected ValidationError::LibXml2Internal"),
        }
    }

    #[test]
    fn test_document_production_wraps_anyhow() {
        use std::error::Error;

        let err: ValidationError = anyhow::anyhow!("serializer exploded").into();
        assert!(err.to_string().contains("serializer exploded"));
        assert!(err.source().is_some());
    }

    #[test]
    fn test_only_unreadable_files_are_recoverable() {
        let unreadable = ValidationError::SchemaFileUnreadable {
            path: PathBuf::from("UBL-xmldsig-core-schema-2.1.xsd"),
            reason: "no schema document".to_string(),
        };
        assert!(!unreadable.is_fatal());

        let malformed = ValidationError::MalformedDocument {
            line: 1,
            column: 1,
            message: "Start tag expected".to_string(),
        };
        assert!(malformed.is_fatal());
    }

    #[test]
    fn test_error_source_chain() {
        use std::error::Error;

        let io_error = std::io::Error::new(std::io::ErrorKind::NotFound, "File not found");
        let validation_error = ValidationError::Io(io_error);

        assert!(validation_error.source().is_some());
        assert_eq!(
            validation_error.source().unwrap().to_string(),
            "File not found"
        );
    }
}
