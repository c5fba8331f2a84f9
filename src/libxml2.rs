//! LibXML2 FFI Wrapper Module
//!
//! Safe wrappers around the parts of libxml2 the conformance pipeline needs:
//! schema compilation (from a file path, a pre-parsed document, or memory),
//! hardened document reads for legacy schema files, and reader-integrated
//! streaming validation with structured error capture.
//!
//! ## Why direct FFI
//!
//! The Rust XML ecosystem has good parsers (`quick-xml`, `roxmltree`) but no
//! mature XSD validator. Official e-invoice schema sets (Factur-X/ZUGFeRD,
//! UBL 2.1) are large, cross-importing, and lean on the full XSD 1.0 feature
//! set, so libxml2 is the only practical engine. We bind the handful of
//! functions we need and wrap every handle in an RAII guard.
//!
//! ## Thread Safety Strategy
//!
//! - **Initialization**: guarded by `std::sync::Once`.
//! - **Schema parsing**: NOT thread-safe in libxml2; serialized process-wide
//!   through `SCHEMA_PARSE_LOCK`.
//! - **Validation**: thread-safe for distinct validation contexts; each call
//!   creates its own reader and validation context over a shared,
//!   read-only compiled schema.
//! - **Error capture**: the global structured error handler is thread-local
//!   in libxml2, so `ErrorSinkGuard` only affects the calling thread.

use std::ffi::{CStr, CString};
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::ptr;
use std::sync::{Arc, Mutex, Once};

use libc::{c_char, c_int, c_void};

use crate::error::{LibXml2Error, LibXml2Result};

/// Global initialization flag for libxml2
static LIBXML2_INIT: Once = Once::new();

/// libxml2's schema parser keeps global state; compile one schema at a time.
static SCHEMA_PARSE_LOCK: Mutex<()> = Mutex::new(());

// Parser option bits (xmlParserOption)
const XML_PARSE_NOERROR: c_int = 1 << 5;
const XML_PARSE_NOWARNING: c_int = 1 << 6;
const XML_PARSE_NONET: c_int = 1 << 11;
const XML_PARSE_BIG_LINES: c_int = 1 << 22;

/// Options for documents that are validated: no network access, real line
/// numbers past 65535.
const READER_OPTIONS: c_int = XML_PARSE_NONET | XML_PARSE_BIG_LINES;

/// Options for legacy schema files: no network, no external DTD loading, no
/// entity substitution, and no error output.
const HARDENED_OPTIONS: c_int =
    XML_PARSE_NONET | XML_PARSE_NOERROR | XML_PARSE_NOWARNING | XML_PARSE_BIG_LINES;

// Error domains (xmlErrorDomain)
pub const XML_FROM_PARSER: i32 = 1;
pub const XML_FROM_NAMESPACE: i32 = 3;
pub const XML_FROM_IO: i32 = 8;
pub const XML_FROM_SCHEMASP: i32 = 16;
pub const XML_FROM_SCHEMASV: i32 = 17;

// Opaque libxml2 structures
#[repr(C)]
pub struct XmlSchema {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaParserCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlSchemaValidCtxt {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlDoc {
    _private: [u8; 0],
}

#[repr(C)]
pub struct XmlTextReader {
    _private: [u8; 0],
}

#[cfg_attr(target_os = "windows", link(name = "libxml2"))]
#[cfg_attr(not(target_os = "windows"), link(name = "xml2"))]
unsafe extern "C" {
    pub fn xmlInitParser();
    pub fn xmlInitGlobals();

    pub fn xmlSetStructuredErrorFunc(ctx: *mut c_void, handler: XmlStructuredErrorFunc);

    // Documents
    pub fn xmlReadFile(filename: *const c_char, encoding: *const c_char, options: c_int)
    -> *mut XmlDoc;
    pub fn xmlReadMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlDoc;
    pub fn xmlFreeDoc(doc: *mut XmlDoc);

    // Schema parsing
    pub fn xmlSchemaNewParserCtxt(url: *const c_char) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaNewDocParserCtxt(doc: *mut XmlDoc) -> *mut XmlSchemaParserCtxt;
    pub fn xmlSchemaSetParserStructuredErrors(
        ctxt: *mut XmlSchemaParserCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );
    pub fn xmlSchemaParse(ctxt: *const XmlSchemaParserCtxt) -> *mut XmlSchema;
    pub fn xmlSchemaFreeParserCtxt(ctxt: *mut XmlSchemaParserCtxt);
    pub fn xmlSchemaFree(schema: *mut XmlSchema);

    // Schema validation
    pub fn xmlSchemaNewValidCtxt(schema: *const XmlSchema) -> *mut XmlSchemaValidCtxt;
    pub fn xmlSchemaFreeValidCtxt(ctxt: *mut XmlSchemaValidCtxt);
    pub fn xmlSchemaSetValidStructuredErrors(
        ctxt: *mut XmlSchemaValidCtxt,
        serror: XmlStructuredErrorFunc,
        ctx: *mut c_void,
    );

    // Streaming reader
    pub fn xmlReaderForMemory(
        buffer: *const c_char,
        size: c_int,
        url: *const c_char,
        encoding: *const c_char,
        options: c_int,
    ) -> *mut XmlTextReader;
    pub fn xmlTextReaderSetStructuredErrorHandler(
        reader: *mut XmlTextReader,
        f: XmlStructuredErrorFunc,
        arg: *mut c_void,
    );
    pub fn xmlTextReaderSchemaValidateCtxt(
        reader: *mut XmlTextReader,
        ctxt: *mut XmlSchemaValidCtxt,
        options: c_int,
    ) -> c_int;
    pub fn xmlTextReaderRead(reader: *mut XmlTextReader) -> c_int;
    pub fn xmlFreeTextReader(reader: *mut XmlTextReader);
}

#[repr(C)]
pub struct xmlError {
    pub domain: c_int,
    pub code: c_int,
    pub message: *const c_char,
    pub level: c_int,
    pub file: *const c_char,
    pub line: c_int,
    pub str1: *const c_char,
    pub str2: *const c_char,
    pub str3: *const c_char,
    pub int1: c_int,
    pub int2: c_int,
    pub ctxt: *mut c_void,
    pub node: *mut c_void,
}

pub type XmlStructuredErrorFunc =
    Option<unsafe extern "C" fn(user_data: *mut c_void, error: *mut xmlError)>;

/// Severity as reported by libxml2 (xmlErrorLevel)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorLevel {
    None,
    Warning,
    Error,
    Fatal,
}

impl From<c_int> for ErrorLevel {
    fn from(level: c_int) -> Self {
        match level {
            1 => ErrorLevel::Warning,
            2 => ErrorLevel::Error,
            3 => ErrorLevel::Fatal,
            _ => ErrorLevel::None,
        }
    }
}

/// An owned copy of one structured libxml2 error.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct XmlDiagnostic {
    pub domain: i32,
    pub code: i32,
    pub level: ErrorLevel,
    pub message: String,
    pub file: Option<String>,
    pub line: i32,
    /// libxml2 reports the column in `int2`; 0 when unknown.
    pub column: i32,
}

impl XmlDiagnostic {
    /// Well-formedness failures reported by the XML parser itself.
    pub fn is_well_formedness_error(&self) -> bool {
        self.level == ErrorLevel::Fatal
            && matches!(self.domain, XML_FROM_PARSER | XML_FROM_NAMESPACE)
    }

    unsafe fn from_raw(error: &xmlError) -> Self {
        let message = unsafe { opt_string(error.message) }
            .map(|s| s.trim().to_string())
            .unwrap_or_default();

        XmlDiagnostic {
            domain: error.domain,
            code: error.code,
            level: ErrorLevel::from(error.level),
            message,
            file: unsafe { opt_string(error.file) },
            line: error.line,
            column: error.int2,
        }
    }
}

unsafe fn opt_string(ptr: *const c_char) -> Option<String> {
    if ptr.is_null() {
        None
    } else {
        Some(unsafe { CStr::from_ptr(ptr) }.to_string_lossy().into_owned())
    }
}

/// Callback for libxml2 to report errors (structured)
unsafe extern "C" fn structured_error_callback(user_data: *mut c_void, error: *mut xmlError) {
    if user_data.is_null() || error.is_null() {
        return;
    }

    let sink = unsafe { &mut *(user_data as *mut Vec<XmlDiagnostic>) };
    sink.push(unsafe { XmlDiagnostic::from_raw(&*error) });
}

/// Routes this thread's global libxml2 structured errors into a sink for the
/// lifetime of the guard, so nothing reaches stderr.
struct ErrorSinkGuard;

impl ErrorSinkGuard {
    fn install(sink: &mut Vec<XmlDiagnostic>) -> Self {
        unsafe {
            xmlSetStructuredErrorFunc(
                sink as *mut Vec<XmlDiagnostic> as *mut c_void,
                Some(structured_error_callback),
            );
        }
        ErrorSinkGuard
    }
}

impl Drop for ErrorSinkGuard {
    fn drop(&mut self) {
        unsafe {
            xmlSetStructuredErrorFunc(ptr::null_mut(), None);
        }
    }
}

/// Owned, parsed XML document (`xmlDocPtr`).
#[derive(Debug)]
pub struct XmlDocument {
    ptr: *mut XmlDoc,
}

// Safety: the document is exclusively owned and only touched by one thread at a time.
unsafe impl Send for XmlDocument {}

impl XmlDocument {
    fn into_raw(self) -> *mut XmlDoc {
        let ptr = self.ptr;
        std::mem::forget(self);
        ptr
    }
}

impl Drop for XmlDocument {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { xmlFreeDoc(self.ptr) };
        }
    }
}

struct ParserCtxtGuard(*mut XmlSchemaParserCtxt);

impl Drop for ParserCtxtGuard {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeParserCtxt(self.0) };
    }
}

struct ValidCtxtGuard(*mut XmlSchemaValidCtxt);

impl Drop for ValidCtxtGuard {
    fn drop(&mut self) {
        unsafe { xmlSchemaFreeValidCtxt(self.0) };
    }
}

struct ReaderGuard(*mut XmlTextReader);

impl Drop for ReaderGuard {
    fn drop(&mut self) {
        unsafe { xmlFreeTextReader(self.0) };
    }
}

/// Thread-safe wrapper for a compiled libxml2 schema
///
/// When the schema was compiled from a pre-parsed document, that document is
/// kept alive alongside it (schema components may point into its nodes) and
/// freed after the schema.
#[derive(Debug, Clone)]
pub struct XmlSchemaPtr {
    inner: Arc<XmlSchemaInner>,
}

#[derive(Debug)]
struct XmlSchemaInner {
    ptr: *mut XmlSchema,
    doc: *mut XmlDoc,
    _phantom: PhantomData<XmlSchema>,
}

// Safety: libxml2 compiled schemas are read-only during validation and safe to
// share between threads, each of which creates its own validation context.
unsafe impl Send for XmlSchemaInner {}
unsafe impl Sync for XmlSchemaInner {}

impl XmlSchemaPtr {
    /// # Safety
    ///
    /// `ptr` must come from `xmlSchemaParse` and be owned by nobody else;
    /// `doc`, when non-null, must be the document it was parsed from.
    unsafe fn from_raw(ptr: *mut XmlSchema, doc: *mut XmlDoc) -> LibXml2Result<Self> {
        if ptr.is_null() {
            if !doc.is_null() {
                unsafe { xmlFreeDoc(doc) };
            }
            return Err(LibXml2Error::SchemaParseFailed);
        }

        Ok(XmlSchemaPtr {
            inner: Arc::new(XmlSchemaInner {
                ptr,
                doc,
                _phantom: PhantomData,
            }),
        })
    }

    pub(crate) fn as_ptr(&self) -> *const XmlSchema {
        self.inner.ptr
    }

    pub fn is_valid(&self) -> bool {
        !self.inner.ptr.is_null()
    }
}

impl Drop for XmlSchemaInner {
    fn drop(&mut self) {
        unsafe {
            if !self.ptr.is_null() {
                xmlSchemaFree(self.ptr);
                self.ptr = ptr::null_mut();
            }
            if !self.doc.is_null() {
                xmlFreeDoc(self.doc);
                self.doc = ptr::null_mut();
            }
        }
    }
}

/// Outcome of one schema compilation: the schema (if any) plus everything
/// libxml2 reported while building it.
#[derive(Debug)]
pub struct SchemaCompilation {
    pub schema: LibXml2Result<XmlSchemaPtr>,
    pub diagnostics: Vec<XmlDiagnostic>,
}

/// Outcome of driving a text reader over a document.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamValidation {
    /// Every structured error in the order libxml2 emitted it.
    pub diagnostics: Vec<XmlDiagnostic>,
    /// False when the reader stopped before end-of-stream.
    pub completed: bool,
}

impl StreamValidation {
    /// First fatal well-formedness error, if the stream was broken.
    pub fn well_formedness_error(&self) -> Option<&XmlDiagnostic> {
        self.diagnostics
            .iter()
            .find(|d| d.is_well_formedness_error())
    }
}

/// LibXML2 wrapper providing safe access to libxml2 functionality
pub struct LibXml2Wrapper {
    _phantom: PhantomData<()>,
}

impl LibXml2Wrapper {
    /// Create a new wrapper; libxml2 is initialized exactly once per process.
    pub fn new() -> Self {
        LIBXML2_INIT.call_once(|| unsafe {
            xmlInitParser();
            xmlInitGlobals();
        });

        LibXml2Wrapper {
            _phantom: PhantomData,
        }
    }

    /// Compile a schema directly from its path. Imports and includes are
    /// resolved relative to the file.
    pub fn compile_schema_file(&self, path: &Path) -> SchemaCompilation {
        let c_path = match path_to_uri_cstring(path) {
            Ok(p) => p,
            Err(e) => {
                return SchemaCompilation {
                    schema: Err(e),
                    diagnostics: Vec::new(),
                };
            }
        };

        self.compile_with(
            || unsafe { xmlSchemaNewParserCtxt(c_path.as_ptr()) },
            ptr::null_mut(),
            path,
        )
    }

    /// Compile a schema from an already parsed document. The document is
    /// owned by the resulting schema, or freed when compilation fails.
    pub fn compile_schema_document(&self, doc: XmlDocument, source: &Path) -> SchemaCompilation {
        let raw_doc = doc.into_raw();
        self.compile_with(|| unsafe { xmlSchemaNewDocParserCtxt(raw_doc) }, raw_doc, source)
    }

    /// Parse an XML schema from a memory buffer. `base_url` anchors relative
    /// imports.
    pub fn parse_schema_from_memory(
        &self,
        schema_data: &[u8],
        base_url: Option<&str>,
    ) -> SchemaCompilation {
        let mut diagnostics = Vec::new();
        let doc = {
            let _sink = ErrorSinkGuard::install(&mut diagnostics);
            read_memory(schema_data, base_url, READER_OPTIONS)
        };

        match doc {
            Ok(doc) => {
                let mut compilation = self.compile_schema_document(doc, Path::new("<memory>"));
                diagnostics.append(&mut compilation.diagnostics);
                compilation.diagnostics = diagnostics;
                compilation
            }
            Err(e) => SchemaCompilation {
                schema: Err(e),
                diagnostics,
            },
        }
    }

    /// Parse a file with external entity and DTD processing disabled and all
    /// error output swallowed. Returns `DocumentParseFailed` when libxml2
    /// yields no document.
    pub fn read_document_hardened(&self, path: &Path) -> LibXml2Result<XmlDocument> {
        let c_path = path_to_cstring(path)?;

        let mut discarded = Vec::new();
        let doc = {
            let _sink = ErrorSinkGuard::install(&mut discarded);
            unsafe { xmlReadFile(c_path.as_ptr(), ptr::null(), HARDENED_OPTIONS) }
        };

        if doc.is_null() {
            return Err(LibXml2Error::DocumentParseFailed {
                path: path.to_path_buf(),
            });
        }

        Ok(XmlDocument { ptr: doc })
    }

    /// Drive a text reader over `data` to end-of-stream, validating against
    /// `schema` as a side effect of traversal. With no schema only
    /// well-formedness is checked.
    ///
    /// Safe to call concurrently: every call owns its reader and validation
    /// context.
    pub fn validate_stream(
        &self,
        schema: Option<&XmlSchemaPtr>,
        data: &[u8],
        base_url: Option<&str>,
    ) -> LibXml2Result<StreamValidation> {
        let size = c_int::try_from(data.len())
            .map_err(|_| LibXml2Error::InputTooLarge { size: data.len() })?;
        let c_url = base_url.map(CString::new).transpose().map_err(|_| {
            LibXml2Error::InvalidPath {
                path: base_url.unwrap_or_default().into(),
            }
        })?;

        // Drop order matters: the reader is freed before the validation
        // context it plugs into, and both before the sink.
        let mut diagnostics: Vec<XmlDiagnostic> = Vec::new();
        let sink_ptr = &mut diagnostics as *mut Vec<XmlDiagnostic> as *mut c_void;

        let valid_ctxt = match schema {
            Some(schema) => {
                let ctxt = unsafe { xmlSchemaNewValidCtxt(schema.as_ptr()) };
                if ctxt.is_null() {
                    return Err(LibXml2Error::ValidationContextCreationFailed);
                }
                Some(ValidCtxtGuard(ctxt))
            }
            None => None,
        };

        let reader = unsafe {
            xmlReaderForMemory(
                data.as_ptr() as *const c_char,
                size,
                c_url.as_ref().map_or(ptr::null(), |u| u.as_ptr()),
                ptr::null(),
                READER_OPTIONS,
            )
        };
        if reader.is_null() {
            return Err(LibXml2Error::ReaderCreationFailed);
        }
        let reader = ReaderGuard(reader);

        unsafe {
            xmlTextReaderSetStructuredErrorHandler(
                reader.0,
                Some(structured_error_callback),
                sink_ptr,
            );
        }

        if let Some(ctxt) = &valid_ctxt {
            unsafe {
                xmlSchemaSetValidStructuredErrors(ctxt.0, Some(structured_error_callback), sink_ptr);
                if xmlTextReaderSchemaValidateCtxt(reader.0, ctxt.0, 0) != 0 {
                    return Err(LibXml2Error::ValidationContextCreationFailed);
                }
            }
        }

        let completed = loop {
            match unsafe { xmlTextReaderRead(reader.0) } {
                1 => continue,
                0 => break true,
                _ => break false,
            }
        };

        drop(reader);
        drop(valid_ctxt);

        Ok(StreamValidation {
            diagnostics,
            completed,
        })
    }

    /// `owned_doc` (possibly null) is handed to the resulting schema, or
    /// freed when there is none.
    fn compile_with<F>(
        &self,
        make_ctxt: F,
        owned_doc: *mut XmlDoc,
        source: &Path,
    ) -> SchemaCompilation
    where
        F: FnOnce() -> *mut XmlSchemaParserCtxt,
    {
        let _parse_lock = SCHEMA_PARSE_LOCK
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());

        let mut diagnostics: Vec<XmlDiagnostic> = Vec::new();
        let schema = {
            let _sink = ErrorSinkGuard::install(&mut diagnostics);

            let ctxt = make_ctxt();
            if ctxt.is_null() {
                if !owned_doc.is_null() {
                    unsafe { xmlFreeDoc(owned_doc) };
                }
                Err(LibXml2Error::ParserContextCreationFailed {
                    source_name: source.display().to_string(),
                })
            } else {
                let ctxt = ParserCtxtGuard(ctxt);
                unsafe {
                    xmlSchemaSetParserStructuredErrors(
                        ctxt.0,
                        Some(structured_error_callback),
                        &mut diagnostics as *mut Vec<XmlDiagnostic> as *mut c_void,
                    );
                    let raw = xmlSchemaParse(ctxt.0);
                    XmlSchemaPtr::from_raw(raw, owned_doc)
                }
            }
        };

        SchemaCompilation {
            schema,
            diagnostics,
        }
    }
}

impl Default for LibXml2Wrapper {
    fn default() -> Self {
        Self::new()
    }
}

fn path_to_cstring(path: &Path) -> LibXml2Result<CString> {
    path.to_str()
        .and_then(|s| CString::new(s).ok())
        .ok_or_else(|| LibXml2Error::InvalidPath {
            path: path.to_path_buf(),
        })
}

/// Schema imports resolve against the document URL, which libxml2 only
/// accepts as a valid URI. Absolute paths become escaped `file://` URLs;
/// libxml2 unescapes those again when opening the file.
fn path_to_uri_cstring(path: &Path) -> LibXml2Result<CString> {
    let invalid = || LibXml2Error::InvalidPath {
        path: path.to_path_buf(),
    };
    let absolute = std::path::absolute(path).map_err(|_| invalid())?;
    let raw = absolute.to_str().ok_or_else(invalid)?;

    let mut url = String::with_capacity(raw.len() + 8);
    if raw.starts_with('/') {
        url.push_str("file://");
    }
    for byte in raw.bytes() {
        match byte {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' => url.push(byte as char),
            b'-' | b'.' | b'_' | b'~' | b'/' | b'!' | b'$' | b'&' | b'\'' | b'(' | b')' | b'*'
            | b'+' | b',' | b';' | b'=' | b':' | b'@' => url.push(byte as char),
            other => url.push_str(&format!("%{:02X}", other)),
        }
    }

    CString::new(url).map_err(|_| invalid())
}

/// Reverse of [`path_to_uri_cstring`] for file names libxml2 reports back.
pub(crate) fn file_url_to_path(reported: &str) -> PathBuf {
    let Some(escaped) = reported.strip_prefix("file://") else {
        return PathBuf::from(reported);
    };

    let bytes = escaped.as_bytes();
    let mut decoded = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let hex = bytes
            .get(i + 1..i + 3)
            .and_then(|h| std::str::from_utf8(h).ok())
            .and_then(|h| u8::from_str_radix(h, 16).ok());
        match (bytes[i], hex) {
            (b'%', Some(byte)) => {
                decoded.push(byte);
                i += 3;
            }
            (byte, _) => {
                decoded.push(byte);
                i += 1;
            }
        }
    }
    PathBuf::from(String::from_utf8_lossy(&decoded).into_owned())
}

fn read_memory(data: &[u8], base_url: Option<&str>, options: c_int) -> LibXml2Result<XmlDocument> {
    let size =
        c_int::try_from(data.len()).map_err(|_| LibXml2Error::InputTooLarge { size: data.len() })?;
    let c_url = base_url.and_then(|u| CString::new(u).ok());

    let doc = unsafe {
        xmlReadMemory(
            data.as_ptr() as *const c_char,
            size,
            c_url.as_ref().map_or(ptr::null(), |u| u.as_ptr()),
            ptr::null(),
            options,
        )
    };

    if doc.is_null() {
        return Err(LibXml2Error::DocumentParseFailed {
            path: base_url.unwrap_or("<memory>").into(),
        });
    }

    Ok(XmlDocument { ptr: doc })
}
