//! Error types for the reconciliation core.
//!
//! # Design
//! Every failure carries enough context to reproduce it: construction and
//! state-mapping failures name the attribute path, transport failures carry
//! the Graph error envelope, and resolution failures carry the rejected
//! input together with the values that would have been accepted.
//!
//! `PostWriteRead` and `NotFound` never overlap: the former means
//! "written but never confirmed", the latter "never existed".

use thiserror::Error;

/// Result alias used throughout the crate.
pub type ReconcileResult<T> = Result<T, ReconcileError>;

/// Whether a resolution query addressed its target by id or by name.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryKind {
    Id,
    Name,
}

impl QueryKind {
    pub fn label(self) -> &'static str {
        match self {
            QueryKind::Id => "id",
            QueryKind::Name => "name",
        }
    }
}

/// A non-2xx response, decoded from the `{"error":{"code","message"}}` envelope.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("HTTP {status} {code}: {message}")]
pub struct TransportError {
    pub status: u16,
    pub code: String,
    pub message: String,
}

impl TransportError {
    pub fn is_not_found(&self) -> bool {
        self.status == 404
    }
}

/// Errors produced by the reconciliation core.
#[derive(Debug, Error)]
pub enum ReconcileError {
    /// The local model could not be translated into a request body.
    #[error("cannot build request value for `{path}`: {message}")]
    Construction { path: String, message: String },

    /// A response field could not be mapped into the local model.
    #[error("cannot map response value for `{path}`: {message}")]
    StateMapping { path: String, message: String },

    /// The service answered with a non-2xx status.
    #[error(transparent)]
    Transport(#[from] TransportError),

    /// The request never produced a response.
    #[error("network failure: {0}")]
    Network(String),

    /// No candidate matched the query exactly.
    #[error("no {resource} found with {} \"{input}\"", .kind.label())]
    NotFound {
        resource: String,
        kind: QueryKind,
        input: String,
        suggestions: Vec<String>,
        valid: Vec<String>,
        /// Configuration attribute that carried the lookup, when known.
        attribute: Option<String>,
    },

    /// Several candidates share the queried name.
    #[error("{} {resource} objects are named \"{input}\"", .ids.len())]
    Ambiguous {
        resource: String,
        input: String,
        ids: Vec<String>,
    },

    /// The service returned no candidates at all.
    #[error("the service returned no {resource} objects to choose from")]
    NoCandidates { resource: String },

    /// A read succeeded but does not yet reflect the write.
    #[error("read does not reflect the write yet; differing attributes: {}", .fields.join(", "))]
    Stale { fields: Vec<String> },

    /// The consistency guard ran out of attempts.
    #[error(
        "{resource} was written but could not be read back after {attempts} attempts; \
         the write may have partially succeeded: {source}"
    )]
    PostWriteRead {
        resource: String,
        attempts: u32,
        #[source]
        source: Box<ReconcileError>,
    },

    /// The caller's deadline passed during a guarded operation.
    #[error("deadline exceeded after {attempts} read attempts")]
    DeadlineExceeded { attempts: u32 },

    /// The caller cancelled a guarded operation.
    #[error("operation cancelled after {attempts} read attempts")]
    Cancelled { attempts: u32 },

    #[error(transparent)]
    Schema(#[from] SchemaError),

    #[error("serialization failed: {0}")]
    Serialization(String),

    #[error("deserialization failed: {0}")]
    Deserialization(String),

    #[error("configuration error: {0}")]
    Config(String),
}

impl ReconcileError {
    pub fn construction(path: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::Construction {
            path: path.into(),
            message: message.into(),
        }
    }

    pub fn state_mapping(path: impl Into<String>, message: impl Into<String>) -> Self {
        ReconcileError::StateMapping {
            path: path.into(),
            message: message.into(),
        }
    }

    /// True for a transport 404.
    pub fn is_not_found(&self) -> bool {
        matches!(self, ReconcileError::Transport(e) if e.is_not_found())
    }

    /// Classification used by the consistency guard after a successful write.
    ///
    /// A 404 counts as transient here because the object was just written.
    pub fn is_retryable_after_write(&self) -> bool {
        match self {
            ReconcileError::Transport(e) => {
                matches!(e.status, 404 | 409 | 429) || e.status >= 500
            }
            ReconcileError::Network(_) | ReconcileError::Stale { .. } => true,
            _ => false,
        }
    }
}

/// Errors raised while binding a mapping table to its schema.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaError {
    #[error("schema attribute `{0}` has no field mapping")]
    Unmapped(String),

    #[error("field mapping `{0}` does not name a schema attribute")]
    UnknownAttribute(String),

    #[error("attribute `{0}` is mapped more than once")]
    DuplicateMapping(String),

    #[error("remote path `{remote}` is mapped by both `{first}` and `{second}`")]
    DuplicateRemote {
        remote: String,
        first: String,
        second: String,
    },

    #[error("field mapping `{0}` has an empty remote path")]
    EmptyRemotePath(String),

    #[error("object attribute `{0}` needs nested field mappings")]
    MissingNested(String),

    #[error("attribute `{0}` is not an object but declares nested field mappings")]
    UnexpectedNested(String),

    #[error("transform {transform} cannot apply to attribute `{path}` of kind {kind}")]
    TransformMismatch {
        path: String,
        transform: String,
        kind: String,
    },
}
