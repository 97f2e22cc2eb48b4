use thiserror::Error;

/// Result type alias using ExError
pub type Result<T> = std::result::Result<T, ExError>;

// ========== Error Facility ==========

/// Canonical error kind taxonomy
///
/// Each kind maps to a stable error code that can be used for programmatic
/// error handling, testing, and operator-facing reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExErrorKind {
    // Records
    /// A stored member could not be parsed into a diff record
    Decode,
    InvalidInput,
    InvalidConfig,

    // Store
    /// The time-series store could not be reached
    StoreUnavailable,
    /// A key exists but does not hold an ordered collection
    KeyTypeMismatch,
    /// A valid query surface that this manager was not configured for
    NotImplemented,

    // Integration/IO
    Io,
    Serialization,
    Persistence,

    // Internal
    Internal,
}

impl ExErrorKind {
    /// Get the stable error code for this kind
    pub fn code(&self) -> &'static str {
        match self {
            ExErrorKind::Decode => "ERR_DECODE",
            ExErrorKind::InvalidInput => "ERR_INVALID_INPUT",
            ExErrorKind::InvalidConfig => "ERR_INVALID_CONFIG",
            ExErrorKind::StoreUnavailable => "ERR_STORE_UNAVAILABLE",
            ExErrorKind::KeyTypeMismatch => "ERR_KEY_TYPE_MISMATCH",
            ExErrorKind::NotImplemented => "ERR_NOT_IMPLEMENTED",
            ExErrorKind::Io => "ERR_IO",
            ExErrorKind::Serialization => "ERR_SERIALIZATION",
            ExErrorKind::Persistence => "ERR_PERSISTENCE",
            ExErrorKind::Internal => "ERR_INTERNAL",
        }
    }
}

/// Canonical structured error type
///
/// Carries a classification for programmatic handling plus the context
/// (operation, store key, entity id) needed to make a failure actionable.
#[derive(Debug, Clone)]
pub struct ExError {
    kind: ExErrorKind,
    op: Option<String>,
    key: Option<String>,
    entity_id: Option<String>,
    message: String,
}

impl ExError {
    /// Create a new error with the specified kind
    pub fn new(kind: ExErrorKind) -> Self {
        Self {
            kind,
            op: None,
            key: None,
            entity_id: None,
            message: String::new(),
        }
    }

    /// Add operation context
    pub fn with_op(mut self, op: impl Into<String>) -> Self {
        self.op = Some(op.into());
        self
    }

    /// Add store key context
    pub fn with_key(mut self, key: impl Into<String>) -> Self {
        self.key = Some(key.into());
        self
    }

    /// Add entity ID context
    pub fn with_entity_id(mut self, id: impl Into<String>) -> Self {
        self.entity_id = Some(id.into());
        self
    }

    /// Add custom message
    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = message.into();
        self
    }

    /// Get the error kind
    pub fn kind(&self) -> ExErrorKind {
        self.kind
    }

    /// Get the stable error code
    pub fn code(&self) -> &'static str {
        self.kind.code()
    }

    pub fn op(&self) -> Option<&str> {
        self.op.as_deref()
    }

    pub fn key(&self) -> Option<&str> {
        self.key.as_deref()
    }

    pub fn entity_id(&self) -> Option<&str> {
        self.entity_id.as_deref()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    /// True when the failure is confined to one key and a batch pass may
    /// move on to the next key.
    pub fn is_per_key(&self) -> bool {
        !matches!(
            self.kind,
            ExErrorKind::StoreUnavailable | ExErrorKind::Internal
        )
    }
}

impl std::fmt::Display for ExError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}]", self.code())?;
        if let Some(op) = &self.op {
            write!(f, " in operation '{}'", op)?;
        }
        if !self.message.is_empty() {
            write!(f, ": {}", self.message)?;
        }
        if let Some(key) = &self.key {
            write!(f, " (key: {})", key)?;
        }
        if let Some(entity_id) = &self.entity_id {
            write!(f, " (entity_id: {})", entity_id)?;
        }
        Ok(())
    }
}

impl std::error::Error for ExError {}

// ========== End Error Facility ==========

/// Failures while decoding a stored member into a diff record
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    /// Member bytes are not valid structured text
    #[error("Invalid record syntax: {reason}")]
    InvalidSyntax { reason: String },

    /// A required field is absent
    #[error("Missing required field: {field}")]
    MissingField { field: &'static str },

    /// A field is present but has the wrong type
    #[error("Invalid field {field}: {reason}")]
    InvalidField { field: &'static str, reason: String },
}

impl From<DecodeError> for ExError {
    fn from(err: DecodeError) -> Self {
        ExError::new(ExErrorKind::Decode)
            .with_op("decode_record")
            .with_message(err.to_string())
    }
}

/// Build a `KeyTypeMismatch` error for a key holding a non-ordered value
pub fn key_type_mismatch(op: &str, key: &str) -> ExError {
    ExError::new(ExErrorKind::KeyTypeMismatch)
        .with_op(op)
        .with_key(key)
        .with_message("key holds a value that is not an ordered collection")
}

/// Build an `Internal` error for a poisoned lock
pub fn lock_poisoned(op: &str) -> ExError {
    ExError::new(ExErrorKind::Internal)
        .with_op(op)
        .with_message("store lock poisoned")
}
