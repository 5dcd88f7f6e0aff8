//! Error taxonomy shared across all component crates
//!
//! Two tiers: component errors ([`VaultError`], [`CacheError`],
//! [`TokenError`], [`RotationError`], [`ValidationError`]) are produced at
//! the edge that owns the failure; the top-level [`GatewayError`] is the
//! taxonomy surfaced to the outer HTTP handlers. Translation upward happens
//! only at component boundaries; there is no throw/catch across them.
//!
//! Security-sensitive failures collapse into [`GatewayError::InvalidCredentials`]
//! without revealing whether the client was unknown or the secret wrong.

use std::time::Duration;
use thiserror::Error;

/// Input and data-shape validation errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    /// Client ID cannot be empty
    #[error("client id cannot be empty")]
    EmptyClientId,

    /// Invalid client ID
    #[error("invalid client id '{id}': {reason}")]
    InvalidClientId {
        /// The rejected id
        id: String,
        /// Why it was rejected
        reason: String,
    },

    /// Token ID cannot be empty
    #[error("token id cannot be empty")]
    EmptyTokenId,

    /// Token expiry must come after issuance
    #[error("token expiry {expires_at} is not after issuance {issued_at}")]
    NonMonotonicExpiry {
        /// Claimed issuance timestamp (RFC 3339)
        issued_at: String,
        /// Claimed expiry timestamp (RFC 3339)
        expires_at: String,
    },

    /// Credential record invariant violated
    #[error("credential record for '{client_id}' rejected: {reason}")]
    RecordInvariant {
        /// Owning client
        client_id: String,
        /// Violated invariant
        reason: String,
    },

    /// Secret hashing failed
    #[error("secret hashing failed: {0}")]
    HashingFailed(String),
}

/// Vault client errors
#[derive(Debug, Clone, Error)]
pub enum VaultError {
    /// Vault cannot be reached or answered 5xx / timed out
    #[error("vault unavailable: {reason}")]
    Unavailable {
        /// Transport-level detail (logged, never surfaced to callers)
        reason: String,
    },

    /// Vault rejected our own authentication
    #[error("vault authentication failed: {reason}")]
    Auth {
        /// Handshake failure detail
        reason: String,
    },

    /// No record at the requested path (never retried)
    #[error("vault path '{path}' not found")]
    NotFound {
        /// The missing path
        path: String,
    },

    /// Concurrent write detected by check-and-set
    #[error("concurrent write to vault path '{path}'")]
    Conflict {
        /// The contended path
        path: String,
    },

    /// Stored payload could not be decoded
    #[error("malformed payload at vault path '{path}': {reason}")]
    Malformed {
        /// The offending path
        path: String,
        /// Decode failure detail
        reason: String,
    },
}

impl VaultError {
    /// True for failures worth another attempt (transport / 5xx only).
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable { .. })
    }
}

/// Cache backend errors
///
/// These never cross the cache layer boundary: the layer logs them and
/// degrades to "absent".
#[derive(Debug, Clone, Error)]
pub enum CacheError {
    /// Backend operation failed
    #[error("cache backend error: {0}")]
    Backend(String),

    /// Backend did not answer within the cache op deadline
    #[error("cache operation exceeded {deadline:?}")]
    Timeout {
        /// The configured deadline
        deadline: Duration,
    },

    /// Entry could not be encoded or decoded
    #[error("cache serialization error: {0}")]
    Serialization(String),
}

/// Token engine errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TokenError {
    /// Token id is in the revocation set
    #[error("token '{token_id}' has been revoked")]
    Revoked {
        /// The revoked id
        token_id: String,
    },

    /// Signature did not verify with the current or previous key
    #[error("token signature invalid")]
    InvalidSignature,

    /// Token string or payload could not be parsed
    #[error("malformed token: {0}")]
    Malformed(String),

    /// Audience claim does not match the configured audience
    #[error("token audience mismatch")]
    AudienceMismatch,

    /// Issuer claim is not in the accepted set
    #[error("token issuer not accepted")]
    IssuerMismatch,

    /// Token expiry has passed
    #[error("token expired")]
    Expired,

    /// Signing failed (configuration or key material problem)
    #[error("token signing failed: {0}")]
    Signing(String),
}

/// Rotation controller errors
#[derive(Debug, Clone, Error)]
pub enum RotationError {
    /// A rotation is already in progress for this client
    #[error("rotation already in progress for client '{client_id}'")]
    AlreadyInProgress {
        /// The contended client
        client_id: String,
    },

    /// Advisory lock for this client is held elsewhere
    #[error("rotation lock for client '{client_id}' is held")]
    LockHeld {
        /// The locked client
        client_id: String,
    },

    /// Requested transition is not in the state graph
    #[error("illegal rotation transition from {from} for client '{client_id}'")]
    IllegalTransition {
        /// The client
        client_id: String,
        /// Current phase name
        from: String,
    },

    /// No rotation record for the client
    #[error("no active rotation for client '{client_id}'")]
    NotFound {
        /// The client
        client_id: String,
    },

    /// Client has no credential record to rotate
    #[error("client '{client_id}' is unknown to the vault")]
    UnknownClient {
        /// The client
        client_id: String,
    },

    /// Provisioning attempted for a client that already has credentials
    #[error("client '{client_id}' already has credentials")]
    AlreadyProvisioned {
        /// The client
        client_id: String,
    },

    /// Vault failure during a rotation step
    #[error(transparent)]
    Vault(#[from] VaultError),

    /// Record or credential shape violated an invariant
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Top-level gateway error taxonomy
///
/// This is what the excluded outer HTTP handlers translate into response
/// codes via [`GatewayError::http_status`].
#[derive(Debug, Clone, Error)]
pub enum GatewayError {
    /// Empty or malformed client id / secret / token (not a security event)
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Credential headers absent or blank
    #[error("missing credentials")]
    MissingCredentials,

    /// Credentials were checked against the vault and did not match
    #[error("invalid credentials")]
    InvalidCredentials,

    /// Token absent, expired, revoked, or carrying an invalid signature
    #[error("unauthenticated")]
    Unauthenticated,

    /// Vault unreachable and no usable fallback
    #[error("vault unavailable")]
    VaultUnavailable,

    /// Inbound request exceeded its wall-clock budget
    #[error("request deadline of {budget:?} exceeded")]
    Timeout {
        /// The configured budget
        budget: Duration,
    },

    /// A rotation is already in progress; operators retry
    #[error("rotation conflict for client '{client_id}'")]
    RotationConflict {
        /// The contended client
        client_id: String,
    },

    /// Anything unclassified; details stay in the logs
    #[error("internal error")]
    Internal(String),
}

impl GatewayError {
    /// HTTP status the outer handlers map this error to.
    pub fn http_status(&self) -> u16 {
        match self {
            Self::InvalidInput(_) | Self::MissingCredentials => 400,
            Self::InvalidCredentials | Self::Unauthenticated => 401,
            Self::RotationConflict { .. } => 409,
            Self::VaultUnavailable => 503,
            Self::Timeout { .. } => 504,
            Self::Internal(_) => 500,
        }
    }

    /// Generic message safe to echo in a response body.
    ///
    /// Details (including the payload of [`GatewayError::Internal`]) belong
    /// in structured logs keyed by correlation id, never in responses.
    pub fn public_message(&self) -> &'static str {
        match self {
            Self::InvalidInput(_) => "invalid request",
            Self::MissingCredentials => "missing credentials",
            Self::InvalidCredentials | Self::Unauthenticated => "authentication failed",
            Self::VaultUnavailable => "service temporarily unavailable",
            Self::Timeout { .. } => "request timed out",
            Self::RotationConflict { .. } => "rotation already in progress",
            Self::Internal(_) => "internal error",
        }
    }
}

impl From<ValidationError> for GatewayError {
    fn from(source: ValidationError) -> Self {
        Self::InvalidInput(source.to_string())
    }
}

impl From<VaultError> for GatewayError {
    fn from(source: VaultError) -> Self {
        match source {
            VaultError::Unavailable { .. } | VaultError::Auth { .. } => Self::VaultUnavailable,
            // NotFound is handled by the resolver before conversion; a stray
            // one means a path bug, not a caller problem.
            VaultError::NotFound { path } => Self::Internal(format!("unexpected missing path {path}")),
            VaultError::Conflict { path } => Self::Internal(format!("unexpected write conflict at {path}")),
            VaultError::Malformed { path, reason } => {
                Self::Internal(format!("malformed vault payload at {path}: {reason}"))
            }
        }
    }
}

impl From<TokenError> for GatewayError {
    fn from(source: TokenError) -> Self {
        match source {
            TokenError::Signing(reason) => Self::Internal(reason),
            _ => Self::Unauthenticated,
        }
    }
}

impl From<RotationError> for GatewayError {
    fn from(source: RotationError) -> Self {
        match source {
            RotationError::AlreadyInProgress { client_id } | RotationError::LockHeld { client_id } => {
                Self::RotationConflict { client_id }
            }
            RotationError::Vault(v) => v.into(),
            other => Self::Internal(other.to_string()),
        }
    }
}

/// Result alias for vault operations
pub type VaultResult<T> = std::result::Result<T, VaultError>;
/// Result alias for cache backend operations
pub type CacheResult<T> = std::result::Result<T, CacheError>;
/// Result alias for token engine operations
pub type TokenResult<T> = std::result::Result<T, TokenError>;
/// Result alias for rotation controller operations
pub type RotationResult<T> = std::result::Result<T, RotationError>;
/// Result alias for gateway entry points
pub type GatewayResult<T> = std::result::Result<T, GatewayError>;
