//! Errors produced while building or exercising an [`Authorizer`][crate::Authorizer]
//!
//! The taxonomy mirrors the phases of an authorization pass:
//!
//! * [`ConfigError`]: malformed or missing setup, raised once at
//!   initialization. Hosts should refuse to accept traffic when
//!   construction fails.
//! * [`SecurityError`]: a credential was presented in a shape the engine
//!   cannot work with.
//! * [`TokenVerificationError`]: the token parsed but failed cryptographic
//!   verification, with a [`VerificationErrorKind`] callers can use for
//!   custom status mapping.
//! * [`AuthError`]: the caller authenticated but is not permitted to
//!   perform the operation.
//!
//! [`AuthzError`] is the sum of the per-request failures, discriminated by
//! [`AuthzError::kind`].

use std::path::PathBuf;

use thiserror::Error;

/// Broad classification of an authorization failure
///
/// Suitable for mapping onto HTTP status codes at the edge of the request
/// pipeline.
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq)]
pub enum ErrorKind {
    /// Malformed or missing setup
    Config,
    /// Malformed credential presentation
    Security,
    /// Cryptographically rejected token
    Verification,
    /// Authenticated, but not permitted
    Auth,
}

/// Malformed or missing setup
///
/// Configuration errors are terminal: they are raised during
/// [`Authorizer::new`][crate::Authorizer::new] and are never retried. The
/// one exception is [`ConfigError::UnmappedMethod`], which surfaces at
/// request time when a secured operation is reached through an HTTP method
/// that has no CRUD action mapping; such requests are rejected rather than
/// silently allowed.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// One or more required keys were absent from a security scheme's
    /// verifier configuration
    ///
    /// The missing keys are reported in declaration order.
    #[error("missing {} in security config", keys.join(", "))]
    MissingKeys {
        /// The keys that were not provided
        keys: Vec<&'static str>,
    },

    /// The merged grant configuration was not a non-empty mapping
    #[error("invalid authentication config")]
    InvalidAcl,

    /// A permission key in the grant configuration did not name a known
    /// action and scope
    #[error("unknown permission '{key}' in authentication config")]
    UnknownPermission {
        /// The offending permission key
        key: String,
    },

    /// A file-backed grant document could not be read
    #[error("unable to read grant file '{}'", path.display())]
    GrantFileRead {
        /// Path of the grant document
        path: PathBuf,
        /// Underlying I/O failure
        #[source]
        source: std::io::Error,
    },

    /// A file-backed grant document could not be parsed as JSON
    #[error("unable to parse grant file '{}'", path.display())]
    GrantFileParse {
        /// Path of the grant document
        path: PathBuf,
        /// Underlying parse failure
        #[source]
        source: serde_json::Error,
    },

    /// An algorithm name in the verifier configuration is not recognized
    #[error("'{name}' is not a recognized JWS algorithm")]
    UnknownAlgorithm {
        /// The unrecognized name
        name: String,
    },

    /// A bearer-JWT security scheme was declared without a matching
    /// verifier configuration
    #[error("no security config provided for scheme '{scheme}'")]
    MissingSchemeConfig {
        /// Name of the scheme
        scheme: String,
    },

    /// A security requirement referenced a scheme that is not declared in
    /// the document's security schemes
    #[error("security requirement references undeclared scheme '{scheme}'")]
    UndeclaredScheme {
        /// Name of the scheme
        scheme: String,
    },

    /// Security was declared with an empty list of requirement
    /// alternatives
    #[error("security declared with no requirement alternatives")]
    EmptyRequirements,

    /// A secured operation was reached through an HTTP method with no
    /// CRUD action mapping
    #[error("method '{method}' has no action mapping")]
    UnmappedMethod {
        /// The offending method
        method: http::Method,
    },
}

/// Malformed credential presentation
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Error)]
pub enum SecurityError {
    /// The credential carrier did not match the expected scheme prefix
    #[error("invalid credential format")]
    InvalidFormat,

    /// The token could not be parsed into a JWT at all
    #[error("malformed token")]
    MalformedToken,

    /// No declared security requirement had a plausible credential present
    /// on the request
    #[error("no credentials presented for any security requirement")]
    NoCredentials,
}

/// The specific way in which a token failed cryptographic verification
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Error)]
pub enum VerificationErrorKind {
    /// The token's validity window has passed
    #[error("token expired")]
    Expired,
    /// The signature does not match the configured key material
    #[error("signature verification failed")]
    BadSignature,
    /// The token's issuer does not match the configured issuer
    #[error("issuer mismatch")]
    IssuerMismatch,
    /// The token was signed with an algorithm outside the allow-list
    #[error("algorithm not allowed")]
    AlgorithmNotAllowed,
}

/// A token parsed correctly but was rejected by cryptographic verification
#[derive(Debug, Error)]
#[error("token verification failed: {kind}")]
pub struct TokenVerificationError {
    kind: VerificationErrorKind,
    #[source]
    source: jsonwebtoken::errors::Error,
}

impl TokenVerificationError {
    pub(crate) fn new(kind: VerificationErrorKind, source: jsonwebtoken::errors::Error) -> Self {
        Self { kind, source }
    }

    /// The specific verification failure, for custom status mapping
    pub fn kind(&self) -> VerificationErrorKind {
        self.kind
    }
}

/// The caller authenticated, but the operation is not permitted
#[derive(Clone, Copy, Debug, Error)]
#[error("operation not permitted")]
pub struct AuthError {
    _p: (),
}

impl AuthError {
    pub(crate) const fn new() -> Self {
        Self { _p: () }
    }
}

/// Any failure terminating an authorization pass
#[derive(Debug, Error)]
pub enum AuthzError {
    /// Malformed or missing setup
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// Malformed credential presentation
    #[error(transparent)]
    Security(#[from] SecurityError),
    /// Cryptographically rejected token
    #[error(transparent)]
    Verification(#[from] TokenVerificationError),
    /// Authenticated, but not permitted
    #[error(transparent)]
    Auth(#[from] AuthError),
}

impl AuthzError {
    /// The broad classification of this failure
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) => ErrorKind::Config,
            Self::Security(_) => ErrorKind::Security,
            Self::Verification(_) => ErrorKind::Verification,
            Self::Auth(_) => ErrorKind::Auth,
        }
    }
}
