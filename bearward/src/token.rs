//! Bearer token extraction and verification
//!
//! Extraction is a pure function over the `Authorization` header value.
//! Verification delegates to [`jsonwebtoken`] with the issuer and
//! algorithm allow-list taken from the scheme's [`SchemeConfig`];
//! everything else about JOSE is that crate's problem.

use serde::Deserialize;
use serde_json::Value;

use crate::error::{
    AuthzError, ConfigError, SecurityError, TokenVerificationError, VerificationErrorKind,
};

/// The decoded payload of a verified token
///
/// An opaque claim-name to value mapping, owned by a single request's
/// authorization pass.
pub type ClaimSet = serde_json::Map<String, Value>;

/// Operator-supplied configuration for one security scheme's verifier
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SchemeConfig {
    /// Required token issuer
    #[serde(default)]
    pub issuer: Option<String>,
    /// HMAC secret
    #[serde(default)]
    pub secret: Option<String>,
    /// Allowed signing algorithms; defaults to `HS256` when unspecified
    #[serde(default)]
    pub algorithms: Option<Vec<String>>,
    /// Claim carrying the caller's role; falls back to `role`
    #[serde(default)]
    pub role_binding: Option<String>,
}

/// Strips the `Bearer` scheme prefix from a credential string
///
/// The prefix keyword must be followed by whitespace; anything else is a
/// [`SecurityError::InvalidFormat`].
///
/// ```
/// use bearward::token::extract_bearer;
///
/// assert_eq!(extract_bearer("Bearer abc.def.ghi").unwrap(), "abc.def.ghi");
/// assert!(extract_bearer("abc.def.ghi").is_err());
/// ```
pub fn extract_bearer(value: &str) -> Result<&str, SecurityError> {
    let rest = value
        .strip_prefix("Bearer")
        .ok_or(SecurityError::InvalidFormat)?;
    if !rest.starts_with(char::is_whitespace) {
        return Err(SecurityError::InvalidFormat);
    }
    Ok(rest.trim())
}

/// Verifies bearer JWTs for a single security scheme
///
/// Construction validates the scheme configuration up front: a missing
/// `issuer` or `secret` is a [`ConfigError`] naming every absent key, so a
/// misconfigured scheme can never reach request handling.
pub struct TokenVerifier {
    key: jsonwebtoken::DecodingKey,
    validation: jsonwebtoken::Validation,
}

impl std::fmt::Debug for TokenVerifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenVerifier")
            .field("validation", &self.validation)
            .finish_non_exhaustive()
    }
}

impl TokenVerifier {
    /// Constructs a verifier from a scheme configuration
    ///
    /// # Errors
    ///
    /// Returns a [`ConfigError`] when `issuer` or `secret` is absent or an
    /// algorithm name is unrecognized.
    pub fn new(config: &SchemeConfig) -> Result<Self, ConfigError> {
        let mut missing = Vec::new();
        if config.issuer.is_none() {
            missing.push("issuer");
        }
        if config.secret.is_none() {
            missing.push("secret");
        }
        let (Some(issuer), Some(secret)) = (&config.issuer, &config.secret) else {
            return Err(ConfigError::MissingKeys { keys: missing });
        };

        let algorithms = match config.algorithms.as_deref() {
            Some(names) if !names.is_empty() => names
                .iter()
                .map(|name| {
                    name.parse().map_err(|_| ConfigError::UnknownAlgorithm {
                        name: name.clone(),
                    })
                })
                .collect::<Result<Vec<jsonwebtoken::Algorithm>, _>>()?,
            _ => vec![jsonwebtoken::Algorithm::HS256],
        };

        let mut validation = jsonwebtoken::Validation::new(algorithms[0]);
        validation.algorithms = algorithms;
        validation.set_issuer(&[issuer]);
        // Expiry is enforced when the claim is present, but tokens without
        // an `exp` are acceptable. The issuer claim stays required: a
        // token that omits `iss` must not slip past the configured pin.
        validation.required_spec_claims.clear();
        validation.required_spec_claims.insert("iss".to_string());

        Ok(Self {
            key: jsonwebtoken::DecodingKey::from_secret(secret.as_bytes()),
            validation,
        })
    }

    /// Verifies a raw token and returns its decoded claims
    ///
    /// # Errors
    ///
    /// Returns [`SecurityError::MalformedToken`] when the token cannot be
    /// parsed as a JWT at all, and a [`TokenVerificationError`] with the
    /// appropriate [`VerificationErrorKind`] when cryptographic
    /// verification rejects it.
    pub fn verify(&self, token: &str) -> Result<ClaimSet, AuthzError> {
        match jsonwebtoken::decode::<ClaimSet>(token, &self.key, &self.validation) {
            Ok(data) => Ok(data.claims),
            Err(err) => Err(classify(err)),
        }
    }
}

fn classify(err: jsonwebtoken::errors::Error) -> AuthzError {
    use jsonwebtoken::errors::ErrorKind;

    let kind = match err.kind() {
        ErrorKind::InvalidToken
        | ErrorKind::Base64(_)
        | ErrorKind::Json(_)
        | ErrorKind::Utf8(_) => return SecurityError::MalformedToken.into(),
        ErrorKind::ExpiredSignature | ErrorKind::ImmatureSignature => {
            VerificationErrorKind::Expired
        }
        // A token omitting a required claim can only be missing `iss`
        // here, since `exp` is not required.
        ErrorKind::InvalidIssuer | ErrorKind::MissingRequiredClaim(_) => {
            VerificationErrorKind::IssuerMismatch
        }
        ErrorKind::InvalidAlgorithm | ErrorKind::InvalidAlgorithmName => {
            VerificationErrorKind::AlgorithmNotAllowed
        }
        _ => VerificationErrorKind::BadSignature,
    };

    TokenVerificationError::new(kind, err).into()
}
