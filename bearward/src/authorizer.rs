//! The authorization engine
//!
//! An [`Authorizer`] is constructed once from an [`ApiDocument`] and an
//! [`AuthorizerConfig`]. Construction validates everything it can
//! (verifier key material, grant documents, requirement/scheme references)
//! and fails with a [`ConfigError`] so a misconfigured engine never serves
//! traffic. The constructed engine is cheaply cloneable and fully
//! immutable; per-request passes share it without synchronization.

use std::collections::HashMap;
use std::sync::Arc;

use http::header;
use serde::Deserialize;

use crate::error::{AuthzError, ConfigError};
use crate::grant::{GrantSource, GrantTable};
use crate::schema::ApiDocument;
use crate::token::{ClaimSet, SchemeConfig, TokenVerifier};

/// Decoded claims from the winning requirement group, keyed by scheme name
///
/// On success these are handed to the downstream pipeline (the tower
/// integration stores them in request extensions) so later stages can
/// reuse the verified payload instead of decoding the token again.
#[derive(Clone, Debug, Default)]
pub struct VerifiedClaims {
    by_scheme: HashMap<String, ClaimSet>,
}

impl VerifiedClaims {
    /// The claims verified under the named scheme, if any
    pub fn get(&self, scheme: &str) -> Option<&ClaimSet> {
        self.by_scheme.get(scheme)
    }

    /// Whether any scheme verified claims during the pass
    pub fn is_empty(&self) -> bool {
        self.by_scheme.is_empty()
    }

    /// Iterates over `(scheme name, claims)` pairs
    pub fn iter(&self) -> impl Iterator<Item = (&str, &ClaimSet)> {
        self.by_scheme.iter().map(|(k, v)| (k.as_str(), v))
    }

    /// Merges another set of verified claims into this one
    pub fn merge(&mut self, other: VerifiedClaims) {
        self.by_scheme.extend(other.by_scheme);
    }
}

impl FromIterator<(String, ClaimSet)> for VerifiedClaims {
    fn from_iter<I: IntoIterator<Item = (String, ClaimSet)>>(iter: I) -> Self {
        Self {
            by_scheme: iter.into_iter().collect(),
        }
    }
}

/// Operator configuration for an [`Authorizer`]
#[derive(Clone, Debug, Default, Deserialize)]
pub struct AuthorizerConfig {
    /// Verifier configuration per security scheme name
    #[serde(default)]
    pub schemes: HashMap<String, SchemeConfig>,
    /// Grant overrides per security scheme name, inline or file-backed
    #[serde(default)]
    pub acl: HashMap<String, GrantSource>,
}

/// Everything the engine holds for one bearer-JWT scheme
pub(crate) struct BearerScheme {
    pub(crate) verifier: TokenVerifier,
    pub(crate) grants: GrantTable,
    pub(crate) role_binding: Option<String>,
}

struct Inner {
    document: ApiDocument,
    bearer: HashMap<String, BearerScheme>,
}

/// The per-process authorization engine
///
/// Cloning is cheap (the state is behind an `Arc`) and clones share the
/// same immutable document, verifiers, and grant tables.
#[derive(Clone)]
pub struct Authorizer {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for Authorizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Authorizer")
            .field("schemes", &self.inner.bearer.keys())
            .finish_non_exhaustive()
    }
}

impl Authorizer {
    /// Constructs the engine, validating the document and configuration
    ///
    /// Every bearer-JWT scheme gets a verifier and a grant table; every
    /// security requirement is checked against the declared schemes.
    ///
    /// # Errors
    ///
    /// Returns the first [`ConfigError`] encountered. Hosts must treat
    /// this as fatal and refuse to accept traffic.
    pub fn new(document: ApiDocument, config: &AuthorizerConfig) -> Result<Self, ConfigError> {
        let mut bearer = HashMap::new();
        for (name, scheme) in &document.components.security_schemes {
            if !scheme.is_bearer_jwt() {
                continue;
            }

            let scheme_config =
                config
                    .schemes
                    .get(name)
                    .ok_or_else(|| ConfigError::MissingSchemeConfig {
                        scheme: name.clone(),
                    })?;
            let verifier = TokenVerifier::new(scheme_config)?;
            let grants = GrantTable::build(
                scheme.default_grants.as_ref(),
                config.acl.get(name),
                &document,
            )?;

            bearer.insert(
                name.clone(),
                BearerScheme {
                    verifier,
                    grants,
                    role_binding: scheme_config.role_binding.clone(),
                },
            );
        }

        validate_requirements(&document)?;

        tracing::info!(schemes = bearer.len(), "authorizer initialized");
        Ok(Self {
            inner: Arc::new(Inner { document, bearer }),
        })
    }

    pub(crate) fn document(&self) -> &ApiDocument {
        &self.inner.document
    }

    pub(crate) fn bearer_scheme(&self, name: &str) -> Option<&BearerScheme> {
        self.inner.bearer.get(name)
    }

    /// Runs one authorization pass for a request
    ///
    /// Requests that match no declared operation, or whose operation
    /// declares no security, pass trivially with empty claims. Otherwise
    /// the operation's requirement alternatives are evaluated (OR across
    /// groups, AND within each group) and the winning group's claims are
    /// returned.
    ///
    /// # Errors
    ///
    /// Returns the [`AuthzError`] terminating the pass; when every
    /// candidate group fails, the error of the first declared group is
    /// surfaced.
    pub async fn authorize(
        &self,
        request: &RequestContext<'_>,
    ) -> Result<VerifiedClaims, AuthzError> {
        let Some(resolved) = self.document().resolve(request.path(), request.method()) else {
            tracing::trace!(path = request.path(), "no matching operation; pass-through");
            return Ok(VerifiedClaims::default());
        };

        let Some(alternatives) = self.document().requirements(resolved.operation) else {
            tracing::trace!(resource = %resolved.resource, "operation declares no security");
            return Ok(VerifiedClaims::default());
        };
        if alternatives.is_empty() {
            return Err(ConfigError::EmptyRequirements.into());
        }

        self.evaluate_alternatives(alternatives, &resolved, request)
            .await
    }
}

fn validate_requirements(document: &ApiDocument) -> Result<(), ConfigError> {
    let operation_lists = document
        .paths
        .values()
        .flat_map(|item| item.operations())
        .filter_map(|op| op.security.as_deref());

    for list in operation_lists {
        if list.is_empty() {
            return Err(ConfigError::EmptyRequirements);
        }
        for group in list {
            check_group_schemes(document, group)?;
        }
    }

    for group in &document.security {
        check_group_schemes(document, group)?;
    }

    Ok(())
}

fn check_group_schemes(
    document: &ApiDocument,
    group: &crate::schema::SecurityRequirement,
) -> Result<(), ConfigError> {
    for scheme in group.keys() {
        if !document.components.security_schemes.contains_key(scheme) {
            return Err(ConfigError::UndeclaredScheme {
                scheme: scheme.clone(),
            });
        }
    }
    Ok(())
}

/// A borrowed view of the credential carriers of one in-flight request
///
/// Hosts construct this from their own request type; the engine reads the
/// method, path, headers, raw query string, and any claims a previous
/// pipeline stage already verified.
#[derive(Clone, Debug)]
pub struct RequestContext<'a> {
    method: http::Method,
    path: &'a str,
    headers: &'a http::HeaderMap,
    query: Option<&'a str>,
    preverified: Option<&'a VerifiedClaims>,
}

impl<'a> RequestContext<'a> {
    /// Constructs a view from the request line and headers
    pub fn new(method: http::Method, path: &'a str, headers: &'a http::HeaderMap) -> Self {
        Self {
            method,
            path,
            headers,
            query: None,
            preverified: None,
        }
    }

    /// Attaches the raw query string, used by the API-key presence filter
    #[must_use]
    pub fn with_query(mut self, query: Option<&'a str>) -> Self {
        self.query = query;
        self
    }

    /// Attaches claims already verified by an earlier pipeline stage
    ///
    /// Schemes found here are not re-verified.
    #[must_use]
    pub fn with_preverified(mut self, preverified: Option<&'a VerifiedClaims>) -> Self {
        self.preverified = preverified;
        self
    }

    /// The request's HTTP method
    pub fn method(&self) -> &http::Method {
        &self.method
    }

    /// The request's path, without the query string
    pub fn path(&self) -> &str {
        self.path
    }

    pub(crate) fn authorization(&self) -> Option<&str> {
        self.header(header::AUTHORIZATION.as_str())
    }

    pub(crate) fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    pub(crate) fn query_has(&self, name: &str) -> bool {
        self.query.is_some_and(|query| {
            query
                .split('&')
                .map(|pair| pair.split_once('=').map_or(pair, |(key, _)| key))
                .any(|key| key == name)
        })
    }

    pub(crate) fn cookie(&self, name: &str) -> Option<&str> {
        self.header(header::COOKIE.as_str())?
            .split(';')
            .filter_map(|pair| pair.trim().split_once('='))
            .find(|(key, _)| *key == name)
            .map(|(_, value)| value)
    }

    pub(crate) fn preverified(&self, scheme: &str) -> Option<&ClaimSet> {
        self.preverified?.get(scheme)
    }
}
