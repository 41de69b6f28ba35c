//! Security requirement evaluation: OR across alternatives, AND within
//! each group
//!
//! An operation's security is an ordered list of requirement groups. A
//! group succeeds only if every member scheme succeeds; the operation is
//! authorized as soon as any group succeeds. Groups are first filtered by
//! a cheap credential-presence check (a group whose member schemes have
//! no plausible credential on the request is never evaluated) and the
//! survivors run concurrently. The first fully-successful group wins and
//! the remaining in-flight evaluations are dropped; evaluation is
//! side-effect free, so cancellation is safe.
//!
//! When every candidate group fails, the error surfaced is that of the
//! first group in declaration order, keeping failures deterministic
//! regardless of completion order.

use futures::future;
use futures::stream::{FuturesUnordered, StreamExt};

use crate::authorizer::{Authorizer, RequestContext, VerifiedClaims};
use crate::error::{AuthzError, SecurityError};
use crate::schema::{
    ApiKeyLocation, ResolvedOperation, SchemeKind, SecurityRequirement, SecurityScheme,
};
use crate::token::{extract_bearer, ClaimSet};

impl Authorizer {
    pub(crate) async fn evaluate_alternatives(
        &self,
        alternatives: &[SecurityRequirement],
        resolved: &ResolvedOperation<'_>,
        request: &RequestContext<'_>,
    ) -> Result<VerifiedClaims, AuthzError> {
        let candidates: Vec<(usize, &SecurityRequirement)> = alternatives
            .iter()
            .enumerate()
            .filter(|(_, group)| {
                group
                    .keys()
                    .all(|name| self.credential_present(name, request))
            })
            .collect();

        tracing::debug!(
            declared = alternatives.len(),
            candidates = candidates.len(),
            "filtered requirement groups by credential presence"
        );

        if candidates.is_empty() {
            return Err(SecurityError::NoCredentials.into());
        }

        let mut pending: FuturesUnordered<_> = candidates
            .into_iter()
            .map(|(index, group)| async move {
                (index, self.evaluate_group(group, resolved, request).await)
            })
            .collect();

        let mut first_failure: Option<(usize, AuthzError)> = None;
        while let Some((index, outcome)) = pending.next().await {
            match outcome {
                // First group to fully succeed wins; dropping `pending`
                // cancels the losers.
                Ok(claims) => return Ok(claims),
                Err(err) => {
                    if first_failure.as_ref().is_none_or(|(i, _)| index < *i) {
                        first_failure = Some((index, err));
                    }
                }
            }
        }

        match first_failure {
            Some((_, err)) => Err(err),
            None => Err(SecurityError::NoCredentials.into()),
        }
    }

    /// Logical AND over a group's member schemes
    async fn evaluate_group(
        &self,
        group: &SecurityRequirement,
        resolved: &ResolvedOperation<'_>,
        request: &RequestContext<'_>,
    ) -> Result<VerifiedClaims, AuthzError> {
        let checks = group
            .keys()
            .map(|name| self.evaluate_scheme(name, resolved, request));
        let outcomes = future::try_join_all(checks).await?;
        Ok(outcomes.into_iter().flatten().collect())
    }

    /// Evaluates a single member scheme
    ///
    /// Only bearer-JWT schemes are verified here; other scheme types
    /// already passed the presence filter and are some other stage's
    /// responsibility.
    async fn evaluate_scheme(
        &self,
        name: &str,
        resolved: &ResolvedOperation<'_>,
        request: &RequestContext<'_>,
    ) -> Result<Option<(String, ClaimSet)>, AuthzError> {
        let Some(armed) = self.bearer_scheme(name) else {
            return Ok(None);
        };

        let header = request
            .authorization()
            .ok_or(SecurityError::NoCredentials)?;
        let claims = match request.preverified(name) {
            Some(claims) => claims.clone(),
            None => {
                let token = extract_bearer(header)?;
                armed.verifier.verify(token)?
            }
        };

        self.check_access(armed, &claims, resolved, request)?;

        Ok(Some((name.to_string(), claims)))
    }

    fn credential_present(&self, scheme: &str, request: &RequestContext<'_>) -> bool {
        self.document()
            .components
            .security_schemes
            .get(scheme)
            .is_some_and(|scheme| scheme_credential_present(scheme, request))
    }
}

fn scheme_credential_present(scheme: &SecurityScheme, request: &RequestContext<'_>) -> bool {
    match scheme.kind {
        SchemeKind::Http => request.authorization().is_some(),
        SchemeKind::ApiKey => {
            let Some(name) = scheme.name.as_deref() else {
                return false;
            };
            match scheme.location {
                Some(ApiKeyLocation::Query) => request.query_has(name),
                Some(ApiKeyLocation::Header) => request.header(name).is_some(),
                Some(ApiKeyLocation::Cookie) => request.cookie(name).is_some(),
                None => {
                    request.query_has(name)
                        || request.header(name).is_some()
                        || request.cookie(name).is_some()
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::authorizer::AuthorizerConfig;
    use crate::error::ErrorKind;
    use serde_json::json;

    fn engine(document: serde_json::Value, config: serde_json::Value) -> Authorizer {
        let document = serde_json::from_value(document).expect("valid document");
        let config: AuthorizerConfig = serde_json::from_value(config).expect("valid config");
        Authorizer::new(document, &config).expect("engine builds")
    }

    fn sign(claims: serde_json::Value) -> String {
        jsonwebtoken::encode(
            &jsonwebtoken::Header::default(),
            &claims,
            &jsonwebtoken::EncodingKey::from_secret(b"testSecret"),
        )
        .expect("token signs")
    }

    fn two_scheme_engine() -> Authorizer {
        engine(
            json!({
                "security": [
                    { "apikey": [] },
                    { "bearerjwt": [] },
                ],
                "paths": { "/open": { "get": {} } },
                "components": {
                    "securitySchemes": {
                        "bearerjwt": {
                            "type": "http", "scheme": "bearer", "bearerFormat": "JWT",
                            "x-acl-config": { "user": { "/open": { "readAny": ["*"] } } }
                        },
                        "apikey": { "type": "apiKey", "in": "query", "name": "api_key" },
                    }
                }
            }),
            json!({
                "schemes": { "bearerjwt": { "issuer": "testIssuer", "secret": "testSecret" } }
            }),
        )
    }

    #[tokio::test]
    async fn any_successful_group_authorizes_the_request() {
        let engine = two_scheme_engine();
        let token = sign(json!({ "iss": "testIssuer", "role": "user" }));

        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().expect("value"),
        );
        let ctx = RequestContext::new(http::Method::GET, "/open", &headers);

        let claims = engine.authorize(&ctx).await.expect("authorized");
        assert_eq!(
            claims.get("bearerjwt").and_then(|c| c.get("role")),
            Some(&serde_json::Value::from("user"))
        );
    }

    #[tokio::test]
    async fn presence_filter_selects_the_api_key_group() {
        let engine = two_scheme_engine();

        // No Authorization header, but the api key is present: only the
        // apikey group is a candidate, and it passes trivially at this
        // layer.
        let headers = http::HeaderMap::new();
        let ctx = RequestContext::new(http::Method::GET, "/open", &headers)
            .with_query(Some("api_key=xyz"));

        let claims = engine.authorize(&ctx).await.expect("authorized");
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn no_credentials_at_all_is_a_security_error() {
        let engine = two_scheme_engine();

        let headers = http::HeaderMap::new();
        let ctx = RequestContext::new(http::Method::GET, "/open", &headers);

        let err = engine.authorize(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Security);
    }

    #[tokio::test]
    async fn failing_groups_surface_the_first_declared_error() {
        // Two bearer groups; both fail, the first group's error wins.
        let engine = engine(
            json!({
                "security": [
                    { "first": [] },
                    { "second": [] },
                ],
                "paths": { "/open": { "get": {} } },
                "components": {
                    "securitySchemes": {
                        "first": {
                            "type": "http", "scheme": "bearer", "bearerFormat": "JWT",
                            "x-acl-config": { "user": { "/open": { "readAny": ["*"] } } }
                        },
                        "second": {
                            "type": "http", "scheme": "bearer", "bearerFormat": "JWT",
                            "x-acl-config": { "user": { "/open": { "readAny": ["*"] } } }
                        },
                    }
                }
            }),
            json!({
                "schemes": {
                    "first": { "issuer": "testIssuer", "secret": "otherSecret" },
                    "second": { "issuer": "testIssuer", "secret": "testSecret" },
                }
            }),
        );

        // `first` rejects the signature (its secret differs) while
        // `second` verifies the token but denies the unknown role. Both
        // groups fail; the surfaced error must be `first`'s verification
        // failure, not `second`'s denial.
        let token = sign(json!({ "iss": "testIssuer", "role": "nobody" }));
        let mut headers = http::HeaderMap::new();
        headers.insert(
            http::header::AUTHORIZATION,
            format!("Bearer {token}").parse().expect("value"),
        );
        let ctx = RequestContext::new(http::Method::GET, "/open", &headers);

        let err = engine.authorize(&ctx).await.unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Verification);
    }

    #[tokio::test]
    async fn unsecured_operations_pass_trivially() {
        let engine = engine(
            json!({ "paths": { "/open": { "get": {} } } }),
            json!({}),
        );

        let headers = http::HeaderMap::new();
        let ctx = RequestContext::new(http::Method::GET, "/open", &headers);

        let claims = engine.authorize(&ctx).await.expect("authorized");
        assert!(claims.is_empty());
    }

    #[tokio::test]
    async fn unmatched_paths_are_outside_jurisdiction() {
        let engine = two_scheme_engine();

        let headers = http::HeaderMap::new();
        let ctx = RequestContext::new(http::Method::GET, "/unknown", &headers);

        assert!(engine.authorize(&ctx).await.is_ok());
    }
}
