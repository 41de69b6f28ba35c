//! Role resolution and any/own permission checks
//!
//! Once a scheme's token is verified, the caller's role is resolved from
//! its claims and the matched operation's path parameters are checked one
//! by one. A parameter passes when the role holds the `any`-scoped
//! permission for the action, or when the caller's bound claim establishes
//! ownership of the parameter value and the role holds the `own`-scoped
//! permission. Every bound parameter must pass; an operation without
//! bound parameters falls back to a single `any`-scoped check on the
//! resource pattern.

use serde_json::Value;

use crate::authorizer::{Authorizer, BearerScheme, RequestContext};
use crate::error::{AuthError, AuthzError};
use crate::grant::{AccessScope, Action};
use crate::schema::ResolvedOperation;
use crate::token::ClaimSet;

impl Authorizer {
    pub(crate) fn check_access(
        &self,
        armed: &BearerScheme,
        claims: &ClaimSet,
        resolved: &ResolvedOperation<'_>,
        request: &RequestContext<'_>,
    ) -> Result<(), AuthzError> {
        let role = resolve_role(claims, armed.role_binding.as_deref());
        let action = Action::from_method(request.method())?;
        let table = &armed.grants;
        let resource = resolved.resource.as_str();

        if resolved.params.is_empty() {
            if table.permission(role, resource, action, AccessScope::Any) {
                return Ok(());
            }
            tracing::debug!(role, resource, ?action, "denied: no any-scoped grant");
            return Err(AuthError::new().into());
        }

        for (param, value) in &resolved.params {
            if table.permission(role, resource, action, AccessScope::Any) {
                continue;
            }

            let binding = resolved.operation.claim_binding(param);
            let claim = claims.get(binding);
            if claim.is_none() {
                tracing::warn!(claim = binding, "missing claim binding in token");
            }

            let owned = claim.is_some_and(|claim| claim_matches(claim, value));
            if owned && table.permission(role, resource, action, AccessScope::Own) {
                continue;
            }

            tracing::debug!(
                role,
                resource,
                ?action,
                param = param.as_str(),
                owned,
                "denied: parameter failed any/own checks"
            );
            return Err(AuthError::new().into());
        }

        Ok(())
    }
}

/// Resolves the caller's role from its claims
///
/// The configured role-binding claim is consulted first, then the default
/// `role` claim; a caller with neither (or with a non-string value) is
/// `anonymous`.
fn resolve_role<'a>(claims: &'a ClaimSet, binding: Option<&str>) -> &'a str {
    binding
        .and_then(|name| claims.get(name))
        .and_then(Value::as_str)
        .or_else(|| claims.get("role").and_then(Value::as_str))
        .unwrap_or("anonymous")
}

/// Whether a claim value establishes ownership of a bound path value
///
/// A collection claim owns the value when any member matches it. Path
/// values arrive as strings, so numeric and boolean claims compare by
/// their canonical textual form.
fn claim_matches(claim: &Value, value: &str) -> bool {
    match claim {
        Value::Array(items) => items.iter().any(|item| scalar_matches(item, value)),
        other => scalar_matches(other, value),
    }
}

fn scalar_matches(claim: &Value, value: &str) -> bool {
    match claim {
        Value::String(s) => s == value,
        Value::Number(n) => n.to_string() == value,
        Value::Bool(b) => b.to_string() == value,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn claims(value: serde_json::Value) -> ClaimSet {
        match value {
            Value::Object(map) => map,
            _ => panic!("claims must be an object"),
        }
    }

    #[test]
    fn role_resolution_falls_back_through_the_chain() {
        let c = claims(json!({ "customRole": "editor", "role": "user" }));
        assert_eq!(resolve_role(&c, Some("customRole")), "editor");
        assert_eq!(resolve_role(&c, None), "user");

        let c = claims(json!({ "role": "user" }));
        assert_eq!(resolve_role(&c, Some("customRole")), "user");

        let c = claims(json!({}));
        assert_eq!(resolve_role(&c, None), "anonymous");
    }

    #[test]
    fn non_string_role_claims_resolve_to_anonymous() {
        let c = claims(json!({ "role": 42 }));
        assert_eq!(resolve_role(&c, None), "anonymous");

        let c = claims(json!({ "customRole": ["a", "b"], "role": 1 }));
        assert_eq!(resolve_role(&c, Some("customRole")), "anonymous");
    }

    #[test]
    fn collection_claims_match_by_membership() {
        assert!(claim_matches(&json!([1, 2, 3]), "2"));
        assert!(!claim_matches(&json!([1, 2, 3]), "5"));
        assert!(claim_matches(&json!(["a", "b"]), "b"));
        assert!(!claim_matches(&json!([]), "a"));
    }

    #[test]
    fn scalar_claims_match_by_canonical_text() {
        assert!(claim_matches(&json!(3), "3"));
        assert!(claim_matches(&json!("3"), "3"));
        assert!(claim_matches(&json!(true), "true"));
        assert!(!claim_matches(&json!(3), "4"));
        assert!(!claim_matches(&json!(null), "null"));
        assert!(!claim_matches(&json!({ "nested": 1 }), "1"));
    }
}
