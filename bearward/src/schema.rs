//! The slice of an OpenAPI document consumed by the authorization engine
//!
//! Schema loading and routing proper belong to the host; this module models
//! only the fields the engine reads: per-operation security requirements,
//! parameter declarations (with their optional `x-acl-binding` claim
//! bindings), and the declared security schemes (with their optional
//! embedded `x-acl-config` default grants).
//!
//! Resource patterns are normalized from the OpenAPI `{param}` placeholder
//! syntax into the router-style `:param` syntax, and are always absolute.
//! Grant tables are keyed by the normalized form, so a pattern that does
//! not round-trip through [`normalize_template`] will never match and will
//! deny silently.

use std::collections::{BTreeMap, HashMap};

use http::Method;
use serde::Deserialize;
use serde_json::Value;

/// A single security requirement group
///
/// Every named scheme in the group must succeed for the group to succeed
/// (logical AND). The mapped scope lists are part of the OpenAPI wire shape
/// but are not interpreted by this engine.
pub type SecurityRequirement = BTreeMap<String, Vec<String>>;

/// The authorization-relevant portion of an OpenAPI document
#[derive(Clone, Debug, Default, Deserialize)]
pub struct ApiDocument {
    /// Document-wide security requirement alternatives, used when an
    /// operation declares none of its own
    #[serde(default)]
    pub security: Vec<SecurityRequirement>,
    /// Path templates in OpenAPI `{param}` syntax mapped to their
    /// operations
    #[serde(default)]
    pub paths: BTreeMap<String, PathItem>,
    /// Reusable components; only security schemes are consumed
    #[serde(default)]
    pub components: Components,
}

/// Reusable document components
#[derive(Clone, Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Components {
    /// Declared security schemes, by name
    #[serde(default)]
    pub security_schemes: HashMap<String, SecurityScheme>,
}

/// The operations available on a single path
#[derive(Clone, Debug, Default, Deserialize)]
pub struct PathItem {
    /// `GET` operation
    pub get: Option<Operation>,
    /// `PUT` operation
    pub put: Option<Operation>,
    /// `POST` operation
    pub post: Option<Operation>,
    /// `DELETE` operation
    pub delete: Option<Operation>,
    /// `HEAD` operation
    pub head: Option<Operation>,
    /// `PATCH` operation
    pub patch: Option<Operation>,
}

impl PathItem {
    /// The operation matching the given HTTP method, if declared
    pub fn operation(&self, method: &Method) -> Option<&Operation> {
        match *method {
            Method::GET => self.get.as_ref(),
            Method::PUT => self.put.as_ref(),
            Method::POST => self.post.as_ref(),
            Method::DELETE => self.delete.as_ref(),
            Method::HEAD => self.head.as_ref(),
            Method::PATCH => self.patch.as_ref(),
            _ => None,
        }
    }

    /// All declared operations on this path
    pub fn operations(&self) -> impl Iterator<Item = &Operation> {
        [
            self.get.as_ref(),
            self.put.as_ref(),
            self.post.as_ref(),
            self.delete.as_ref(),
            self.head.as_ref(),
            self.patch.as_ref(),
        ]
        .into_iter()
        .flatten()
    }
}

/// A single declared operation
#[derive(Clone, Debug, Default, Deserialize)]
pub struct Operation {
    /// Operation-level security requirement alternatives, overriding the
    /// document-wide default when present
    pub security: Option<Vec<SecurityRequirement>>,
    /// Declared parameters
    #[serde(default)]
    pub parameters: Vec<ParameterSpec>,
}

impl Operation {
    /// The claim name bound to the given path parameter
    ///
    /// Parameters may declare an explicit binding through `x-acl-binding`;
    /// otherwise the parameter's own name is used.
    pub fn claim_binding<'a>(&'a self, param: &'a str) -> &'a str {
        self.parameters
            .iter()
            .find(|p| p.name == param)
            .and_then(|p| p.claim_binding.as_deref())
            .unwrap_or(param)
    }
}

/// A declared operation parameter
#[derive(Clone, Debug, Deserialize)]
pub struct ParameterSpec {
    /// Parameter name
    pub name: String,
    /// Where the parameter is carried (`path`, `query`, `header`,
    /// `cookie`)
    #[serde(rename = "in", default)]
    pub location: Option<String>,
    /// Claim name whose value establishes ownership of this parameter
    #[serde(rename = "x-acl-binding", default)]
    pub claim_binding: Option<String>,
}

/// Where an API key credential is carried
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiKeyLocation {
    /// In the query string
    Query,
    /// In a request header
    Header,
    /// In the `Cookie` header
    Cookie,
}

/// The broad type of a security scheme
#[derive(Clone, Copy, Debug, Hash, Eq, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SchemeKind {
    /// HTTP authentication (`Authorization` header)
    Http,
    /// Named API key in a query parameter, header, or cookie
    ApiKey,
}

/// A declared security scheme
#[derive(Clone, Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecurityScheme {
    /// The scheme type
    #[serde(rename = "type")]
    pub kind: SchemeKind,
    /// HTTP authentication scheme keyword (`bearer`)
    pub scheme: Option<String>,
    /// Bearer token format hint (`JWT`)
    pub bearer_format: Option<String>,
    /// Credential carrier for API key schemes
    #[serde(rename = "in", default)]
    pub location: Option<ApiKeyLocation>,
    /// Parameter or header name for API key schemes
    pub name: Option<String>,
    /// Schema-embedded default grant object
    #[serde(rename = "x-acl-config", default)]
    pub default_grants: Option<Value>,
}

impl SecurityScheme {
    /// Whether this scheme carries a bearer JWT this engine can verify
    pub fn is_bearer_jwt(&self) -> bool {
        self.kind == SchemeKind::Http
            && self.scheme.as_deref() == Some("bearer")
            && self.bearer_format.as_deref() == Some("JWT")
    }
}

/// An operation matched against a concrete request path
#[derive(Clone, Debug)]
pub struct ResolvedOperation<'a> {
    /// The normalized resource pattern, as used in grant tables
    pub resource: String,
    /// The matched operation
    pub operation: &'a Operation,
    /// Path parameter bindings, in template order
    pub params: Vec<(String, String)>,
}

impl ApiDocument {
    /// The security requirement alternatives in force for an operation
    ///
    /// Operation-level requirements take precedence; otherwise the
    /// document-wide default applies. `None` means the operation is
    /// unsecured and passes trivially.
    pub fn requirements<'a>(&'a self, operation: &'a Operation) -> Option<&'a [SecurityRequirement]> {
        operation.security.as_deref().or_else(|| {
            if self.security.is_empty() {
                None
            } else {
                Some(&self.security)
            }
        })
    }

    /// Matches a concrete request path and method against the declared
    /// operations
    ///
    /// Literal templates win over parameterized ones. Returns `None` when
    /// no declared operation matches; such requests are outside this
    /// engine's jurisdiction.
    pub fn resolve(&self, path: &str, method: &Method) -> Option<ResolvedOperation<'_>> {
        let trimmed = trim_trailing_slash(path);

        // Pass 1: exact literal match
        for (template, item) in &self.paths {
            let resource = normalize_template(template);
            if resource == trimmed {
                if let Some(operation) = item.operation(method) {
                    return Some(ResolvedOperation {
                        resource,
                        operation,
                        params: Vec::new(),
                    });
                }
            }
        }

        // Pass 2: parameterized match
        for (template, item) in &self.paths {
            let resource = normalize_template(template);
            if let Some(params) = match_template(&resource, trimmed) {
                if let Some(operation) = item.operation(method) {
                    return Some(ResolvedOperation {
                        resource,
                        operation,
                        params,
                    });
                }
            }
        }

        None
    }

    /// Normalized patterns of every parameterless read operation
    ///
    /// These are the operations the implicit `anonymous` role is granted
    /// `read:any` on when the configuration does not define one.
    pub(crate) fn parameterless_read_paths(&self) -> impl Iterator<Item = String> + '_ {
        self.paths.iter().filter_map(|(template, item)| {
            let parameterless_read = [item.get.as_ref(), item.head.as_ref()]
                .into_iter()
                .flatten()
                .any(|read| read.parameters.is_empty());
            parameterless_read.then(|| normalize_template(template))
        })
    }
}

/// Rewrites an OpenAPI path template into the router's parameter syntax
///
/// `{param}` placeholders become `:param`, and the result is always an
/// absolute path.
///
/// ```
/// use bearward::schema::normalize_template;
///
/// assert_eq!(normalize_template("/pets/{petId}"), "/pets/:petId");
/// assert_eq!(normalize_template("pets"), "/pets");
/// ```
pub fn normalize_template(template: &str) -> String {
    let rewritten = template.replace('{', ":").replace('}', "");
    if rewritten.starts_with('/') {
        rewritten
    } else {
        format!("/{rewritten}")
    }
}

/// Matches a concrete path against a normalized template, binding `:param`
/// segments
///
/// Returns `None` when the path does not match; an empty binding list when
/// the template is fully literal.
pub fn match_template(template: &str, path: &str) -> Option<Vec<(String, String)>> {
    let template_segments: Vec<&str> = template.split('/').filter(|s| !s.is_empty()).collect();
    let path_segments: Vec<&str> = trim_trailing_slash(path)
        .split('/')
        .filter(|s| !s.is_empty())
        .collect();

    if template_segments.len() != path_segments.len() {
        return None;
    }

    let mut params = Vec::new();
    for (expected, actual) in template_segments.iter().zip(&path_segments) {
        if let Some(name) = expected.strip_prefix(':') {
            params.push((name.to_string(), (*actual).to_string()));
        } else if expected != actual {
            return None;
        }
    }

    Some(params)
}

fn trim_trailing_slash(path: &str) -> &str {
    if path.len() > 1 {
        path.trim_end_matches('/')
    } else {
        path
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn document(json: serde_json::Value) -> ApiDocument {
        serde_json::from_value(json).expect("valid document")
    }

    #[test]
    fn templates_normalize_to_router_syntax() {
        assert_eq!(normalize_template("/a/{b}/c/{d}"), "/a/:b/c/:d");
        assert_eq!(normalize_template("{id}"), "/:id");
        assert_eq!(normalize_template("/plain"), "/plain");
    }

    #[test]
    fn template_matching_binds_parameters() {
        let params = match_template("/resource/:id", "/resource/42").expect("match");
        assert_eq!(params, vec![("id".to_string(), "42".to_string())]);

        assert!(match_template("/resource/:id", "/resource").is_none());
        assert!(match_template("/resource/:id", "/other/42").is_none());
        assert!(match_template("/resource", "/resource/").expect("match").is_empty());
    }

    #[test]
    fn resolve_prefers_literal_over_parameterized() {
        let doc = document(serde_json::json!({
            "paths": {
                "/pets/{petId}": { "get": {} },
                "/pets/mine": { "get": {} },
            }
        }));

        let matched = doc.resolve("/pets/mine", &Method::GET).expect("match");
        assert_eq!(matched.resource, "/pets/mine");
        assert!(matched.params.is_empty());

        let matched = doc.resolve("/pets/7", &Method::GET).expect("match");
        assert_eq!(matched.resource, "/pets/:petId");
        assert_eq!(matched.params, vec![("petId".to_string(), "7".to_string())]);
    }

    #[test]
    fn operation_security_overrides_document_security() {
        let doc = document(serde_json::json!({
            "security": [{ "global": [] }],
            "paths": {
                "/open": { "get": { "security": [] } },
                "/closed": { "get": {} },
            }
        }));

        let open = doc.resolve("/open", &Method::GET).expect("match");
        let closed = doc.resolve("/closed", &Method::GET).expect("match");

        // An explicit empty list is a declaration (rejected at engine
        // construction); absence falls back to the document default.
        assert_eq!(doc.requirements(open.operation).map(<[_]>::len), Some(0));
        let inherited = doc.requirements(closed.operation).expect("inherited");
        assert!(inherited[0].contains_key("global"));
    }

    #[test]
    fn claim_binding_defaults_to_parameter_name() {
        let doc = document(serde_json::json!({
            "paths": {
                "/r/{id}": {
                    "get": {
                        "parameters": [
                            { "name": "id", "in": "path", "x-acl-binding": "ownedIds" }
                        ]
                    }
                },
                "/s/{key}": {
                    "get": { "parameters": [ { "name": "key", "in": "path" } ] }
                }
            }
        }));

        let r = doc.resolve("/r/1", &Method::GET).expect("match");
        assert_eq!(r.operation.claim_binding("id"), "ownedIds");

        let s = doc.resolve("/s/1", &Method::GET).expect("match");
        assert_eq!(s.operation.claim_binding("key"), "key");
    }

    #[test]
    fn bearer_jwt_detection_requires_scheme_and_format() {
        let doc = document(serde_json::json!({
            "components": {
                "securitySchemes": {
                    "jwt": { "type": "http", "scheme": "bearer", "bearerFormat": "JWT" },
                    "basic": { "type": "http", "scheme": "basic" },
                    "key": { "type": "apiKey", "in": "query", "name": "api_key" },
                }
            }
        }));

        let schemes = &doc.components.security_schemes;
        assert!(schemes["jwt"].is_bearer_jwt());
        assert!(!schemes["basic"].is_bearer_jwt());
        assert!(!schemes["key"].is_bearer_jwt());
        assert_eq!(schemes["key"].location, Some(ApiKeyLocation::Query));
    }
}
