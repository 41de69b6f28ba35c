//! Authorization for APIs described by an OpenAPI document
//!
//! `bearward` decides, per request, whether a bearer-token-bearing caller
//! may execute the matched operation. It combines the document's security
//! requirements (logical OR of logical AND groups of named schemes),
//! verifies bearer JWTs, maps HTTP methods onto CRUD actions, and resolves
//! role-based `any`/`own` permissions against the request's path
//! parameters.
//!
//! The engine is host-agnostic: it consumes a borrowed
//! [`RequestContext`] view of the in-flight request and produces either
//! the verified claims of the winning requirement group or a typed
//! [`AuthzError`]. The `bearward_tower` crate wires it into a
//! `tower-http` authorization layer.
//!
//! # Example
//!
//! ```
//! use bearward::{Authorizer, AuthorizerConfig, RequestContext};
//!
//! # fn sign(claims: serde_json::Value) -> String {
//! #     jsonwebtoken::encode(
//! #         &jsonwebtoken::Header::default(),
//! #         &claims,
//! #         &jsonwebtoken::EncodingKey::from_secret(b"testSecret"),
//! #     )
//! #     .unwrap()
//! # }
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let document = serde_json::from_value(serde_json::json!({
//!     "security": [{ "bearerjwt": [] }],
//!     "paths": { "/status": { "get": {} } },
//!     "components": {
//!         "securitySchemes": {
//!             "bearerjwt": {
//!                 "type": "http", "scheme": "bearer", "bearerFormat": "JWT",
//!                 "x-acl-config": { "user": { "/status": { "readAny": ["*"] } } }
//!             }
//!         }
//!     }
//! }))?;
//! let config: AuthorizerConfig = serde_json::from_value(serde_json::json!({
//!     "schemes": { "bearerjwt": { "issuer": "testIssuer", "secret": "testSecret" } }
//! }))?;
//!
//! let authorizer = Authorizer::new(document, &config)?;
//!
//! let token = sign(serde_json::json!({ "iss": "testIssuer", "role": "user" }));
//! let mut headers = http::HeaderMap::new();
//! headers.insert(http::header::AUTHORIZATION, format!("Bearer {token}").parse()?);
//!
//! let ctx = RequestContext::new(http::Method::GET, "/status", &headers);
//! let claims = authorizer.authorize(&ctx).await?;
//! assert!(claims.get("bearerjwt").is_some());
//! # Ok(())
//! # }
//! ```

#![warn(
    missing_docs,
    unused_import_braces,
    unused_imports,
    unused_qualifications
)]
#![deny(
    missing_debug_implementations,
    trivial_casts,
    trivial_numeric_casts,
    unused_must_use
)]
#![forbid(unsafe_code)]

mod access;
mod authorizer;
pub mod error;
pub mod grant;
mod requirement;
pub mod schema;
pub mod token;

pub use authorizer::{Authorizer, AuthorizerConfig, RequestContext, VerifiedClaims};
pub use error::{
    AuthError, AuthzError, ConfigError, ErrorKind, SecurityError, TokenVerificationError,
    VerificationErrorKind,
};
pub use grant::{AccessScope, Action, GrantSource, GrantTable, Permission};
pub use schema::{ApiDocument, SecurityScheme};
pub use token::{extract_bearer, ClaimSet, SchemeConfig, TokenVerifier};
