//! Tower middleware for the [`bearward`] authorization engine
//!
//! [`BearerAuthorizer`] turns an [`Authorizer`] into a `tower-http`
//! [`AsyncRequireAuthorizationLayer`]. Each request runs one authorization
//! pass; on success the winning requirement group's [`VerifiedClaims`] are
//! stored in the request extensions for downstream handlers, and on
//! failure the attached [`OnAuthzError`] handler builds the response.
//!
//! ```
//! use bearward::{Authorizer, AuthorizerConfig};
//! use bearward_tower::BearerAuthorizer;
//! use tower::ServiceBuilder;
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
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
//! let authorizer = Authorizer::new(document, &config)?;
//!
//! let auth = BearerAuthorizer::new(authorizer).with_verbose_error_handler::<String>();
//!
//! let service = ServiceBuilder::new()
//!     .layer(auth.layer())
//!     .service(tower::service_fn(|_req: http::Request<String>| async {
//!         Ok::<_, std::convert::Infallible>(http::Response::new(String::new()))
//!     }));
//! # let _ = service;
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

use std::fmt;
use std::marker::PhantomData;

use bearward::{
    AuthError, Authorizer, AuthzError, ConfigError, SecurityError, TokenVerificationError,
};
use http::Response;
use tower_http::auth::AsyncRequireAuthorizationLayer;

mod authorize;
pub mod util;

pub use authorize::AuthorizeBearer;

/// Handler for converting authorization failures into responses
///
/// The per-class methods allow hosts to choose their own status mapping;
/// verification failures in particular are commonly mapped to either
/// `401` or `403` depending on deployment policy.
pub trait OnAuthzError {
    /// The body type of error responses
    type Body;

    /// Response when the engine itself is misconfigured
    ///
    /// Configuration errors normally abort startup; reaching one at
    /// request time (an unmapped HTTP method on a secured operation) is a
    /// server-side fault.
    fn on_config_error(&self, error: &ConfigError) -> Response<Self::Body>;

    /// Response when the presented credential is malformed or absent
    fn on_security_error(&self, error: &SecurityError) -> Response<Self::Body>;

    /// Response when the token failed cryptographic verification
    fn on_verification_error(&self, error: &TokenVerificationError) -> Response<Self::Body>;

    /// Response when the caller is authenticated but not permitted
    fn on_auth_denied(&self, error: &AuthError) -> Response<Self::Body>;

    /// Dispatches on the failure's class
    fn on_authz_error(&self, error: &AuthzError) -> Response<Self::Body> {
        match error {
            AuthzError::Config(err) => self.on_config_error(err),
            AuthzError::Security(err) => self.on_security_error(err),
            AuthzError::Verification(err) => self.on_verification_error(err),
            AuthzError::Auth(err) => self.on_auth_denied(err),
        }
    }
}

macro_rules! delegate_impls {
    ($($ty:ty)*) => {
        $(
            impl<T> OnAuthzError for $ty
            where
                T: OnAuthzError,
            {
                type Body = T::Body;

                fn on_config_error(&self, error: &ConfigError) -> Response<Self::Body> {
                    T::on_config_error(self, error)
                }

                fn on_security_error(&self, error: &SecurityError) -> Response<Self::Body> {
                    T::on_security_error(self, error)
                }

                fn on_verification_error(
                    &self,
                    error: &TokenVerificationError,
                ) -> Response<Self::Body> {
                    T::on_verification_error(self, error)
                }

                fn on_auth_denied(&self, error: &AuthError) -> Response<Self::Body> {
                    T::on_auth_denied(self, error)
                }
            }
        )*
    }
}

delegate_impls!(
    &'_ T
    Box<T>
    std::rc::Rc<T>
    std::sync::Arc<T>
);

/// Error handler producing status-only responses with empty bodies
pub struct TerseErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> TerseErrorHandler<ResBody> {
    /// Instantiates a handler over the given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for TerseErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("TerseErrorHandler")
    }
}

impl<ResBody> Default for TerseErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<ResBody> Clone for TerseErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Copy for TerseErrorHandler<ResBody> {}

impl<ResBody> OnAuthzError for TerseErrorHandler<ResBody>
where
    ResBody: Default,
{
    type Body = ResBody;

    #[inline]
    fn on_config_error(&self, _: &ConfigError) -> Response<Self::Body> {
        tracing::error!("authorization failed: engine misconfiguration reached request handling");
        util::internal_error()
    }

    #[inline]
    fn on_security_error(&self, _: &SecurityError) -> Response<Self::Body> {
        tracing::debug!("authorization failed: malformed credential presentation");
        util::unauthorized("")
    }

    #[inline]
    fn on_verification_error(&self, _: &TokenVerificationError) -> Response<Self::Body> {
        tracing::debug!("authorization failed: token rejected");
        util::forbidden("")
    }

    #[inline]
    fn on_auth_denied(&self, _: &AuthError) -> Response<Self::Body> {
        tracing::debug!("authorization failed: operation not permitted");
        util::forbidden("")
    }
}

/// Error handler that surfaces failure descriptions in the
/// `www-authenticate` header
pub struct VerboseErrorHandler<ResBody> {
    _ty: PhantomData<fn() -> ResBody>,
}

impl<ResBody> VerboseErrorHandler<ResBody> {
    /// Instantiates a handler over the given body type
    #[inline]
    pub fn new() -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> fmt::Debug for VerboseErrorHandler<ResBody> {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str("VerboseErrorHandler")
    }
}

impl<ResBody> Default for VerboseErrorHandler<ResBody> {
    #[inline]
    fn default() -> Self {
        Self::new()
    }
}

impl<ResBody> Clone for VerboseErrorHandler<ResBody> {
    #[inline]
    fn clone(&self) -> Self {
        Self { _ty: PhantomData }
    }
}

impl<ResBody> Copy for VerboseErrorHandler<ResBody> {}

impl<ResBody> OnAuthzError for VerboseErrorHandler<ResBody>
where
    ResBody: Default,
{
    type Body = ResBody;

    fn on_config_error(&self, error: &ConfigError) -> Response<Self::Body> {
        tracing::error!("authorization failed: {error}");
        util::internal_error()
    }

    fn on_security_error(&self, error: &SecurityError) -> Response<Self::Body> {
        tracing::debug!("authorization failed: {error}");
        util::unauthorized(&error.to_string())
    }

    fn on_verification_error(&self, error: &TokenVerificationError) -> Response<Self::Body> {
        let description = util::error_chain(error);
        tracing::debug!("authorization failed: {description}");
        util::forbidden(&description)
    }

    fn on_auth_denied(&self, error: &AuthError) -> Response<Self::Body> {
        tracing::debug!("authorization failed: {error}");
        util::forbidden(&error.to_string())
    }
}

/// Builder for authorization layers backed by a [`bearward::Authorizer`]
pub struct BearerAuthorizer<OnError> {
    authorizer: Authorizer,
    on_error: OnError,
}

impl<OnError> Clone for BearerAuthorizer<OnError>
where
    OnError: Clone,
{
    fn clone(&self) -> Self {
        Self {
            authorizer: self.authorizer.clone(),
            on_error: self.on_error.clone(),
        }
    }
}

impl<OnError> fmt::Debug for BearerAuthorizer<OnError>
where
    OnError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("BearerAuthorizer")
            .field("authorizer", &self.authorizer)
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl BearerAuthorizer<()> {
    /// Constructs a builder without an error handler attached
    #[inline]
    pub fn new(authorizer: Authorizer) -> Self {
        Self {
            authorizer,
            on_error: (),
        }
    }
}

impl<OnError> BearerAuthorizer<OnError> {
    /// Attaches a custom error handler to generate responses in the event
    /// of an authorization failure
    #[inline]
    pub fn with_error_handler<E>(self, on_error: E) -> BearerAuthorizer<E> {
        BearerAuthorizer {
            authorizer: self.authorizer,
            on_error,
        }
    }

    /// Attaches the default terse error handler: [`TerseErrorHandler`]
    #[inline]
    pub fn with_terse_error_handler<ResBody: Default>(
        self,
    ) -> BearerAuthorizer<TerseErrorHandler<ResBody>> {
        self.with_error_handler(TerseErrorHandler::new())
    }

    /// Attaches the default verbose error handler: [`VerboseErrorHandler`]
    #[inline]
    pub fn with_verbose_error_handler<ResBody: Default>(
        self,
    ) -> BearerAuthorizer<VerboseErrorHandler<ResBody>> {
        self.with_error_handler(VerboseErrorHandler::new())
    }
}

impl<OnError> BearerAuthorizer<OnError>
where
    OnError: OnAuthzError + Clone + Send + 'static,
    OnError::Body: Default + Send + 'static,
{
    /// Authorization layer that runs one engine pass per request
    ///
    /// Successful passes store the winning group's
    /// [`VerifiedClaims`][bearward::VerifiedClaims] in the request
    /// extensions.
    pub fn layer(&self) -> AsyncRequireAuthorizationLayer<AuthorizeBearer<OnError>> {
        AsyncRequireAuthorizationLayer::new(AuthorizeBearer::new(
            self.authorizer.clone(),
            self.on_error.clone(),
        ))
    }
}
