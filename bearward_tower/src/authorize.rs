use std::fmt;

use bearward::{Authorizer, RequestContext, VerifiedClaims};
use futures::future::BoxFuture;
use http::{Request, Response};
use tower_http::auth::AsyncAuthorizeRequest;

/// Request authorizer driving one engine pass per request
///
/// Constructed through [`BearerAuthorizer::layer`][crate::BearerAuthorizer::layer].
pub struct AuthorizeBearer<OnError> {
    authorizer: Authorizer,
    on_error: OnError,
}

impl<OnError> AuthorizeBearer<OnError> {
    pub(crate) fn new(authorizer: Authorizer, on_error: OnError) -> Self {
        Self {
            authorizer,
            on_error,
        }
    }
}

impl<OnError> Clone for AuthorizeBearer<OnError>
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

impl<OnError> fmt::Debug for AuthorizeBearer<OnError>
where
    OnError: fmt::Debug,
{
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.debug_struct("AuthorizeBearer")
            .field("authorizer", &self.authorizer)
            .field("on_error", &self.on_error)
            .finish()
    }
}

impl<B, OnError> AsyncAuthorizeRequest<B> for AuthorizeBearer<OnError>
where
    B: Send + 'static,
    OnError: crate::OnAuthzError + Clone + Send + 'static,
    OnError::Body: Default + Send + 'static,
{
    type RequestBody = B;
    type ResponseBody = OnError::Body;
    type Future = BoxFuture<'static, Result<Request<B>, Response<OnError::Body>>>;

    fn authorize(&mut self, mut request: Request<B>) -> Self::Future {
        let authorizer = self.authorizer.clone();
        let on_error = self.on_error.clone();

        Box::pin(async move {
            let outcome = {
                let ctx = RequestContext::new(
                    request.method().clone(),
                    request.uri().path(),
                    request.headers(),
                )
                .with_query(request.uri().query())
                .with_preverified(request.extensions().get::<VerifiedClaims>());

                authorizer.authorize(&ctx).await
            };

            match outcome {
                Ok(claims) => {
                    let merged = match request.extensions_mut().remove::<VerifiedClaims>() {
                        Some(mut existing) => {
                            existing.merge(claims);
                            existing
                        }
                        None => claims,
                    };
                    request.extensions_mut().insert(merged);
                    Ok(request)
                }
                Err(error) => Err(on_error.on_authz_error(&error)),
            }
        })
    }
}
