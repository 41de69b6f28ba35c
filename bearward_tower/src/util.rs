//! Utilities for generating HTTP responses on authorization failures

use std::error::Error;

use http::{header, HeaderValue, Response, StatusCode};

/// Build a `401 Unauthorized` response with the appropriate
/// `www-authenticate` header
///
/// The description provided will be automatically escaped to make sure it
/// is header-friendly.
///
/// The prepared response will have the form:
///
/// ```http
/// HTTP/1.1 401 Unauthorized
/// www-authenticate: Bearer error="invalid_token" error_description="{description}"
/// ```
///
/// `error_description` is omitted if `description` is empty.
pub fn unauthorized<Body: Default>(description: &str) -> Response<Body> {
    let mut resp = Response::new(Body::default());
    *resp.status_mut() = StatusCode::UNAUTHORIZED;
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, invalid_token(description));
    resp
}

/// Build a `403 Forbidden` response with the appropriate
/// `www-authenticate` header
///
/// The description provided will be automatically escaped to make sure it
/// is header-friendly.
///
/// The prepared response will have the form:
///
/// ```http
/// HTTP/1.1 403 Forbidden
/// www-authenticate: Bearer error="insufficient_permissions" error_description="{description}"
/// ```
///
/// `error_description` is omitted if `description` is empty.
pub fn forbidden<Body: Default>(description: &str) -> Response<Body> {
    let mut resp = Response::new(Body::default());
    *resp.status_mut() = StatusCode::FORBIDDEN;
    resp.headers_mut()
        .insert(header::WWW_AUTHENTICATE, insufficient_permissions(description));
    resp
}

/// Build a `500 Internal Server Error` response with an empty body
///
/// Used when an engine misconfiguration surfaces at request time; the
/// fault is the server's, so no detail is exposed to the caller.
pub fn internal_error<Body: Default>() -> Response<Body> {
    let mut resp = Response::new(Body::default());
    *resp.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
    resp
}

/// Renders an error and its sources as a single `: `-separated line
pub fn error_chain(error: &dyn Error) -> String {
    let mut description = error.to_string();
    let mut source = error.source();
    while let Some(err) = source {
        description.push_str(": ");
        description.push_str(&err.to_string());
        source = err.source();
    }
    description
}

fn invalid_token(description: &str) -> HeaderValue {
    if description.is_empty() {
        HeaderValue::from_static(r#"Bearer error="invalid_token""#)
    } else {
        HeaderValue::try_from(format!(
            r#"Bearer error="invalid_token" error_description="{}""#,
            description.escape_default()
        ))
        .expect("escaped description is a valid header value")
    }
}

fn insufficient_permissions(description: &str) -> HeaderValue {
    if description.is_empty() {
        HeaderValue::from_static(r#"Bearer error="insufficient_permissions""#)
    } else {
        HeaderValue::try_from(format!(
            r#"Bearer error="insufficient_permissions" error_description="{}""#,
            description.escape_default()
        ))
        .expect("escaped description is a valid header value")
    }
}
