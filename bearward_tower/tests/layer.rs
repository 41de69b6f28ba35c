//! Exercising the authorization layer through a real tower service stack

use std::convert::Infallible;

use bearward::{Authorizer, AuthorizerConfig, VerifiedClaims};
use bearward_tower::BearerAuthorizer;
use http::{header, Request, Response, StatusCode};
use serde_json::{json, Value};
use tower::{service_fn, ServiceBuilder, ServiceExt};

fn sign(claims: Value) -> String {
    jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &claims,
        &jsonwebtoken::EncodingKey::from_secret(b"testSecret"),
    )
    .expect("token signs")
}

fn engine() -> Authorizer {
    let document = serde_json::from_value(json!({
        "security": [{ "bearerjwt": [] }],
        "paths": {
            "/api/v1/bearerjwt": { "get": {} },
            "/api/v1/bearerjwt/{paramId}": {
                "get": {
                    "parameters": [
                        { "name": "paramId", "in": "path", "x-acl-binding": "paramBinding" }
                    ]
                }
            },
        },
        "components": {
            "securitySchemes": {
                "bearerjwt": {
                    "type": "http",
                    "scheme": "bearer",
                    "bearerFormat": "JWT",
                    "x-acl-config": {
                        "user": {
                            "/api/v1/bearerjwt": { "readAny": ["*"] },
                            "/api/v1/bearerjwt/{paramId}": { "readOwn": ["*"] },
                        }
                    }
                }
            }
        }
    }))
    .expect("valid document");
    let config: AuthorizerConfig = serde_json::from_value(json!({
        "schemes": { "bearerjwt": { "issuer": "testIssuer", "secret": "testSecret" } }
    }))
    .expect("valid config");
    Authorizer::new(document, &config).expect("engine builds")
}

/// Inner service that reports whether claims landed in the extensions
async fn echo_claims(req: Request<String>) -> Result<Response<String>, Infallible> {
    let body = match req.extensions().get::<VerifiedClaims>() {
        Some(claims) if !claims.is_empty() => claims
            .iter()
            .map(|(scheme, decoded)| {
                let decoded = serde_json::to_string(decoded).expect("serializes");
                format!("{scheme}={decoded}")
            })
            .collect::<Vec<_>>()
            .join("\n"),
        _ => String::from("no claims"),
    };
    Ok(Response::new(body))
}

fn request(path: &str, authorization: Option<&str>) -> Request<String> {
    let mut builder = Request::get(path);
    if let Some(value) = authorization {
        builder = builder.header(header::AUTHORIZATION, value);
    }
    builder.body(String::new()).expect("request builds")
}

#[tokio::test]
async fn authorized_request_reaches_the_service_with_claims() {
    let auth = BearerAuthorizer::new(engine()).with_verbose_error_handler::<String>();
    let service = ServiceBuilder::new()
        .layer(auth.layer())
        .service(service_fn(echo_claims));

    let token = sign(json!({ "iss": "testIssuer", "role": "user", "payload": "test" }));
    let resp = service
        .oneshot(request("/api/v1/bearerjwt", Some(&format!("Bearer {token}"))))
        .await
        .expect("service is infallible");

    assert_eq!(resp.status(), StatusCode::OK);
    let decoded = resp
        .body()
        .strip_prefix("bearerjwt=")
        .expect("claims keyed by scheme");
    let claims: Value = serde_json::from_str(decoded).expect("body is claims json");
    assert_eq!(claims["payload"], json!("test"));
}

#[tokio::test]
async fn missing_credentials_are_rejected_with_401() {
    let auth = BearerAuthorizer::new(engine()).with_verbose_error_handler::<String>();
    let service = ServiceBuilder::new()
        .layer(auth.layer())
        .service(service_fn(echo_claims));

    let resp = service
        .oneshot(request("/api/v1/bearerjwt", None))
        .await
        .expect("service is infallible");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    let challenge = resp
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .expect("challenge present")
        .to_str()
        .expect("visible ascii");
    assert!(challenge.starts_with(r#"Bearer error="invalid_token""#));
}

#[tokio::test]
async fn bad_signature_is_rejected_with_403() {
    let auth = BearerAuthorizer::new(engine()).with_verbose_error_handler::<String>();
    let service = ServiceBuilder::new()
        .layer(auth.layer())
        .service(service_fn(echo_claims));

    let forged = jsonwebtoken::encode(
        &jsonwebtoken::Header::default(),
        &json!({ "iss": "testIssuer", "role": "user" }),
        &jsonwebtoken::EncodingKey::from_secret(b"wrongSecret"),
    )
    .expect("token signs");

    let resp = service
        .oneshot(request("/api/v1/bearerjwt", Some(&format!("Bearer {forged}"))))
        .await
        .expect("service is infallible");

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn denied_operation_is_rejected_with_403_and_description() {
    let auth = BearerAuthorizer::new(engine()).with_verbose_error_handler::<String>();
    let service = ServiceBuilder::new()
        .layer(auth.layer())
        .service(service_fn(echo_claims));

    let token = sign(json!({ "iss": "testIssuer", "role": "user", "paramBinding": [1] }));
    let resp = service
        .oneshot(request(
            "/api/v1/bearerjwt/7",
            Some(&format!("Bearer {token}")),
        ))
        .await
        .expect("service is infallible");

    assert_eq!(resp.status(), StatusCode::FORBIDDEN);
    let challenge = resp
        .headers()
        .get(header::WWW_AUTHENTICATE)
        .expect("challenge present")
        .to_str()
        .expect("visible ascii");
    assert!(challenge.contains("operation not permitted"));
}

#[tokio::test]
async fn terse_handler_omits_descriptions() {
    let auth = BearerAuthorizer::new(engine()).with_terse_error_handler::<String>();
    let service = ServiceBuilder::new()
        .layer(auth.layer())
        .service(service_fn(echo_claims));

    let resp = service
        .oneshot(request("/api/v1/bearerjwt", None))
        .await
        .expect("service is infallible");

    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
    assert_eq!(
        resp.headers()
            .get(header::WWW_AUTHENTICATE)
            .expect("challenge present"),
        r#"Bearer error="invalid_token""#,
    );
}

#[tokio::test]
async fn unsecured_paths_pass_through_without_claims() {
    let auth = BearerAuthorizer::new(engine()).with_verbose_error_handler::<String>();
    let service = ServiceBuilder::new()
        .layer(auth.layer())
        .service(service_fn(echo_claims));

    let resp = service
        .oneshot(request("/not/in/the/document", None))
        .await
        .expect("service is infallible");

    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(resp.body(), "no claims");
}
