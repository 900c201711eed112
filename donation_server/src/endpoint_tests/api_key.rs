use actix_web::{http::StatusCode, test::TestRequest, web, web::ServiceConfig};
use dpg_common::Secret;
use serde_json::{json, Value};

use super::helpers::send_request;
use crate::{
    middleware::{ApiKeyMiddlewareFactory, API_KEY_HEADER},
    routes::health,
};

fn configure(key: Option<&str>) -> impl FnOnce(&mut ServiceConfig) {
    let key = key.map(|k| Secret::new(k.to_string()));
    move |cfg| {
        cfg.service(web::scope("/api").wrap(ApiKeyMiddlewareFactory::new(key)).service(health));
    }
}

fn json_body(body: &str) -> Value {
    serde_json::from_str(body).expect("Response body is not JSON")
}

#[actix_web::test]
async fn missing_key() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/api/health");
    let (status, body) = send_request(req, configure(Some("s3cret"))).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(json_body(&body), json!({ "error": "Unauthorized. The X-Api-Key header is required." }));
}

#[actix_web::test]
async fn wrong_key() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/api/health").insert_header((API_KEY_HEADER, "guess"));
    let (status, body) = send_request(req, configure(Some("s3cret"))).await;
    assert_eq!(status, StatusCode::FORBIDDEN);
    assert_eq!(json_body(&body), json!({ "error": "Forbidden. Invalid API key." }));
}

#[actix_web::test]
async fn correct_key() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/api/health").insert_header((API_KEY_HEADER, "s3cret"));
    let (status, body) = send_request(req, configure(Some("s3cret"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, "👍️\n");
}

#[actix_web::test]
async fn no_key_configured() {
    let _ = env_logger::try_init().ok();
    let req = TestRequest::get().uri("/api/health");
    let (status, _) = send_request(req, configure(None)).await;
    assert_eq!(status, StatusCode::OK);
}
