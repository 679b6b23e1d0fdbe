//! Process-wide application instance.
//!
//! Kept in its own test binary so no other test touches the shared app.

use std::sync::atomic::{AtomicUsize, Ordering};

use axum::{
    body::{to_bytes, Body},
    http::{header, Request, StatusCode},
    routing::post,
    Json, Router,
};
use serde_json::{json, Value};
use serverless_app::api::{shared_app, ParsedBody, RouteRegistrar};
use serverless_app::error::{AppError, AppResult};
use serverless_app::server::ServerHandle;
use tower::ServiceExt;

struct CountingRoutes {
    calls: AtomicUsize,
    fail_first: bool,
}

impl RouteRegistrar for CountingRoutes {
    async fn register(&self, server: Option<&ServerHandle>, router: Router) -> AppResult<Router> {
        async fn echo(ParsedBody(body): ParsedBody) -> Json<Value> {
            Json(body)
        }

        assert!(server.is_none());
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_first && call == 0 {
            return Err(AppError::Internal("cold start failure".to_string()));
        }

        Ok(router.route("/echo", post(echo)))
    }
}

#[tokio::test]
async fn test_shared_app_registers_once() {
    let registrar = CountingRoutes {
        calls: AtomicUsize::new(0),
        fail_first: true,
    };

    // A failed build is surfaced and not cached.
    assert!(matches!(
        shared_app(&registrar).await,
        Err(AppError::Registration(_))
    ));

    let first = shared_app(&registrar).await.unwrap();
    let second = shared_app(&registrar).await.unwrap();
    assert_eq!(registrar.calls.load(Ordering::SeqCst), 2);

    // Both handles are the same app and still serve parsed bodies.
    for app in [first, second] {
        let request = Request::builder()
            .method("POST")
            .uri("/echo")
            .header(header::CONTENT_TYPE, "application/json")
            .body(Body::from(r#"{"n":1}"#))
            .unwrap();

        let response = app.oneshot(request).await.unwrap();
        assert_eq!(response.status(), StatusCode::OK);
        let body = to_bytes(response.into_body(), 1024).await.unwrap();
        let parsed: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(parsed, json!({"n": 1}));
    }
}
