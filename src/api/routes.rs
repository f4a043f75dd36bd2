use axum::{
    middleware,
    routing::{get, post},
    Router,
};

use crate::api::handlers::{self, ServerState};
use crate::connector::request_cache_layer;
use crate::store::traits::ModelStore;

pub fn create_router<S: ModelStore + 'static>() -> Router<ServerState<S>> {
    let forbidden = handlers::method_forbidden;

    Router::new()
        // Health check
        .route("/health", get(handlers::health_check))
        // Directory and metadata
        .route(
            "/slumber/",
            get(handlers::get_directory::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/",
            get(handlers::get_application::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/:model/",
            get(handlers::get_model::<S>).fallback(forbidden),
        )
        // Model operations
        .route(
            "/slumber/:app/:model/instances/",
            get(handlers::list_instances::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/:model/get/",
            get(handlers::query_instance::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/:model/create/",
            post(handlers::create_instance::<S>).fallback(forbidden),
        )
        // Instance operations
        .route(
            "/slumber/:app/:model/data/:pk/",
            get(handlers::get_instance::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/:model/data/:pk/:array/",
            get(handlers::list_related::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/:model/update/:pk/",
            post(handlers::update_instance::<S>).fallback(forbidden),
        )
        .route(
            "/slumber/:app/:model/delete/:pk/",
            post(handlers::delete_instance::<S>).fallback(forbidden),
        )
        .layer(middleware::from_fn(request_cache_layer))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::seed::load_models;
    use crate::store::MemoryStore;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use serde_json::{json, Value};
    use std::sync::Arc;
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(MemoryStore::new());
        load_models(&*store).await.unwrap();
        create_router().with_state(ServerState::new(store, 10))
    }

    async fn send(router: &Router, method: &str, uri: &str) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .body(Body::empty())
            .unwrap();
        let response = router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn test_wrong_method_is_forbidden() {
        let router = app().await;

        let (status, body) = send(&router, "POST", "/slumber/slumber_test/Pizza/instances/").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body["error"].as_str().unwrap().contains("POST"));

        let (status, _) = send(&router, "PURGE", "/slumber/slumber_test/Pizza/instances/").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&router, "GET", "/slumber/slumber_test/Pizza/create/").await;
        assert_eq!(status, StatusCode::FORBIDDEN);

        let (status, _) = send(&router, "GET", "/slumber/slumber_test/Pizza/delete/1/").await;
        assert_eq!(status, StatusCode::FORBIDDEN);
    }

    #[tokio::test]
    async fn test_application_without_models() {
        let router = app().await;

        let (status, body) = send(&router, "GET", "/slumber/slumber_test.no_models/").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"models": {}}));

        let (_, directory) = send(&router, "GET", "/slumber/").await;
        assert_eq!(
            directory["apps"]["slumber_test.no_models"],
            "/slumber/slumber_test.no_models/"
        );

        let (status, _) = send(&router, "GET", "/slumber/nope/").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
