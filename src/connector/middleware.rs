use crate::connector::request_cache;
use axum::extract::Request;
use axum::middleware::Next;
use axum::response::Response;

/// Run each inbound request inside its own request cache scope.
///
/// Install with `axum::middleware::from_fn(request_cache_layer)`.
pub async fn request_cache_layer(request: Request, next: Next) -> Response {
    request_cache::scope(next.run(request)).await
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::StatusCode;
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    async fn report_scope() -> String {
        let count = request_cache::cached_field_count();
        format!("{}:{:?}", request_cache::is_active(), count)
    }

    async fn body_text(response: Response) -> String {
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        String::from_utf8(bytes.to_vec()).unwrap()
    }

    #[tokio::test]
    async fn test_every_request_gets_a_fresh_scope() {
        let app = Router::new()
            .route("/", get(report_scope))
            .layer(axum::middleware::from_fn(request_cache_layer));

        for _ in 0..2 {
            let response = app
                .clone()
                .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(response.status(), StatusCode::OK);
            assert_eq!(body_text(response).await, "true:Some(0)");
            assert!(!request_cache::is_active());
        }
    }

    #[tokio::test]
    async fn test_routes_without_layer_have_no_scope() {
        let app = Router::new().route("/", get(report_scope));
        let response = app
            .oneshot(Request::builder().uri("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(body_text(response).await, "false:None");
    }
}
