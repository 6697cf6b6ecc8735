use axum::Router;
use axum::routing::{get, post};
use tower_http::limit::RequestBodyLimitLayer;

use crate::handlers::{
    create_analyzer, create_query, delete_analyzer, get_analyzer, get_query,
};
use crate::server::AppState;

pub(crate) fn build_router(state: AppState, max_body_size: usize) -> Router {
    Router::new()
        .route("/analyzers", post(create_analyzer))
        .route(
            "/analyzers/{id}",
            get(get_analyzer).delete(delete_analyzer),
        )
        .route("/analyzers/{id}/queries", post(create_query))
        .route("/queries/{id}", get(get_query))
        .layer(RequestBodyLimitLayer::new(max_body_size))
        .with_state(state)
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use quarry_jobs::{Analyzer, AnalyzerStatus, NoopSpawner, Query, QueryStatus};
    use quarry_store::CoordStore;
    use quarry_store::memory::InMemoryCoordStore;

    use super::*;

    fn make_state() -> (AppState, Arc<dyn CoordStore>, Arc<NoopSpawner>) {
        let store: Arc<dyn CoordStore> = Arc::new(InMemoryCoordStore::new());
        let spawner = Arc::new(NoopSpawner::new());
        (
            AppState {
                store: Arc::clone(&store),
                spawner: spawner.clone(),
            },
            store,
            spawner,
        )
    }

    fn make_router() -> (Router, Arc<dyn CoordStore>, Arc<NoopSpawner>) {
        let (state, store, spawner) = make_state();
        (build_router(state, 1_048_576), store, spawner)
    }

    fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
        Request::builder()
            .method("POST")
            .uri(uri)
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    async fn json_body(resp: axum::response::Response) -> serde_json::Value {
        let bytes = resp.into_body().collect().await.unwrap().to_bytes();
        serde_json::from_slice(&bytes).unwrap()
    }

    #[tokio::test]
    async fn create_analyzer_spawns_worker_and_returns_id() {
        let (app, store, spawner) = make_router();
        let body = serde_json::json!({"source_url": "https://github.com/octo/webapp"});
        let resp = app.oneshot(post_json("/analyzers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = json_body(resp).await;
        let id = json["analyzer_id"].as_str().unwrap();
        assert_eq!(spawner.spawned_ids(), vec![id.to_owned()]);

        let analyzer = Analyzer::from_id(store, id);
        assert_eq!(
            analyzer.status().await.unwrap(),
            Some(AnalyzerStatus::Spawned)
        );
    }

    #[tokio::test]
    async fn create_analyzer_rejects_bad_url() {
        let (app, _, _) = make_router();
        let body = serde_json::json!({"source_url": "not a repository"});
        let resp = app.oneshot(post_json("/analyzers", body)).await.unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn get_analyzer_reports_status() {
        let (app, store, _) = make_router();
        let analyzer = Analyzer::create(store, "https://github.com/octo/webapp")
            .await
            .unwrap();
        analyzer.set_status(AnalyzerStatus::Processing).await.unwrap();

        let req = Request::builder()
            .uri(format!("/analyzers/{}", analyzer.id()))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let json = json_body(resp).await;
        assert_eq!(json["status"], "PROCESSING");
    }

    #[tokio::test]
    async fn unknown_analyzer_is_404() {
        let (app, _, _) = make_router();
        let req = Request::builder()
            .uri("/analyzers/doesnotexist")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn query_rejected_unless_analyzer_ready() {
        let (app, store, _) = make_router();
        let analyzer = Analyzer::create(store, "https://github.com/octo/webapp")
            .await
            .unwrap();

        let uri = format!("/analyzers/{}/queries", analyzer.id());
        let resp = app
            .oneshot(post_json(&uri, serde_json::json!({"question": "why?"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn query_created_against_ready_analyzer() {
        let (app, store, _) = make_router();
        let analyzer = Analyzer::create(Arc::clone(&store), "https://github.com/octo/webapp")
            .await
            .unwrap();
        analyzer.set_status(AnalyzerStatus::Ready).await.unwrap();

        let uri = format!("/analyzers/{}/queries", analyzer.id());
        let resp = app
            .oneshot(post_json(&uri, serde_json::json!({"question": "why?"})))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);

        let json = json_body(resp).await;
        let query_id = json["query_id"].as_str().unwrap();
        let query = Query::from_id(store, query_id);
        assert_eq!(query.status().await.unwrap(), Some(QueryStatus::Requested));
    }

    #[tokio::test]
    async fn query_for_unknown_analyzer_is_404() {
        let (app, _, _) = make_router();
        let resp = app
            .oneshot(post_json(
                "/analyzers/nope/queries",
                serde_json::json!({"question": "why?"}),
            ))
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn get_query_reports_status_without_result() {
        let (app, store, _) = make_router();
        let query = Query::create(store, "a1", "why?");
        query.set_status(QueryStatus::Answering).await.unwrap();

        let req = Request::builder()
            .uri(format!("/queries/{}", query.id()))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        let json = json_body(resp).await;
        assert_eq!(json["status"], "ANSWERING");
        assert!(json.get("result").is_none());
    }

    #[tokio::test]
    async fn unknown_query_is_404() {
        let (app, _, _) = make_router();
        let req = Request::builder()
            .uri("/queries/nope")
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn delete_analyzer_cascades() {
        let (app, store, _) = make_router();
        let analyzer = Analyzer::create(Arc::clone(&store), "https://github.com/octo/webapp")
            .await
            .unwrap();
        analyzer.set_status(AnalyzerStatus::Ready).await.unwrap();
        let query = analyzer.enqueue_query("why?").await.unwrap();

        let req = Request::builder()
            .method("DELETE")
            .uri(format!("/analyzers/{}", analyzer.id()))
            .body(Body::empty())
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::NO_CONTENT);

        assert!(analyzer.status().await.unwrap().is_none());
        assert!(!query.exists().await.unwrap());
    }

    #[tokio::test]
    async fn body_size_limit_enforced() {
        let (state, _, _) = make_state();
        let app = build_router(state, 64);
        let oversized = vec![b'a'; 256];
        let req = Request::builder()
            .method("POST")
            .uri("/analyzers")
            .header("content-type", "application/json")
            .body(Body::from(oversized))
            .unwrap();
        let resp = app.oneshot(req).await.unwrap();
        assert_eq!(resp.status(), StatusCode::PAYLOAD_TOO_LARGE);
    }
}
