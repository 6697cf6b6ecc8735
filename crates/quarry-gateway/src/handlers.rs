use std::sync::Arc;

use axum::Json;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;

use quarry_index::repo::Repository;
use quarry_jobs::{Analyzer, AnalyzerStatus, Query};

use crate::error::GatewayError;
use crate::server::AppState;

#[derive(serde::Deserialize)]
pub(crate) struct CreateAnalyzerRequest {
    pub source_url: String,
}

#[derive(serde::Serialize)]
struct CreateAnalyzerResponse {
    analyzer_id: String,
}

#[derive(serde::Serialize)]
struct AnalyzerStatusResponse {
    analyzer_id: String,
    status: String,
}

#[derive(serde::Deserialize)]
pub(crate) struct CreateQueryRequest {
    pub question: String,
}

#[derive(serde::Serialize)]
struct CreateQueryResponse {
    query_id: String,
}

#[derive(serde::Serialize)]
struct QueryStatusResponse {
    query_id: String,
    status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    result: Option<serde_json::Value>,
}

pub(crate) async fn create_analyzer(
    State(state): State<AppState>,
    Json(payload): Json<CreateAnalyzerRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    if Repository::extract_id(&payload.source_url).is_none() {
        return Err(GatewayError::BadRequest(format!(
            "cannot extract repository id from {}",
            payload.source_url
        )));
    }

    let analyzer = Analyzer::create(Arc::clone(&state.store), &payload.source_url).await?;
    state
        .spawner
        .spawn(analyzer.id(), &payload.source_url)
        .await?;
    analyzer.set_status(AnalyzerStatus::Spawned).await?;

    Ok(Json(CreateAnalyzerResponse {
        analyzer_id: analyzer.id().to_owned(),
    }))
}

pub(crate) async fn get_analyzer(
    State(state): State<AppState>,
    Path(analyzer_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let analyzer = Analyzer::from_id(Arc::clone(&state.store), &analyzer_id);
    let status = analyzer
        .status()
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("analyzer {analyzer_id} not found")))?;

    Ok(Json(AnalyzerStatusResponse {
        analyzer_id,
        status: status.as_str().to_owned(),
    }))
}

pub(crate) async fn create_query(
    State(state): State<AppState>,
    Path(analyzer_id): Path<String>,
    Json(payload): Json<CreateQueryRequest>,
) -> Result<impl IntoResponse, GatewayError> {
    let analyzer = Analyzer::from_id(Arc::clone(&state.store), &analyzer_id);
    if analyzer.status().await?.is_none() {
        return Err(GatewayError::NotFound(format!(
            "analyzer {analyzer_id} not found"
        )));
    }

    let query = analyzer.enqueue_query(&payload.question).await?;
    Ok(Json(CreateQueryResponse {
        query_id: query.id().to_owned(),
    }))
}

pub(crate) async fn get_query(
    State(state): State<AppState>,
    Path(query_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let query = Query::from_id(Arc::clone(&state.store), &query_id);
    let status = query
        .status()
        .await?
        .ok_or_else(|| GatewayError::NotFound(format!("query {query_id} not found")))?;

    // Status and result are separate keys; a DONE status with a result
    // still in flight reads as result-absent, which pollers retry.
    let result = query
        .result()
        .await?
        .map(|report| serde_json::to_value(report))
        .transpose()
        .map_err(quarry_jobs::JobError::from)?;

    Ok(Json(QueryStatusResponse {
        query_id,
        status: status.as_str().to_owned(),
        result,
    }))
}

pub(crate) async fn delete_analyzer(
    State(state): State<AppState>,
    Path(analyzer_id): Path<String>,
) -> Result<impl IntoResponse, GatewayError> {
    let analyzer = Analyzer::from_id(Arc::clone(&state.store), &analyzer_id);
    if analyzer.status().await?.is_none() {
        return Err(GatewayError::NotFound(format!(
            "analyzer {analyzer_id} not found"
        )));
    }

    if let Err(e) = state.spawner.terminate(&analyzer_id).await {
        tracing::warn!(analyzer_id = %analyzer_id, "worker terminate failed: {e}");
    }
    analyzer.teardown().await?;
    Ok(StatusCode::NO_CONTENT)
}
