// src/dashboard/mod.rs
use serde::Serialize;
use std::{convert::Infallible, sync::Arc, time::Instant};
use tracing::{info, warn};
use warp::{reject::Rejection, reply::Reply, Filter};

use crate::{dataset::Dataset, query::Classification};

pub mod view;

pub use view::{build_dashboard, dashboard_options, DashboardOptions, DashboardQuery, DashboardView};

const INDEX_HTML: &str = include_str!("index.html");
const SERVICE_NAME: &str = "fii-dashboard";

/// Everything the handlers read. Built once, shared read-only.
pub struct AppState {
    pub dataset: Dataset,
    pub classification: Classification,
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
    details: Option<String>,
}

impl ErrorResponse {
    fn reply(error: &str, details: impl std::fmt::Display) -> warp::reply::Json {
        warp::reply::json(&ErrorResponse {
            error: error.to_string(),
            details: Some(details.to_string()),
        })
    }
}

fn with_state(
    state: Arc<AppState>,
) -> impl Filter<Extract = (Arc<AppState>,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

async fn health_check() -> Result<impl Reply, Rejection> {
    Ok(warp::reply::json(&serde_json::json!({
        "status": "healthy",
        "service": SERVICE_NAME
    })))
}

async fn options_handler(state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    match tokio::task::spawn_blocking(move || dashboard_options(&state.dataset)).await {
        Ok(Ok(opts)) => Ok(warp::reply::json(&opts)),
        Ok(Err(e)) => {
            warn!(error = %format!("{:#}", e), "listing options failed");
            Ok(ErrorResponse::reply("Options failed", format!("{:#}", e)))
        }
        Err(e) => Ok(ErrorResponse::reply("Options task failed", e)),
    }
}

async fn dashboard_handler(query: DashboardQuery, state: Arc<AppState>) -> Result<impl Reply, Rejection> {
    let start = Instant::now();
    info!(?query, "dashboard request");

    let result = tokio::task::spawn_blocking(move || {
        build_dashboard(&state.dataset, &state.classification, &query)
    })
    .await;

    match result {
        Ok(Ok(view)) => {
            info!(
                rows = view.rows,
                sections = view.sections.len(),
                elapsed = ?start.elapsed(),
                "dashboard reply"
            );
            Ok(warp::reply::json(&view))
        }
        Ok(Err(e)) => {
            warn!(error = %format!("{:#}", e), elapsed = ?start.elapsed(), "dashboard failed");
            Ok(ErrorResponse::reply("Dashboard failed", format!("{:#}", e)))
        }
        Err(e) => Ok(ErrorResponse::reply("Dashboard task failed", e)),
    }
}

/// All HTTP routes of the dashboard service.
pub fn routes(
    state: Arc<AppState>,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health")
        .and(warp::path::end())
        .and(warp::get())
        .and_then(health_check);

    let options = warp::path!("api" / "options")
        .and(warp::get())
        .and(with_state(state.clone()))
        .and_then(options_handler);

    let dashboard = warp::path!("api" / "dashboard")
        .and(warp::get())
        .and(warp::query::<DashboardQuery>())
        .and(with_state(state))
        .and_then(dashboard_handler);

    let index = warp::path::end()
        .and(warp::get())
        .map(|| warp::reply::html(INDEX_HTML));

    health.or(options).or(dashboard).or(index)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dashboard::view::tests::fixture;
    use serde_json::Value;
    use warp::http::StatusCode;

    fn state() -> (tempfile::TempDir, Arc<AppState>) {
        let (dir, dataset) = fixture();
        let state = Arc::new(AppState {
            dataset,
            classification: Classification::default(),
        });
        (dir, state)
    }

    #[tokio::test]
    async fn health_reports_the_service() {
        let (_dir, state) = state();
        let resp = warp::test::request()
            .method("GET")
            .path("/health")
            .reply(&routes(state))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let body: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(body["status"], "healthy");
        assert_eq!(body["service"], SERVICE_NAME);
    }

    #[tokio::test]
    async fn options_and_dashboard_round_trip() {
        let (_dir, state) = state();
        let api = routes(state);

        let resp = warp::test::request().path("/api/options").reply(&api).await;
        assert_eq!(resp.status(), StatusCode::OK);
        let opts: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(opts["default_year"], 2024);
        assert_eq!(opts["funds"], serde_json::json!(["aa", "bb"]));

        let resp = warp::test::request()
            .path("/api/dashboard?date_col=Data_Referencia&funds=aa,bb&year=2023")
            .reply(&api)
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let view: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(view["rows"], 3);
        assert_eq!(view["sections"][0]["group"], "portfolio");
        assert_eq!(view["sections"][0]["charts"][0]["kind"], "line");
        assert_eq!(view["sections"][0]["charts"][0]["points"][0]["date"], "2023-03-31");
    }

    #[tokio::test]
    async fn missing_parameters_yield_notices() {
        let (_dir, state) = state();
        let resp = warp::test::request()
            .path("/api/dashboard")
            .reply(&routes(state))
            .await;
        assert_eq!(resp.status(), StatusCode::OK);
        let view: Value = serde_json::from_slice(resp.body()).unwrap();
        assert_eq!(view["notices"][0]["level"], "warning");
        assert_eq!(view["sections"], serde_json::json!([]));
    }

    #[tokio::test]
    async fn index_page_is_served() {
        let (_dir, state) = state();
        let resp = warp::test::request().path("/").reply(&routes(state)).await;
        assert_eq!(resp.status(), StatusCode::OK);
        assert!(std::str::from_utf8(resp.body()).unwrap().contains("/api/dashboard"));
    }
}
