//! API Service - read-only aggregation over the EV / energy star schema
//!
//! Endpoints:
//! - GET /health - Health check
//! - GET /api/tables/:name - Raw rows of an allow-listed table
//! - GET /api/energy-data - Energy facts joined with suburb and year
//! - GET /api/ev_metrics - EV totals and BEV share
//! - GET /api/ev-distribution - EV counts per suburb
//! - GET /api/ev-price-scatter - Average listed price vs EV count
//! - GET /api/ev-range-scatter - Average range vs EV count
//! - GET /api/energy-vs-no2 - Consumption and NO2 per suburb for one year
//! - GET /api/no2-trends - NO2 per suburb and year
//!
//! Table names are never taken from the request verbatim: they must resolve
//! through `etl::schema`, which lists every table the pipeline writes.

use anyhow::Context;
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use sqlx::{postgres::PgPoolOptions, PgPool};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use etl::normalize::canonical_suburb;
use etl::schema::{find_table, TableSpec};

const DEFAULT_LIMIT: i64 = 100;
const MAX_LIMIT: i64 = 1000;

// ============================================================================
// State
// ============================================================================

#[derive(Clone)]
struct AppState {
    pool: PgPool,
}

// ============================================================================
// Errors
// ============================================================================

#[derive(Debug, thiserror::Error)]
enum ApiError {
    #[error("Unknown table: {0}")]
    UnknownTable(String),

    #[error("limit must be between 1 and {MAX_LIMIT}, got {0}")]
    InvalidLimit(i64),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),
}

#[derive(Serialize)]
struct ErrorResponse {
    error: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self {
            ApiError::UnknownTable(_) | ApiError::InvalidLimit(_) => StatusCode::BAD_REQUEST,
            ApiError::Database(ref e) => {
                error!(error = %e, "Query failed");
                StatusCode::INTERNAL_SERVER_ERROR
            }
        };
        (
            status,
            Json(ErrorResponse {
                error: self.to_string(),
            }),
        )
            .into_response()
    }
}

// ============================================================================
// Response types
// ============================================================================

#[derive(Serialize)]
struct HealthResponse {
    ok: bool,
    version: &'static str,
}

#[derive(Serialize)]
struct TableResponse {
    table: &'static str,
    limit: i64,
    rows: serde_json::Value,
}

#[derive(Serialize, sqlx::FromRow)]
struct EnergyDataRow {
    suburb_name: String,
    year: i64,
    energy_consumption: f64,
    energy_change_pct: f64,
    no2_level: f64,
    no2_change: f64,
    no2_change_pct: f64,
    ev_per_energy_unit: f64,
    no2_per_ev: f64,
}

#[derive(Serialize)]
struct EvMetricsResponse {
    total_evs: i64,
    bev_count: i64,
    phev_count: i64,
    bev_pct: f64,
    suburbs_with_evs: i64,
}

#[derive(Serialize, sqlx::FromRow)]
struct EvDistributionRow {
    suburb_name: String,
    total_evs: i64,
    bev_count: i64,
    phev_count: i64,
}

#[derive(Serialize, sqlx::FromRow)]
struct ScatterPoint {
    suburb_name: String,
    value: f64,
    total_evs: i64,
}

#[derive(Serialize, sqlx::FromRow)]
struct EnergyVsNo2Row {
    suburb_name: String,
    year: i64,
    energy_consumption: f64,
    no2_level: f64,
    ev_per_energy_unit: f64,
}

#[derive(Serialize, sqlx::FromRow)]
struct No2TrendRow {
    suburb_name: String,
    year: i64,
    no2_level: f64,
    no2_change: f64,
    no2_change_pct: f64,
}

// ============================================================================
// Query params
// ============================================================================

#[derive(Deserialize)]
struct LimitQuery {
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct EnergyDataQuery {
    year: Option<i32>,
    suburb: Option<String>,
    limit: Option<i64>,
}

#[derive(Deserialize)]
struct YearQuery {
    year: Option<i32>,
}

// ============================================================================
// Validation
// ============================================================================

fn resolve_limit(limit: Option<i64>) -> Result<i64, ApiError> {
    match limit {
        None => Ok(DEFAULT_LIMIT),
        Some(l) if l < 1 => Err(ApiError::InvalidLimit(l)),
        Some(l) => Ok(l.min(MAX_LIMIT)),
    }
}

fn resolve_table(name: &str) -> Result<&'static TableSpec, ApiError> {
    find_table(name).ok_or_else(|| ApiError::UnknownTable(name.to_string()))
}

/// Stable row order: the primary key, or the dimension keys of a fact
fn order_columns(spec: &TableSpec) -> String {
    match spec.primary_key {
        Some(pk) => pk.to_string(),
        None => spec
            .foreign_keys
            .iter()
            .map(|fk| fk.column)
            .collect::<Vec<_>>()
            .join(", "),
    }
}

fn bev_percentage(bev: i64, total: i64) -> f64 {
    if total == 0 {
        0.0
    } else {
        bev as f64 / total as f64 * 100.0
    }
}

// ============================================================================
// Handlers
// ============================================================================

async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        ok: true,
        version: "0.1.0",
    })
}

async fn table_handler(
    State(state): State<Arc<AppState>>,
    Path(name): Path<String>,
    Query(params): Query<LimitQuery>,
) -> Result<Json<TableResponse>, ApiError> {
    let spec = resolve_table(&name)?;
    let limit = resolve_limit(params.limit)?;

    // spec.name comes from the static schema, never from the request
    let sql = format!(
        "SELECT COALESCE(json_agg(row_to_json(t)), '[]'::json) \
         FROM (SELECT * FROM {} ORDER BY {} LIMIT $1) t",
        spec.name,
        order_columns(spec)
    );
    let (rows,): (serde_json::Value,) = sqlx::query_as(&sql)
        .bind(limit)
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(TableResponse {
        table: spec.name,
        limit,
        rows,
    }))
}

async fn energy_data_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<EnergyDataQuery>,
) -> Result<Json<Vec<EnergyDataRow>>, ApiError> {
    let limit = resolve_limit(params.limit)?;
    let suburb = params.suburb.as_deref().and_then(canonical_suburb);

    let rows: Vec<EnergyDataRow> = sqlx::query_as(
        r#"
        SELECT
            s.suburb_name,
            t.year,
            e.energy_consumption,
            e.energy_change_pct,
            e.no2_level,
            e.no2_change,
            e.no2_change_pct,
            e.ev_per_energy_unit,
            e.no2_per_ev
        FROM energy_fact e
        JOIN suburb_dim s ON e.suburb_key = s.suburb_key
        JOIN time_dim t ON e.time_key = t.time_key
        WHERE ($1::bigint IS NULL OR t.year = $1)
          AND ($2::text IS NULL OR s.suburb_name = $2)
        ORDER BY s.suburb_name, t.year
        LIMIT $3
        "#,
    )
    .bind(params.year.map(i64::from))
    .bind(suburb)
    .bind(limit)
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

async fn ev_metrics_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<EvMetricsResponse>, ApiError> {
    let (total_evs, bev_count, phev_count, suburbs_with_evs): (i64, i64, i64, i64) =
        sqlx::query_as(
            r#"
            SELECT
                COALESCE(SUM(total_evs), 0)::bigint,
                COALESCE(SUM(bev_count), 0)::bigint,
                COALESCE(SUM(phev_count), 0)::bigint,
                COUNT(*) FILTER (WHERE total_evs > 0)
            FROM ev_fact
            "#,
        )
        .fetch_one(&state.pool)
        .await?;

    Ok(Json(EvMetricsResponse {
        total_evs,
        bev_count,
        phev_count,
        bev_pct: bev_percentage(bev_count, total_evs),
        suburbs_with_evs,
    }))
}

async fn ev_distribution_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<EvDistributionRow>>, ApiError> {
    let rows: Vec<EvDistributionRow> = sqlx::query_as(
        r#"
        SELECT s.suburb_name, e.total_evs, e.bev_count, e.phev_count
        FROM ev_fact e
        JOIN suburb_dim s ON e.suburb_key = s.suburb_key
        WHERE e.total_evs > 0
        ORDER BY e.total_evs DESC, s.suburb_name
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

/// Per-suburb (metric, EV count) pairs; `column` is one of a fixed set
async fn scatter(pool: &PgPool, column: &'static str) -> Result<Vec<ScatterPoint>, ApiError> {
    let sql = format!(
        "SELECT s.suburb_name, e.{column} AS value, e.total_evs \
         FROM ev_fact e \
         JOIN suburb_dim s ON e.suburb_key = s.suburb_key \
         WHERE e.total_evs > 0 \
         ORDER BY s.suburb_name"
    );
    Ok(sqlx::query_as(&sql).fetch_all(pool).await?)
}

async fn ev_price_scatter_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScatterPoint>>, ApiError> {
    Ok(Json(scatter(&state.pool, "avg_price").await?))
}

async fn ev_range_scatter_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<ScatterPoint>>, ApiError> {
    Ok(Json(scatter(&state.pool, "avg_range_km").await?))
}

async fn energy_vs_no2_handler(
    State(state): State<Arc<AppState>>,
    Query(params): Query<YearQuery>,
) -> Result<Json<Vec<EnergyVsNo2Row>>, ApiError> {
    // Default to the year flagged current in time_dim
    let rows: Vec<EnergyVsNo2Row> = sqlx::query_as(
        r#"
        SELECT s.suburb_name, t.year, e.energy_consumption, e.no2_level, e.ev_per_energy_unit
        FROM energy_fact e
        JOIN suburb_dim s ON e.suburb_key = s.suburb_key
        JOIN time_dim t ON e.time_key = t.time_key
        WHERE ($1::bigint IS NULL AND t.is_current_year) OR t.year = $1
        ORDER BY s.suburb_name
        "#,
    )
    .bind(params.year.map(i64::from))
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

async fn no2_trends_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<Vec<No2TrendRow>>, ApiError> {
    // Suburbs without a monitoring station carry a zero level; skip them
    let rows: Vec<No2TrendRow> = sqlx::query_as(
        r#"
        SELECT s.suburb_name, t.year, e.no2_level, e.no2_change, e.no2_change_pct
        FROM energy_fact e
        JOIN suburb_dim s ON e.suburb_key = s.suburb_key
        JOIN time_dim t ON e.time_key = t.time_key
        WHERE e.no2_level > 0
        ORDER BY s.suburb_name, t.year
        "#,
    )
    .fetch_all(&state.pool)
    .await?;

    Ok(Json(rows))
}

// ============================================================================
// Main
// ============================================================================

fn build_router(state: Arc<AppState>) -> Router {
    // CORS for the dashboard frontend
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/health", get(health_handler))
        .route("/api/tables/:name", get(table_handler))
        .route("/api/energy-data", get(energy_data_handler))
        .route("/api/ev_metrics", get(ev_metrics_handler))
        .route("/api/ev-distribution", get(ev_distribution_handler))
        .route("/api/ev-price-scatter", get(ev_price_scatter_handler))
        .route("/api/ev-range-scatter", get(ev_range_scatter_handler))
        .route("/api/energy-vs-no2", get(energy_vs_no2_handler))
        .route("/api/no2-trends", get(no2_trends_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(Level::INFO.into()))
        .init();

    let db_url = std::env::var("DB_URL").context("DB_URL env var missing")?;
    let bind = std::env::var("API_BIND").unwrap_or_else(|_| "127.0.0.1:8080".to_string());
    let max_connections: u32 = std::env::var("DB_MAX_CONNECTIONS")
        .ok()
        .and_then(|v| v.parse().ok())
        .unwrap_or(10);

    info!("=== EV / Energy / Pollution API ===");

    let pool = PgPoolOptions::new()
        .max_connections(max_connections)
        .connect(&db_url)
        .await
        .context("Failed to connect to database")?;

    info!(max_connections, "Database connected");

    let app = build_router(Arc::new(AppState { pool }));

    info!(%bind, "API listening");
    let listener = tokio::net::TcpListener::bind(&bind).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
