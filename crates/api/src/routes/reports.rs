use axum::{
    extract::{rejection::JsonRejection, State},
    routing::{get, post},
    Extension, Json, Router,
};
use reports::{Column, Entity, Literal, OutputColumn, QuerySpec, ReportRow, ValidationError};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::{
    error::{ApiResult, AppError},
    state::{AppState, RequestId},
};

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/v1/reports", post(run_report))
        .route("/v1/reports/schema", get(schema))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct ReportRequest {
    tables: Vec<String>,
    #[serde(default)]
    fields: Vec<FieldRequest>,
    #[serde(default)]
    filters: Vec<FilterRequest>,
    #[serde(default)]
    aggregations: Vec<AggregationRequest>,
    #[serde(default)]
    order_by: Vec<OrderRequest>,
    limit: Option<u64>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FieldRequest {
    table: String,
    field: String,
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct FilterRequest {
    field: String,
    operator: String,
    value: Literal,
    connective: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct AggregationRequest {
    field: String,
    function: String,
    alias: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
struct OrderRequest {
    alias: String,
    direction: Option<String>,
}

impl ReportRequest {
    /// Replay the request onto a fresh specification, in request order.
    pub fn into_spec(self) -> Result<QuerySpec, ValidationError> {
        let mut spec = QuerySpec::new();
        for table in &self.tables {
            spec.add_table(table)?;
        }
        for field in &self.fields {
            spec.add_field(&field.table, &field.field, field.alias.as_deref())?;
        }
        for filter in self.filters {
            spec.add_filter(
                &filter.field,
                &filter.operator,
                filter.value,
                filter.connective.as_deref().unwrap_or("AND"),
            )?;
        }
        for aggregation in &self.aggregations {
            spec.add_aggregation(
                &aggregation.field,
                &aggregation.function,
                aggregation.alias.as_deref(),
            )?;
        }
        for ordering in &self.order_by {
            spec.order_by(&ordering.alias, ordering.direction.as_deref().unwrap_or("asc"))?;
        }
        Ok(spec)
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ReportResponse {
    columns: Vec<OutputColumn>,
    rows: Vec<ReportRow>,
    row_count: usize,
    truncated: bool,
}

#[derive(Debug, Serialize)]
struct SchemaResponse {
    tables: Vec<TableSchema>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct TableSchema {
    name: Entity,
    columns: &'static [Column],
    relations: Vec<RelationSchema>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct RelationSchema {
    name: &'static str,
    table: Entity,
    foreign_key: &'static str,
}

async fn run_report(
    State(state): State<AppState>,
    Extension(request_id): Extension<RequestId>,
    payload: Result<Json<ReportRequest>, JsonRejection>,
) -> ApiResult<Json<ReportResponse>> {
    let Json(payload) = payload
        .map_err(|rejection| {
            AppError::BadRequest(rejection.body_text()).with_request_id(&request_id.0)
        })?;

    let limit = effective_limit(payload.limit, state.row_limit);
    let query = payload
        .into_spec()
        .and_then(|spec| spec.build())
        .map_err(|err| AppError::from(err).with_request_id(&request_id.0))?;

    let mut rows = query
        .fetch_all(&state.db, Some(fetch_limit(limit)))
        .await
        .map_err(|err| AppError::from(err).with_request_id(&request_id.0))?;
    let truncated = rows.len() as u64 > limit;
    rows.truncate(limit as usize);

    info!(
        request_id = %request_id.0,
        shape = ?query.shape(),
        rows = rows.len(),
        truncated,
        "report served"
    );

    Ok(Json(ReportResponse {
        columns: query.columns().to_vec(),
        row_count: rows.len(),
        rows,
        truncated,
    }))
}

async fn schema() -> Json<SchemaResponse> {
    let tables = Entity::ALL
        .iter()
        .map(|&entity| TableSchema {
            name: entity,
            columns: entity.columns(),
            relations: entity
                .relations()
                .map(|edge| RelationSchema {
                    name: edge.relation,
                    table: edge.parent,
                    foreign_key: edge.foreign_key,
                })
                .collect(),
        })
        .collect();
    Json(SchemaResponse { tables })
}

fn effective_limit(requested: Option<u64>, max: u64) -> u64 {
    let max = max.max(1);
    requested.unwrap_or(max).clamp(1, max)
}

/// One extra row tells us whether the result was cut off.
fn fetch_limit(limit: u64) -> u64 {
    limit.saturating_add(1)
}
