use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::{Deserialize, Serialize};
use std::str::FromStr;
use uuid::Uuid;

use crate::api::{
    api_error, ok_message, store_error, ApiError, Envelope, ListEnvelope, Pagination,
};
use crate::models::{Category, Record, RecordInput, Severity, Status};
use crate::search;
use crate::state::AppState;
use crate::store::{ListFilter, Stats};

const SEARCH_LIMIT: usize = 20;

/// POST /api/rca - Create a record
pub async fn create(
    State(state): State<AppState>,
    Json(input): Json<RecordInput>,
) -> Result<(StatusCode, Json<Envelope<Record>>), ApiError> {
    let validated = input
        .validate()
        .map_err(|e| store_error(e, "Failed to create RCA"))?;

    let record = state.store.create(validated);

    if let Some(index) = &state.index {
        if let Err(e) = index.add(&record) {
            tracing::warn!("Failed to index record {}: {e:#}", record.id);
        }
    }

    Ok((
        StatusCode::CREATED,
        Envelope::with_message("RCA created successfully", record),
    ))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub category: Option<String>,
    pub severity: Option<String>,
    pub status: Option<String>,
    pub sort_by: Option<String>,
    pub order: Option<String>,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

/// GET /api/rca - List records with filter, sort and pagination
pub async fn list(
    State(state): State<AppState>,
    Query(query): Query<ListQuery>,
) -> Result<Json<ListEnvelope<Record>>, ApiError> {
    let filter = parse_filter(&query)?;

    let sort_by = query.sort_by.as_deref().unwrap_or("createdAt");
    let order = query.order.as_deref().unwrap_or("desc");
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).max(1);

    let (items, total) = state.store.list(&filter, sort_by, order, page, limit);

    Ok(Json(ListEnvelope {
        success: true,
        data: items,
        pagination: Pagination {
            total,
            page,
            pages: total.div_ceil(limit),
            limit,
        },
    }))
}

fn parse_filter(query: &ListQuery) -> Result<ListFilter, ApiError> {
    let mut filter = ListFilter::default();
    if let Some(c) = query.category.as_deref().filter(|s| !s.is_empty()) {
        filter.category = Some(
            Category::from_str(c).map_err(|e| store_error(e, "Failed to fetch RCAs"))?,
        );
    }
    if let Some(s) = query.severity.as_deref().filter(|s| !s.is_empty()) {
        filter.severity = Some(
            Severity::from_str(s).map_err(|e| store_error(e, "Failed to fetch RCAs"))?,
        );
    }
    if let Some(s) = query.status.as_deref().filter(|s| !s.is_empty()) {
        filter.status =
            Some(Status::from_str(s).map_err(|e| store_error(e, "Failed to fetch RCAs"))?);
    }
    Ok(filter)
}

/// GET /api/rca/{id} - Fetch a single record
pub async fn get_by_id(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<Record>>, ApiError> {
    let record = state
        .store
        .get(id)
        .map_err(|e| store_error(e, "Failed to fetch RCA"))?;
    Ok(Envelope::data(record))
}

/// PUT /api/rca/{id} - Update a record (full replacement, last writer wins)
pub async fn update(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(input): Json<RecordInput>,
) -> Result<Json<Envelope<Record>>, ApiError> {
    let validated = input
        .validate()
        .map_err(|e| store_error(e, "Failed to update RCA"))?;

    let record = state
        .store
        .update(id, validated)
        .map_err(|e| store_error(e, "Failed to update RCA"))?;

    if let Some(index) = &state.index {
        if let Err(e) = index.update(&record) {
            tracing::warn!("Failed to reindex record {}: {e:#}", record.id);
        }
    }

    Ok(Envelope::with_message("RCA updated successfully", record))
}

/// DELETE /api/rca/{id} - Delete a record, immediately and irreversibly
pub async fn delete(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<Envelope<()>>, ApiError> {
    state
        .store
        .delete(id)
        .map_err(|e| store_error(e, "Failed to delete RCA"))?;

    if let Some(index) = &state.index {
        if let Err(e) = index.delete(id) {
            tracing::warn!("Failed to remove record {id} from index: {e:#}");
        }
    }

    Ok(ok_message("RCA deleted successfully"))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct SearchEnvelope {
    pub success: bool,
    pub data: Vec<Record>,
    pub count: usize,
}

/// GET /api/rca/search - Keyword search. Uses the text index when it is
/// healthy and degrades to a case-insensitive substring scan otherwise.
pub async fn search(
    State(state): State<AppState>,
    Query(query): Query<SearchQuery>,
) -> Result<Json<SearchEnvelope>, ApiError> {
    let q = query.q.as_deref().unwrap_or("").trim().to_string();
    if q.is_empty() {
        return Err(api_error(
            StatusCode::BAD_REQUEST,
            "Search query is required",
        ));
    }

    let category = match query.category.as_deref().filter(|s| !s.is_empty()) {
        Some(c) => Some(Category::from_str(c).map_err(|e| store_error(e, "Search failed"))?),
        None => None,
    };

    // Category narrows the candidate pool before the result cap, so
    // in-category matches ranked past the cap are not lost. The index is
    // queried without the cap for the same reason; hits resolve against
    // the narrowed pool and are truncated afterwards.
    let records = state.store.all();
    let fetch = records.len().max(SEARCH_LIMIT);
    let pool: Vec<Record> = match category {
        Some(category) => records
            .into_iter()
            .filter(|r| r.category == category)
            .collect(),
        None => records,
    };
    let mut results = search::search_with_fallback(state.index.as_deref(), &pool, &q, fetch);
    results.truncate(SEARCH_LIMIT);

    let count = results.len();
    Ok(Json(SearchEnvelope {
        success: true,
        data: results,
        count,
    }))
}

/// GET /api/rca/stats - Counts by category/severity/status plus recents
pub async fn stats(State(state): State<AppState>) -> Json<Envelope<Stats>> {
    Envelope::data(state.store.stats())
}
