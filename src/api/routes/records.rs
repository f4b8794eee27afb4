//! Record Routes
//!
//! Generic CRUD over the content tables. Each handler is instantiated per
//! record type when the router is built:
//!
//! - GET /api/v1/{table} - List with filters, `limit` and `offset`
//! - POST /api/v1/{table} - Create
//! - GET /api/v1/{table}/:id - Get one
//! - PUT /api/v1/{table}/:id - Update (fields not sent keep their value)
//! - DELETE /api/v1/{table}/:id - Delete, applying the table's FK policies
//!
//! Reads need a signed-in caller; writes need the section's permission.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Json,
};
use chrono::Utc;
use serde_json::{Map, Value};
use std::sync::Arc;
use uuid::Uuid;

use crate::api::dto::{ListParams, ListResponse};
use crate::api::error::{ApiError, ApiResult};
use crate::api::extract::CurrentUser;
use crate::api::state::AppState;
use crate::storage::{Action, DeleteReport, ListQuery, Record, Section, SystemAlert};

/// GET /api/v1/{table}
pub async fn list<T: Record>(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Query(params): Query<ListParams>,
) -> ApiResult<Json<ListResponse<T>>> {
    let query = params.to_query().map_err(ApiError::Validation)?;
    let (items, total) = list_page::<T>(&state, &query).await?;
    Ok(Json(ListResponse { items, total }))
}

/// Filtered rows of `T`, paged, plus the unpaged total
pub(crate) async fn list_page<T: Record>(
    state: &AppState,
    query: &ListQuery,
) -> ApiResult<(Vec<T>, usize)> {
    let unpaged = ListQuery {
        filters: query.filters.clone(),
        ..Default::default()
    };
    let rows: Vec<T> = state.store.list(&unpaged).await?;
    let total = rows.len();
    let items = page(rows, query);
    Ok((items, total))
}

pub(crate) fn page<T>(rows: Vec<T>, query: &ListQuery) -> Vec<T> {
    rows.into_iter()
        .skip(query.offset)
        .take(query.limit.unwrap_or(usize::MAX))
        .collect()
}

/// GET /api/v1/{table}/:id
pub async fn get<T: Record>(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<T>> {
    Ok(Json(state.store.require::<T>(id).await?))
}

/// POST /api/v1/{table}
pub async fn create<T: Record>(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Json(body): Json<Value>,
) -> ApiResult<(StatusCode, Json<T>)> {
    user.principal
        .require(Section::for_table(T::TABLE), Action::Create)?;

    let record: T = record_from_body(body, Uuid::new_v4(), None)?;
    let created = state.store.insert(record).await?;

    tracing::info!(table = %T::TABLE, id = %created.id(), by = %user.principal.user_id, "Created record");
    Ok((StatusCode::CREATED, Json(created)))
}

/// PUT /api/v1/{table}/:id
pub async fn update<T: Record>(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
    Json(body): Json<Value>,
) -> ApiResult<Json<T>> {
    user.principal
        .require(Section::for_table(T::TABLE), Action::Edit)?;

    let existing = state
        .store
        .get_row(T::TABLE, id)
        .await?
        .ok_or_else(|| ApiError::NotFound(format!("{} {}", T::TABLE, id)))?;

    let record: T = record_from_body(body, id, Some(existing))?;
    let updated = state.store.update(record).await?;

    tracing::info!(table = %T::TABLE, id = %id, by = %user.principal.user_id, "Updated record");
    Ok(Json(updated))
}

/// DELETE /api/v1/{table}/:id
pub async fn delete<T: Record>(
    State(state): State<Arc<AppState>>,
    user: CurrentUser,
    Path(id): Path<Uuid>,
) -> ApiResult<Json<DeleteReport>> {
    user.principal
        .require(Section::for_table(T::TABLE), Action::Delete)?;

    let report = state.store.delete::<T>(id).await?;

    tracing::info!(
        table = %T::TABLE,
        id = %id,
        deleted = report.deleted,
        updated = report.updated,
        by = %user.principal.user_id,
        "Deleted record"
    );
    Ok(Json(report))
}

/// GET /api/v1/system-alerts/active
///
/// Active alerts whose window contains now.
pub async fn active_alerts(
    State(state): State<Arc<AppState>>,
    _user: CurrentUser,
) -> ApiResult<Json<Vec<SystemAlert>>> {
    let now = Utc::now();
    let alerts: Vec<SystemAlert> = state.store.all().await?;
    Ok(Json(alerts.into_iter().filter(|a| a.is_live(now)).collect()))
}

/// Build a record from a JSON body
///
/// The path id always wins. For updates the stored row supplies every field
/// the body leaves out; for creates the timestamps are filled in and then
/// overwritten by the store.
pub(crate) fn record_from_body<T: Record>(
    body: Value,
    id: Uuid,
    existing: Option<Value>,
) -> ApiResult<T> {
    let Value::Object(fields) = body else {
        return Err(ApiError::Validation("body must be a JSON object".to_string()));
    };

    let mut merged = match existing {
        Some(Value::Object(row)) => row,
        _ => {
            let now = Value::String(Utc::now().to_rfc3339());
            let mut row = Map::new();
            row.insert("created_at".to_string(), now.clone());
            row.insert("updated_at".to_string(), now);
            row
        }
    };
    merged.extend(fields);
    merged.insert("id".to_string(), Value::String(id.to_string()));

    serde_json::from_value(Value::Object(merged)).map_err(|e| ApiError::Validation(e.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::Company;
    use serde_json::json;

    #[test]
    fn test_create_body_gets_id_and_timestamps() {
        let id = Uuid::new_v4();
        let company: Company = record_from_body(json!({"name": "Generali"}), id, None).unwrap();
        assert_eq!(company.id, id);
        assert_eq!(company.name, "Generali");
    }

    #[test]
    fn test_update_body_keeps_unsent_fields() {
        let mut stored = Company::new("Mapfre");
        stored.website = Some("https://mapfre.es".to_string());
        let row = serde_json::to_value(&stored).unwrap();

        // The body cannot move the record to another id
        let other = Uuid::new_v4();
        let updated: Company = record_from_body(
            json!({"id": other, "phone": "910000000"}),
            stored.id,
            Some(row),
        )
        .unwrap();

        assert_eq!(updated.id, stored.id);
        assert_eq!(updated.website.as_deref(), Some("https://mapfre.es"));
        assert_eq!(updated.phone.as_deref(), Some("910000000"));
    }

    #[test]
    fn test_body_must_be_an_object() {
        let result: ApiResult<Company> = record_from_body(json!(["x"]), Uuid::new_v4(), None);
        assert!(matches!(result, Err(ApiError::Validation(_))));
    }

    #[test]
    fn test_page() {
        let query = ListQuery::new().offset(1).limit(2);
        assert_eq!(page(vec![1, 2, 3, 4], &query), vec![2, 3]);
    }
}
