use axum::extract::rejection::{PathRejection, QueryRejection};
use axum::extract::{Path, Query, State};
use axum::Json;
use garde::Validate;
use serde::{Deserialize, Serialize};

use crate::app_state::AppState;
use crate::models::taxonomy::{TaxonomyEntry, TaxonomyMetadata};
use crate::routes::ApiError;
use crate::services::taxonomy::TaxonomyError;

#[derive(Serialize, Deserialize)]
pub struct TaxonomyListing {
    pub metadata: TaxonomyMetadata,
    pub entries: Vec<TaxonomyEntry>,
}

#[derive(Debug, Deserialize, Validate)]
pub struct SearchParams {
    #[garde(length(chars, min = 1, max = 100))]
    pub q: String,
}

impl From<TaxonomyError> for ApiError {
    fn from(err: TaxonomyError) -> Self {
        match err {
            TaxonomyError::NotFound(msg) => ApiError::NotFound(msg),
            other => ApiError::BadRequest(other.to_string()),
        }
    }
}

/// GET /api/v1/taxonomy: the whole table.
pub async fn list_taxonomy(State(state): State<AppState>) -> Json<TaxonomyListing> {
    Json(TaxonomyListing {
        metadata: state.taxonomy.metadata().clone(),
        entries: state.taxonomy.all().to_vec(),
    })
}

/// GET /api/v1/taxonomy/search?q=: exact name or label match.
pub async fn search_taxonomy(
    State(state): State<AppState>,
    params: Result<Query<SearchParams>, QueryRejection>,
) -> Result<Json<Vec<TaxonomyEntry>>, ApiError> {
    let Query(params) = params.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    params
        .validate()
        .map_err(|e| ApiError::BadRequest(e.to_string()))?;
    let entries = state.taxonomy.search(&params.q)?;
    Ok(Json(entries.into_iter().cloned().collect()))
}

/// GET /api/v1/taxonomy/{id}
pub async fn get_taxonomy_entry(
    State(state): State<AppState>,
    id: Result<Path<u32>, PathRejection>,
) -> Result<Json<TaxonomyEntry>, ApiError> {
    let Path(id) = id.map_err(|e| ApiError::BadRequest(e.body_text()))?;
    Ok(Json(state.taxonomy.lookup_by_id(id)?.clone()))
}
