//! Style catalog endpoints

use axum::{
    extract::{Path, Query, State},
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::catalog::{prompts, Category, TypeInfo};
use crate::AppState;

#[derive(Debug, Serialize)]
pub struct TypesResponse {
    pub types: Vec<TypeInfo>,
}

#[derive(Debug, Serialize)]
pub struct PromptResponse {
    pub prompt: String,
}

#[derive(Debug, Serialize)]
pub struct CategoriesResponse {
    pub categories: &'static [Category],
    pub simple_prompts: &'static [&'static str],
}

#[derive(Debug, Default, Deserialize)]
pub struct PromptQuery {
    #[serde(default)]
    pub use_simple: bool,
}

/// GET /api/styles/types
pub async fn list_types(State(state): State<Arc<AppState>>) -> Json<TypesResponse> {
    Json(TypesResponse {
        types: state.catalog.listing(&state.settings.catalog.static_prefix),
    })
}

/// GET /api/styles/types/:type_index/prompt
pub async fn type_prompt(
    State(state): State<Arc<AppState>>,
    Path(type_index): Path<i64>,
    Query(query): Query<PromptQuery>,
) -> Json<PromptResponse> {
    Json(PromptResponse {
        prompt: resolve(&state, type_index, 0, query.use_simple),
    })
}

/// GET /api/styles/types/:type_index/styles/:style_index/prompt
pub async fn style_prompt(
    State(state): State<Arc<AppState>>,
    Path((type_index, style_index)): Path<(i64, i64)>,
    Query(query): Query<PromptQuery>,
) -> Json<PromptResponse> {
    Json(PromptResponse {
        prompt: resolve(&state, type_index, style_index, query.use_simple),
    })
}

/// Negative indices are out of range like any other and resolve to ""
fn resolve(state: &AppState, type_index: i64, style_index: i64, use_simple: bool) -> String {
    match (usize::try_from(type_index), usize::try_from(style_index)) {
        (Ok(type_index), Ok(style_index)) => state.catalog.resolve_prompt(type_index, style_index, use_simple),
        _ => String::new(),
    }
}

/// GET /api/styles/categories
pub async fn categories() -> Json<CategoriesResponse> {
    Json(CategoriesResponse {
        categories: &prompts::CATEGORIES,
        simple_prompts: &prompts::SIMPLE_PROMPTS,
    })
}
