use serde::Deserialize;

use crate::commands::ApiResponse;
use crate::models::CategoryNode;
use crate::services::category_store;
use crate::services::state::AppState;

#[derive(Debug, Clone, Deserialize)]
pub struct AddCategoryPayload {
    #[serde(default)]
    pub parent_key: Option<String>,
    pub name: String,
    pub key: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RenameCategoryPayload {
    #[serde(default)]
    pub parent_key: Option<String>,
    pub key: String,
    pub new_name: String,
    #[serde(default)]
    pub new_key: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DeleteCategoryPayload {
    #[serde(default)]
    pub parent_key: Option<String>,
    pub key: String,
}

pub fn get_structure(state: &AppState) -> ApiResponse<Vec<CategoryNode>> {
    state
        .lock_db()
        .and_then(|db| category_store::list(&db))
        .into()
}

pub fn add_category(state: &AppState, payload: AddCategoryPayload) -> ApiResponse<CategoryNode> {
    state
        .lock_db()
        .and_then(|db| {
            category_store::add(
                &db,
                payload.parent_key.as_deref(),
                &payload.name,
                &payload.key,
            )
        })
        .into()
}

pub fn rename_category(state: &AppState, payload: RenameCategoryPayload) -> ApiResponse<CategoryNode> {
    state
        .lock_db()
        .and_then(|db| {
            category_store::rename(
                &db,
                payload.parent_key.as_deref(),
                &payload.key,
                &payload.new_name,
                payload.new_key.as_deref(),
            )
        })
        .into()
}

pub fn delete_category(state: &AppState, payload: DeleteCategoryPayload) -> ApiResponse<CategoryNode> {
    state
        .lock_db()
        .and_then(|db| category_store::delete(&db, payload.parent_key.as_deref(), &payload.key))
        .into()
}
