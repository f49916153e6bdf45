use tracing::info;

use crate::commands::ApiResponse;
use crate::config::{self, SettingsUpdate};
use crate::error::CoreResult;
use crate::models::Settings;
use crate::services::state::AppState;

pub fn get_settings(state: &AppState) -> ApiResponse<Settings> {
    state.settings().into()
}

fn apply(state: &AppState, update: SettingsUpdate) -> CoreResult<Settings> {
    let settings = {
        let db = state.lock_db()?;
        config::save_settings(&db, update)?
    };
    state.update_settings(settings.clone())?;
    info!(
        storage = ?settings.storage_folder,
        extraction_url = ?settings.extraction_url,
        page_size = settings.page_size,
        "Settings saved"
    );
    Ok(settings)
}

/// Persists the update and swaps the storage root and extractor it selects.
pub fn save_settings(state: &AppState, update: SettingsUpdate) -> ApiResponse<Settings> {
    apply(state, update).into()
}
