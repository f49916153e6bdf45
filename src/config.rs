use serde::Deserialize;
use tracing::warn;

use crate::db::Database;
use crate::error::CoreResult;
use crate::models::{Settings, DEFAULT_PAGE_SIZE};

const STORAGE_FOLDER_KEY: &str = "storage_folder";
const EXTRACTION_URL_KEY: &str = "extraction_url";
const PAGE_SIZE_KEY: &str = "page_size";

/// Fields left out keep their stored value; an empty string clears one.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct SettingsUpdate {
    pub storage_folder: Option<String>,
    pub extraction_url: Option<String>,
    pub page_size: Option<usize>,
}

fn parse_page_size(raw: &str) -> usize {
    match raw.trim().parse::<usize>() {
        Ok(size) if size > 0 => size,
        _ => {
            warn!("Ignoring stored page size {:?}, using {}", raw, DEFAULT_PAGE_SIZE);
            DEFAULT_PAGE_SIZE
        }
    }
}

pub fn load_settings(db: &Database) -> Settings {
    let storage_folder = db.get_setting(STORAGE_FOLDER_KEY).ok().flatten();
    let extraction_url = db.get_setting(EXTRACTION_URL_KEY).ok().flatten();
    let page_size = db
        .get_setting(PAGE_SIZE_KEY)
        .ok()
        .flatten()
        .map(|raw| parse_page_size(&raw))
        .unwrap_or(DEFAULT_PAGE_SIZE);
    Settings {
        storage_folder,
        extraction_url,
        page_size,
    }
}

fn store_optional(db: &Database, key: &str, value: Option<String>) -> CoreResult<()> {
    match value.map(|v| v.trim().to_string()) {
        Some(v) if v.is_empty() => db.clear_setting(key)?,
        Some(v) => db.set_setting(key, &v)?,
        None => {}
    }
    Ok(())
}

/// Writes the update and returns the settings now in effect.
pub fn save_settings(db: &Database, update: SettingsUpdate) -> CoreResult<Settings> {
    store_optional(db, STORAGE_FOLDER_KEY, update.storage_folder)?;
    store_optional(db, EXTRACTION_URL_KEY, update.extraction_url)?;
    if let Some(size) = update.page_size {
        let size = if size == 0 { DEFAULT_PAGE_SIZE } else { size };
        db.set_setting(PAGE_SIZE_KEY, &size.to_string())?;
    }
    Ok(load_settings(db))
}
