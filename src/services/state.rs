use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard};

use tracing::{info, warn};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::Settings;
use crate::services::extraction::{Extractor, PdfTextExtractor};
use crate::services::remote_extractor::HttpExtractor;
use crate::services::storage::DocumentStorage;
use crate::utils::non_blank;

pub struct AppState {
    pub db: Arc<Mutex<Database>>,
    pub settings: Arc<Mutex<Settings>>,
    data_dir: PathBuf,
    storage: Mutex<DocumentStorage>,
    extractor: Mutex<Arc<dyn Extractor>>,
}

fn storage_for(settings: &Settings, data_dir: &Path) -> DocumentStorage {
    match non_blank(settings.storage_folder.clone()) {
        Some(folder) => DocumentStorage::new(folder),
        None => DocumentStorage::new(data_dir.join("facturas")),
    }
}

/// A configured extraction URL selects the remote service; otherwise PDFs are read locally.
fn extractor_for(settings: &Settings) -> Arc<dyn Extractor> {
    match non_blank(settings.extraction_url.clone()) {
        Some(url) => match HttpExtractor::new(url) {
            Ok(remote) => {
                info!(endpoint = %remote.endpoint(), "Using remote extraction service");
                Arc::new(remote)
            }
            Err(err) => {
                warn!("{}; reading PDFs locally", err);
                Arc::new(PdfTextExtractor)
            }
        },
        None => Arc::new(PdfTextExtractor),
    }
}

impl AppState {
    pub fn new(db: Database, settings: Settings, data_dir: PathBuf) -> Self {
        let extractor = extractor_for(&settings);
        Self::with_extractor(db, settings, data_dir, extractor)
    }

    pub fn with_extractor(
        db: Database,
        settings: Settings,
        data_dir: PathBuf,
        extractor: Arc<dyn Extractor>,
    ) -> Self {
        let storage = storage_for(&settings, &data_dir);
        AppState {
            db: Arc::new(Mutex::new(db)),
            settings: Arc::new(Mutex::new(settings)),
            data_dir,
            storage: Mutex::new(storage),
            extractor: Mutex::new(extractor),
        }
    }

    pub fn lock_db(&self) -> CoreResult<MutexGuard<'_, Database>> {
        self.db.lock().map_err(|_| CoreError::LockPoisoned("DB"))
    }

    pub fn settings(&self) -> CoreResult<Settings> {
        Ok(self
            .settings
            .lock()
            .map_err(|_| CoreError::LockPoisoned("Settings"))?
            .clone())
    }

    pub fn storage(&self) -> CoreResult<DocumentStorage> {
        Ok(self
            .storage
            .lock()
            .map_err(|_| CoreError::LockPoisoned("Storage"))?
            .clone())
    }

    pub fn extractor(&self) -> CoreResult<Arc<dyn Extractor>> {
        Ok(self
            .extractor
            .lock()
            .map_err(|_| CoreError::LockPoisoned("Extractor"))?
            .clone())
    }

    /// Swaps in new settings along with the storage root and extractor they select.
    pub fn update_settings(&self, settings: Settings) -> CoreResult<()> {
        let storage = storage_for(&settings, &self.data_dir);
        let extractor = extractor_for(&settings);
        {
            let mut locked = self.storage.lock().map_err(|_| CoreError::LockPoisoned("Storage"))?;
            *locked = storage;
        }
        {
            let mut locked = self
                .extractor
                .lock()
                .map_err(|_| CoreError::LockPoisoned("Extractor"))?;
            *locked = extractor;
        }
        let mut locked = self.settings.lock().map_err(|_| CoreError::LockPoisoned("Settings"))?;
        *locked = settings;
        Ok(())
    }
}
