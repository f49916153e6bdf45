use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard};

use tokio::task::JoinHandle;
use tracing::{info, warn};

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    InvoiceFields, InvoiceRecord, Origen, RecordSource, RecordStatus, RejectedFile, UploadReport,
    UploadedFile,
};
use crate::services::extraction::{ExtractError, Extractor};
use crate::services::invoice_store;
use crate::services::storage::DocumentStorage;
use crate::utils::{is_pdf, now_rfc3339, sha256_bytes, strip_origin_tag};

type Extraction = Result<InvoiceFields, ExtractError>;

fn lock(db: &Arc<Mutex<Database>>) -> CoreResult<MutexGuard<'_, Database>> {
    db.lock().map_err(|_| CoreError::LockPoisoned("DB"))
}

struct Accepted {
    archivo: String,
    file_hash: String,
    staged: Result<PathBuf, String>,
    bytes: Vec<u8>,
}

fn discard(storage: &DocumentStorage, item: &Accepted) {
    if let Ok(staged) = &item.staged {
        if let Err(err) = storage.remove(staged) {
            warn!(archivo = %item.archivo, path = %staged.display(), "Staged document not removed: {}", err);
        }
    }
}

fn reject(report: &mut UploadReport, file_name: &str, reason: &str) {
    info!(file = %file_name, reason = %reason, "Upload rejected");
    report.rejected.push(RejectedFile {
        file_name: file_name.to_string(),
        reason: reason.to_string(),
    });
}

fn build_record(
    categoria: &str,
    origen: Origen,
    accepted: &Accepted,
    ruta: Option<PathBuf>,
    outcome: Extraction,
) -> InvoiceRecord {
    let now = now_rfc3339();
    let (status, fields, error_msg) = match outcome {
        Ok(fields) => (RecordStatus::Ok, fields, None),
        Err(err) => (RecordStatus::Error, InvoiceFields::default(), Some(err.to_string())),
    };
    InvoiceRecord {
        archivo: accepted.archivo.clone(),
        categoria: categoria.to_string(),
        origen,
        status,
        fuente: RecordSource::Extracted,
        fields,
        error_msg,
        ruta: ruta.map(|path| path.to_string_lossy().to_string()),
        file_hash: Some(accepted.file_hash.clone()),
        created_at: now.clone(),
        updated_at: now,
    }
}

/// Files a batch of uploads under `categoria`.
///
/// Every accepted PDF becomes a record, `status=error` included when extraction fails;
/// non-PDF names and filenames already present in the category (or repeated in the
/// batch) are reported under `rejected`. Extractions run concurrently, records are
/// written in input order once all of them have finished.
///
/// Documents are staged under a temporary name and moved into place only after their
/// record is filed. A record that cannot be written is rejected and the batch goes on.
pub async fn process_upload(
    db: &Arc<Mutex<Database>>,
    storage: &DocumentStorage,
    extractor: Arc<dyn Extractor>,
    categoria: &str,
    origen: Origen,
    files: Vec<UploadedFile>,
) -> CoreResult<UploadReport> {
    let mut report = UploadReport::default();
    let mut accepted = Vec::new();

    {
        let db = lock(db)?;
        let mut seen = HashSet::new();
        for file in files {
            let archivo = strip_origin_tag(&file.file_name);
            if archivo.is_empty() {
                reject(&mut report, &file.file_name, "empty file name");
                continue;
            }
            if !is_pdf(&archivo) {
                reject(&mut report, &file.file_name, "only PDF files are accepted");
                continue;
            }
            if !seen.insert(archivo.clone()) {
                reject(&mut report, &file.file_name, "repeated in this upload");
                continue;
            }
            if db.invoice_exists(categoria, &archivo)? {
                reject(&mut report, &file.file_name, "already filed in this category");
                continue;
            }

            let staged = storage
                .stage(categoria, &archivo, &file.bytes)
                .map_err(|e| format!("could not store document: {}", e));
            accepted.push(Accepted {
                file_hash: sha256_bytes(&file.bytes),
                archivo,
                staged,
                bytes: file.bytes,
            });
        }
    }

    let handles: Vec<Option<JoinHandle<Extraction>>> = accepted
        .iter_mut()
        .map(|item| {
            if item.staged.is_err() {
                return None;
            }
            let extractor = extractor.clone();
            let archivo = item.archivo.clone();
            let bytes = std::mem::take(&mut item.bytes);
            Some(tokio::spawn(async move {
                extractor.extract(&archivo, &bytes).await
            }))
        })
        .collect();

    let mut outcomes = Vec::with_capacity(handles.len());
    for (item, handle) in accepted.iter().zip(handles) {
        let outcome = match (handle, &item.staged) {
            (Some(handle), _) => handle.await.unwrap_or_else(|e| {
                Err(ExtractError::Failed(format!("extraction task aborted: {}", e)))
            }),
            (None, Err(msg)) => Err(ExtractError::Failed(msg.clone())),
            (None, Ok(_)) => Err(ExtractError::Failed("extraction was not started".to_string())),
        };
        if let Err(err) = &outcome {
            warn!(categoria = %categoria, archivo = %item.archivo, "Extraction failed: {}", err);
        }
        outcomes.push(outcome);
    }

    let db = match lock(db) {
        Ok(db) => db,
        Err(err) => {
            accepted.iter().for_each(|item| discard(storage, item));
            return Err(err);
        }
    };
    for (item, outcome) in accepted.iter().zip(outcomes) {
        let ruta = item
            .staged
            .as_ref()
            .ok()
            .map(|_| storage.path_for(categoria, &item.archivo));
        let record = build_record(categoria, origen, item, ruta, outcome);
        let mut record = match invoice_store::insert_extracted(&db, categoria, record) {
            Ok(record) => record,
            Err(CoreError::DuplicateKey(_)) => {
                discard(storage, item);
                reject(&mut report, &item.archivo, "already filed in this category");
                continue;
            }
            Err(err) => {
                warn!(categoria = %categoria, archivo = %item.archivo, "Record not filed: {}", err);
                discard(storage, item);
                reject(&mut report, &item.archivo, &err.to_string());
                continue;
            }
        };

        if let Ok(staged) = &item.staged {
            if let Err(err) = storage.commit(staged, categoria, &item.archivo) {
                warn!(categoria = %categoria, archivo = %item.archivo, "Document not moved into place: {}", err);
                discard(storage, item);
                record.ruta = None;
                if let Err(err) = db.replace_invoice(&record) {
                    warn!(categoria = %categoria, archivo = %item.archivo, "Stale document path kept: {}", err);
                }
            }
        }

        let status = match record.status {
            RecordStatus::Ok => "success",
            RecordStatus::Error => "failed",
        };
        if let Err(err) = db.log_processing(
            categoria,
            &record.archivo,
            record.file_hash.as_deref(),
            "upload",
            status,
            record.error_msg.as_deref(),
        ) {
            warn!(categoria = %categoria, archivo = %record.archivo, "Processing log not written: {}", err);
        }
        report.count += 1;
        report.files.push(record.archivo);
    }

    info!(
        categoria = %categoria,
        origen = origen.as_str(),
        count = report.count,
        rejected = report.rejected.len(),
        "Upload batch filed"
    );
    Ok(report)
}

/// Runs extraction again over the stored document of an existing record.
/// An unreachable extractor leaves the record untouched and surfaces as `ConnectionFailure`.
pub async fn reprocess(
    db: &Arc<Mutex<Database>>,
    storage: &DocumentStorage,
    extractor: Arc<dyn Extractor>,
    categoria: &str,
    archivo: &str,
) -> CoreResult<InvoiceRecord> {
    let mut record = {
        let db = lock(db)?;
        invoice_store::get(&db, categoria, archivo)?
    };
    let path = record
        .ruta
        .as_ref()
        .map(PathBuf::from)
        .ok_or_else(|| CoreError::ValidationFailed(format!("{} has no stored document", archivo)))?;
    let bytes = storage.read(&path)?;

    match extractor.extract(archivo, &bytes).await {
        Ok(fields) => {
            record.fields = fields;
            record.status = RecordStatus::Ok;
            record.error_msg = None;
        }
        Err(ExtractError::Unavailable(msg)) => {
            warn!(categoria = %categoria, archivo = %archivo, "Reprocess aborted: {}", msg);
            return Err(CoreError::ConnectionFailure(msg));
        }
        Err(err @ ExtractError::Failed(_)) => {
            record.status = RecordStatus::Error;
            record.error_msg = Some(err.to_string());
        }
    }
    record.fuente = RecordSource::Extracted;
    record.file_hash = Some(sha256_bytes(&bytes));
    record.updated_at = now_rfc3339();

    let db = lock(db)?;
    invoice_store::replace_extraction(&db, &record)?;
    if let Err(err) = db.log_processing(
        categoria,
        archivo,
        record.file_hash.as_deref(),
        "reprocess",
        if record.status == RecordStatus::Ok { "success" } else { "failed" },
        record.error_msg.as_deref(),
    ) {
        warn!(categoria = %categoria, archivo = %archivo, "Processing log not written: {}", err);
    }
    info!(categoria = %categoria, archivo = %archivo, status = record.status.as_str(), "Invoice reprocessed");
    Ok(record)
}
