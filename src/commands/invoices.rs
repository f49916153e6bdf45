use serde::Deserialize;
use std::path::Path;
use tracing::warn;

use crate::commands::ApiResponse;
use crate::error::CoreResult;
use crate::models::{
    InvoicePatch, InvoiceRecord, ManualInvoice, Origen, OriginFilter, UploadReport, UploadedFile,
    GENERAL_CATEGORY,
};
use crate::services::state::AppState;
use crate::services::{invoice_store, processor};

#[derive(Debug, Clone, Deserialize)]
pub struct InvoiceKey {
    pub categoria: String,
    pub archivo: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct EditInvoicePayload {
    pub categoria: String,
    pub archivo: String,
    #[serde(flatten)]
    pub patch: InvoicePatch,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UpdateOrigenPayload {
    pub categoria: String,
    pub archivo: String,
    pub origen: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListInvoicesQuery {
    #[serde(default)]
    pub categoria: Option<String>,
    #[serde(default)]
    pub page: Option<usize>,
    #[serde(default)]
    pub limit: Option<usize>,
    #[serde(default)]
    pub filtro_origen: Option<String>,
}

fn category_or_general(categoria: Option<String>) -> String {
    categoria
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or_else(|| GENERAL_CATEGORY.to_string())
}

/// Number of records filed under the category; the "General" bucket when none is named.
pub fn get_pending_count(state: &AppState, categoria: Option<String>) -> ApiResponse<usize> {
    let categoria = category_or_general(categoria);
    state
        .lock_db()
        .and_then(|db| invoice_store::count(&db, &categoria))
        .into()
}

async fn upload(
    state: &AppState,
    categoria: &str,
    origen: Origen,
    files: Vec<UploadedFile>,
) -> CoreResult<UploadReport> {
    let storage = state.storage()?;
    let extractor = state.extractor()?;
    processor::process_upload(&state.db, &storage, extractor, categoria, origen, files).await
}

pub async fn upload_invoices(
    state: &AppState,
    categoria: Option<String>,
    origen: Option<String>,
    files: Vec<UploadedFile>,
) -> ApiResponse<UploadReport> {
    let categoria = category_or_general(categoria);
    let origen = origen.as_deref().map(Origen::from_tag).unwrap_or_default();

    match upload(state, &categoria, origen, files).await {
        Ok(report) => {
            let message = format!("{} archivos subidos", report.count);
            ApiResponse::success_with(message, report)
        }
        Err(err) => ApiResponse::failure(err),
    }
}

pub fn list_invoices(state: &AppState, query: ListInvoicesQuery) -> ApiResponse<Vec<InvoiceRecord>> {
    let categoria = category_or_general(query.categoria);
    let filter = OriginFilter::from_param(query.filtro_origen.as_deref());
    let result = state.settings().and_then(|settings| {
        let limit = query.limit.unwrap_or(settings.page_size);
        let page = query.page.unwrap_or(1);
        let db = state.lock_db()?;
        invoice_store::list_by_category(&db, &categoria, page, limit, filter)
    });
    result.into()
}

pub fn get_invoice(state: &AppState, key: InvoiceKey) -> ApiResponse<InvoiceRecord> {
    state
        .lock_db()
        .and_then(|db| invoice_store::get(&db, &key.categoria, &key.archivo))
        .into()
}

pub fn edit_invoice(state: &AppState, payload: EditInvoicePayload) -> ApiResponse<InvoiceRecord> {
    state
        .lock_db()
        .and_then(|db| invoice_store::update(&db, &payload.categoria, &payload.archivo, payload.patch))
        .into()
}

pub fn create_manual_invoice(state: &AppState, invoice: ManualInvoice) -> ApiResponse<InvoiceRecord> {
    state
        .lock_db()
        .and_then(|db| {
            invoice_store::insert_manual(
                &db,
                &invoice.categoria,
                invoice.archivo,
                invoice.origen,
                invoice.fields,
            )
        })
        .into()
}

pub fn update_origen(state: &AppState, payload: UpdateOrigenPayload) -> ApiResponse<InvoiceRecord> {
    let origen = Origen::from_tag(&payload.origen);
    state
        .lock_db()
        .and_then(|db| invoice_store::set_origen(&db, &payload.categoria, &payload.archivo, origen))
        .into()
}

/// Deletes the record, then its stored document. A document that cannot be removed is only logged.
pub fn delete_invoice(state: &AppState, key: InvoiceKey) -> ApiResponse<InvoiceRecord> {
    let removed = state
        .lock_db()
        .and_then(|db| invoice_store::delete(&db, &key.categoria, &key.archivo));

    let record = match removed {
        Ok(record) => record,
        Err(err) => return ApiResponse::failure(err),
    };

    if let Some(ruta) = record.ruta.as_deref() {
        let outcome = state.storage().and_then(|storage| Ok(storage.remove(Path::new(ruta))?));
        if let Err(err) = outcome {
            warn!(archivo = %record.archivo, "Stored document not removed: {}", err);
        }
    }
    let message = format!("Archivo {} eliminado", record.archivo);
    ApiResponse::success_with(message, record)
}

async fn reprocess(state: &AppState, key: &InvoiceKey) -> CoreResult<InvoiceRecord> {
    let storage = state.storage()?;
    let extractor = state.extractor()?;
    processor::reprocess(&state.db, &storage, extractor, &key.categoria, &key.archivo).await
}

pub async fn reprocess_invoice(state: &AppState, key: InvoiceKey) -> ApiResponse<InvoiceRecord> {
    reprocess(state, &key).await.into()
}
