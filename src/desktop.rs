use anyhow::anyhow;
use tauri::{Manager, State};
use tracing::info;

use crate::commands::categories::{AddCategoryPayload, DeleteCategoryPayload, RenameCategoryPayload};
use crate::commands::invoices::{EditInvoicePayload, InvoiceKey, ListInvoicesQuery, UpdateOrigenPayload};
use crate::commands::{self, ApiResponse};
use crate::config::{self, SettingsUpdate};
use crate::db::Database;
use crate::models::{
    CategoryNode, FinancialSummary, InvoiceRecord, ManualInvoice, Settings, UploadReport,
    UploadedFile,
};
use crate::services::category_store;
use crate::services::state::AppState;

type CommandResult<T> = Result<ApiResponse<T>, String>;

#[tauri::command]
async fn get_structure(state: State<'_, AppState>) -> CommandResult<Vec<CategoryNode>> {
    Ok(commands::categories::get_structure(&state))
}

#[tauri::command]
async fn add_category(payload: AddCategoryPayload, state: State<'_, AppState>) -> CommandResult<CategoryNode> {
    Ok(commands::categories::add_category(&state, payload))
}

#[tauri::command]
async fn rename_category(
    payload: RenameCategoryPayload,
    state: State<'_, AppState>,
) -> CommandResult<CategoryNode> {
    Ok(commands::categories::rename_category(&state, payload))
}

#[tauri::command]
async fn delete_category(
    payload: DeleteCategoryPayload,
    state: State<'_, AppState>,
) -> CommandResult<CategoryNode> {
    Ok(commands::categories::delete_category(&state, payload))
}

#[tauri::command(rename_all = "snake_case")]
async fn get_pending_count(categoria: Option<String>, state: State<'_, AppState>) -> CommandResult<usize> {
    Ok(commands::invoices::get_pending_count(&state, categoria))
}

#[tauri::command(rename_all = "snake_case")]
async fn upload_invoices(
    categoria: Option<String>,
    origen: Option<String>,
    files: Vec<UploadedFile>,
    state: State<'_, AppState>,
) -> CommandResult<UploadReport> {
    Ok(commands::invoices::upload_invoices(&state, categoria, origen, files).await)
}

#[tauri::command(rename_all = "snake_case")]
async fn list_invoices(
    categoria: Option<String>,
    page: Option<usize>,
    limit: Option<usize>,
    filtro_origen: Option<String>,
    state: State<'_, AppState>,
) -> CommandResult<Vec<InvoiceRecord>> {
    let query = ListInvoicesQuery {
        categoria,
        page,
        limit,
        filtro_origen,
    };
    Ok(commands::invoices::list_invoices(&state, query))
}

#[tauri::command]
async fn get_invoice(key: InvoiceKey, state: State<'_, AppState>) -> CommandResult<InvoiceRecord> {
    Ok(commands::invoices::get_invoice(&state, key))
}

#[tauri::command]
async fn edit_invoice(payload: EditInvoicePayload, state: State<'_, AppState>) -> CommandResult<InvoiceRecord> {
    Ok(commands::invoices::edit_invoice(&state, payload))
}

#[tauri::command]
async fn delete_invoice(key: InvoiceKey, state: State<'_, AppState>) -> CommandResult<InvoiceRecord> {
    Ok(commands::invoices::delete_invoice(&state, key))
}

#[tauri::command]
async fn create_manual_invoice(
    invoice: ManualInvoice,
    state: State<'_, AppState>,
) -> CommandResult<InvoiceRecord> {
    Ok(commands::invoices::create_manual_invoice(&state, invoice))
}

#[tauri::command]
async fn update_origen(payload: UpdateOrigenPayload, state: State<'_, AppState>) -> CommandResult<InvoiceRecord> {
    Ok(commands::invoices::update_origen(&state, payload))
}

#[tauri::command]
async fn reprocess_invoice(key: InvoiceKey, state: State<'_, AppState>) -> CommandResult<InvoiceRecord> {
    Ok(commands::invoices::reprocess_invoice(&state, key).await)
}

#[tauri::command]
async fn get_financial_summary(state: State<'_, AppState>) -> CommandResult<FinancialSummary> {
    Ok(commands::dashboard::get_financial_summary(&state))
}

#[tauri::command]
async fn get_settings(state: State<'_, AppState>) -> CommandResult<Settings> {
    Ok(commands::settings::get_settings(&state))
}

#[tauri::command]
async fn save_settings(payload: SettingsUpdate, state: State<'_, AppState>) -> CommandResult<Settings> {
    Ok(commands::settings::save_settings(&state, payload))
}

pub fn run() -> anyhow::Result<()> {
    tracing_subscriber::fmt::init();

    tauri::Builder::default()
        .setup(|app| {
            let app_data_dir = app
                .path()
                .app_data_dir()
                .map_err(|e| anyhow!("App data dir: {}", e))?;
            std::fs::create_dir_all(&app_data_dir)?;

            let db = Database::new(app_data_dir.join("facturacion.sqlite"))?;
            let settings = config::load_settings(&db);
            let tree = category_store::load_tree(&db)?;
            info!(
                categories = tree.leaf_keys().len(),
                data_dir = %app_data_dir.display(),
                "Database ready"
            );

            app.manage(AppState::new(db, settings, app_data_dir));
            Ok(())
        })
        .invoke_handler(tauri::generate_handler![
            get_structure,
            add_category,
            rename_category,
            delete_category,
            get_pending_count,
            upload_invoices,
            list_invoices,
            get_invoice,
            edit_invoice,
            delete_invoice,
            create_manual_invoice,
            update_origen,
            reprocess_invoice,
            get_financial_summary,
            get_settings,
            save_settings,
        ])
        .run(tauri::generate_context!())
        .map_err(|e| anyhow!("Tauri runtime: {}", e))
}
