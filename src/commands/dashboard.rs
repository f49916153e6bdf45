use crate::commands::ApiResponse;
use crate::error::CoreResult;
use crate::models::FinancialSummary;
use crate::services::state::AppState;
use crate::services::{category_store, invoice_store, summary};

fn financial_summary(state: &AppState) -> CoreResult<FinancialSummary> {
    let db = state.lock_db()?;
    let tree = category_store::load_tree(&db)?;
    let records = invoice_store::all_by_category(&db)?;
    Ok(summary::summarize(tree.nodes(), &records))
}

pub fn get_financial_summary(state: &AppState) -> ApiResponse<FinancialSummary> {
    financial_summary(state).into()
}
