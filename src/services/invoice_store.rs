use std::collections::HashMap;
use tracing::info;

use crate::db::Database;
use crate::error::{CoreError, CoreResult};
use crate::models::{
    InvoiceFields, InvoicePatch, InvoiceRecord, Origen, OriginFilter, RecordSource, RecordStatus,
};
use crate::utils::{manual_file_name, non_blank, now_rfc3339};

fn not_found(categoria: &str, archivo: &str) -> CoreError {
    CoreError::NotFound(format!("{}/{}", categoria, archivo))
}

/// Page `page` (1-indexed, 0 treated as 1) of a category's records in filename order.
pub fn list_by_category(
    db: &Database,
    categoria: &str,
    page: usize,
    page_size: usize,
    filter: OriginFilter,
) -> CoreResult<Vec<InvoiceRecord>> {
    if page_size == 0 {
        return Ok(Vec::new());
    }
    // Past the end of any SQLite table; an OFFSET above i64::MAX would wrap.
    let Some(offset) = (page.max(1) - 1).checked_mul(page_size) else {
        return Ok(Vec::new());
    };
    if i64::try_from(offset).is_err() {
        return Ok(Vec::new());
    }
    Ok(db.list_invoices(categoria, filter.origen(), page_size, offset)?)
}

pub fn count(db: &Database, categoria: &str) -> CoreResult<usize> {
    Ok(db.count_invoices(categoria)?)
}

pub fn get(db: &Database, categoria: &str, archivo: &str) -> CoreResult<InvoiceRecord> {
    db.get_invoice(categoria, archivo)?
        .ok_or_else(|| not_found(categoria, archivo))
}

pub fn all_by_category(db: &Database) -> CoreResult<HashMap<String, Vec<InvoiceRecord>>> {
    let mut grouped: HashMap<String, Vec<InvoiceRecord>> = HashMap::new();
    for record in db.all_invoices()? {
        grouped.entry(record.categoria.clone()).or_default().push(record);
    }
    Ok(grouped)
}

fn insert(db: &Database, record: InvoiceRecord) -> CoreResult<InvoiceRecord> {
    if record.archivo.trim().is_empty() {
        return Err(CoreError::ValidationFailed("archivo is required".to_string()));
    }
    if db.invoice_exists(&record.categoria, &record.archivo)? {
        return Err(CoreError::DuplicateKey(format!(
            "{}/{}",
            record.categoria, record.archivo
        )));
    }
    db.insert_invoice(&record)?;
    Ok(record)
}

/// Files the outcome of an extraction, successful or not.
pub fn insert_extracted(db: &Database, categoria: &str, mut record: InvoiceRecord) -> CoreResult<InvoiceRecord> {
    record.categoria = categoria.to_string();
    record.fuente = RecordSource::Extracted;
    insert(db, record)
}

/// Files a hand-typed invoice. A missing filename gets a "Manual - xxxxxxxx.json" surrogate.
pub fn insert_manual(
    db: &Database,
    categoria: &str,
    archivo: Option<String>,
    origen: Origen,
    fields: InvoiceFields,
) -> CoreResult<InvoiceRecord> {
    let categoria = non_blank(Some(categoria.to_string()))
        .ok_or_else(|| CoreError::ValidationFailed("categoria is required".to_string()))?;
    if non_blank(fields.subtotal.clone()).is_none() && non_blank(fields.total_neto.clone()).is_none() {
        return Err(CoreError::ValidationFailed(
            "subtotal or total_neto is required".to_string(),
        ));
    }

    let archivo = non_blank(archivo).unwrap_or_else(manual_file_name);
    let now = now_rfc3339();
    let record = insert(
        db,
        InvoiceRecord {
            archivo,
            categoria,
            origen,
            status: RecordStatus::Ok,
            fuente: RecordSource::Manual,
            fields,
            error_msg: None,
            ruta: None,
            file_hash: None,
            created_at: now.clone(),
            updated_at: now,
        },
    )?;
    info!(categoria = %record.categoria, archivo = %record.archivo, "Manual invoice stored");
    Ok(record)
}

/// Replaces every editable field. An edited record counts as manually verified.
pub fn update(db: &Database, categoria: &str, archivo: &str, patch: InvoicePatch) -> CoreResult<InvoiceRecord> {
    let mut record = get(db, categoria, archivo)?;
    record.origen = patch.origen;
    record.fields = patch.fields;
    record.status = RecordStatus::Ok;
    record.fuente = RecordSource::Manual;
    record.error_msg = None;
    record.updated_at = now_rfc3339();

    if db.replace_invoice(&record)? == 0 {
        return Err(not_found(categoria, archivo));
    }
    info!(categoria = %categoria, archivo = %archivo, "Invoice edited");
    Ok(record)
}

/// Stores a refreshed extraction over an existing row.
pub fn replace_extraction(db: &Database, record: &InvoiceRecord) -> CoreResult<()> {
    if db.replace_invoice(record)? == 0 {
        return Err(not_found(&record.categoria, &record.archivo));
    }
    Ok(())
}

pub fn set_origen(db: &Database, categoria: &str, archivo: &str, origen: Origen) -> CoreResult<InvoiceRecord> {
    if db.set_origen(categoria, archivo, origen, &now_rfc3339())? == 0 {
        return Err(not_found(categoria, archivo));
    }
    get(db, categoria, archivo)
}

/// Removes the row and hands it back so the caller can discard the stored document.
pub fn delete(db: &Database, categoria: &str, archivo: &str) -> CoreResult<InvoiceRecord> {
    let record = get(db, categoria, archivo)?;
    db.delete_invoice(categoria, archivo)?;
    info!(categoria = %categoria, archivo = %archivo, "Invoice deleted");
    Ok(record)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn extracted(archivo: &str, origen: Origen, total_neto: &str) -> InvoiceRecord {
        InvoiceRecord {
            archivo: archivo.to_string(),
            categoria: String::new(),
            origen,
            status: RecordStatus::Ok,
            fuente: RecordSource::Extracted,
            fields: InvoiceFields {
                total_neto: Some(total_neto.to_string()),
                ..Default::default()
            },
            error_msg: None,
            ruta: None,
            file_hash: None,
            created_at: now_rfc3339(),
            updated_at: now_rfc3339(),
        }
    }

    fn amounts(fields: &str) -> InvoiceFields {
        InvoiceFields {
            total_neto: Some(fields.to_string()),
            ..Default::default()
        }
    }

    #[test]
    fn duplicate_filename_is_rejected() {
        let db = Database::open_in_memory().unwrap();
        insert_extracted(&db, "Fletes", extracted("a.pdf", Origen::Centrales, "1")).unwrap();
        let err = insert_extracted(&db, "Fletes", extracted("a.pdf", Origen::Campo, "2")).unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey(_)));
        assert_eq!(get(&db, "Fletes", "a.pdf").unwrap().origen, Origen::Centrales);
    }

    #[test]
    fn insert_extracted_files_under_given_category() {
        let db = Database::open_in_memory().unwrap();
        let stored = insert_extracted(&db, "Seguros", extracted("p.pdf", Origen::Campo, "5")).unwrap();
        assert_eq!(stored.categoria, "Seguros");
        assert_eq!(count(&db, "Seguros").unwrap(), 1);
    }

    #[test]
    fn manual_entry_requires_an_amount() {
        let db = Database::open_in_memory().unwrap();
        let err = insert_manual(&db, "Honorarios", None, Origen::Campo, InvoiceFields::default())
            .unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
        let err = insert_manual(&db, " ", None, Origen::Campo, amounts("1")).unwrap_err();
        assert!(matches!(err, CoreError::ValidationFailed(_)));
        assert_eq!(count(&db, "Honorarios").unwrap(), 0);
    }

    #[test]
    fn manual_entries_get_distinct_surrogate_names() {
        let db = Database::open_in_memory().unwrap();
        let a = insert_manual(&db, "Honorarios", None, Origen::Campo, amounts("1400.00")).unwrap();
        let b = insert_manual(&db, "Honorarios", Some("  ".to_string()), Origen::Centrales, amounts("1")).unwrap();
        assert_ne!(a.archivo, b.archivo);
        assert!(a.archivo.starts_with("Manual - "));
        assert_eq!(a.fuente, RecordSource::Manual);
        assert_eq!(count(&db, "Honorarios").unwrap(), 2);
    }

    #[test]
    fn manual_entry_with_taken_name_is_duplicate() {
        let db = Database::open_in_memory().unwrap();
        insert_manual(&db, "Honorarios", Some("n.json".to_string()), Origen::Campo, amounts("1")).unwrap();
        let err = insert_manual(&db, "Honorarios", Some("n.json".to_string()), Origen::Campo, amounts("2"))
            .unwrap_err();
        assert!(matches!(err, CoreError::DuplicateKey(_)));
    }

    #[test]
    fn paging_follows_filename_order() {
        let db = Database::open_in_memory().unwrap();
        for name in ["e.pdf", "a.pdf", "d.pdf", "b.pdf", "c.pdf"] {
            insert_extracted(&db, "Servicios", extracted(name, Origen::Centrales, "1")).unwrap();
        }
        let page = |n| -> Vec<String> {
            list_by_category(&db, "Servicios", n, 2, OriginFilter::All)
                .unwrap()
                .into_iter()
                .map(|r| r.archivo)
                .collect()
        };
        assert_eq!(page(1), vec!["a.pdf", "b.pdf"]);
        assert_eq!(page(2), vec!["c.pdf", "d.pdf"]);
        assert_eq!(page(3), vec!["e.pdf"]);
        assert!(page(4).is_empty());
        assert_eq!(page(0), page(1));
        assert!(list_by_category(&db, "Servicios", 1, 0, OriginFilter::All).unwrap().is_empty());
    }

    #[test]
    fn huge_page_or_limit_does_not_wrap() {
        let db = Database::open_in_memory().unwrap();
        for name in ["a.pdf", "b.pdf", "c.pdf"] {
            insert_extracted(&db, "Servicios", extracted(name, Origen::Centrales, "1")).unwrap();
        }
        let far = list_by_category(&db, "Servicios", usize::MAX, 2, OriginFilter::All).unwrap();
        assert!(far.is_empty());
        let past_i64 = i64::MAX as usize / 2 + 2;
        let far = list_by_category(&db, "Servicios", past_i64, 2, OriginFilter::All).unwrap();
        assert!(far.is_empty());

        let everything = list_by_category(&db, "Servicios", 1, usize::MAX, OriginFilter::All).unwrap();
        assert_eq!(everything.len(), 3);
    }

    #[test]
    fn origin_filter_applies_before_paging() {
        let db = Database::open_in_memory().unwrap();
        insert_extracted(&db, "Fletes", extracted("a.pdf", Origen::Campo, "1")).unwrap();
        insert_extracted(&db, "Fletes", extracted("b.pdf", Origen::Centrales, "1")).unwrap();
        insert_extracted(&db, "Fletes", extracted("c.pdf", Origen::Campo, "1")).unwrap();

        let campo = list_by_category(&db, "Fletes", 1, 10, OriginFilter::Campo).unwrap();
        assert_eq!(campo.len(), 2);
        let second = list_by_category(&db, "Fletes", 2, 1, OriginFilter::Campo).unwrap();
        assert_eq!(second[0].archivo, "c.pdf");
    }

    #[test]
    fn update_replaces_all_fields() {
        let db = Database::open_in_memory().unwrap();
        let mut failed = extracted("x.pdf", Origen::Centrales, "1");
        failed.status = RecordStatus::Error;
        failed.error_msg = Some("unreadable".to_string());
        failed.fields.rfc_emisor = Some("AAA010101AAA".to_string());
        insert_extracted(&db, "Fletes", failed).unwrap();

        let patch = InvoicePatch {
            origen: Origen::Campo,
            fields: amounts("250.00"),
        };
        let updated = update(&db, "Fletes", "x.pdf", patch).unwrap();
        assert_eq!(updated.status, RecordStatus::Ok);
        assert_eq!(updated.fields.rfc_emisor, None);

        let stored = get(&db, "Fletes", "x.pdf").unwrap();
        assert_eq!(stored.origen, Origen::Campo);
        assert_eq!(stored.fields.total_neto.as_deref(), Some("250.00"));
        assert_eq!(stored.error_msg, None);
        assert_eq!(stored.fuente, RecordSource::Manual);
    }

    #[test]
    fn update_and_set_origen_of_missing_record_are_not_found() {
        let db = Database::open_in_memory().unwrap();
        let patch = InvoicePatch {
            origen: Origen::Campo,
            fields: InvoiceFields::default(),
        };
        assert!(matches!(update(&db, "Fletes", "x.pdf", patch), Err(CoreError::NotFound(_))));
        assert!(matches!(
            set_origen(&db, "Fletes", "x.pdf", Origen::Campo),
            Err(CoreError::NotFound(_))
        ));
    }

    #[test]
    fn set_origen_retags_record() {
        let db = Database::open_in_memory().unwrap();
        insert_extracted(&db, "Fletes", extracted("a.pdf", Origen::Centrales, "1")).unwrap();
        let record = set_origen(&db, "Fletes", "a.pdf", Origen::Campo).unwrap();
        assert_eq!(record.origen, Origen::Campo);
    }

    #[test]
    fn double_delete_reports_not_found() {
        let db = Database::open_in_memory().unwrap();
        insert_extracted(&db, "Fletes", extracted("a.pdf", Origen::Centrales, "1")).unwrap();
        delete(&db, "Fletes", "a.pdf").unwrap();
        assert_eq!(count(&db, "Fletes").unwrap(), 0);
        assert!(matches!(delete(&db, "Fletes", "a.pdf"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn all_by_category_groups_records() {
        let db = Database::open_in_memory().unwrap();
        insert_extracted(&db, "Fletes", extracted("a.pdf", Origen::Centrales, "1")).unwrap();
        insert_extracted(&db, "Fletes", extracted("b.pdf", Origen::Campo, "1")).unwrap();
        insert_extracted(&db, "Seguros", extracted("a.pdf", Origen::Campo, "1")).unwrap();
        let grouped = all_by_category(&db).unwrap();
        assert_eq!(grouped["Fletes"].len(), 2);
        assert_eq!(grouped["Seguros"].len(), 1);
    }
}
