use rusqlite::{params, Connection, OptionalExtension, Result as SqlResult, Row};
use std::path::PathBuf;

use crate::models::{InvoiceFields, InvoiceRecord, Origen, RecordSource, RecordStatus};

const INVOICE_COLUMNS: &str = "categoria, archivo, origen, status, fuente, folio_fiscal, rfc_emisor,
    rfc_receptor, nombre_emisor, nombre_receptor, puesto, subtotal, total_deducciones, total_neto,
    uso_cfdi, efecto_comprobante, error_msg, ruta, file_hash, created_at, updated_at";

pub struct Database {
    conn: Connection,
}

impl Database {
    pub fn new(db_path: PathBuf) -> SqlResult<Self> {
        let conn = Connection::open(db_path)?;
        Self::from_connection(conn)
    }

    pub fn open_in_memory() -> SqlResult<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> SqlResult<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let mut db = Database { conn };
        db.run_migrations()?;
        Ok(db)
    }

    fn run_migrations(&mut self) -> SqlResult<()> {
        self.conn.execute_batch(
            "CREATE TABLE IF NOT EXISTS schema_migrations (
                name TEXT PRIMARY KEY,
                applied_at TEXT NOT NULL
            );",
        )?;

        let migrations = vec![
            (
                "001_create_invoices.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/001_create_invoices.sql"
                )),
            ),
            (
                "002_create_settings.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/002_create_settings.sql"
                )),
            ),
            (
                "003_create_processing_logs_table.sql",
                include_str!(concat!(
                    env!("CARGO_MANIFEST_DIR"),
                    "/migrations/003_create_processing_logs_table.sql"
                )),
            ),
        ];

        for (name, sql) in migrations {
            let applied: Option<String> = self
                .conn
                .query_row(
                    "SELECT name FROM schema_migrations WHERE name = ?1",
                    params![name],
                    |row| row.get(0),
                )
                .optional()?;

            if applied.is_none() {
                let tx = self.conn.transaction()?;
                tx.execute_batch(sql)?;
                tx.execute(
                    "INSERT INTO schema_migrations (name, applied_at) VALUES (?1, datetime('now'))",
                    params![name],
                )?;
                tx.commit()?;
            }
        }

        Ok(())
    }

    pub fn insert_invoice(&self, invoice: &InvoiceRecord) -> SqlResult<()> {
        let f = &invoice.fields;
        self.conn.execute(
            &format!(
                "INSERT INTO invoices ({INVOICE_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21)"
            ),
            params![
                invoice.categoria,
                invoice.archivo,
                invoice.origen.as_str(),
                invoice.status.as_str(),
                invoice.fuente.as_str(),
                f.folio_fiscal,
                f.rfc_emisor,
                f.rfc_receptor,
                f.nombre_emisor,
                f.nombre_receptor,
                f.puesto,
                f.subtotal,
                f.total_deducciones,
                f.total_neto,
                f.uso_cfdi,
                f.efecto_comprobante,
                invoice.error_msg,
                invoice.ruta,
                invoice.file_hash,
                invoice.created_at,
                invoice.updated_at
            ],
        )?;
        Ok(())
    }

    /// Rewrites every mutable column of the row identified by (categoria, archivo).
    pub fn replace_invoice(&self, invoice: &InvoiceRecord) -> SqlResult<usize> {
        let f = &invoice.fields;
        self.conn.execute(
            "UPDATE invoices SET
                origen = ?3, status = ?4, fuente = ?5, folio_fiscal = ?6, rfc_emisor = ?7,
                rfc_receptor = ?8, nombre_emisor = ?9, nombre_receptor = ?10, puesto = ?11,
                subtotal = ?12, total_deducciones = ?13, total_neto = ?14, uso_cfdi = ?15,
                efecto_comprobante = ?16, error_msg = ?17, ruta = ?18, file_hash = ?19,
                updated_at = ?20
             WHERE categoria = ?1 AND archivo = ?2",
            params![
                invoice.categoria,
                invoice.archivo,
                invoice.origen.as_str(),
                invoice.status.as_str(),
                invoice.fuente.as_str(),
                f.folio_fiscal,
                f.rfc_emisor,
                f.rfc_receptor,
                f.nombre_emisor,
                f.nombre_receptor,
                f.puesto,
                f.subtotal,
                f.total_deducciones,
                f.total_neto,
                f.uso_cfdi,
                f.efecto_comprobante,
                invoice.error_msg,
                invoice.ruta,
                invoice.file_hash,
                invoice.updated_at
            ],
        )
    }

    pub fn get_invoice(&self, categoria: &str, archivo: &str) -> SqlResult<Option<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices WHERE categoria = ?1 AND archivo = ?2"
        ))?;
        stmt.query_row(params![categoria, archivo], row_to_invoice)
            .optional()
    }

    pub fn invoice_exists(&self, categoria: &str, archivo: &str) -> SqlResult<bool> {
        let found: Option<i64> = self
            .conn
            .query_row(
                "SELECT 1 FROM invoices WHERE categoria = ?1 AND archivo = ?2",
                params![categoria, archivo],
                |row| row.get(0),
            )
            .optional()?;
        Ok(found.is_some())
    }

    pub fn list_invoices(
        &self,
        categoria: &str,
        origen: Option<Origen>,
        limit: usize,
        offset: usize,
    ) -> SqlResult<Vec<InvoiceRecord>> {
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let Ok(offset) = i64::try_from(offset) else {
            return Ok(Vec::new());
        };
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS}
             FROM invoices
             WHERE categoria = ?1 AND (?2 IS NULL OR origen = ?2)
             ORDER BY lower(archivo), archivo
             LIMIT ?3 OFFSET ?4"
        ))?;

        let rows = stmt.query_map(
            params![
                categoria,
                origen.map(|o| o.as_str()),
                limit,
                offset
            ],
            row_to_invoice,
        )?;

        rows.collect()
    }

    pub fn count_invoices(&self, categoria: &str) -> SqlResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM invoices WHERE categoria = ?1",
            params![categoria],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    pub fn all_invoices(&self) -> SqlResult<Vec<InvoiceRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "SELECT {INVOICE_COLUMNS} FROM invoices ORDER BY categoria, lower(archivo), archivo"
        ))?;
        let rows = stmt.query_map([], row_to_invoice)?;
        rows.collect()
    }

    pub fn delete_invoice(&self, categoria: &str, archivo: &str) -> SqlResult<usize> {
        self.conn.execute(
            "DELETE FROM invoices WHERE categoria = ?1 AND archivo = ?2",
            params![categoria, archivo],
        )
    }

    pub fn set_origen(
        &self,
        categoria: &str,
        archivo: &str,
        origen: Origen,
        updated_at: &str,
    ) -> SqlResult<usize> {
        self.conn.execute(
            "UPDATE invoices SET origen = ?3, updated_at = ?4 WHERE categoria = ?1 AND archivo = ?2",
            params![categoria, archivo, origen.as_str(), updated_at],
        )
    }

    pub fn set_setting(&self, key: &str, value: &str) -> SqlResult<()> {
        self.conn.execute(
            "INSERT OR REPLACE INTO settings (key, value, updated_at) VALUES (?1, ?2, datetime('now'))",
            params![key, value],
        )?;
        Ok(())
    }

    pub fn get_setting(&self, key: &str) -> SqlResult<Option<String>> {
        let mut stmt = self.conn.prepare("SELECT value FROM settings WHERE key = ?1")?;
        stmt.query_row(params![key], |row| row.get(0)).optional()
    }

    pub fn clear_setting(&self, key: &str) -> SqlResult<()> {
        self.conn
            .execute("DELETE FROM settings WHERE key = ?1", params![key])?;
        Ok(())
    }

    pub fn log_processing(
        &self,
        categoria: &str,
        archivo: &str,
        file_hash: Option<&str>,
        process_type: &str,
        status: &str,
        message: Option<&str>,
    ) -> SqlResult<()> {
        self.conn.execute(
            "INSERT INTO processing_logs (id, categoria, archivo, file_hash, process_type, status, message, created_at)
             VALUES (hex(randomblob(16)), ?1, ?2, ?3, ?4, ?5, ?6, datetime('now'))",
            params![categoria, archivo, file_hash, process_type, status, message],
        )?;
        Ok(())
    }

    pub fn count_processing_logs(&self, categoria: &str, status: &str) -> SqlResult<usize> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM processing_logs WHERE categoria = ?1 AND status = ?2",
            params![categoria, status],
            |row| row.get(0),
        )?;
        Ok(count as usize)
    }

    #[cfg(test)]
    pub(crate) fn execute_batch(&self, sql: &str) -> SqlResult<()> {
        self.conn.execute_batch(sql)
    }
}

fn row_to_invoice(row: &Row<'_>) -> SqlResult<InvoiceRecord> {
    let origen: String = row.get(2)?;
    let status: String = row.get(3)?;
    let fuente: String = row.get(4)?;
    Ok(InvoiceRecord {
        categoria: row.get(0)?,
        archivo: row.get(1)?,
        origen: Origen::from_tag(&origen),
        status: RecordStatus::from_db(&status),
        fuente: RecordSource::from_db(&fuente),
        fields: InvoiceFields {
            folio_fiscal: row.get(5)?,
            rfc_emisor: row.get(6)?,
            rfc_receptor: row.get(7)?,
            nombre_emisor: row.get(8)?,
            nombre_receptor: row.get(9)?,
            puesto: row.get(10)?,
            subtotal: row.get(11)?,
            total_deducciones: row.get(12)?,
            total_neto: row.get(13)?,
            uso_cfdi: row.get(14)?,
            efecto_comprobante: row.get(15)?,
        },
        error_msg: row.get(16)?,
        ruta: row.get(17)?,
        file_hash: row.get(18)?,
        created_at: row.get(19)?,
        updated_at: row.get(20)?,
    })
}
