use serde::{Deserialize, Serialize};

/// A node of the expense taxonomy. Leaves hold invoices, groups only aggregate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategoryNode {
    pub key: String,
    pub name: String,
    #[serde(rename = "isGroup", default, skip_serializing_if = "std::ops::Not::not")]
    pub is_group: bool,
    #[serde(rename = "subItems", default, skip_serializing_if = "Vec::is_empty")]
    pub sub_items: Vec<CategoryNode>,
}

impl CategoryNode {
    pub fn leaf(key: &str, name: &str) -> Self {
        CategoryNode {
            key: key.to_string(),
            name: name.to_string(),
            is_group: false,
            sub_items: Vec::new(),
        }
    }

    pub fn group(key: &str, name: &str, sub_items: Vec<CategoryNode>) -> Self {
        CategoryNode {
            key: key.to_string(),
            name: name.to_string(),
            is_group: true,
            sub_items,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        self.is_group || !self.sub_items.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String")]
pub enum Origen {
    Centrales,
    Campo,
}

impl Origen {
    /// Anything that is not exactly "Campo" lands in the Centrales bucket.
    pub fn from_tag(tag: &str) -> Self {
        if tag.trim() == "Campo" {
            Origen::Campo
        } else {
            Origen::Centrales
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Origen::Centrales => "Centrales",
            Origen::Campo => "Campo",
        }
    }
}

impl From<String> for Origen {
    fn from(value: String) -> Self {
        Origen::from_tag(&value)
    }
}

impl Default for Origen {
    fn default() -> Self {
        Origen::Centrales
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OriginFilter {
    All,
    Centrales,
    Campo,
}

impl OriginFilter {
    pub fn from_param(value: Option<&str>) -> Self {
        match value.map(str::trim) {
            Some("Centrales") => OriginFilter::Centrales,
            Some("Campo") => OriginFilter::Campo,
            _ => OriginFilter::All,
        }
    }

    pub fn origen(&self) -> Option<Origen> {
        match self {
            OriginFilter::All => None,
            OriginFilter::Centrales => Some(Origen::Centrales),
            OriginFilter::Campo => Some(Origen::Campo),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordStatus {
    Ok,
    Error,
}

impl RecordStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Ok => "ok",
            RecordStatus::Error => "error",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == "error" {
            RecordStatus::Error
        } else {
            RecordStatus::Ok
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordSource {
    Extracted,
    Manual,
}

impl RecordSource {
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordSource::Extracted => "extracted",
            RecordSource::Manual => "manual",
        }
    }

    pub fn from_db(value: &str) -> Self {
        if value == "manual" {
            RecordSource::Manual
        } else {
            RecordSource::Extracted
        }
    }
}

/// CFDI fields shared by extraction output, manual entry and edits.
/// Amounts stay raw strings; they are only sanitized when aggregated.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InvoiceFields {
    pub folio_fiscal: Option<String>,
    pub rfc_emisor: Option<String>,
    pub rfc_receptor: Option<String>,
    pub nombre_emisor: Option<String>,
    pub nombre_receptor: Option<String>,
    pub puesto: Option<String>,
    pub subtotal: Option<String>,
    pub total_deducciones: Option<String>,
    pub total_neto: Option<String>,
    pub uso_cfdi: Option<String>,
    pub efecto_comprobante: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InvoiceRecord {
    pub archivo: String,
    pub categoria: String,
    pub origen: Origen,
    pub status: RecordStatus,
    pub fuente: RecordSource,
    #[serde(flatten)]
    pub fields: InvoiceFields,
    pub error_msg: Option<String>,
    pub ruta: Option<String>,
    pub file_hash: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ManualInvoice {
    #[serde(default)]
    pub archivo: Option<String>,
    #[serde(default = "default_categoria")]
    pub categoria: String,
    #[serde(default)]
    pub origen: Origen,
    #[serde(flatten)]
    pub fields: InvoiceFields,
}

fn default_categoria() -> String {
    GENERAL_CATEGORY.to_string()
}

/// Bucket used when a request names no category.
pub const GENERAL_CATEGORY: &str = "General";

#[derive(Debug, Clone, Deserialize)]
pub struct InvoicePatch {
    #[serde(default)]
    pub origen: Origen,
    #[serde(flatten)]
    pub fields: InvoiceFields,
}

#[derive(Debug, Clone, Deserialize)]
pub struct UploadedFile {
    pub file_name: String,
    pub bytes: Vec<u8>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectedFile {
    pub file_name: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadReport {
    pub count: usize,
    pub files: Vec<String>,
    pub rejected: Vec<RejectedFile>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct OriginTotals {
    pub total: f64,
    pub cantidad: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CategorySummary {
    pub categoria: String,
    pub nombre: String,
    pub is_group: bool,
    pub total: f64,
    pub cantidad_facturas: usize,
    pub centrales: OriginTotals,
    pub campo: OriginTotals,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FinancialSummary {
    pub detalles: Vec<CategorySummary>,
    pub gran_total: f64,
}

impl FinancialSummary {
    pub fn category(&self, key: &str) -> Option<&CategorySummary> {
        self.detalles.iter().find(|entry| entry.categoria == key)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub storage_folder: Option<String>,
    pub extraction_url: Option<String>,
    pub page_size: usize,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            storage_folder: None,
            extraction_url: None,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

pub const DEFAULT_PAGE_SIZE: usize = 10;
