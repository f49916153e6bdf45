use chrono::Utc;
use regex::Regex;
use sha2::{Digest, Sha256};
use std::path::Path;
use std::sync::OnceLock;

pub fn now_rfc3339() -> String {
    Utc::now().to_rfc3339()
}

pub fn sha256_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    hex::encode(hasher.finalize())
}

/// Sanitizes an extracted amount ("$1,234.50", "-300.00") into a number.
/// Blank or unparseable input yields 0.
pub fn parse_amount(value: &str) -> f64 {
    let cleaned: String = value
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    cleaned.parse::<f64>().ok().filter(|v| v.is_finite()).unwrap_or(0.0)
}

pub fn round_cents(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

pub fn is_pdf(file_name: &str) -> bool {
    Path::new(file_name)
        .extension()
        .and_then(|ext| ext.to_str())
        .map(|ext| ext.eq_ignore_ascii_case("pdf"))
        .unwrap_or(false)
}

fn origin_tag_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^\[.*?\]\s*").expect("valid origin tag pattern"))
}

/// Drops a leading "[Campo] " style tag left on re-uploaded files.
pub fn strip_origin_tag(file_name: &str) -> String {
    origin_tag_pattern().replace(file_name.trim(), "").to_string()
}

pub fn manual_file_name() -> String {
    let id = uuid::Uuid::new_v4().simple().to_string();
    format!("Manual - {}.json", &id[..8])
}

/// Trims and drops empty strings.
pub fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_amount_strips_currency_decoration() {
        assert_eq!(parse_amount("$1,000.00"), 1000.0);
        assert_eq!(parse_amount(" $ 500.50 "), 500.5);
        assert_eq!(parse_amount("-300.25"), -300.25);
        assert_eq!(parse_amount("12,345"), 12345.0);
    }

    #[test]
    fn parse_amount_treats_garbage_as_zero() {
        assert_eq!(parse_amount(""), 0.0);
        assert_eq!(parse_amount("N/A"), 0.0);
        assert_eq!(parse_amount("1.2.3"), 0.0);
        assert_eq!(parse_amount("NaN"), 0.0);
    }

    #[test]
    fn round_cents_drops_float_noise() {
        assert_eq!(round_cents(0.1 + 0.2), 0.3);
        assert_eq!(round_cents(1500.004), 1500.0);
    }

    #[test]
    fn pdf_detection_ignores_case() {
        assert!(is_pdf("factura.PDF"));
        assert!(is_pdf("a.b.pdf"));
        assert!(!is_pdf("factura.json"));
        assert!(!is_pdf("pdf"));
    }

    #[test]
    fn origin_tag_is_stripped_once() {
        assert_eq!(strip_origin_tag("[Campo] nomina.pdf"), "nomina.pdf");
        assert_eq!(strip_origin_tag("[Centrales]renta.pdf"), "renta.pdf");
        assert_eq!(strip_origin_tag("renta [2024].pdf"), "renta [2024].pdf");
    }

    #[test]
    fn manual_names_are_unique_surrogates() {
        let a = manual_file_name();
        let b = manual_file_name();
        assert!(a.starts_with("Manual - ") && a.ends_with(".json"));
        assert_eq!(a.len(), "Manual - ".len() + 8 + ".json".len());
        assert_ne!(a, b);
    }
}
