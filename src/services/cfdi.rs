use regex::Regex;
use std::sync::OnceLock;

use crate::models::InvoiceFields;

const RECEPTOR_MARKERS: [&str; 4] = ["receptor", "cliente", "facturar a", "razón social:"];
const NETO_MARKERS: [&str; 5] = ["neto", "líquido", "liquido", "a pagar", "alcance"];
const PUESTO_MARKERS: [&str; 6] = [
    "puesto",
    "departamento",
    "categoría",
    "categoria",
    "ocupación",
    "ocupacion",
];

// Payroll vocabulary that shows up next to "Receptor"/"Trabajador" labels but is never a name.
const NAME_BLACKLIST: [&str; 34] = [
    "sueldo", "salario", "hora", "extra", "aguinaldo", "prima", "vacacion", "bono", "subsidio",
    "fondo", "ahorro", "vale", "despensa", "imss", "infonavit", "isr", "sat", "folio", "fecha",
    "periodo", "dia", "pago", "nomina", "neto", "total", "concepto", "percepcion", "deduccion",
    "monto", "importe", "fiscal", "digital", "sello", "cadena",
];

struct Patterns {
    uuid: Regex,
    rfc: Regex,
    rfc_token: Regex,
    amount_cents: Regex,
    amount_loose: Regex,
    emisor_label: Regex,
    emisor_tail: Regex,
    rfc_label: Regex,
    rfc_emisor_label: Regex,
    receptor_label: Regex,
    nomina_label: Regex,
    puesto_label: Regex,
    puesto_tail: Regex,
    uso_cfdi: Regex,
    efecto: Regex,
    digit: Regex,
}

fn patterns() -> &'static Patterns {
    static PATTERNS: OnceLock<Patterns> = OnceLock::new();
    PATTERNS.get_or_init(|| {
        let re = |pattern: &str| Regex::new(pattern).expect("valid CFDI pattern");
        Patterns {
            uuid: re(r"[0-9a-fA-F]{8}(?:-[0-9a-fA-F]{4}){3}-[0-9a-fA-F]{12}"),
            rfc: re(r"[A-Z&Ñ]{3,4}[0-9]{2}(?:0[1-9]|1[0-2])(?:0[1-9]|[12][0-9]|3[01])[A-Z0-9]{3}"),
            rfc_token: re(r"^[A-Z&Ñ]{3,4}[0-9]{6}[A-Z0-9]{3}"),
            amount_cents: re(r"\$?\s*[\d,]+\.\d{2}"),
            amount_loose: re(r"[\d,]+(?:\.\d{2})?"),
            emisor_label: re(r"(?i)emisor:|social:|nombre:"),
            emisor_tail: re(r"(?i)folio|rfc|no\.?\s*de\s*serie|serie|csd|regimen|lugar"),
            rfc_label: re(r"(?i)r\.?f\.?c\.?[:.]?"),
            rfc_emisor_label: re(r"(?i)rfc.*emisor"),
            receptor_label: re(r"(?i)(?:receptor|trabajador|empleado|recibí de)[:\s]+(.+)"),
            nomina_label: re(r"(?i)pago de n[oó]mina"),
            puesto_label: re(r"(?i)(?:puesto|departamento|categor[ií]a|ocupaci[oó]n)[:\s]+"),
            puesto_tail: re(r"(?i)fecha|salario|sindicalizado|periodo|riesgo|jornada"),
            uso_cfdi: re(r"(?i)uso\s+(?:del\s+)?cfdi\s*:?\s*(.+)"),
            efecto: re(r"(?i)efecto\s+(?:del\s+)?comprobante\s*:?\s*(.+)"),
            digit: re(r"\d"),
        }
    })
}

fn squash_whitespace(line: &str) -> String {
    line.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn contains_any(haystack: &str, needles: &[&str]) -> bool {
    needles.iter().any(|needle| haystack.contains(needle))
}

/// Text after the first match of `label`, if any.
fn after<'a>(label: &Regex, line: &'a str) -> Option<&'a str> {
    label.find(line).map(|m| line[m.end()..].trim())
}

/// Text before the first match of `tail`, or the whole input.
fn before<'a>(tail: &Regex, value: &'a str) -> &'a str {
    match tail.find(value) {
        Some(m) => value[..m.start()].trim(),
        None => value.trim(),
    }
}

fn last_cents_amount(line: &str) -> Option<String> {
    let raw = patterns().amount_cents.find_iter(line).last()?.as_str();
    let cleaned: String = raw
        .chars()
        .filter(|c| *c != '$' && *c != ',' && !c.is_whitespace())
        .collect();
    match cleaned.parse::<f64>() {
        Ok(value) if value > 0.0 => Some(cleaned),
        _ => None,
    }
}

fn last_loose_amount(line: &str, accept: impl Fn(&str) -> bool) -> Option<String> {
    patterns()
        .amount_loose
        .find_iter(line)
        .map(|m| m.as_str())
        .filter(|candidate| accept(*candidate))
        .last()
        .map(|raw| raw.replace(',', ""))
}

fn plausible_person_name(candidate: &str) -> bool {
    let lower = candidate.to_lowercase();
    candidate.chars().count() > 5
        && !contains_any(&lower, &NAME_BLACKLIST)
        && !patterns().digit.is_match(candidate)
}

/// Pulls CFDI fields out of the plain text of a SAT invoice or payroll receipt.
/// Fields that cannot be located stay `None`.
pub fn parse_cfdi_text(text: &str) -> InvoiceFields {
    let p = patterns();
    let mut fields = InvoiceFields::default();
    let lines: Vec<&str> = text.lines().collect();

    fields.folio_fiscal = p.uuid.find(text).map(|m| m.as_str().to_string());

    let rfcs: Vec<&str> = p.rfc.find_iter(text).map(|m| m.as_str()).collect();
    fields.rfc_emisor = rfcs.first().map(|s| s.to_string());
    fields.rfc_receptor = rfcs.get(1).map(|s| s.to_string());

    // An RFC tied to a receptor label wins over document order.
    for (i, line) in lines.iter().enumerate() {
        if !contains_any(&squash_whitespace(line).to_lowercase(), &RECEPTOR_MARKERS) {
            continue;
        }
        let labelled = p.rfc.find(line).or_else(|| {
            lines
                .get(i + 1)
                .and_then(|next| p.rfc.find(next))
        });
        if let Some(m) = labelled {
            fields.rfc_receptor = Some(m.as_str().to_string());
            break;
        }
    }

    if fields.rfc_emisor.is_some() && fields.rfc_emisor == fields.rfc_receptor {
        if let Some(other) = rfcs.iter().find(|rfc| Some(**rfc) != fields.rfc_emisor.as_deref()) {
            fields.rfc_receptor = Some(other.to_string());
        }
    }

    for raw_line in &lines {
        let line = squash_whitespace(raw_line);
        let lower = line.to_lowercase();

        if fields.nombre_emisor.is_none() {
            if lower.contains("nombre")
                && (lower.contains("emisor") || lower.contains("razón social") || lower.contains("razon social"))
            {
                if let Some(value) = after(&p.emisor_label, &line) {
                    let name = before(&p.emisor_tail, value);
                    if name.chars().count() > 3 {
                        fields.nombre_emisor = Some(name.to_string());
                    }
                }
            } else if let Some(rfc) = fields.rfc_emisor.as_deref().filter(|rfc| line.contains(*rfc)) {
                let rest = line.replace(rfc, "");
                let candidate = p.rfc_label.replace_all(&rest, "");
                let candidate = candidate.trim();
                if candidate.chars().count() > 5 && !p.digit.is_match(candidate) {
                    fields.nombre_emisor = Some(candidate.to_string());
                }
            }
        }

        if lower.contains("subtotal") || lower.contains("sub total") {
            if let Some(amount) = last_cents_amount(&line) {
                fields.subtotal = Some(amount);
            }
        } else if fields.subtotal.is_none() && lower.contains("importe") && !lower.contains("total") {
            fields.subtotal = last_cents_amount(&line);
        }

        if (lower.contains("r.f.c.") || lower.contains("rfc"))
            && !lower.contains("receptor")
            && !lower.contains("cliente")
        {
            let token = after(&p.rfc_label, &line).and_then(|rest| rest.split(' ').next());
            if let Some(token) = token.filter(|t| p.rfc_token.is_match(t)) {
                fields.rfc_emisor = Some(token.to_string());
            }
        }
        if fields.rfc_emisor.is_none() && lower.contains("rfc") && lower.contains("emisor") {
            let token = after(&p.rfc_emisor_label, &line).and_then(|rest| rest.split(' ').next());
            if let Some(token) = token.filter(|t| p.rfc_token.is_match(t)) {
                fields.rfc_emisor = Some(token.to_string());
            }
        }

        if fields.nombre_receptor.is_none() {
            if let Some(caps) = p.receptor_label.captures(&line) {
                let candidate = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                if plausible_person_name(candidate) {
                    fields.nombre_receptor = Some(candidate.to_string());
                }
            } else if lower.contains("pago de n") && lower.contains("mina") {
                let stripped = p.nomina_label.replace_all(&line, "");
                let candidate = stripped.trim();
                if plausible_person_name(candidate) {
                    fields.nombre_receptor = Some(candidate.to_string());
                }
            }
        }

        if fields.puesto.is_none() && contains_any(&lower, &PUESTO_MARKERS) {
            if let Some(value) = after(&p.puesto_label, &line) {
                let puesto = before(&p.puesto_tail, value);
                if puesto.chars().count() > 2 {
                    fields.puesto = Some(puesto.to_string());
                }
            }
        }

        if fields.uso_cfdi.is_none() {
            if let Some(caps) = p.uso_cfdi.captures(&line) {
                let value = caps.get(1).map(|m| m.as_str()).unwrap_or_default();
                let value = before(&p.efecto, value);
                if !value.is_empty() {
                    fields.uso_cfdi = Some(value.to_string());
                }
            }
        }

        if fields.efecto_comprobante.is_none() {
            if let Some(caps) = p.efecto.captures(&line) {
                let value = caps.get(1).map(|m| m.as_str().trim()).unwrap_or_default();
                if !value.is_empty() {
                    fields.efecto_comprobante = Some(value.to_string());
                }
            }
        }

        if lower.contains("total") && lower.contains("deducciones") {
            if let Some(amount) = last_loose_amount(&line, |n| n.contains('.') || n.len() > 3) {
                fields.total_deducciones = Some(amount);
            }
        }

        if fields.total_neto.is_none() && contains_any(&lower, &NETO_MARKERS) {
            fields.total_neto = last_loose_amount(&line, |n| n.contains('.'));
        }
    }

    fields
}
