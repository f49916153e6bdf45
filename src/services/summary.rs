use std::collections::HashMap;

use crate::models::{
    CategoryNode, CategorySummary, FinancialSummary, InvoiceRecord, Origen, OriginTotals,
};
use crate::utils::{non_blank, parse_amount, round_cents};

/// The row total shown for an invoice: `total_neto`, or `subtotal` when there is none.
pub fn record_amount(record: &InvoiceRecord) -> f64 {
    non_blank(record.fields.total_neto.clone())
        .or_else(|| non_blank(record.fields.subtotal.clone()))
        .map(|raw| parse_amount(&raw))
        .unwrap_or(0.0)
}

#[derive(Debug, Clone, Copy, Default)]
struct Stats {
    total: f64,
    cantidad: usize,
    centrales: OriginTotals,
    campo: OriginTotals,
}

impl Stats {
    fn from_records(records: &[InvoiceRecord]) -> Self {
        let mut stats = Stats::default();
        for record in records {
            let amount = record_amount(record);
            let bucket = match record.origen {
                Origen::Campo => &mut stats.campo,
                Origen::Centrales => &mut stats.centrales,
            };
            bucket.total += amount;
            bucket.cantidad += 1;
            stats.total += amount;
            stats.cantidad += 1;
        }
        stats.rounded()
    }

    fn add(&mut self, other: &Stats) {
        self.total += other.total;
        self.cantidad += other.cantidad;
        self.centrales.total += other.centrales.total;
        self.centrales.cantidad += other.centrales.cantidad;
        self.campo.total += other.campo.total;
        self.campo.cantidad += other.campo.cantidad;
    }

    fn rounded(mut self) -> Self {
        self.total = round_cents(self.total);
        self.centrales.total = round_cents(self.centrales.total);
        self.campo.total = round_cents(self.campo.total);
        self
    }
}

/// Walks the tree, appending one entry per node in pre-order, and returns the node's stats.
/// Groups are the sum of their children; records under a group's own key are ignored.
fn summarize_node(
    node: &CategoryNode,
    records: &HashMap<String, Vec<InvoiceRecord>>,
    out: &mut Vec<CategorySummary>,
) -> Stats {
    let slot = out.len();
    out.push(CategorySummary {
        categoria: node.key.clone(),
        nombre: node.name.clone(),
        is_group: node.is_aggregate(),
        total: 0.0,
        cantidad_facturas: 0,
        centrales: OriginTotals::default(),
        campo: OriginTotals::default(),
    });

    let stats = if node.is_aggregate() {
        let mut sum = Stats::default();
        for child in &node.sub_items {
            sum.add(&summarize_node(child, records, out));
        }
        sum.rounded()
    } else {
        records
            .get(&node.key)
            .map(|list| Stats::from_records(list))
            .unwrap_or_default()
    };

    let entry = &mut out[slot];
    entry.total = stats.total;
    entry.cantidad_facturas = stats.cantidad;
    entry.centrales = stats.centrales;
    entry.campo = stats.campo;
    stats
}

/// Rolls every record up into its leaf, every leaf into its groups, and the
/// top level into `gran_total`. Records under keys absent from the tree are not counted.
pub fn summarize(tree: &[CategoryNode], records: &HashMap<String, Vec<InvoiceRecord>>) -> FinancialSummary {
    let mut detalles = Vec::new();
    let mut gran_total = 0.0;
    for node in tree {
        gran_total += summarize_node(node, records, &mut detalles).total;
    }
    FinancialSummary {
        detalles,
        gran_total: round_cents(gran_total),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{InvoiceFields, RecordSource, RecordStatus};

    fn record(categoria: &str, origen: Origen, total_neto: Option<&str>, subtotal: Option<&str>) -> InvoiceRecord {
        InvoiceRecord {
            archivo: format!("{}-{:?}-{:?}.pdf", categoria, total_neto, subtotal),
            categoria: categoria.to_string(),
            origen,
            status: RecordStatus::Ok,
            fuente: RecordSource::Extracted,
            fields: InvoiceFields {
                total_neto: total_neto.map(str::to_string),
                subtotal: subtotal.map(str::to_string),
                ..Default::default()
            },
            error_msg: None,
            ruta: None,
            file_hash: None,
            created_at: String::new(),
            updated_at: String::new(),
        }
    }

    fn by_category(records: Vec<InvoiceRecord>) -> HashMap<String, Vec<InvoiceRecord>> {
        let mut map: HashMap<String, Vec<InvoiceRecord>> = HashMap::new();
        for r in records {
            map.entry(r.categoria.clone()).or_default().push(r);
        }
        map
    }

    fn tree() -> Vec<CategoryNode> {
        vec![
            CategoryNode::leaf("Honorarios", "I. Honorarios"),
            CategoryNode::group(
                "Oficina",
                "V. Gastos de Oficina",
                vec![
                    CategoryNode::leaf("Papeleria", "a. Papelería"),
                    CategoryNode::group(
                        "Equipo",
                        "b. Equipo",
                        vec![CategoryNode::leaf("Computo", "a. Cómputo")],
                    ),
                ],
            ),
            CategoryNode::leaf("Seguros", "VIII. Seguros"),
        ]
    }

    #[test]
    fn amount_prefers_total_neto_then_subtotal() {
        assert_eq!(record_amount(&record("x", Origen::Campo, Some("$1,000.00"), Some("9"))), 1000.0);
        assert_eq!(record_amount(&record("x", Origen::Campo, Some(" "), Some("9.50"))), 9.5);
        assert_eq!(record_amount(&record("x", Origen::Campo, None, None)), 0.0);
        assert_eq!(record_amount(&record("x", Origen::Campo, Some("n/a"), Some("9"))), 0.0);
    }

    #[test]
    fn leaf_totals_split_by_origin() {
        let records = by_category(vec![
            record("Honorarios", Origen::Centrales, Some("$1,000.00"), None),
            record("Honorarios", Origen::Campo, Some("$500.00"), None),
        ]);
        let summary = summarize(&tree(), &records);
        let entry = summary.category("Honorarios").unwrap();
        assert_eq!(entry.total, 1500.0);
        assert_eq!(entry.cantidad_facturas, 2);
        assert_eq!(entry.centrales, OriginTotals { total: 1000.0, cantidad: 1 });
        assert_eq!(entry.campo, OriginTotals { total: 500.0, cantidad: 1 });
    }

    #[test]
    fn error_records_count_with_zero_amount() {
        let mut failed = record("Seguros", Origen::Campo, None, None);
        failed.status = RecordStatus::Error;
        let records = by_category(vec![failed, record("Seguros", Origen::Campo, Some("10"), None)]);
        let entry = summarize(&tree(), &records).category("Seguros").cloned().unwrap();
        assert_eq!(entry.cantidad_facturas, 2);
        assert_eq!(entry.campo, OriginTotals { total: 10.0, cantidad: 2 });
    }

    #[test]
    fn groups_equal_sum_of_children() {
        let records = by_category(vec![
            record("Papeleria", Origen::Centrales, Some("100.10"), None),
            record("Papeleria", Origen::Campo, Some("0.20"), None),
            record("Computo", Origen::Campo, Some("50.05"), None),
            record("Computo", Origen::Centrales, None, Some("-5.00")),
            record("Oficina", Origen::Centrales, Some("999"), None),
        ]);
        let summary = summarize(&tree(), &records);

        for group_key in ["Oficina", "Equipo"] {
            let node = find(&tree(), group_key);
            let group = summary.category(group_key).unwrap();
            let children: Vec<&CategorySummary> = node
                .sub_items
                .iter()
                .map(|child| summary.category(&child.key).unwrap())
                .collect();
            let sum_total: f64 = children.iter().map(|c| c.total).sum();
            assert_eq!(group.total, round_cents(sum_total));
            assert_eq!(group.cantidad_facturas, children.iter().map(|c| c.cantidad_facturas).sum::<usize>());
            assert_eq!(group.campo.cantidad, children.iter().map(|c| c.campo.cantidad).sum::<usize>());
            assert_eq!(
                group.centrales.total,
                round_cents(children.iter().map(|c| c.centrales.total).sum())
            );
            assert!(group.is_group);
        }

        let oficina = summary.category("Oficina").unwrap();
        assert_eq!(oficina.total, 145.35);
        assert_eq!(oficina.cantidad_facturas, 4);
    }

    #[test]
    fn grand_total_counts_each_leaf_once() {
        let records = by_category(vec![
            record("Honorarios", Origen::Centrales, Some("10"), None),
            record("Papeleria", Origen::Campo, Some("20"), None),
            record("Computo", Origen::Campo, Some("30"), None),
            record("Huerfana", Origen::Campo, Some("1000"), None),
        ]);
        let summary = summarize(&tree(), &records);
        let top: f64 = tree()
            .iter()
            .map(|node| summary.category(&node.key).unwrap().total)
            .sum();
        assert_eq!(summary.gran_total, 60.0);
        assert_eq!(summary.gran_total, top);
        assert!(summary.category("Huerfana").is_none());
    }

    #[test]
    fn empty_categories_still_appear() {
        let summary = summarize(&tree(), &HashMap::new());
        let keys: Vec<&str> = summary.detalles.iter().map(|d| d.categoria.as_str()).collect();
        assert_eq!(keys, vec!["Honorarios", "Oficina", "Papeleria", "Equipo", "Computo", "Seguros"]);
        assert!(summary.detalles.iter().all(|d| d.total == 0.0 && d.cantidad_facturas == 0));
        assert_eq!(summary.gran_total, 0.0);
    }

    fn find(nodes: &[CategoryNode], key: &str) -> CategoryNode {
        fn walk(nodes: &[CategoryNode], key: &str) -> Option<CategoryNode> {
            for node in nodes {
                if node.key == key {
                    return Some(node.clone());
                }
                if let Some(found) = walk(&node.sub_items, key) {
                    return Some(found);
                }
            }
            None
        }
        walk(nodes, key).unwrap()
    }
}
