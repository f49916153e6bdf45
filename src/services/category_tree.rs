use regex::Regex;
use std::sync::OnceLock;

use crate::error::{CoreError, CoreResult};
use crate::models::CategoryNode;

/// Keys carrying these markers are UI entries ("Agregar…", "Otros") and never get a letter.
const SENTINEL_MARKERS: [&str; 2] = ["Otros", "Agregar"];

/// Letter prefix for the sibling at `index`: a, b, … z, aa, ab, …
pub fn prefix_for(index: usize) -> String {
    let mut letters = Vec::new();
    let mut n = index + 1;
    while n > 0 {
        n -= 1;
        letters.push(char::from(b'a' + (n % 26) as u8));
        n /= 26;
    }
    letters.iter().rev().collect()
}

fn prefix_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"^([a-z]{1,2})\.\s*").expect("valid prefix pattern"))
}

/// Splits "c. Limpieza" into (Some("c"), "Limpieza").
pub fn split_prefix(name: &str) -> (Option<&str>, &str) {
    let name = name.trim();
    match prefix_pattern().captures(name) {
        Some(caps) => {
            let whole = caps.get(0).map(|m| m.end()).unwrap_or(0);
            (caps.get(1).map(|m| m.as_str()), name[whole..].trim())
        }
        None => (None, name),
    }
}

fn format_name(prefix: &str, bare: &str) -> String {
    format!("{}. {}", prefix, bare)
}

fn is_sentinel(node: &CategoryNode) -> bool {
    SENTINEL_MARKERS
        .iter()
        .any(|marker| node.key.contains(marker))
}

fn lettered_count(siblings: &[CategoryNode]) -> usize {
    siblings.iter().filter(|node| !is_sentinel(node)).count()
}

/// Rewrites existing letter prefixes so they follow sibling position.
/// Names without a prefix keep their text but still occupy a position.
fn renumber(siblings: &mut [CategoryNode]) {
    let mut position = 0;
    for node in siblings.iter_mut() {
        if is_sentinel(node) {
            continue;
        }
        let renamed = match split_prefix(&node.name) {
            (Some(_), bare) => Some(format_name(&prefix_for(position), bare)),
            (None, _) => None,
        };
        if let Some(name) = renamed {
            node.name = name;
        }
        position += 1;
    }
}

fn find<'a>(nodes: &'a [CategoryNode], key: &str) -> Option<&'a CategoryNode> {
    for node in nodes {
        if node.key == key {
            return Some(node);
        }
        if let Some(found) = find(&node.sub_items, key) {
            return Some(found);
        }
    }
    None
}

fn find_mut<'a>(nodes: &'a mut [CategoryNode], key: &str) -> Option<&'a mut CategoryNode> {
    for node in nodes.iter_mut() {
        if node.key == key {
            return Some(node);
        }
        if let Some(found) = find_mut(&mut node.sub_items, key) {
            return Some(found);
        }
    }
    None
}

fn collect_leaves(nodes: &[CategoryNode], out: &mut Vec<String>) {
    for node in nodes {
        if node.is_aggregate() {
            collect_leaves(&node.sub_items, out);
        } else {
            out.push(node.key.clone());
        }
    }
}

fn required(value: &str, field: &str) -> CoreResult<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CoreError::ValidationFailed(format!("{} is required", field)));
    }
    Ok(trimmed.to_string())
}

#[derive(Debug, Clone, PartialEq)]
pub struct CategoryTree {
    nodes: Vec<CategoryNode>,
}

impl CategoryTree {
    pub fn new(nodes: Vec<CategoryNode>) -> Self {
        CategoryTree { nodes }
    }

    pub fn default_structure() -> Self {
        CategoryTree::new(vec![
            CategoryNode::leaf("Honorarios", "I. Honorarios, Sueldos y Prestaciones"),
            CategoryNode::leaf("Depreciación", "II. Depreciación, Mantenimiento y Rentas"),
            CategoryNode::leaf("Servicios", "III. Servicios"),
            CategoryNode::leaf("Fletes", "IV. Fletes y Acarreos"),
            CategoryNode::group(
                "Oficina",
                "V. Gastos de Oficina",
                vec![
                    CategoryNode::leaf("Papelería y Útiles", "a. Papelería y Útiles"),
                    CategoryNode::leaf("Comunicaciones y Radios", "b. Comunicaciones, Fax..."),
                    CategoryNode::leaf("Equipo de Cómputo", "c. Equipo de Cómputo"),
                ],
            ),
            CategoryNode::leaf("Capacitación", "VI. Gastos de Capacitación y Adiestramiento"),
            CategoryNode::leaf("Seguridad", "VII. Seguridad e Higiene"),
            CategoryNode::leaf("Seguros", "VIII. Seguros y Fianzas"),
            CategoryNode::leaf("Trabajos Previos", "IX. Trabajos Previos y Auxiliares"),
        ])
    }

    pub fn nodes(&self) -> &[CategoryNode] {
        &self.nodes
    }

    pub fn into_nodes(self) -> Vec<CategoryNode> {
        self.nodes
    }

    pub fn find(&self, key: &str) -> Option<&CategoryNode> {
        find(&self.nodes, key)
    }

    /// Invoice-bearing keys in tree order.
    pub fn leaf_keys(&self) -> Vec<String> {
        let mut keys = Vec::new();
        collect_leaves(&self.nodes, &mut keys);
        keys
    }

    /// Appends a leaf under `parent_key` (or at the root) named with the next letter.
    /// A leaf parent becomes a group.
    pub fn add(&mut self, parent_key: Option<&str>, name: &str, key: &str) -> CoreResult<CategoryNode> {
        let key = required(key, "key")?;
        let name = required(name, "name")?;
        let (_, bare) = split_prefix(&name);
        let bare = required(bare, "name")?;

        if self.find(&key).is_some() {
            return Err(CoreError::DuplicateKey(key));
        }

        let siblings = match parent_key {
            Some(parent_key) => {
                let parent = find_mut(&mut self.nodes, parent_key)
                    .ok_or_else(|| CoreError::ParentNotFound(parent_key.to_string()))?;
                parent.is_group = true;
                &mut parent.sub_items
            }
            None => &mut self.nodes,
        };

        let mut node = CategoryNode::leaf(&key, &bare);
        if !is_sentinel(&node) {
            node.name = format_name(&prefix_for(lettered_count(siblings)), &bare);
        }
        siblings.push(node.clone());
        renumber(siblings);
        Ok(node)
    }

    /// Renames a node, keeping its letter prefix. Changing the key does not
    /// move invoice records filed under the old key.
    pub fn rename(
        &mut self,
        parent_key: Option<&str>,
        key: &str,
        new_name: &str,
        new_key: Option<&str>,
    ) -> CoreResult<CategoryNode> {
        let new_name = required(new_name, "name")?;
        let (_, bare) = split_prefix(&new_name);
        let bare = required(bare, "name")?;
        let new_key = match new_key {
            Some(candidate) => required(candidate, "key")?,
            None => key.to_string(),
        };

        let index = self
            .siblings_mut(parent_key)?
            .iter()
            .position(|node| node.key == key)
            .ok_or_else(|| CoreError::NotFound(key.to_string()))?;

        if new_key != key && self.find(&new_key).is_some() {
            return Err(CoreError::DuplicateKey(new_key));
        }

        let node = &mut self.siblings_mut(parent_key)?[index];

        node.name = match split_prefix(&node.name) {
            (Some(prefix), _) => format_name(prefix, &bare),
            (None, _) => bare,
        };
        node.key = new_key;
        Ok(node.clone())
    }

    /// Detaches a node from the tree. Records filed under it are left alone.
    pub fn delete(&mut self, parent_key: Option<&str>, key: &str) -> CoreResult<CategoryNode> {
        let siblings = self.siblings_mut(parent_key)?;
        let index = siblings
            .iter()
            .position(|node| node.key == key)
            .ok_or_else(|| CoreError::NotFound(key.to_string()))?;
        let removed = siblings.remove(index);
        renumber(siblings);
        Ok(removed)
    }

    fn siblings_mut(&mut self, parent_key: Option<&str>) -> CoreResult<&mut Vec<CategoryNode>> {
        match parent_key {
            Some(parent_key) => find_mut(&mut self.nodes, parent_key)
                .map(|parent| &mut parent.sub_items)
                .ok_or_else(|| CoreError::NotFound(parent_key.to_string())),
            None => Ok(&mut self.nodes),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn oficina_tree() -> CategoryTree {
        CategoryTree::new(vec![
            CategoryNode::leaf("Honorarios", "I. Honorarios"),
            CategoryNode::group(
                "Oficina",
                "V. Gastos de Oficina",
                vec![
                    CategoryNode::leaf("Papeleria", "a. Papelería"),
                    CategoryNode::leaf("Radios", "b. Radios"),
                ],
            ),
        ])
    }

    fn names(tree: &CategoryTree, parent: &str) -> Vec<String> {
        tree.find(parent)
            .unwrap()
            .sub_items
            .iter()
            .map(|node| node.name.clone())
            .collect()
    }

    #[test]
    fn prefix_sequence_continues_past_z() {
        assert_eq!(prefix_for(0), "a");
        assert_eq!(prefix_for(2), "c");
        assert_eq!(prefix_for(25), "z");
        assert_eq!(prefix_for(26), "aa");
        assert_eq!(prefix_for(27), "ab");
    }

    #[test]
    fn split_prefix_only_matches_lowercase_letters() {
        assert_eq!(split_prefix("c. Limpieza"), (Some("c"), "Limpieza"));
        assert_eq!(split_prefix("V. Gastos de Oficina"), (None, "V. Gastos de Oficina"));
        assert_eq!(split_prefix("Limpieza"), (None, "Limpieza"));
    }

    #[test]
    fn add_appends_next_letter() {
        let mut tree = oficina_tree();
        let node = tree.add(Some("Oficina"), "Limpieza", "Limpieza").unwrap();
        assert_eq!(node.name, "c. Limpieza");
        assert_eq!(names(&tree, "Oficina"), vec!["a. Papelería", "b. Radios", "c. Limpieza"]);
    }

    #[test]
    fn add_replaces_caller_supplied_prefix() {
        let mut tree = oficina_tree();
        let node = tree.add(Some("Oficina"), "z. Limpieza", "Limpieza").unwrap();
        assert_eq!(node.name, "c. Limpieza");
    }

    #[test]
    fn add_skips_sentinel_entries_when_counting() {
        let mut tree = oficina_tree();
        tree.add(Some("Oficina"), "Agregar", "Agregar Nuevo").unwrap();
        let node = tree.add(Some("Oficina"), "Limpieza", "Limpieza").unwrap();
        assert_eq!(node.name, "c. Limpieza");
    }

    #[test]
    fn add_under_leaf_turns_it_into_group() {
        let mut tree = oficina_tree();
        tree.add(Some("Honorarios"), "Nomina", "Nomina").unwrap();
        let parent = tree.find("Honorarios").unwrap();
        assert!(parent.is_group);
        assert_eq!(parent.sub_items[0].name, "a. Nomina");
        assert_eq!(tree.leaf_keys(), vec!["Nomina", "Papeleria", "Radios"]);
    }

    #[test]
    fn add_rejects_duplicate_and_missing_parent() {
        let mut tree = oficina_tree();
        assert!(matches!(
            tree.add(Some("Oficina"), "Otra", "Radios"),
            Err(CoreError::DuplicateKey(_))
        ));
        assert!(matches!(
            tree.add(Some("Nope"), "Otra", "Otra"),
            Err(CoreError::ParentNotFound(_))
        ));
        assert!(matches!(
            tree.add(None, "  ", "Vacia"),
            Err(CoreError::ValidationFailed(_))
        ));
        assert_eq!(tree, oficina_tree());
    }

    #[test]
    fn rename_keeps_prefix_and_changes_key() {
        let mut tree = oficina_tree();
        let node = tree
            .rename(Some("Oficina"), "Radios", "Telefonía", Some("Telefonia"))
            .unwrap();
        assert_eq!(node.name, "b. Telefonía");
        assert!(tree.find("Radios").is_none());
        assert_eq!(tree.find("Telefonia").unwrap().name, "b. Telefonía");
    }

    #[test]
    fn rename_of_unprefixed_root_uses_new_name_verbatim() {
        let mut tree = oficina_tree();
        let node = tree
            .rename(None, "Honorarios", "I. Honorarios y Sueldos", None)
            .unwrap();
        assert_eq!(node.name, "I. Honorarios y Sueldos");
        assert_eq!(node.key, "Honorarios");
    }

    #[test]
    fn rename_failures_leave_tree_untouched() {
        let mut tree = oficina_tree();
        assert!(matches!(
            tree.rename(Some("Oficina"), "Nope", "x", None),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            tree.rename(Some("Nope"), "Radios", "x", None),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(
            tree.rename(Some("Oficina"), "Radios", "x", Some("Papeleria")),
            Err(CoreError::DuplicateKey(_))
        ));
        assert_eq!(tree, oficina_tree());
    }

    #[test]
    fn rename_of_missing_node_is_not_found_even_with_taken_key() {
        let mut tree = oficina_tree();
        assert!(matches!(
            tree.rename(Some("Nope"), "Radios", "x", Some("Papeleria")),
            Err(CoreError::NotFound(key)) if key == "Nope"
        ));
        assert!(matches!(
            tree.rename(Some("Oficina"), "Nope", "x", Some("Papeleria")),
            Err(CoreError::NotFound(key)) if key == "Nope"
        ));
        assert!(matches!(
            tree.rename(None, "Radios", "x", Some("Honorarios")),
            Err(CoreError::NotFound(key)) if key == "Radios"
        ));
        assert_eq!(tree, oficina_tree());
    }

    #[test]
    fn delete_renumbers_remaining_siblings() {
        let mut tree = oficina_tree();
        tree.add(Some("Oficina"), "Limpieza", "Limpieza").unwrap();
        let removed = tree.delete(Some("Oficina"), "Papeleria").unwrap();
        assert_eq!(removed.key, "Papeleria");
        assert_eq!(names(&tree, "Oficina"), vec!["a. Radios", "b. Limpieza"]);

        let next = tree.add(Some("Oficina"), "Aseo", "Aseo").unwrap();
        assert_eq!(next.name, "c. Aseo");
    }

    #[test]
    fn renumber_is_idempotent() {
        let mut siblings = vec![
            CategoryNode::leaf("x", "c. X"),
            CategoryNode::leaf("y", "a. Y"),
            CategoryNode::leaf("Otros", "Otros"),
            CategoryNode::leaf("z", "Z"),
            CategoryNode::leaf("w", "q. W"),
        ];
        renumber(&mut siblings);
        let once = siblings.clone();
        renumber(&mut siblings);
        assert_eq!(siblings, once);
        let names: Vec<&str> = siblings.iter().map(|n| n.name.as_str()).collect();
        assert_eq!(names, vec!["a. X", "b. Y", "Otros", "Z", "d. W"]);
    }

    #[test]
    fn delete_missing_node_is_not_found() {
        let mut tree = oficina_tree();
        assert!(matches!(
            tree.delete(Some("Oficina"), "Nope"),
            Err(CoreError::NotFound(_))
        ));
        assert!(matches!(tree.delete(None, "Radios"), Err(CoreError::NotFound(_))));
    }

    #[test]
    fn default_structure_lists_leaves_in_order() {
        let keys = CategoryTree::default_structure().leaf_keys();
        assert_eq!(keys.len(), 11);
        assert_eq!(keys[0], "Honorarios");
        assert_eq!(keys[4], "Papelería y Útiles");
        assert_eq!(keys[10], "Trabajos Previos");
    }
}
