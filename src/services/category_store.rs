use tracing::{info, warn};

use crate::db::Database;
use crate::error::CoreResult;
use crate::models::CategoryNode;
use crate::services::category_tree::CategoryTree;

/// The whole tree lives in one settings row.
pub const TREE_SETTING_KEY: &str = "category_tree";

pub fn load_tree(db: &Database) -> CoreResult<CategoryTree> {
    let raw = match db.get_setting(TREE_SETTING_KEY)? {
        Some(raw) => raw,
        None => {
            let tree = CategoryTree::default_structure();
            save_tree(db, &tree)?;
            info!("Seeded default category structure");
            return Ok(tree);
        }
    };

    match serde_json::from_str::<Vec<CategoryNode>>(&raw) {
        Ok(nodes) => Ok(CategoryTree::new(nodes)),
        Err(err) => {
            warn!("Stored category tree is unreadable, serving default: {}", err);
            Ok(CategoryTree::default_structure())
        }
    }
}

pub fn save_tree(db: &Database, tree: &CategoryTree) -> CoreResult<()> {
    let raw = serde_json::to_string(tree.nodes())?;
    db.set_setting(TREE_SETTING_KEY, &raw)?;
    Ok(())
}

pub fn list(db: &Database) -> CoreResult<Vec<CategoryNode>> {
    Ok(load_tree(db)?.into_nodes())
}

// Each mutation is a load-modify-save; callers hold the database lock for the
// whole sequence, which serializes adds under the same parent.

pub fn add(db: &Database, parent_key: Option<&str>, name: &str, key: &str) -> CoreResult<CategoryNode> {
    let mut tree = load_tree(db)?;
    let node = tree.add(parent_key, name, key)?;
    save_tree(db, &tree)?;
    info!(parent = ?parent_key, key = %node.key, name = %node.name, "Category added");
    Ok(node)
}

pub fn rename(
    db: &Database,
    parent_key: Option<&str>,
    key: &str,
    new_name: &str,
    new_key: Option<&str>,
) -> CoreResult<CategoryNode> {
    let mut tree = load_tree(db)?;
    let node = tree.rename(parent_key, key, new_name, new_key)?;
    save_tree(db, &tree)?;
    if node.key != key {
        warn!(
            old_key = %key,
            new_key = %node.key,
            "Category key changed; invoices filed under the old key stay there"
        );
    }
    info!(key = %node.key, name = %node.name, "Category renamed");
    Ok(node)
}

pub fn delete(db: &Database, parent_key: Option<&str>, key: &str) -> CoreResult<CategoryNode> {
    let mut tree = load_tree(db)?;
    let removed = tree.delete(parent_key, key)?;
    save_tree(db, &tree)?;
    info!(parent = ?parent_key, key = %removed.key, "Category removed from tree");
    Ok(removed)
}
