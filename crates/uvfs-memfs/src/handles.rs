//! Open-handle slot table issuing file contexts.

use std::collections::HashMap;
use uvfs::types::FileContext;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenEntry {
    pub context: FileContext,
    /// Normalized path of the node this handle refers to.
    pub path: String,
    pub granted_access: u32,
}

pub struct OpenFileTable {
    next: u64,
    entries: HashMap<FileContext, OpenEntry>,
}

impl OpenFileTable {
    pub fn new() -> Self {
        tracing::debug!("Creating new open file table");
        Self {
            next: 1,
            entries: HashMap::new(),
        }
    }

    pub fn open(&mut self, path: &str, granted_access: u32) -> FileContext {
        let context = FileContext(self.next);
        self.next += 1;
        self.entries.insert(
            context,
            OpenEntry {
                context,
                path: path.to_string(),
                granted_access,
            },
        );
        tracing::debug!(%context, path, "Opened handle");
        context
    }

    pub fn get(&self, context: FileContext) -> Option<&OpenEntry> {
        self.entries.get(&context)
    }

    pub fn close(&mut self, context: FileContext) -> Option<OpenEntry> {
        let entry = self.entries.remove(&context);
        if entry.is_some() {
            tracing::debug!(%context, "Closed handle");
        }
        entry
    }

    /// Re-point handles at `from` or below it to the same place under `to`.
    pub fn rename_subtree(&mut self, from: &str, to: &str) {
        for entry in self.entries.values_mut() {
            if let Some(rest) = subtree_suffix(&entry.path, from) {
                entry.path = format!("{}{}", to, rest);
            }
        }
    }

    pub fn handles_for_path(&self, path: &str) -> Vec<FileContext> {
        self.entries
            .values()
            .filter(|e| e.path == path)
            .map(|e| e.context)
            .collect()
    }

    pub fn count(&self) -> usize {
        self.entries.len()
    }
}

impl Default for OpenFileTable {
    fn default() -> Self {
        Self::new()
    }
}

/// The part of `path` after `root` if `path` is `root` or lies below it.
/// `root` must not be the volume root.
pub(crate) fn subtree_suffix<'a>(path: &'a str, root: &str) -> Option<&'a str> {
    let rest = path.strip_prefix(root)?;
    if rest.is_empty() || rest.starts_with('\\') {
        Some(rest)
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_open_returns_distinct_contexts() {
        let mut table = OpenFileTable::new();
        let a = table.open("\\a", 0);
        let b = table.open("\\a", 0);
        assert_ne!(a, b);
        assert_eq!(table.count(), 2);
        assert_eq!(table.handles_for_path("\\a").len(), 2);
    }

    #[test]
    fn test_close_removes_entry() {
        let mut table = OpenFileTable::new();
        let a = table.open("\\a", 0);
        assert!(table.close(a).is_some());
        assert!(table.close(a).is_none());
        assert!(table.get(a).is_none());
    }

    #[test]
    fn test_rename_subtree_moves_children_only() {
        let mut table = OpenFileTable::new();
        let dir = table.open("\\dir", 0);
        let child = table.open("\\dir\\f", 0);
        let sibling = table.open("\\dirx", 0);
        table.rename_subtree("\\dir", "\\new");
        assert_eq!(table.get(dir).unwrap().path, "\\new");
        assert_eq!(table.get(child).unwrap().path, "\\new\\f");
        assert_eq!(table.get(sibling).unwrap().path, "\\dirx");
    }

    #[test]
    fn test_subtree_suffix() {
        assert_eq!(subtree_suffix("\\a\\b", "\\a"), Some("\\b"));
        assert_eq!(subtree_suffix("\\a", "\\a"), Some(""));
        assert_eq!(subtree_suffix("\\ab", "\\a"), None);
    }
}
