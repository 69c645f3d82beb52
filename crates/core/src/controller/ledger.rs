//! Handled-file ledger.

use std::collections::HashSet;

/// Append-only set of filenames already forwarded or compressed in a session.
///
/// Matching is by exact filename; content is not hashed.
#[derive(Debug, Default, Clone)]
pub struct HandledFileLedger {
    names: HashSet<String>,
}

impl HandledFileLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.names.contains(name)
    }

    /// Records a filename. Returns false if it was already present.
    pub fn record(&mut self, name: &str) -> bool {
        self.names.insert(name.to_string())
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Recorded names, sorted.
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.names.iter().cloned().collect();
        names.sort();
        names
    }
}
