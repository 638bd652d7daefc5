//! Quick-open search over the workspace tree and open buffers.

use serde::Serialize;

use crate::bridge::{NodeKind, TreeNode};
use crate::registry::Document;

/// Queries shorter than this clear the result list instead of searching.
pub const MIN_QUERY_LEN: usize = 2;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum MatchType {
    File,
    Folder,
    Content,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SearchHit {
    pub match_type: MatchType,
    pub name: String,
    pub path: String,
    /// Lines containing the query, for content hits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub matches: Option<usize>,
}

/// Case-insensitive search: tree entries whose name contains `query`, then
/// one hit per open buffer whose text contains it.
pub fn search<'a>(
    query: &str,
    tree: &[TreeNode],
    documents: impl IntoIterator<Item = &'a Document>,
) -> Vec<SearchHit> {
    let query = query.trim();
    if query.chars().count() < MIN_QUERY_LEN {
        return Vec::new();
    }
    let needle = query.to_lowercase();
    let mut hits = Vec::new();

    TreeNode::walk(tree, &mut |node| {
        if node.name.to_lowercase().contains(&needle) {
            hits.push(SearchHit {
                match_type: match node.kind {
                    NodeKind::File => MatchType::File,
                    NodeKind::Folder => MatchType::Folder,
                },
                name: node.name.clone(),
                path: node.path.clone(),
                matches: None,
            });
        }
    });

    for doc in documents {
        let lines = doc
            .buffer_content()
            .lines()
            .filter(|line| line.to_lowercase().contains(&needle))
            .count();
        if lines > 0 {
            hits.push(SearchHit {
                match_type: MatchType::Content,
                name: doc.display_name.clone(),
                path: doc.path.clone(),
                matches: Some(lines),
            });
        }
    }

    hits
}

/// Result list with a highlighted row, driven by arrow keys.
#[derive(Debug, Default, Serialize)]
pub struct SearchState {
    pub query: String,
    pub results: Vec<SearchHit>,
    pub current: Option<usize>,
}

impl SearchState {
    pub fn set_results(&mut self, query: &str, results: Vec<SearchHit>) {
        self.query = query.to_string();
        self.current = if results.is_empty() { None } else { Some(0) };
        self.results = results;
    }

    /// Move the highlight by `delta`, stopping at either end.
    pub fn navigate(&mut self, delta: isize) {
        let Some(cur) = self.current else { return };
        let next = cur as isize + delta;
        if next >= 0 && (next as usize) < self.results.len() {
            self.current = Some(next as usize);
        }
    }

    pub fn selected(&self) -> Option<&SearchHit> {
        self.current.and_then(|i| self.results.get(i))
    }

    pub fn clear(&mut self) {
        self.query.clear();
        self.results.clear();
        self.current = None;
    }
}
