//! Longest-matching-prefix routing structure keyed by `/`-delimited path
//! segments, as used by the proxy router to find the room backing a
//! given URL path.
//!
//! Ported from the reference `pkg/prefix` trie: a node is a leaf, an
//! interior branch, or both. `Insert` at a prefix discards whatever
//! subtree previously hung off that node — a later insert always wins
//! over an earlier descendant, which is why callers must never insert
//! two prefixes where one is an ancestor of the other (see `Remove`
//! compaction note below).

use std::collections::HashMap;

#[derive(Debug, Default)]
struct Node<T> {
    value: Option<T>,
    is_leaf: bool,
    children: HashMap<String, Node<T>>,
}

impl<T> Node<T> {
    fn new() -> Self {
        Self {
            value: None,
            is_leaf: false,
            children: HashMap::new(),
        }
    }
}

/// A trie of `/`-split path segments mapping a prefix to a value.
///
/// Not internally synchronized — concurrent access (readers racing a
/// writer) is the caller's responsibility, the same way the source
/// leaves locking to `proxy.ProxyManagerCtx`.
#[derive(Debug)]
pub struct PrefixTree<T> {
    root: Node<T>,
}

fn split(path: &str) -> Vec<&str> {
    path.split('/').filter(|s| !s.is_empty()).collect()
}

impl<T> Default for PrefixTree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PrefixTree<T> {
    pub fn new() -> Self {
        Self { root: Node::new() }
    }

    /// Inserts `value` at `prefix`. Any subtree that previously hung off
    /// the terminal node is discarded — a prefix shadows its descendants.
    pub fn insert(&mut self, prefix: &str, value: T) {
        let segments = split(prefix);
        let Some((last, rest)) = segments.split_last() else {
            self.root.value = Some(value);
            self.root.is_leaf = true;
            self.root.children.clear();
            return;
        };

        let mut node = &mut self.root;
        for segment in rest {
            node = node
                .children
                .entry((*segment).to_string())
                .or_insert_with(Node::new);
        }

        let leaf = node
            .children
            .entry((*last).to_string())
            .or_insert_with(Node::new);
        leaf.value = Some(value);
        leaf.is_leaf = true;
        leaf.children.clear();
    }

    /// Returns a value only for an exact leaf hit at `prefix`.
    pub fn find(&self, prefix: &str) -> Option<&T> {
        let segments = split(prefix);
        let mut node = &self.root;
        for segment in &segments {
            node = node.children.get(*segment)?;
        }
        node.is_leaf.then(|| node.value.as_ref()).flatten()
    }

    /// Walks `path` segment by segment, stopping at the first leaf
    /// encountered (or at a missing child). Returns the leaf's value and
    /// the `/`-joined prefix walked to reach it.
    pub fn matches(&self, path: &str) -> Option<(&T, String)> {
        let segments = split(path);
        let mut node = &self.root;
        let mut walked = Vec::new();

        for segment in segments {
            let next = node.children.get(segment)?;
            node = next;
            walked.push(segment);
            if node.is_leaf {
                break;
            }
        }

        if node.is_leaf {
            node.value
                .as_ref()
                .map(|v| (v, format!("/{}", walked.join("/"))))
        } else {
            None
        }
    }

    /// Removes the terminal leaf at `prefix` and, walking back toward
    /// the root, drops any node whose subtree is now empty and which is
    /// not itself a leaf — so no empty-subtree orphans remain.
    pub fn remove(&mut self, prefix: &str) {
        let segments = split(prefix);
        if segments.is_empty() {
            self.root.value = None;
            self.root.is_leaf = false;
            return;
        }

        Self::remove_at(&mut self.root, &segments);
    }

    fn remove_at(node: &mut Node<T>, segments: &[&str]) -> bool {
        let (head, rest) = match segments.split_first() {
            Some(v) => v,
            None => return false,
        };

        if rest.is_empty() {
            node.children.remove(*head);
            return node.children.is_empty() && !node.is_leaf;
        }

        let should_prune = match node.children.get_mut(*head) {
            Some(child) => Self::remove_at(child, rest),
            None => return false,
        };

        if should_prune {
            node.children.remove(*head);
        }

        node.children.is_empty() && !node.is_leaf
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn match_stops_at_first_leaf() {
        let mut tree = PrefixTree::new();
        tree.insert("/a/b", "X");
        tree.insert("/a/b/c", "Y");

        let (value, prefix) = tree.matches("/a/b/c/d").unwrap();
        assert_eq!(*value, "Y");
        assert_eq!(prefix, "/a/b/c");
    }

    #[test]
    fn later_insert_replaces_ancestor_leafness() {
        let mut tree = PrefixTree::new();
        tree.insert("/a", "X");
        tree.insert("/a/b", "Y");

        assert_eq!(tree.matches("/a"), None);
        let (value, prefix) = tree.matches("/a/b").unwrap();
        assert_eq!(*value, "Y");
        assert_eq!(prefix, "/a/b");
    }

    #[test]
    fn remove_compacts_empty_subtrees() {
        let mut tree = PrefixTree::new();
        tree.insert("/u/1", "a");
        tree.insert("/u/2", "b");

        tree.remove("/u/1");
        tree.remove("/u/2");

        assert!(tree.root.children.is_empty());
    }

    #[test]
    fn remove_compaction_preserves_siblings() {
        let mut tree = PrefixTree::new();
        tree.insert("/u/1", "a");
        tree.insert("/u/2", "b");

        tree.remove("/u/1");

        assert_eq!(tree.find("/u/2"), Some(&"b"));
        assert_eq!(tree.find("/u/1"), None);
    }

    #[test]
    fn find_requires_exact_leaf() {
        let mut tree = PrefixTree::new();
        tree.insert("/room-a", "room-a");

        assert_eq!(tree.find("/room-a"), Some(&"room-a"));
        assert_eq!(tree.find("/room-a/sub"), None);
    }
}
