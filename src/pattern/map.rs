//! Trie mapping [`Pattern`]s to values.
//!
//! Nodes live in an arena indexed by stable ids; parent back-edges make
//! deletion a simple upward prune with no shared ownership. Edges are keyed
//! by literal text or by one of two sentinels: a segment wildcard (pattern
//! parameter) or a terminal wildcard (trailing `*`).
//!
//! Registration enforces the uniqueness rules at setup time:
//! - a segment wildcard and a literal may not coexist as children of the
//!   same node,
//! - a terminal wildcard may not coexist with any sibling edge,
//! - a reachable node holds at most one value, and re-assignment is only
//!   legal for the same (token-equal) pattern.

use super::{Pattern, PatternToken};
use smallvec::SmallVec;
use std::fmt;
use thiserror::Error;
use tracing::debug;

#[derive(Debug, Error)]
pub enum PatternMapError {
    #[error("pattern {0:?} adds a segment wildcard beside existing literal routes")]
    WildcardConflict(String),
    #[error("pattern {0:?} adds a literal segment where a wildcard is already registered")]
    LiteralConflict(String),
    #[error("pattern {0:?} conflicts with a terminal wildcard at the same position")]
    TerminalConflict(String),
    #[error("pattern {new:?} maps to the node already occupied by {existing:?}")]
    ValueConflict { existing: String, new: String },
}

/// Edge label between trie nodes.
#[derive(Debug, Clone, PartialEq, Eq)]
enum EdgeKey {
    Literal { text: String, case_sensitive: bool },
    SegmentWildcard,
    TerminalWildcard,
}

impl EdgeKey {
    fn from_token(token: &PatternToken, case_sensitive: bool) -> Self {
        match token {
            PatternToken::Literal(text) => EdgeKey::Literal {
                text: text.clone(),
                case_sensitive,
            },
            PatternToken::Param(_) => EdgeKey::SegmentWildcard,
            PatternToken::Wildcard => EdgeKey::TerminalWildcard,
        }
    }

    /// Two literal edges address the same child when their texts agree,
    /// case-insensitively as soon as either side is insensitive.
    fn same_edge(&self, other: &EdgeKey) -> bool {
        match (self, other) {
            (
                EdgeKey::Literal {
                    text: a,
                    case_sensitive: ca,
                },
                EdgeKey::Literal {
                    text: b,
                    case_sensitive: cb,
                },
            ) => {
                if *ca && *cb {
                    a == b
                } else {
                    a.eq_ignore_ascii_case(b)
                }
            }
            (EdgeKey::SegmentWildcard, EdgeKey::SegmentWildcard) => true,
            (EdgeKey::TerminalWildcard, EdgeKey::TerminalWildcard) => true,
            _ => false,
        }
    }

    /// Match a concrete path segment against this edge.
    fn matches_segment(&self, segment: &str) -> bool {
        match self {
            EdgeKey::Literal {
                text,
                case_sensitive,
            } => {
                if *case_sensitive {
                    text == segment
                } else {
                    text.eq_ignore_ascii_case(segment)
                }
            }
            EdgeKey::SegmentWildcard => true,
            EdgeKey::TerminalWildcard => true,
        }
    }

    fn is_literal(&self) -> bool {
        matches!(self, EdgeKey::Literal { .. })
    }
}

type NodeId = usize;

struct Entry<T> {
    pattern: Pattern,
    value: T,
}

/// Most nodes have very few children; keep them inline.
type Edges = SmallVec<[(EdgeKey, NodeId); 4]>;

struct Node<T> {
    entry: Option<Entry<T>>,
    parent: Option<(NodeId, EdgeKey)>,
    edges: Edges,
}

impl<T> Node<T> {
    fn new(parent: Option<(NodeId, EdgeKey)>) -> Self {
        Self {
            entry: None,
            parent,
            edges: SmallVec::new(),
        }
    }

    fn child(&self, key: &EdgeKey) -> Option<NodeId> {
        self.edges
            .iter()
            .find(|(k, _)| k.same_edge(key))
            .map(|(_, id)| *id)
    }

    fn sentinel_child(&self, key: &EdgeKey) -> Option<NodeId> {
        self.edges.iter().find(|(k, _)| k == key).map(|(_, id)| *id)
    }

    fn literal_child(&self, segment: &str) -> Option<NodeId> {
        self.edges
            .iter()
            .find(|(k, _)| k.is_literal() && k.matches_segment(segment))
            .map(|(_, id)| *id)
    }
}

/// A trie from path patterns to values of type `T`.
pub struct PatternMap<T> {
    arena: Vec<Node<T>>,
    free: Vec<NodeId>,
    len: usize,
}

const ROOT: NodeId = 0;

impl<T> Default for PatternMap<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> PatternMap<T> {
    pub fn new() -> Self {
        Self {
            arena: vec![Node::new(None)],
            free: Vec::new(),
            len: 0,
        }
    }

    /// Number of registered patterns.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    fn alloc(&mut self, parent: NodeId, key: EdgeKey) -> NodeId {
        let node = Node::new(Some((parent, key.clone())));
        let id = match self.free.pop() {
            Some(id) => {
                self.arena[id] = node;
                id
            }
            None => {
                self.arena.push(node);
                self.arena.len() - 1
            }
        };
        self.arena[parent].edges.push((key, id));
        id
    }

    /// Check the uniqueness rules before adding `key` under `node`.
    fn check_insert(&self, node: NodeId, key: &EdgeKey, pattern: &Pattern) -> Result<(), PatternMapError> {
        let edges = &self.arena[node].edges;
        let has_terminal = edges.iter().any(|(k, _)| *k == EdgeKey::TerminalWildcard);
        if has_terminal && *key != EdgeKey::TerminalWildcard {
            return Err(PatternMapError::TerminalConflict(pattern.raw().to_string()));
        }
        match key {
            EdgeKey::TerminalWildcard => {
                if edges.iter().any(|(k, _)| *k != EdgeKey::TerminalWildcard) {
                    return Err(PatternMapError::TerminalConflict(pattern.raw().to_string()));
                }
            }
            EdgeKey::SegmentWildcard => {
                if edges.iter().any(|(k, _)| k.is_literal()) {
                    return Err(PatternMapError::WildcardConflict(pattern.raw().to_string()));
                }
            }
            EdgeKey::Literal { .. } => {
                if edges.iter().any(|(k, _)| *k == EdgeKey::SegmentWildcard) {
                    return Err(PatternMapError::LiteralConflict(pattern.raw().to_string()));
                }
            }
        }
        Ok(())
    }

    /// Register `pattern`, returning the previous value when re-assigning
    /// the same pattern.
    ///
    /// Fails on any uniqueness violation, including an occupied node whose
    /// registered pattern differs from `pattern` (two parameters with
    /// different names address the same node but are distinct patterns).
    pub fn set(&mut self, pattern: Pattern, value: T) -> Result<Option<T>, PatternMapError> {
        let mut node = ROOT;
        for token in pattern.tokens() {
            let key = EdgeKey::from_token(token, pattern.case_sensitive());
            match self.arena[node].child(&key) {
                Some(next) => node = next,
                None => {
                    self.check_insert(node, &key, &pattern)?;
                    node = self.alloc(node, key);
                }
            }
        }

        if let Some(existing) = &self.arena[node].entry {
            if existing.pattern != pattern {
                return Err(PatternMapError::ValueConflict {
                    existing: existing.pattern.raw().to_string(),
                    new: pattern.raw().to_string(),
                });
            }
        }

        debug!(pattern = %pattern, "pattern registered");
        let old = self.arena[node].entry.replace(Entry { pattern, value });
        if old.is_none() {
            self.len += 1;
        }
        Ok(old.map(|e| e.value))
    }

    fn node_for(&self, pattern: &Pattern) -> Option<NodeId> {
        let mut node = ROOT;
        for token in pattern.tokens() {
            let key = EdgeKey::from_token(token, pattern.case_sensitive());
            node = self.arena[node].child(&key)?;
        }
        Some(node)
    }

    /// Fetch the value registered under a token-equal pattern.
    pub fn get(&self, pattern: &Pattern) -> Option<&T> {
        let node = self.node_for(pattern)?;
        let entry = self.arena[node].entry.as_ref()?;
        if entry.pattern == *pattern {
            Some(&entry.value)
        } else {
            None
        }
    }

    pub fn has(&self, pattern: &Pattern) -> bool {
        self.get(pattern).is_some()
    }

    /// Remove the value registered under `pattern`, pruning nodes left
    /// empty via their back-edges.
    pub fn delete(&mut self, pattern: &Pattern) -> Option<T> {
        let node = self.node_for(pattern)?;
        match &self.arena[node].entry {
            Some(entry) if entry.pattern == *pattern => {}
            _ => return None,
        }
        let entry = self.arena[node].entry.take()?;
        self.len -= 1;

        let mut current = node;
        while current != ROOT
            && self.arena[current].entry.is_none()
            && self.arena[current].edges.is_empty()
        {
            let (parent, key) = match self.arena[current].parent.take() {
                Some(p) => p,
                None => break,
            };
            self.arena[parent].edges.retain(|(_, id)| *id != current);
            self.free.push(current);
            current = parent;
        }

        Some(entry.value)
    }

    /// Resolve a concrete request path.
    ///
    /// A terminal wildcard short-circuits as soon as it is reachable; a
    /// segment wildcard consumes the current segment (the insertion rules
    /// guarantee it has no literal siblings).
    pub fn lookup(&self, path: &str) -> Option<&T> {
        let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        let mut node = ROOT;

        for &segment in &segments {
            if let Some(terminal) = self.arena[node].sentinel_child(&EdgeKey::TerminalWildcard) {
                return self.arena[terminal].entry.as_ref().map(|e| &e.value);
            }
            if let Some(next) = self.arena[node].sentinel_child(&EdgeKey::SegmentWildcard) {
                node = next;
                continue;
            }
            match self.arena[node].literal_child(segment) {
                Some(next) => node = next,
                None => return None,
            }
        }

        if let Some(entry) = self.arena[node].entry.as_ref() {
            return Some(&entry.value);
        }
        // A forward pattern also matches the path that stops right where
        // its wildcard begins (empty tail).
        let terminal = self.arena[node].sentinel_child(&EdgeKey::TerminalWildcard)?;
        self.arena[terminal].entry.as_ref().map(|e| &e.value)
    }
}

impl<T> fmt::Debug for PatternMap<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PatternMap")
            .field("len", &self.len)
            .field("nodes", &(self.arena.len() - self.free.len()))
            .finish()
    }
}
