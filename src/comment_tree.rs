//! Rebuilds reply threads from comments that only know their parent id.
//!
//! The shape is deliberately two-tier: replies to a top-level comment are
//! nested under it, and every deeper reply is flattened into the list of
//! the depth-1 reply it descends from. Comment templates render against
//! this shape, so it stays as-is until product decides otherwise.

use std::collections::{HashMap, HashSet};

use tracing::warn;

use crate::models::{Comment, Id};
use crate::repo::RepoResult;

pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// Single-level lookup: the approved comments whose parent is `parent_id`.
pub trait ChildSource {
    fn children_of(&self, parent_id: &str) -> RepoResult<Vec<Comment>>;
}

impl<F> ChildSource for F
where
    F: Fn(&str) -> RepoResult<Vec<Comment>>,
{
    fn children_of(&self, parent_id: &str) -> RepoResult<Vec<Comment>> {
        self(parent_id)
    }
}

/// Parent id to children, built once from a flat comment set so a whole
/// thread is assembled without further store round-trips.
#[derive(Debug, Default)]
pub struct ParentIndex {
    roots: Vec<Comment>,
    by_parent: HashMap<Id, Vec<Comment>>,
}

impl ParentIndex {
    /// Input order is kept within every sibling list.
    pub fn from_flat<I>(comments: I) -> Self
    where
        I: IntoIterator<Item = Comment>,
    {
        let mut index = ParentIndex::default();
        for c in comments {
            if c.is_top_level() {
                index.roots.push(c);
            } else {
                index.by_parent.entry(c.parent.clone()).or_default().push(c);
            }
        }
        index
    }

    pub fn roots(&self) -> &[Comment] {
        &self.roots
    }

    pub fn len(&self) -> usize {
        self.roots.len() + self.by_parent.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ChildSource for ParentIndex {
    fn children_of(&self, parent_id: &str) -> RepoResult<Vec<Comment>> {
        Ok(self.by_parent.get(parent_id).cloned().unwrap_or_default())
    }
}

#[derive(Debug, Clone, Copy)]
pub struct TreeBuilder {
    max_depth: usize,
}

impl Default for TreeBuilder {
    fn default() -> Self {
        Self { max_depth: DEFAULT_MAX_DEPTH }
    }
}

impl TreeBuilder {
    pub fn new(max_depth: usize) -> Self {
        Self { max_depth: max_depth.max(1) }
    }

    /// Builds every thread of a flat, already-filtered comment set.
    pub fn build_forest<I>(&self, comments: I) -> Vec<Comment>
    where
        I: IntoIterator<Item = Comment>,
    {
        let index = ParentIndex::from_flat(comments);
        self.attach_replies(index.roots().to_vec(), &index)
    }

    /// Fills `children` of each root. A branch whose lookup fails is left
    /// empty; the rest of the thread is still returned.
    pub fn attach_replies<S>(&self, roots: Vec<Comment>, source: &S) -> Vec<Comment>
    where
        S: ChildSource + ?Sized,
    {
        roots
            .into_iter()
            .map(|mut root| {
                let mut placed = HashSet::from([root.id.clone()]);
                root.children = self.nested_replies(&root.id, source, &mut placed);
                root
            })
            .collect()
    }

    // depth 1: each reply keeps its own list of everything beneath it
    fn nested_replies<S>(&self, root_id: &str, source: &S, placed: &mut HashSet<Id>) -> Vec<Comment>
    where
        S: ChildSource + ?Sized,
    {
        let mut replies = self.fetch_unplaced(root_id, source, placed);
        for reply in replies.iter_mut() {
            let mut flat = Vec::new();
            self.collect_flattened(&reply.id, 2, source, placed, &mut flat);
            reply.children = flat;
        }
        replies
    }

    // depth >= 2: whole batch first, then each member's descendants
    fn collect_flattened<S>(
        &self,
        parent_id: &str,
        depth: usize,
        source: &S,
        placed: &mut HashSet<Id>,
        out: &mut Vec<Comment>,
    ) where
        S: ChildSource + ?Sized,
    {
        if depth > self.max_depth {
            warn!(parent = %parent_id, limit = self.max_depth, "comment thread exceeds depth limit, truncating");
            return;
        }
        let batch = self.fetch_unplaced(parent_id, source, placed);
        let ids: Vec<Id> = batch.iter().map(|c| c.id.clone()).collect();
        out.extend(batch);
        for id in ids {
            self.collect_flattened(&id, depth + 1, source, placed, out);
        }
    }

    fn fetch_unplaced<S>(&self, parent_id: &str, source: &S, placed: &mut HashSet<Id>) -> Vec<Comment>
    where
        S: ChildSource + ?Sized,
    {
        let children = match source.children_of(parent_id) {
            Ok(children) => children,
            Err(e) => {
                warn!(parent = %parent_id, error = %e, "child comment lookup failed, leaving branch empty");
                return Vec::new();
            }
        };
        children
            .into_iter()
            .filter(|c| {
                let fresh = placed.insert(c.id.clone());
                if !fresh {
                    warn!(comment = %c.id, "comment reached twice while threading, skipping");
                }
                fresh
            })
            .map(|mut c| {
                c.children.clear();
                c
            })
            .collect()
    }
}
