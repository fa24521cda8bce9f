use std::collections::HashSet;

use async_trait::async_trait;
use futures_util::future::BoxFuture;
use tracing::debug;

use crate::error::{ContentError, ContentResult};
use crate::models::Id;
use crate::repo::{CommentRepo, RepoError, RepoResult};

pub const DEFAULT_MAX_DEPTH: usize = 1000;

/// What a cascading delete needs from a parent-linked collection.
#[async_trait]
pub trait ParentLinkedStore: Send + Sync {
    async fn child_ids(&self, parent_id: &str) -> RepoResult<Vec<Id>>;
    async fn remove(&self, id: &str) -> RepoResult<()>;
}

#[async_trait]
impl<T> ParentLinkedStore for T
where
    T: CommentRepo + ?Sized,
{
    async fn child_ids(&self, parent_id: &str) -> RepoResult<Vec<Id>> {
        self.child_comment_ids(parent_id).await
    }

    async fn remove(&self, id: &str) -> RepoResult<()> {
        self.delete_comment(id).await
    }
}

/// Removes `id` and everything beneath it, children before parents.
///
/// Not transactional: an error leaves already-removed descendants removed.
/// Records that are already gone count as removed, so calling again after
/// a partial failure finishes the job. Returns how many records this call
/// actually deleted.
pub async fn delete_with_descendants<S>(store: &S, id: &str, max_depth: usize) -> ContentResult<usize>
where
    S: ParentLinkedStore + ?Sized,
{
    let mut visited = HashSet::new();
    let removed = delete_subtree(store, id.to_string(), 0, max_depth, &mut visited).await?;
    debug!(root = %id, removed, "cascading delete finished");
    Ok(removed)
}

fn delete_subtree<'a, S>(
    store: &'a S,
    id: Id,
    depth: usize,
    max_depth: usize,
    visited: &'a mut HashSet<Id>,
) -> BoxFuture<'a, ContentResult<usize>>
where
    S: ParentLinkedStore + ?Sized,
{
    Box::pin(async move {
        if depth > max_depth {
            return Err(ContentError::DepthLimitExceeded { limit: max_depth });
        }
        // a parent chain that loops back is cut here
        if !visited.insert(id.clone()) {
            return Ok(0);
        }
        let mut removed = 0;
        for child in store.child_ids(&id).await? {
            removed += delete_subtree(store, child, depth + 1, max_depth, &mut *visited).await?;
        }
        match store.remove(&id).await {
            Ok(()) => Ok(removed + 1),
            Err(RepoError::NotFound) => Ok(removed),
            Err(e) => Err(e.into()),
        }
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// id -> parent, with optional failure injection on remove.
    #[derive(Default)]
    struct FlatStore {
        nodes: Mutex<Vec<(String, String)>>,
        fail_remove: Option<String>,
        removed_order: Mutex<Vec<String>>,
    }

    impl FlatStore {
        fn with(nodes: &[(&str, &str)]) -> Self {
            Self {
                nodes: Mutex::new(nodes.iter().map(|(a, b)| (a.to_string(), b.to_string())).collect()),
                ..Default::default()
            }
        }

        fn remaining(&self) -> Vec<String> {
            self.nodes.lock().unwrap().iter().map(|(id, _)| id.clone()).collect()
        }
    }

    #[async_trait]
    impl ParentLinkedStore for FlatStore {
        async fn child_ids(&self, parent_id: &str) -> RepoResult<Vec<Id>> {
            let nodes = self.nodes.lock().unwrap();
            Ok(nodes.iter().filter(|(_, p)| p == parent_id).map(|(id, _)| id.clone()).collect())
        }

        async fn remove(&self, id: &str) -> RepoResult<()> {
            if self.fail_remove.as_deref() == Some(id) {
                return Err(RepoError::Unavailable("connection reset".into()));
            }
            let mut nodes = self.nodes.lock().unwrap();
            let before = nodes.len();
            nodes.retain(|(n, _)| n != id);
            if nodes.len() == before {
                return Err(RepoError::NotFound);
            }
            self.removed_order.lock().unwrap().push(id.to_string());
            Ok(())
        }
    }

    #[tokio::test]
    async fn removes_chain_children_first() {
        let store = FlatStore::with(&[
            ("root", ""),
            ("child1", "root"),
            ("child2", "child1"),
            ("child3", "child2"),
            ("other", ""),
        ]);
        let n = delete_with_descendants(&store, "root", DEFAULT_MAX_DEPTH).await.unwrap();
        assert_eq!(n, 4);
        assert_eq!(store.remaining(), ["other"]);
        assert_eq!(*store.removed_order.lock().unwrap(), ["child3", "child2", "child1", "root"]);
    }

    #[tokio::test]
    async fn second_run_is_a_no_op() {
        let store = FlatStore::with(&[("root", ""), ("a", "root")]);
        delete_with_descendants(&store, "root", DEFAULT_MAX_DEPTH).await.unwrap();
        let n = delete_with_descendants(&store, "root", DEFAULT_MAX_DEPTH).await.unwrap();
        assert_eq!(n, 0);
    }

    #[tokio::test]
    async fn store_error_stops_and_leaves_partial_state() {
        let mut store = FlatStore::with(&[("root", ""), ("a", "root"), ("b", "root"), ("a1", "a")]);
        store.fail_remove = Some("b".into());
        let err = delete_with_descendants(&store, "root", DEFAULT_MAX_DEPTH).await.unwrap_err();
        assert!(matches!(err, ContentError::StoreUnavailable(_)));
        let mut left = store.remaining();
        left.sort();
        assert_eq!(left, ["b", "root"]);

        store.fail_remove = None;
        assert_eq!(delete_with_descendants(&store, "root", DEFAULT_MAX_DEPTH).await.unwrap(), 2);
        assert!(store.remaining().is_empty());
    }

    #[tokio::test]
    async fn depth_limit_fails_fast() {
        let chain: Vec<(String, String)> = (1..20).map(|i| (format!("n{i}"), format!("n{}", i - 1))).collect();
        let store = FlatStore {
            nodes: Mutex::new(std::iter::once(("n0".to_string(), String::new())).chain(chain).collect()),
            ..Default::default()
        };
        let err = delete_with_descendants(&store, "n0", 5).await.unwrap_err();
        assert_eq!(err, ContentError::DepthLimitExceeded { limit: 5 });
        // nothing below the limit was reached, so nothing was deleted
        assert_eq!(store.remaining().len(), 20);
    }

    #[tokio::test]
    async fn parent_cycle_terminates() {
        let store = FlatStore::with(&[("x", "y"), ("y", "x")]);
        let n = delete_with_descendants(&store, "x", DEFAULT_MAX_DEPTH).await.unwrap();
        assert_eq!(n, 2);
        assert!(store.remaining().is_empty());
    }

    #[cfg(feature = "inmem-store")]
    #[tokio::test]
    async fn works_through_comment_repo() {
        use crate::models::Comment;
        use crate::repo::inmem::InMemRepo;

        let repo = InMemRepo::new();
        for (id, parent) in [("r", ""), ("c", "r")] {
            repo.save_comment(Comment { id: id.into(), parent: parent.into(), ..Default::default() })
                .await
                .unwrap();
        }
        assert_eq!(delete_with_descendants(&repo, "r", DEFAULT_MAX_DEPTH).await.unwrap(), 2);
        assert_eq!(repo.get_comment("c").await.unwrap_err(), RepoError::NotFound);
    }
}
