use async_trait::async_trait;

use crate::models::*;

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum RepoError {
    #[error("not found")] NotFound,
    #[error("conflict")] Conflict,
    #[error("store unavailable: {0}")] Unavailable(String),
}

pub type RepoResult<T> = Result<T, RepoError>;

#[async_trait]
pub trait PostRepo: Send + Sync {
    /// Fails with `Conflict` when the id or the slug is already stored.
    async fn insert_post(&self, post: Post) -> RepoResult<Post>;
    /// Fails with `NotFound` for an unknown id and `Conflict` when another
    /// post holds the slug.
    async fn replace_post(&self, post: Post) -> RepoResult<Post>;
    async fn get_post(&self, id: &str) -> RepoResult<Post>;
    async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post>;
    async fn slug_taken(&self, slug: &str, except_id: Option<&str>) -> RepoResult<bool>;
    async fn delete_post(&self, id: &str) -> RepoResult<()>;
    async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64>;
    /// `limit: None` returns everything from `offset` on.
    async fn list_posts(&self, filter: &PostFilter, order: PostOrder, offset: i64, limit: Option<i64>) -> RepoResult<Vec<Post>>;
}

#[async_trait]
pub trait CommentRepo: Send + Sync {
    async fn save_comment(&self, comment: Comment) -> RepoResult<Comment>; // upsert by id
    async fn get_comment(&self, id: &str) -> RepoResult<Comment>;
    async fn count_comments(&self, only_approved: bool) -> RepoResult<i64>;
    /// Newest first.
    async fn list_comments(&self, only_approved: bool, offset: i64, limit: i64) -> RepoResult<Vec<Comment>>;
    /// Oldest first, ties in insertion order.
    async fn approved_comments_for_post(&self, post_id: &str) -> RepoResult<Vec<Comment>>;
    /// Direct children regardless of approval.
    async fn child_comment_ids(&self, parent_id: &str) -> RepoResult<Vec<Id>>;
    async fn comment_ids_for_post(&self, post_id: &str) -> RepoResult<Vec<Id>>;
    async fn delete_comment(&self, id: &str) -> RepoResult<()>;
}

#[async_trait]
pub trait SettingRepo: Send + Sync {
    async fn get_setting(&self, key: &str) -> RepoResult<Setting>;
    async fn set_setting(&self, setting: Setting) -> RepoResult<()>;
    async fn settings_by_kind(&self, kind: &str) -> RepoResult<Vec<Setting>>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    /// Fails with `Conflict` when the id, email or slug is already stored.
    async fn insert_user(&self, user: User) -> RepoResult<User>;
    async fn replace_user(&self, user: User) -> RepoResult<User>;
    async fn get_user(&self, id: &str) -> RepoResult<User>;
    async fn get_user_by_slug(&self, slug: &str) -> RepoResult<User>;
    /// Names are not unique; the earliest registered user wins.
    async fn get_user_by_name(&self, name: &str) -> RepoResult<User>;
    async fn get_user_by_email(&self, email: &str) -> RepoResult<User>;
    async fn email_taken(&self, email: &str) -> RepoResult<bool>;
    async fn user_slug_taken(&self, slug: &str) -> RepoResult<bool>;
    async fn count_users(&self) -> RepoResult<i64>;
}

#[async_trait]
pub trait MessageRepo: Send + Sync {
    async fn insert_message(&self, message: Message) -> RepoResult<Message>;
    /// Newest first.
    async fn unread_messages(&self, limit: i64) -> RepoResult<Vec<Message>>;
    async fn mark_message_read(&self, id: &str) -> RepoResult<()>;
}

pub trait Repo: PostRepo + CommentRepo + SettingRepo + UserRepo + MessageRepo {}

impl<T> Repo for T where T: PostRepo + CommentRepo + SettingRepo + UserRepo + MessageRepo {}

#[cfg_attr(not(feature = "inmem-store"), allow(dead_code))]
fn window<T>(items: Vec<T>, offset: i64, limit: Option<i64>) -> Vec<T> {
    let skip = usize::try_from(offset.max(0)).unwrap_or(usize::MAX);
    let take = limit.map(|l| usize::try_from(l.max(0)).unwrap_or(usize::MAX)).unwrap_or(usize::MAX);
    items.into_iter().skip(skip).take(take).collect()
}

#[cfg(feature = "inmem-store")]
pub mod inmem {
    use super::*;
    use serde::{Deserialize, Serialize};
    use std::collections::HashMap;
    use std::path::{Path, PathBuf};
    use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
    use tracing::{info, warn};

    pub const SNAPSHOT_FILE: &str = "state.json";

    #[derive(Clone, Serialize, Deserialize)]
    struct Stored<T> {
        seq: u64, // insertion order, the tie-breaker for equal timestamps
        doc: T,
    }

    #[derive(Default, Serialize, Deserialize)]
    struct State {
        posts: HashMap<Id, Stored<Post>>,
        comments: HashMap<Id, Stored<Comment>>,
        settings: HashMap<String, Setting>,
        #[serde(default)]
        users: HashMap<Id, Stored<User>>,
        #[serde(default)]
        messages: HashMap<Id, Stored<Message>>,
        next_seq: u64,
    }

    impl State {
        fn next_seq(&mut self) -> u64 {
            self.next_seq += 1;
            self.next_seq
        }

        fn slug_holder(&self, slug: &str) -> Option<&str> {
            self.posts.values().find(|p| p.doc.slug == slug).map(|p| p.doc.id.as_str())
        }

        // another user already holding the email or slug of `u`
        fn user_clash(&self, u: &User) -> bool {
            self.users
                .values()
                .any(|x| x.doc.id != u.id && (x.doc.email == u.email || (!u.slug.is_empty() && x.doc.slug == u.slug)))
        }

        fn first_user<P: Fn(&User) -> bool>(&self, pred: P) -> RepoResult<User> {
            self.users
                .values()
                .filter(|u| pred(&u.doc))
                .min_by_key(|u| u.seq)
                .map(|u| u.doc.clone())
                .ok_or(RepoError::NotFound)
        }
    }

    #[derive(Clone, Default)]
    pub struct InMemRepo {
        state: Arc<RwLock<State>>,
        snapshot_path: Option<Arc<PathBuf>>,
    }

    impl InMemRepo {
        /// Ephemeral store, nothing touches disk.
        pub fn new() -> Self {
            Self::default()
        }

        /// Loads `dir/state.json` if present and rewrites it after every
        /// mutation.
        pub fn with_snapshot_dir(dir: impl AsRef<Path>) -> Self {
            let path = dir.as_ref().join(SNAPSHOT_FILE);
            let state = Self::load_state_from(&path);
            Self {
                state: Arc::new(RwLock::new(state)),
                snapshot_path: Some(Arc::new(path)),
            }
        }

        fn load_state_from(path: &Path) -> State {
            match std::fs::read(path) {
                Ok(bytes) => match serde_json::from_slice::<State>(&bytes) {
                    Ok(s) => {
                        info!("loaded snapshot '{}'", path.display());
                        s
                    }
                    Err(e) => {
                        warn!("failed to parse snapshot '{}': {e}, starting empty", path.display());
                        State::default()
                    }
                },
                Err(e) => {
                    info!("no snapshot at '{}' ({e}), starting empty", path.display());
                    State::default()
                }
            }
        }

        fn persist(&self) {
            let Some(path) = self.snapshot_path.as_ref() else { return };
            let bytes = match self.state.read() {
                Ok(s) => serde_json::to_vec_pretty(&*s),
                Err(_) => return,
            };
            match bytes {
                Ok(bytes) => {
                    if let Some(dir) = path.parent() {
                        let _ = std::fs::create_dir_all(dir);
                    }
                    if let Err(e) = std::fs::write(&**path, bytes) {
                        warn!("failed to write snapshot '{}': {e}", path.display());
                    }
                }
                Err(e) => warn!("failed to encode snapshot: {e}"),
            }
        }

        fn read(&self) -> RepoResult<RwLockReadGuard<'_, State>> {
            self.state.read().map_err(|_| RepoError::Unavailable("state lock poisoned".into()))
        }

        fn write(&self) -> RepoResult<RwLockWriteGuard<'_, State>> {
            self.state.write().map_err(|_| RepoError::Unavailable("state lock poisoned".into()))
        }
    }

    fn sorted_posts(s: &State, filter: &PostFilter, order: PostOrder) -> Vec<Post> {
        let mut v: Vec<&Stored<Post>> = s.posts.values().filter(|p| filter.matches(&p.doc)).collect();
        v.sort_by(|a, b| {
            let ka = (order.key(&a.doc), a.seq);
            let kb = (order.key(&b.doc), b.seq);
            if order.descending() { kb.cmp(&ka) } else { ka.cmp(&kb) }
        });
        v.into_iter().map(|p| p.doc.clone()).collect()
    }

    #[async_trait]
    impl PostRepo for InMemRepo {
        async fn insert_post(&self, post: Post) -> RepoResult<Post> {
            let mut s = self.write()?;
            if s.posts.contains_key(&post.id) || s.slug_holder(&post.slug).is_some() {
                return Err(RepoError::Conflict);
            }
            let seq = s.next_seq();
            s.posts.insert(post.id.clone(), Stored { seq, doc: post.clone() });
            drop(s); // release lock before persisting
            self.persist();
            Ok(post)
        }

        async fn replace_post(&self, post: Post) -> RepoResult<Post> {
            let mut s = self.write()?;
            if matches!(s.slug_holder(&post.slug), Some(holder) if holder != post.id) {
                return Err(RepoError::Conflict);
            }
            let stored = s.posts.get_mut(&post.id).ok_or(RepoError::NotFound)?;
            stored.doc = post.clone();
            drop(s);
            self.persist();
            Ok(post)
        }

        async fn get_post(&self, id: &str) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.get(id).map(|p| p.doc.clone()).ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            let s = self.read()?;
            s.posts.values().find(|p| p.doc.slug == slug).map(|p| p.doc.clone()).ok_or(RepoError::NotFound)
        }

        async fn slug_taken(&self, slug: &str, except_id: Option<&str>) -> RepoResult<bool> {
            let s = self.read()?;
            Ok(s.posts.values().any(|p| p.doc.slug == slug && Some(p.doc.id.as_str()) != except_id))
        }

        async fn delete_post(&self, id: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            s.posts.remove(id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }

        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
            let s = self.read()?;
            Ok(s.posts.values().filter(|p| filter.matches(&p.doc)).count() as i64)
        }

        async fn list_posts(&self, filter: &PostFilter, order: PostOrder, offset: i64, limit: Option<i64>) -> RepoResult<Vec<Post>> {
            let s = self.read()?;
            Ok(window(sorted_posts(&s, filter, order), offset, limit))
        }
    }

    #[async_trait]
    impl CommentRepo for InMemRepo {
        async fn save_comment(&self, comment: Comment) -> RepoResult<Comment> {
            let mut s = self.write()?;
            let mut doc = comment;
            doc.children.clear();
            match s.comments.get_mut(&doc.id) {
                Some(stored) => stored.doc = doc.clone(),
                None => {
                    let seq = s.next_seq();
                    s.comments.insert(doc.id.clone(), Stored { seq, doc: doc.clone() });
                }
            }
            drop(s);
            self.persist();
            Ok(doc)
        }

        async fn get_comment(&self, id: &str) -> RepoResult<Comment> {
            let s = self.read()?;
            s.comments.get(id).map(|c| c.doc.clone()).ok_or(RepoError::NotFound)
        }

        async fn count_comments(&self, only_approved: bool) -> RepoResult<i64> {
            let s = self.read()?;
            Ok(s.comments.values().filter(|c| !only_approved || c.doc.approved).count() as i64)
        }

        async fn list_comments(&self, only_approved: bool, offset: i64, limit: i64) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values().filter(|c| !only_approved || c.doc.approved).collect();
            v.sort_by(|a, b| (b.doc.created_at, b.seq).cmp(&(a.doc.created_at, a.seq))); // latest first
            Ok(window(v.into_iter().map(|c| c.doc.clone()).collect(), offset, Some(limit)))
        }

        async fn approved_comments_for_post(&self, post_id: &str) -> RepoResult<Vec<Comment>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values()
                .filter(|c| c.doc.post_id == post_id && c.doc.approved)
                .collect();
            v.sort_by(|a, b| (a.doc.created_at, a.seq).cmp(&(b.doc.created_at, b.seq)));
            Ok(v.into_iter().map(|c| c.doc.clone()).collect())
        }

        async fn child_comment_ids(&self, parent_id: &str) -> RepoResult<Vec<Id>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values().filter(|c| c.doc.parent == parent_id).collect();
            v.sort_by_key(|c| c.seq);
            Ok(v.into_iter().map(|c| c.doc.id.clone()).collect())
        }

        async fn comment_ids_for_post(&self, post_id: &str) -> RepoResult<Vec<Id>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.comments.values().filter(|c| c.doc.post_id == post_id).collect();
            v.sort_by_key(|c| c.seq);
            Ok(v.into_iter().map(|c| c.doc.id.clone()).collect())
        }

        async fn delete_comment(&self, id: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            s.comments.remove(id).ok_or(RepoError::NotFound)?;
            drop(s);
            self.persist();
            Ok(())
        }
    }

    #[async_trait]
    impl SettingRepo for InMemRepo {
        async fn get_setting(&self, key: &str) -> RepoResult<Setting> {
            let s = self.read()?;
            s.settings.get(key).cloned().ok_or(RepoError::NotFound)
        }

        async fn set_setting(&self, setting: Setting) -> RepoResult<()> {
            let mut s = self.write()?;
            s.settings.insert(setting.key.clone(), setting);
            drop(s);
            self.persist();
            Ok(())
        }

        async fn settings_by_kind(&self, kind: &str) -> RepoResult<Vec<Setting>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.settings.values().filter(|x| x.kind == kind).cloned().collect();
            v.sort_by(|a, b| a.key.cmp(&b.key));
            Ok(v)
        }
    }

    #[async_trait]
    impl UserRepo for InMemRepo {
        async fn insert_user(&self, user: User) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.users.contains_key(&user.id) || s.user_clash(&user) {
                return Err(RepoError::Conflict);
            }
            let seq = s.next_seq();
            s.users.insert(user.id.clone(), Stored { seq, doc: user.clone() });
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn replace_user(&self, user: User) -> RepoResult<User> {
            let mut s = self.write()?;
            if s.user_clash(&user) {
                return Err(RepoError::Conflict);
            }
            let stored = s.users.get_mut(&user.id).ok_or(RepoError::NotFound)?;
            stored.doc = user.clone();
            drop(s);
            self.persist();
            Ok(user)
        }

        async fn get_user(&self, id: &str) -> RepoResult<User> {
            let s = self.read()?;
            s.users.get(id).map(|u| u.doc.clone()).ok_or(RepoError::NotFound)
        }

        async fn get_user_by_slug(&self, slug: &str) -> RepoResult<User> {
            self.read()?.first_user(|u| u.slug == slug)
        }

        async fn get_user_by_name(&self, name: &str) -> RepoResult<User> {
            self.read()?.first_user(|u| u.name == name)
        }

        async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
            self.read()?.first_user(|u| u.email == email)
        }

        async fn email_taken(&self, email: &str) -> RepoResult<bool> {
            Ok(self.read()?.users.values().any(|u| u.doc.email == email))
        }

        async fn user_slug_taken(&self, slug: &str) -> RepoResult<bool> {
            Ok(self.read()?.users.values().any(|u| u.doc.slug == slug))
        }

        async fn count_users(&self) -> RepoResult<i64> {
            Ok(self.read()?.users.len() as i64)
        }
    }

    #[async_trait]
    impl MessageRepo for InMemRepo {
        async fn insert_message(&self, message: Message) -> RepoResult<Message> {
            let mut s = self.write()?;
            if s.messages.contains_key(&message.id) {
                return Err(RepoError::Conflict);
            }
            let seq = s.next_seq();
            s.messages.insert(message.id.clone(), Stored { seq, doc: message.clone() });
            drop(s);
            self.persist();
            Ok(message)
        }

        async fn unread_messages(&self, limit: i64) -> RepoResult<Vec<Message>> {
            let s = self.read()?;
            let mut v: Vec<_> = s.messages.values().filter(|m| !m.doc.is_read).collect();
            v.sort_by(|a, b| (b.doc.created_at, b.seq).cmp(&(a.doc.created_at, a.seq)));
            Ok(window(v.into_iter().map(|m| m.doc.clone()).collect(), 0, Some(limit)))
        }

        async fn mark_message_read(&self, id: &str) -> RepoResult<()> {
            let mut s = self.write()?;
            s.messages.get_mut(id).ok_or(RepoError::NotFound)?.doc.is_read = true;
            drop(s);
            self.persist();
            Ok(())
        }
    }
}

// Postgres implementation (feature = "postgres-store"): one JSONB document per row
#[cfg(feature = "postgres-store")]
pub mod pg {
    use super::*;
    use sqlx::types::Json;
    use sqlx::{Pool, Postgres};

    const POST_FILTER: &str = "($1::boolean IS NULL OR (doc->>'is_page')::boolean = $1) \
        AND (NOT $2 OR (doc->>'is_published')::boolean) \
        AND ($3::text IS NULL OR doc->'tags' @> jsonb_build_array(jsonb_build_object('slug', $3::text)))";

    fn map_err(e: sqlx::Error) -> RepoError {
        match &e {
            sqlx::Error::RowNotFound => RepoError::NotFound,
            sqlx::Error::Database(db) if db.code().as_deref() == Some("23505") => RepoError::Conflict,
            _ => RepoError::Unavailable(e.to_string()),
        }
    }

    fn offset_of(offset: i64) -> i64 {
        offset.max(0)
    }

    #[derive(Clone)]
    pub struct PgRepo { pool: Pool<Postgres> }

    impl PgRepo {
        pub fn new(pool: Pool<Postgres>) -> Self { Self { pool } }

        /// Creates the document tables and their unique indexes.
        pub async fn migrate(&self) -> RepoResult<()> {
            sqlx::migrate!("./migrations")
                .run(&self.pool)
                .await
                .map_err(|e| RepoError::Unavailable(e.to_string()))
        }
    }

    #[async_trait]
    impl PostRepo for PgRepo {
        async fn insert_post(&self, post: Post) -> RepoResult<Post> {
            sqlx::query("INSERT INTO posts (id, doc) VALUES ($1, $2)")
                .bind(&post.id)
                .bind(Json(&post))
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(post)
        }

        async fn replace_post(&self, post: Post) -> RepoResult<Post> {
            let res = sqlx::query("UPDATE posts SET doc = $2 WHERE id = $1")
                .bind(&post.id)
                .bind(Json(&post))
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(post)
        }

        async fn get_post(&self, id: &str) -> RepoResult<Post> {
            let row: Option<(Json<Post>,)> = sqlx::query_as("SELECT doc FROM posts WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(map_err)?;
            row.map(|(Json(p),)| p).ok_or(RepoError::NotFound)
        }

        async fn get_post_by_slug(&self, slug: &str) -> RepoResult<Post> {
            let row: Option<(Json<Post>,)> = sqlx::query_as("SELECT doc FROM posts WHERE doc->>'slug' = $1")
                .bind(slug)
                .fetch_optional(&self.pool).await.map_err(map_err)?;
            row.map(|(Json(p),)| p).ok_or(RepoError::NotFound)
        }

        async fn slug_taken(&self, slug: &str, except_id: Option<&str>) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM posts WHERE doc->>'slug' = $1 AND ($2::text IS NULL OR id <> $2))")
                .bind(slug)
                .bind(except_id)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn delete_post(&self, id: &str) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM posts WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }

        async fn count_posts(&self, filter: &PostFilter) -> RepoResult<i64> {
            sqlx::query_scalar(&format!("SELECT COUNT(*) FROM posts WHERE {POST_FILTER}"))
                .bind(filter.is_page)
                .bind(filter.only_published)
                .bind(filter.tag_slug.as_deref())
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn list_posts(&self, filter: &PostFilter, order: PostOrder, offset: i64, limit: Option<i64>) -> RepoResult<Vec<Post>> {
            // column and direction come from the PostOrder whitelist, never from input
            let dir = if order.descending() { "DESC" } else { "ASC" };
            let sql = format!(
                "SELECT doc FROM posts WHERE {POST_FILTER} \
                 ORDER BY (doc->>'{col}')::timestamptz {dir} NULLS LAST, seq {dir} OFFSET $4 LIMIT $5",
                col = order.column(),
            );
            let rows: Vec<(Json<Post>,)> = sqlx::query_as(&sql)
                .bind(filter.is_page)
                .bind(filter.only_published)
                .bind(filter.tag_slug.as_deref())
                .bind(offset_of(offset))
                .bind(limit)
                .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok(rows.into_iter().map(|(Json(p),)| p).collect())
        }
    }

    #[async_trait]
    impl CommentRepo for PgRepo {
        async fn save_comment(&self, comment: Comment) -> RepoResult<Comment> {
            sqlx::query("INSERT INTO comments (id, doc) VALUES ($1, $2) ON CONFLICT (id) DO UPDATE SET doc = EXCLUDED.doc")
                .bind(&comment.id)
                .bind(Json(&comment))
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(comment)
        }

        async fn get_comment(&self, id: &str) -> RepoResult<Comment> {
            let row: Option<(Json<Comment>,)> = sqlx::query_as("SELECT doc FROM comments WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(map_err)?;
            row.map(|(Json(c),)| c).ok_or(RepoError::NotFound)
        }

        async fn count_comments(&self, only_approved: bool) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM comments WHERE (NOT $1 OR (doc->>'approved')::boolean)")
                .bind(only_approved)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn list_comments(&self, only_approved: bool, offset: i64, limit: i64) -> RepoResult<Vec<Comment>> {
            let rows: Vec<(Json<Comment>,)> = sqlx::query_as(r#"
                SELECT doc FROM comments
                WHERE (NOT $1 OR (doc->>'approved')::boolean)
                ORDER BY (doc->>'created_at')::timestamptz DESC NULLS LAST, seq DESC
                OFFSET $2 LIMIT $3
            "#)
                .bind(only_approved)
                .bind(offset_of(offset))
                .bind(limit.max(0))
                .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok(rows.into_iter().map(|(Json(c),)| c).collect())
        }

        async fn approved_comments_for_post(&self, post_id: &str) -> RepoResult<Vec<Comment>> {
            let rows: Vec<(Json<Comment>,)> = sqlx::query_as(r#"
                SELECT doc FROM comments
                WHERE doc->>'post_id' = $1 AND (doc->>'approved')::boolean
                ORDER BY (doc->>'created_at')::timestamptz ASC NULLS FIRST, seq ASC
            "#)
                .bind(post_id)
                .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok(rows.into_iter().map(|(Json(c),)| c).collect())
        }

        async fn child_comment_ids(&self, parent_id: &str) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar("SELECT id FROM comments WHERE doc->>'parent' = $1 ORDER BY seq")
                .bind(parent_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }

        async fn comment_ids_for_post(&self, post_id: &str) -> RepoResult<Vec<Id>> {
            sqlx::query_scalar("SELECT id FROM comments WHERE doc->>'post_id' = $1 ORDER BY seq")
                .bind(post_id)
                .fetch_all(&self.pool).await.map_err(map_err)
        }

        async fn delete_comment(&self, id: &str) -> RepoResult<()> {
            let res = sqlx::query("DELETE FROM comments WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SettingRepo for PgRepo {
        async fn get_setting(&self, key: &str) -> RepoResult<Setting> {
            let row: Option<(Json<Setting>,)> = sqlx::query_as("SELECT doc FROM settings WHERE key = $1")
                .bind(key)
                .fetch_optional(&self.pool).await.map_err(map_err)?;
            row.map(|(Json(s),)| s).ok_or(RepoError::NotFound)
        }

        async fn set_setting(&self, setting: Setting) -> RepoResult<()> {
            sqlx::query("INSERT INTO settings (key, doc) VALUES ($1, $2) ON CONFLICT (key) DO UPDATE SET doc = EXCLUDED.doc")
                .bind(&setting.key)
                .bind(Json(&setting))
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(())
        }

        async fn settings_by_kind(&self, kind: &str) -> RepoResult<Vec<Setting>> {
            let rows: Vec<(Json<Setting>,)> = sqlx::query_as("SELECT doc FROM settings WHERE doc->>'type' = $1 ORDER BY key")
                .bind(kind)
                .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok(rows.into_iter().map(|(Json(s),)| s).collect())
        }
    }

    async fn user_where(pool: &Pool<Postgres>, field: &str, value: &str) -> RepoResult<User> {
        // field is one of the fixed document keys passed below
        let row: Option<(Json<User>,)> = sqlx::query_as(&format!("SELECT doc FROM users WHERE doc->>'{field}' = $1 ORDER BY seq LIMIT 1"))
            .bind(value)
            .fetch_optional(pool).await.map_err(map_err)?;
        row.map(|(Json(u),)| u).ok_or(RepoError::NotFound)
    }

    #[async_trait]
    impl UserRepo for PgRepo {
        async fn insert_user(&self, user: User) -> RepoResult<User> {
            sqlx::query("INSERT INTO users (id, doc) VALUES ($1, $2)")
                .bind(&user.id)
                .bind(Json(&user))
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(user)
        }

        async fn replace_user(&self, user: User) -> RepoResult<User> {
            let res = sqlx::query("UPDATE users SET doc = $2 WHERE id = $1")
                .bind(&user.id)
                .bind(Json(&user))
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(user)
        }

        async fn get_user(&self, id: &str) -> RepoResult<User> {
            let row: Option<(Json<User>,)> = sqlx::query_as("SELECT doc FROM users WHERE id = $1")
                .bind(id)
                .fetch_optional(&self.pool).await.map_err(map_err)?;
            row.map(|(Json(u),)| u).ok_or(RepoError::NotFound)
        }

        async fn get_user_by_slug(&self, slug: &str) -> RepoResult<User> {
            user_where(&self.pool, "slug", slug).await
        }

        async fn get_user_by_name(&self, name: &str) -> RepoResult<User> {
            user_where(&self.pool, "name", name).await
        }

        async fn get_user_by_email(&self, email: &str) -> RepoResult<User> {
            user_where(&self.pool, "email", email).await
        }

        async fn email_taken(&self, email: &str) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE doc->>'email' = $1)")
                .bind(email)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn user_slug_taken(&self, slug: &str) -> RepoResult<bool> {
            sqlx::query_scalar("SELECT EXISTS (SELECT 1 FROM users WHERE doc->>'slug' = $1)")
                .bind(slug)
                .fetch_one(&self.pool).await.map_err(map_err)
        }

        async fn count_users(&self) -> RepoResult<i64> {
            sqlx::query_scalar("SELECT COUNT(*) FROM users")
                .fetch_one(&self.pool).await.map_err(map_err)
        }
    }

    #[async_trait]
    impl MessageRepo for PgRepo {
        async fn insert_message(&self, message: Message) -> RepoResult<Message> {
            sqlx::query("INSERT INTO messages (id, doc) VALUES ($1, $2)")
                .bind(&message.id)
                .bind(Json(&message))
                .execute(&self.pool).await.map_err(map_err)?;
            Ok(message)
        }

        async fn unread_messages(&self, limit: i64) -> RepoResult<Vec<Message>> {
            let rows: Vec<(Json<Message>,)> = sqlx::query_as(r#"
                SELECT doc FROM messages
                WHERE NOT (doc->>'is_read')::boolean
                ORDER BY (doc->>'created_at')::timestamptz DESC NULLS LAST, seq DESC
                LIMIT $1
            "#)
                .bind(limit.max(0))
                .fetch_all(&self.pool).await.map_err(map_err)?;
            Ok(rows.into_iter().map(|(Json(m),)| m).collect())
        }

        async fn mark_message_read(&self, id: &str) -> RepoResult<()> {
            let res = sqlx::query("UPDATE messages SET doc = jsonb_set(doc, '{is_read}', 'true') WHERE id = $1")
                .bind(id)
                .execute(&self.pool).await.map_err(map_err)?;
            if res.rows_affected() == 0 {
                return Err(RepoError::NotFound);
            }
            Ok(())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::window;

    #[test]
    fn window_skips_and_takes() {
        assert_eq!(window(vec![1, 2, 3, 4, 5], 1, Some(2)), vec![2, 3]);
        assert_eq!(window(vec![1, 2, 3], 2, None), vec![3]);
        assert_eq!(window(vec![1, 2, 3], 5, Some(2)), Vec::<i32>::new());
    }
}
