use std::sync::Arc;

use chrono::Utc;
use tracing::{info, warn};

use crate::cascade;
use crate::comment_tree::TreeBuilder;
use crate::config::EngineConfig;
use crate::error::{ContentError, ContentResult};
use crate::messages::{comment_message, UNREAD_LIMIT};
use crate::models::*;
use crate::pager::Pager;
use crate::password::{hash_password, verify_password};
use crate::render::render_markdown;
use crate::repo::{Repo, RepoError};
use crate::slug::{ensure_unique_slug, normalize_slug, slugify};
use crate::tags::{distinct_by_slug, parse_comma_tags};
use crate::validation::{gravatar_url, is_email, validate_comment};

const AVATAR_SIZE: u32 = 50;
const NAVIGATION_KEY: &str = "navigation";

const WELCOME_MARKDOWN: &str = "Welcome to Quire! This is your first post.\n\n\
Posts are written in Markdown:\n\n\
# Heading\n\n\
Paragraphs are separated by a blank line. Text attributes _italic_, **bold**, `monospace`.\n\n\
<!--more-->\n\n\
* apples\n* oranges\n* pears\n\n\
| | Cost to x | Cost to y |\n|---|---|---|\n| From x | 0 | 3 |\n| From y | 3 | 0 |\n";

/// Owns the content flows and keeps the document graph consistent: unique
/// slugs, de-duplicated tags, threaded comments and cascading deletes.
#[derive(Clone)]
pub struct ContentService {
    repo: Arc<dyn Repo>,
    cfg: EngineConfig,
}

impl ContentService {
    pub fn new(repo: Arc<dyn Repo>, cfg: EngineConfig) -> Self {
        Self { repo, cfg }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    // ── posts ────────────────────────────────────────────────

    async fn unique_slug(&self, candidate: &str, except_id: Option<&str>) -> ContentResult<String> {
        let repo = &self.repo;
        ensure_unique_slug(candidate, |slug| async move { repo.slug_taken(&slug, except_id).await }).await
    }

    /// Inserts a new post or re-saves an existing one with `tags` as its
    /// tag list. A slug that collides with another post gets a numeric
    /// suffix.
    pub async fn save_post(&self, mut post: Post, tags: Vec<Tag>) -> ContentResult<Post> {
        let candidate = normalize_slug(&post.slug).to_string();
        if candidate.is_empty() {
            return Err(ContentError::InvalidInput("slug can not be empty or root".into()));
        }
        post.slug = candidate.clone();

        let now = Utc::now();
        if post.created_at.is_none() {
            post.created_at = Some(now);
        }
        if post.is_published && post.published_at.is_none() {
            post.published_at = Some(now);
            post.published_by = post.created_by.clone();
        }
        post.updated_at = Some(now);
        post.updated_by = post.created_by.clone();
        post.tags = distinct_by_slug(tags);
        post.html = render_markdown(&post.markdown);

        if post.id.is_empty() {
            post.id = new_id();
            return self.insert_post(post, &candidate).await;
        }
        match self.repo.get_post(&post.id).await {
            Err(RepoError::NotFound) => self.insert_post(post, &candidate).await,
            Err(e) => Err(e.into()),
            Ok(current) => {
                if current.slug != post.slug {
                    post.slug = self.unique_slug(&candidate, Some(&post.id)).await?;
                }
                self.store_post(post, &candidate, true).await
            }
        }
    }

    /// Like `save_post`, with tags given as `"a, b, c"`.
    pub async fn save_post_with_tag_string(&self, post: Post, tags: &str) -> ContentResult<Post> {
        self.save_post(post, parse_comma_tags(tags)).await
    }

    async fn insert_post(&self, mut post: Post, candidate: &str) -> ContentResult<Post> {
        post.slug = self.unique_slug(candidate, None).await?;
        self.store_post(post, candidate, false).await
    }

    // A conflict here means another writer claimed the slug between the
    // availability check and the write; search once more before giving up.
    async fn store_post(&self, mut post: Post, candidate: &str, existing: bool) -> ContentResult<Post> {
        for attempt in 0..2 {
            let result = if existing {
                self.repo.replace_post(post.clone()).await
            } else {
                self.repo.insert_post(post.clone()).await
            };
            match result {
                Ok(saved) => {
                    info!(id = %saved.id, slug = %saved.slug, "post saved");
                    return Ok(saved);
                }
                Err(RepoError::Conflict) if attempt == 0 => {
                    warn!(slug = %post.slug, "slug claimed concurrently, searching again");
                    post.slug = self.unique_slug(candidate, Some(&post.id)).await?;
                }
                Err(e) => return Err(e.into()),
            }
        }
        Err(ContentError::Conflict)
    }

    pub async fn publish_post(&self, id: &str, by: &str) -> ContentResult<Post> {
        let mut post = self.repo.get_post(id).await?;
        post.is_published = true;
        post.published_at = Some(Utc::now());
        post.published_by = by.to_string();
        Ok(self.repo.replace_post(post).await?)
    }

    pub async fn get_post(&self, id: &str) -> ContentResult<Post> {
        Ok(self.repo.get_post(id).await?)
    }

    pub async fn get_post_by_slug(&self, slug: &str) -> ContentResult<Post> {
        Ok(self.repo.get_post_by_slug(normalize_slug(slug)).await?)
    }

    /// Deletes the post and every comment attached to it. Returns how many
    /// comments went with it.
    pub async fn delete_post(&self, id: &str) -> ContentResult<usize> {
        self.repo.get_post(id).await?;
        let mut removed = 0;
        for comment_id in self.repo.comment_ids_for_post(id).await? {
            removed += cascade::delete_with_descendants(self.repo.as_ref(), &comment_id, self.cfg.max_delete_depth).await?;
        }
        self.repo.delete_post(id).await?;
        info!(id = %id, comments = removed, "post deleted");
        Ok(removed)
    }

    async fn paged_posts(&self, filter: PostFilter, order: PostOrder, page: i64, size: i64) -> ContentResult<(Pager, Vec<Post>)> {
        let total = self.repo.count_posts(&filter).await?;
        let pager = Pager::new(page, size, total).ensure_valid()?;
        let posts = self.repo.list_posts(&filter, order, pager.begin, Some(pager.limit())).await?;
        Ok((pager, posts))
    }

    pub async fn list_posts(&self, page: i64, size: i64, is_page: bool, only_published: bool, order: PostOrder) -> ContentResult<(Pager, Vec<Post>)> {
        let filter = PostFilter { is_page: Some(is_page), only_published, tag_slug: None };
        self.paged_posts(filter, order, page, size).await
    }

    pub async fn posts_by_tag(&self, tag_slug: &str, page: i64, size: i64, only_published: bool) -> ContentResult<(Pager, Vec<Post>)> {
        let filter = PostFilter { is_page: None, only_published, tag_slug: Some(tag_slug.to_string()) };
        self.paged_posts(filter, PostOrder::PublishedAtDesc, page, size).await
    }

    // ── tags ─────────────────────────────────────────────────

    /// Every tag used by any post, first use (newest post first) winning.
    pub async fn all_tags(&self) -> ContentResult<Vec<Tag>> {
        let posts = self.repo.list_posts(&PostFilter::default(), PostOrder::PublishedAtDesc, 0, None).await?;
        Ok(distinct_by_slug(posts.into_iter().flat_map(|p| p.tags)))
    }

    pub async fn tags_for_post(&self, post_id: &str) -> ContentResult<Vec<Tag>> {
        let post = self.repo.get_post(post_id).await?;
        Ok(distinct_by_slug(post.tags))
    }

    pub async fn tag_by_slug(&self, slug: &str) -> ContentResult<Tag> {
        let filter = PostFilter { tag_slug: Some(slug.to_string()), ..Default::default() };
        let posts = self.repo.list_posts(&filter, PostOrder::PublishedAtDesc, 0, Some(1)).await?;
        posts
            .into_iter()
            .flat_map(|p| p.tags)
            .find(|t| t.slug == slug)
            .ok_or(ContentError::NotFound)
    }

    // ── comments ─────────────────────────────────────────────

    /// Validates and stores a comment. A reply must point at an existing
    /// comment of the same post. A new comment leaves an unread message
    /// for the admin.
    pub async fn save_comment(&self, comment: Comment) -> ContentResult<Comment> {
        self.store_comment(comment, true).await
    }

    async fn store_comment(&self, mut comment: Comment, notify: bool) -> ContentResult<Comment> {
        validate_comment(&comment)?;
        let post = match self.repo.get_post(&comment.post_id).await {
            Err(RepoError::NotFound) => return Err(ContentError::InvalidInput("post not found".into())),
            other => other?,
        };
        let is_new = comment.id.is_empty() || matches!(self.repo.get_comment(&comment.id).await, Err(RepoError::NotFound));
        if comment.id.is_empty() {
            comment.id = new_id();
        }
        let mut parent = None;
        if !comment.is_top_level() {
            if comment.parent == comment.id {
                return Err(ContentError::InvalidInput("comment can not reply to itself".into()));
            }
            let p = match self.repo.get_comment(&comment.parent).await {
                Err(RepoError::NotFound) => return Err(ContentError::InvalidInput("parent comment not found".into())),
                other => other?,
            };
            if p.post_id != comment.post_id {
                return Err(ContentError::InvalidInput("parent comment belongs to another post".into()));
            }
            parent = Some(p);
        }
        if comment.created_at.is_none() {
            comment.created_at = Some(Utc::now());
        }
        comment.avatar = gravatar_url(&comment.email, AVATAR_SIZE);
        comment.children.clear();
        let saved = self.repo.save_comment(comment).await?;

        if notify && is_new {
            let message = comment_message(&post, &saved, parent.as_ref());
            // the comment is stored either way
            if let Err(e) = self.repo.insert_message(message).await {
                warn!(comment = %saved.id, error = %e, "failed to record comment message");
            }
        }
        Ok(saved)
    }

    pub async fn approve_comment(&self, id: &str) -> ContentResult<Comment> {
        let mut comment = self.repo.get_comment(id).await?;
        comment.approved = true;
        Ok(self.repo.save_comment(comment).await?)
    }

    pub async fn get_comment(&self, id: &str) -> ContentResult<Comment> {
        Ok(self.repo.get_comment(id).await?)
    }

    pub async fn comment_count(&self, only_approved: bool) -> ContentResult<i64> {
        Ok(self.repo.count_comments(only_approved).await?)
    }

    /// Newest comments first, across all posts.
    pub async fn list_comments(&self, page: i64, size: i64, only_approved: bool) -> ContentResult<(Pager, Vec<Comment>)> {
        let total = self.repo.count_comments(only_approved).await?;
        let pager = Pager::new(page, size, total).ensure_valid()?;
        let comments = self.repo.list_comments(only_approved, pager.begin, pager.limit()).await?;
        Ok((pager, comments))
    }

    /// Approved threads of a post, top-level comments oldest first.
    pub async fn comments_for_post(&self, post_id: &str) -> ContentResult<Vec<Comment>> {
        let flat = self.repo.approved_comments_for_post(post_id).await?;
        Ok(TreeBuilder::new(self.cfg.max_tree_depth).build_forest(flat))
    }

    /// Markdown quote of the comment being replied to, empty for top-level
    /// comments.
    pub async fn parent_content(&self, comment: &Comment) -> String {
        if comment.is_top_level() {
            return String::new();
        }
        match self.repo.get_comment(&comment.parent).await {
            Ok(parent) => format!("> @{}\n\n> {}\n", parent.author, parent.content),
            Err(_) => "> Comment not found.".to_string(),
        }
    }

    /// Deletes the comment and all of its replies. Deleting a comment that
    /// is already gone succeeds.
    pub async fn delete_comment(&self, id: &str) -> ContentResult<usize> {
        cascade::delete_with_descendants(self.repo.as_ref(), id, self.cfg.max_delete_depth).await
    }

    // ── settings ─────────────────────────────────────────────

    pub async fn setting_value(&self, key: &str) -> ContentResult<String> {
        Ok(self.repo.get_setting(key).await?.value)
    }

    /// Returns whether the setting was written.
    pub async fn set_setting_if_missing(&self, key: &str, value: &str, kind: &str) -> ContentResult<bool> {
        match self.repo.get_setting(key).await {
            Ok(_) => Ok(false),
            Err(RepoError::NotFound) => {
                self.repo.set_setting(Setting::new(key, value, kind)).await?;
                Ok(true)
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn ensure_default_settings(&self) -> ContentResult<()> {
        self.set_setting_if_missing("theme", "default", "blog").await?;
        self.set_setting_if_missing("title", "My Blog", "blog").await?;
        self.set_setting_if_missing("description", "Awesome blog created with quire.", "blog").await?;
        Ok(())
    }

    /// Creates the welcome post and its first comment on an empty store.
    pub async fn seed_welcome_content(&self) -> ContentResult<Option<Post>> {
        if self.repo.count_posts(&PostFilter::default()).await? > 0 {
            return Ok(None);
        }
        let mut post = Post::new("Welcome to Quire!", "welcome-to-quire", WELCOME_MARKDOWN);
        post.allow_comment = true;
        post.is_published = true;
        let post = self.save_post_with_tag_string(post, "Welcome, Quire").await?;

        self.store_comment(Comment {
            post_id: post.id.clone(),
            author: "Quire".into(),
            email: "hello@quire.invalid".into(),
            content: "Welcome to Quire! This is your first comment.".into(),
            ip: "127.0.0.1".into(),
            approved: true,
            ..Default::default()
        }, false)
        .await?;
        self.set_navigators(vec![Navigator::new("Home", "/")]).await?;
        Ok(Some(post))
    }

    /// Site menu from the `navigation` setting; empty when unset or
    /// unreadable.
    pub async fn navigators(&self) -> ContentResult<Vec<Navigator>> {
        let raw = match self.repo.get_setting(NAVIGATION_KEY).await {
            Ok(s) => s.value,
            Err(RepoError::NotFound) => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        match serde_json::from_str(&raw) {
            Ok(navs) => Ok(navs),
            Err(e) => {
                warn!(error = %e, "navigation setting is not a menu list");
                Ok(Vec::new())
            }
        }
    }

    /// Replaces the site menu. Entries with a blank label are dropped.
    pub async fn set_navigators(&self, navs: Vec<Navigator>) -> ContentResult<Vec<Navigator>> {
        let navs: Vec<Navigator> = navs.into_iter().filter(|n| !n.label.trim().is_empty()).collect();
        let raw = serde_json::to_string(&navs).map_err(|e| ContentError::InvalidInput(e.to_string()))?;
        self.repo.set_setting(Setting::new(NAVIGATION_KEY, raw, NAVIGATION_KEY)).await?;
        Ok(navs)
    }

    // ── messages ─────────────────────────────────────────────

    /// The newest unread admin messages.
    pub async fn unread_messages(&self) -> ContentResult<Vec<Message>> {
        Ok(self.repo.unread_messages(UNREAD_LIMIT).await?)
    }

    pub async fn mark_message_read(&self, id: &str) -> ContentResult<()> {
        Ok(self.repo.mark_message_read(id).await?)
    }

    // ── users ────────────────────────────────────────────────

    /// Registers a user with an argon2id password hash. Emails are stored
    /// lowercased and must be unused; the slug comes from the name.
    pub async fn create_user(&self, email: &str, name: &str, password: &str) -> ContentResult<User> {
        let email = email.trim().to_lowercase();
        let name = name.trim();
        if name.is_empty() || !is_email(&email) {
            return Err(ContentError::InvalidInput("a name and a valid email are required".into()));
        }
        if self.repo.email_taken(&email).await? {
            return Err(ContentError::Conflict);
        }
        let mut user = User::new(email, name);
        user.hashed_password = hash_password(password)?;
        user.id = new_id();
        let base = match slugify(name) {
            s if s.is_empty() => "user".to_string(),
            s => s,
        };
        let repo = &self.repo;
        user.slug = ensure_unique_slug(&base, |slug| async move { repo.user_slug_taken(&slug).await }).await?;
        let user = self.repo.insert_user(user).await?;
        info!(id = %user.id, slug = %user.slug, "user created");
        Ok(user)
    }

    /// False for an unknown email as well as a wrong password.
    pub async fn check_password(&self, email: &str, password: &str) -> ContentResult<bool> {
        match self.repo.get_user_by_email(&email.trim().to_lowercase()).await {
            Ok(user) => verify_password(password, &user.hashed_password),
            Err(RepoError::NotFound) => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    pub async fn change_password(&self, user_id: &str, password: &str) -> ContentResult<User> {
        let mut user = self.repo.get_user(user_id).await?;
        user.hashed_password = hash_password(password)?;
        user.updated_at = Some(Utc::now());
        Ok(self.repo.replace_user(user).await?)
    }

    pub async fn get_user(&self, id: &str) -> ContentResult<User> {
        Ok(self.repo.get_user(id).await?)
    }

    pub async fn user_by_slug(&self, slug: &str) -> ContentResult<User> {
        Ok(self.repo.get_user_by_slug(slug).await?)
    }

    pub async fn user_by_name(&self, name: &str) -> ContentResult<User> {
        Ok(self.repo.get_user_by_name(name).await?)
    }

    pub async fn user_by_email(&self, email: &str) -> ContentResult<User> {
        Ok(self.repo.get_user_by_email(&email.trim().to_lowercase()).await?)
    }

    pub async fn user_email_exists(&self, email: &str) -> ContentResult<bool> {
        Ok(self.repo.email_taken(&email.trim().to_lowercase()).await?)
    }

    pub async fn user_count(&self) -> ContentResult<i64> {
        Ok(self.repo.count_users().await?)
    }
}
