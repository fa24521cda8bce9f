use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// Documents are keyed by server-assigned string ids
pub type Id = String;

pub fn new_id() -> Id {
    uuid::Uuid::new_v4().simple().to_string()
}

/// A keyword embedded by value in a post.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tag {
    pub name: String,
    pub slug: String,
}

impl Tag {
    pub fn new(name: impl Into<String>, slug: impl Into<String>) -> Self {
        Self { name: name.into(), slug: slug.into() }
    }

    pub fn url(&self) -> String {
        format!("/tag/{}", self.slug)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Post {
    pub id: Id, // empty until first save
    pub title: String,
    pub slug: String,
    pub markdown: String,
    pub html: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub is_featured: bool,
    #[serde(default)]
    pub is_page: bool,
    #[serde(default)]
    pub allow_comment: bool,
    #[serde(default)]
    pub comment_num: i64,
    #[serde(default)]
    pub is_published: bool,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub meta_title: String,
    #[serde(default)]
    pub meta_description: String,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: String,
    pub published_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub published_by: String,
    #[serde(default)]
    pub tags: Vec<Tag>,
}

impl Post {
    pub fn new(title: impl Into<String>, slug: impl Into<String>, markdown: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            slug: slug.into(),
            markdown: markdown.into(),
            created_at: Some(Utc::now()),
            ..Default::default()
        }
    }

    pub fn url(&self) -> String {
        format!("/{}", self.slug)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Comment {
    pub id: Id,
    pub post_id: Id,
    #[serde(default)]
    pub parent: Id, // empty = top-level
    pub author: String,
    pub email: String,
    #[serde(default)]
    pub avatar: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub ip: String,
    #[serde(default)]
    pub user_agent: String,
    #[serde(default)]
    pub user_id: String,
    pub content: String,
    #[serde(default)]
    pub approved: bool,
    pub created_at: Option<DateTime<Utc>>,
    /// Replies attached while rebuilding a thread; never persisted.
    #[serde(skip)]
    pub children: Vec<Comment>,
}

impl Comment {
    pub fn is_top_level(&self) -> bool {
        self.parent.is_empty()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Setting {
    pub key: String,
    pub value: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub created_at: Option<DateTime<Utc>>,
}

impl Setting {
    pub fn new(key: impl Into<String>, value: impl Into<String>, kind: impl Into<String>) -> Self {
        Self { key: key.into(), value: value.into(), kind: kind.into(), created_at: Some(Utc::now()) }
    }
}

/// One entry of the site navigation menu, stored as a JSON list under the
/// `navigation` setting.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Navigator {
    pub label: String,
    pub url: String,
}

impl Navigator {
    pub fn new(label: impl Into<String>, url: impl Into<String>) -> Self {
        Self { label: label.into(), url: url.into() }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Owner,
    Administrator,
    Editor,
    #[default]
    Author,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct User {
    pub id: Id,
    pub name: String,
    pub slug: String,
    pub email: String,
    /// PHC string (argon2id); never the plain password.
    pub hashed_password: String,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub cover: String,
    #[serde(default)]
    pub bio: String,
    #[serde(default)]
    pub website: String,
    #[serde(default)]
    pub location: String,
    #[serde(default)]
    pub language: String,
    #[serde(default)]
    pub role: Role,
    pub last_login: Option<DateTime<Utc>>,
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub created_by: String,
    pub updated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    pub updated_by: String,
}

impl User {
    pub fn new(email: impl Into<String>, name: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            email: email.into(),
            name: name.into(),
            created_at: Some(now),
            updated_at: Some(now),
            ..Default::default()
        }
    }
}

/// Admin notification, e.g. a new comment waiting to be read.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Message {
    pub id: Id,
    #[serde(rename = "type")]
    pub kind: String,
    pub data: String,
    #[serde(default)]
    pub is_read: bool,
    pub created_at: Option<DateTime<Utc>>,
}

impl Message {
    pub fn new(kind: impl Into<String>, data: impl Into<String>) -> Self {
        Self {
            id: new_id(),
            kind: kind.into(),
            data: data.into(),
            is_read: false,
            created_at: Some(Utc::now()),
        }
    }
}

/// Which posts a ranged listing covers.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PostFilter {
    pub is_page: Option<bool>,
    pub only_published: bool,
    pub tag_slug: Option<String>,
}

impl PostFilter {
    pub fn matches(&self, p: &Post) -> bool {
        if let Some(is_page) = self.is_page {
            if p.is_page != is_page { return false; }
        }
        if self.only_published && !p.is_published { return false; }
        match &self.tag_slug {
            Some(slug) => p.tags.iter().any(|t| &t.slug == slug),
            None => true,
        }
    }
}

/// Whitelisted sort orders for post listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PostOrder {
    CreatedAt,
    CreatedAtDesc,
    UpdatedAt,
    UpdatedAtDesc,
    PublishedAt,
    #[default]
    PublishedAtDesc,
}

impl PostOrder {
    /// Unknown values fall back to newest-published first.
    pub fn parse(s: &str) -> Self {
        match s {
            "created_at" => PostOrder::CreatedAt,
            "created_at DESC" => PostOrder::CreatedAtDesc,
            "updated_at" => PostOrder::UpdatedAt,
            "updated_at DESC" => PostOrder::UpdatedAtDesc,
            "published_at" => PostOrder::PublishedAt,
            _ => PostOrder::PublishedAtDesc,
        }
    }

    pub fn key(self, p: &Post) -> Option<DateTime<Utc>> {
        match self {
            PostOrder::CreatedAt | PostOrder::CreatedAtDesc => p.created_at,
            PostOrder::UpdatedAt | PostOrder::UpdatedAtDesc => p.updated_at,
            PostOrder::PublishedAt | PostOrder::PublishedAtDesc => p.published_at,
        }
    }

    pub fn descending(self) -> bool {
        matches!(self, PostOrder::CreatedAtDesc | PostOrder::UpdatedAtDesc | PostOrder::PublishedAtDesc)
    }

    pub fn column(self) -> &'static str {
        match self {
            PostOrder::CreatedAt | PostOrder::CreatedAtDesc => "created_at",
            PostOrder::UpdatedAt | PostOrder::UpdatedAtDesc => "updated_at",
            PostOrder::PublishedAt | PostOrder::PublishedAtDesc => "published_at",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn order_parse_falls_back() {
        assert_eq!(PostOrder::parse("created_at DESC"), PostOrder::CreatedAtDesc);
        assert_eq!(PostOrder::parse("id; DROP TABLE posts"), PostOrder::PublishedAtDesc);
    }

    #[test]
    fn children_are_not_serialized() {
        let mut c = Comment { id: "a".into(), content: "hi".into(), ..Default::default() };
        c.children.push(Comment { id: "b".into(), ..Default::default() });
        let v = serde_json::to_value(&c).unwrap();
        assert!(v.get("children").is_none());
        let back: Comment = serde_json::from_value(v).unwrap();
        assert!(back.children.is_empty());
    }

    #[test]
    fn user_document_shape() {
        let u = User { hashed_password: "$argon2id$x".into(), ..User::new("a@b.co", "Ada") };
        let v = serde_json::to_value(&u).unwrap();
        assert_eq!(v["role"], "author");
        assert_eq!(v["email"], "a@b.co");
        let nav: Vec<Navigator> = serde_json::from_str(r#"[{"label":"Home","url":"/"}]"#).unwrap();
        assert_eq!(nav, [Navigator::new("Home", "/")]);
    }

    #[test]
    fn filter_by_tag_and_publication() {
        let mut p = Post::new("T", "t", "");
        p.tags = vec![Tag::new("Rust", "rust")];
        let f = PostFilter { tag_slug: Some("rust".into()), ..Default::default() };
        assert!(f.matches(&p));
        let f = PostFilter { only_published: true, ..f };
        assert!(!f.matches(&p));
    }
}
