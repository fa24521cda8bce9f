pub mod cascade;
pub mod comment_tree;
pub mod config;
pub mod error;
pub mod messages;
pub mod models;
pub mod pager;
pub mod password;
pub mod render;
pub mod repo;
pub mod service;
pub mod slug;
pub mod tags;
pub mod validation;

// Re-export commonly used items for tests / external users
pub use error::{ContentError, ContentResult};
pub use pager::Pager;
pub use service::ContentService;
