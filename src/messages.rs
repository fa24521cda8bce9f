use crate::models::{Comment, Message, Post};
use crate::render::{escape_html, html_to_text};

pub const COMMENT_KIND: &str = "comment";

/// How many unread messages the admin inbox shows.
pub const UNREAD_LIMIT: i64 = 10;

/// Notification body for a new comment. `parent` is the comment being
/// replied to, if it could be loaded.
pub fn comment_message(post: &Post, comment: &Comment, parent: Option<&Comment>) -> Message {
    let author = escape_html(&comment.author);
    let title = escape_html(&post.title);
    let head = match parent {
        Some(p) => format!("{author} replied {}'s comment on <i>{title}</i>: ", escape_html(&p.author)),
        None => format!("{author} commented on post <i>{title}</i>: "),
    };
    let body = escape_html(&html_to_text(&comment.content));
    Message::new(COMMENT_KIND, format!("<p>{head}</p><p>{body}</p>"))
}
