use sha2::{Digest, Sha256};

use crate::error::{ContentError, ContentResult};
use crate::models::Comment;

/// Gravatar image for an address, using the SHA-256 form of the hash.
pub fn gravatar_url(email: &str, size: u32) -> String {
    let digest = Sha256::digest(email.trim().to_lowercase().as_bytes());
    format!("https://www.gravatar.com/avatar/{}?s={size}", hex::encode(digest))
}

pub fn is_email(s: &str) -> bool {
    let Some((local, domain)) = s.trim().rsplit_once('@') else { return false };
    !local.is_empty()
        && !domain.starts_with('.')
        && !domain.ends_with('.')
        && domain.contains('.')
        && !s.chars().any(char::is_whitespace)
}

pub fn is_url(s: &str) -> bool {
    match url::Url::parse(s.trim()) {
        Ok(u) => matches!(u.scheme(), "http" | "https") && u.host_str().is_some(),
        Err(_) => false,
    }
}

pub fn validate_comment(c: &Comment) -> ContentResult<()> {
    if c.author.trim().is_empty() || c.content.trim().is_empty() {
        return Err(ContentError::InvalidInput("name, email and content are required fields".into()));
    }
    if !is_email(&c.email) {
        return Err(ContentError::InvalidInput("email format not valid".into()));
    }
    if !c.website.trim().is_empty() && !is_url(&c.website) {
        return Err(ContentError::InvalidInput("website url format not valid".into()));
    }
    Ok(())
}
