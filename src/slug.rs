use std::future::Future;

use crate::error::{ContentError, ContentResult};
use crate::repo::RepoResult;

/// Strips leading and trailing path separators.
pub fn normalize_slug(candidate: &str) -> &str {
    candidate.trim_matches('/')
}

/// Lowercases `text` and collapses every run of non-alphanumeric
/// characters into a single `-`.
pub fn slugify(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut pending_dash = false;
    for ch in text.chars() {
        if ch.is_alphanumeric() {
            if pending_dash && !out.is_empty() {
                out.push('-');
            }
            pending_dash = false;
            out.extend(ch.to_lowercase());
        } else {
            pending_dash = true;
        }
    }
    out
}

/// Returns `candidate` if `exists` reports it free, otherwise the first of
/// `candidate-1`, `candidate-2`, ... that is free. Suffixes are tried in
/// order so the result is reproducible for a fixed set of taken slugs.
///
/// The lookup runs against the live store, so two writers can still race to
/// the same result; a unique index in the store is the final authority.
pub async fn ensure_unique_slug<F, Fut>(candidate: &str, mut exists: F) -> ContentResult<String>
where
    F: FnMut(String) -> Fut,
    Fut: Future<Output = RepoResult<bool>>,
{
    let base = normalize_slug(candidate);
    if base.is_empty() {
        return Err(ContentError::InvalidInput("slug can not be empty or root".into()));
    }
    if !exists(base.to_string()).await? {
        return Ok(base.to_string());
    }
    let mut suffix: u64 = 1;
    loop {
        let next = format!("{base}-{suffix}");
        if !exists(next.clone()).await? {
            tracing::debug!(slug = %base, chosen = %next, "slug taken, using suffix");
            return Ok(next);
        }
        suffix += 1;
    }
}
