use serde::Serialize;

use crate::error::{ContentError, ContentResult};

/// Offset window for a 1-based page over a counted result set.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pager {
    pub page: i64,
    pub size: i64,
    pub total: i64,
    pub begin: i64,
    pub is_valid: bool,
}

impl Pager {
    /// An invalid pager means "no such page"; callers should not treat it
    /// as an empty slice. Page 1 of an empty set is valid.
    pub fn new(page: i64, size: i64, total: i64) -> Self {
        let mut pager = Pager { page, size, total: total.max(0), begin: 0, is_valid: false };
        if page < 1 || size < 1 {
            return pager;
        }
        if page > 1 && page > pager.page_count() {
            return pager;
        }
        pager.begin = (page - 1).saturating_mul(size);
        pager.is_valid = true;
        pager
    }

    pub fn page_count(&self) -> i64 {
        if self.size < 1 || self.total == 0 {
            return 0;
        }
        self.total / self.size + i64::from(self.total % self.size != 0)
    }

    pub fn limit(&self) -> i64 {
        self.size.max(0)
    }

    pub fn has_prev(&self) -> bool {
        self.is_valid && self.page > 1
    }

    pub fn has_next(&self) -> bool {
        self.is_valid && self.page < self.page_count()
    }

    pub fn ensure_valid(self) -> ContentResult<Self> {
        if self.is_valid {
            Ok(self)
        } else {
            Err(ContentError::InvalidInput(format!("page {} not found", self.page)))
        }
    }
}
