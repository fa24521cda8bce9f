use crate::repo::RepoError;

#[derive(thiserror::Error, Debug, PartialEq, Eq)]
pub enum ContentError {
    #[error("not found")] NotFound,
    #[error("invalid input: {0}")] InvalidInput(String),
    #[error("store unavailable: {0}")] StoreUnavailable(String),
    #[error("conflict")] Conflict,
    #[error("parent chain deeper than {limit}")] DepthLimitExceeded { limit: usize },
    #[error("password hash: {0}")] PasswordHash(String),
}

pub type ContentResult<T> = Result<T, ContentError>;

impl From<RepoError> for ContentError {
    fn from(e: RepoError) -> Self {
        match e {
            RepoError::NotFound => ContentError::NotFound,
            RepoError::Conflict => ContentError::Conflict,
            RepoError::Unavailable(msg) => ContentError::StoreUnavailable(msg),
        }
    }
}
