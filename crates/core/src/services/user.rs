//! User lookup for request authentication.

use meetpoll_common::{AppError, AppResult};
use meetpoll_db::entities::user;

use super::store::PollStoreService;

/// Resolves bearer tokens to users.
#[derive(Clone)]
pub struct UserService {
    store: PollStoreService,
}

impl UserService {
    #[must_use]
    pub const fn new(store: PollStoreService) -> Self {
        Self { store }
    }

    /// Authenticate a user by token.
    pub async fn authenticate_by_token(&self, token: &str) -> AppResult<user::Model> {
        self.store
            .get_user_by_token(token)
            .await?
            .ok_or_else(|| AppError::Unauthorized("invalid token".to_string()))
    }
}
