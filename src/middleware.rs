// Bearer authentication middleware and shared application state

use axum::{
    extract::{Request, State},
    http::header::AUTHORIZATION,
    middleware::Next,
    response::Response,
};
use std::sync::Arc;

use crate::alerts::AlertPublisher;
use crate::auth::{AuthError, JwtManager};
use crate::shell::ShellOptions;
use crate::store::{StoreError, Stores};

// Middleware for JWT authentication
pub async fn auth_middleware(
    State(state): State<Arc<AppState>>,
    mut request: Request,
    next: Next,
) -> Result<Response, AuthError> {
    let token = request
        .headers()
        .get(AUTHORIZATION)
        .and_then(|header| header.to_str().ok())
        .and_then(bearer_token)
        .ok_or(AuthError::MissingToken)?;

    let current_user = state.authenticate(token).await?;

    // Store user info in request extensions for handlers to use
    request.extensions_mut().insert(current_user);

    Ok(next.run(request).await)
}

fn bearer_token(header: &str) -> Option<&str> {
    let (scheme, token) = header.split_once(' ')?;
    let token = token.trim();
    (scheme.eq_ignore_ascii_case("bearer") && !token.is_empty()).then_some(token)
}

// Current user resolved from the bearer token
#[derive(Debug, Clone)]
pub struct CurrentUser {
    pub id: String,
    pub email: String,
}

// Application state
#[derive(Clone)]
pub struct AppState {
    pub stores: Stores,
    pub jwt_manager: JwtManager,
    pub alert_publisher: AlertPublisher,
    pub password_cost: u32,
    pub auto_approve_signups: bool,
    pub shell: ShellOptions,
}

impl AppState {
    pub fn new(stores: Stores, jwt_secret: &str) -> Self {
        Self {
            stores,
            jwt_manager: JwtManager::new(jwt_secret),
            alert_publisher: AlertPublisher::new(),
            password_cost: bcrypt::DEFAULT_COST,
            auto_approve_signups: true,
            shell: ShellOptions::default(),
        }
    }

    /// Verifies a token and checks its subject still exists.
    pub async fn authenticate(&self, token: &str) -> Result<CurrentUser, AuthError> {
        let claims = self.jwt_manager.verify_token(token)?;

        match self.stores.users.get(&claims.user_id).await {
            Ok(user) => Ok(CurrentUser {
                id: user.id,
                email: user.email,
            }),
            Err(StoreError::NotFound) => Err(AuthError::InvalidToken),
            Err(e) => {
                tracing::error!(user_id = %claims.user_id, "Failed to resolve token subject: {}", e);
                Err(AuthError::InvalidToken)
            }
        }
    }
}
