use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};
use subtle::ConstantTimeEq;

use crate::db::AppState;
use crate::error::AppError;
use crate::util::extract_bearer_token;

/// Who performed an admin action, as far as the token tells us.
#[derive(Clone, Debug)]
pub struct AdminContext {
    /// `None` when the admin API runs without a token
    pub actor: Option<String>,
}

fn token_matches(expected: &str, presented: &str) -> bool {
    expected.as_bytes().ct_eq(presented.as_bytes()).into()
}

pub async fn admin_auth(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response, AppError> {
    let context = match state.admin_token.as_deref() {
        None => AdminContext { actor: None },
        Some(expected) => {
            let presented = extract_bearer_token(request.headers()).ok_or(AppError::Unauthorized)?;
            if !token_matches(expected, presented) {
                tracing::warn!("Rejected admin request with an invalid token");
                return Err(AppError::Unauthorized);
            }
            AdminContext {
                actor: Some("admin".to_string()),
            }
        }
    };

    request.extensions_mut().insert(context);
    Ok(next.run(request).await)
}
