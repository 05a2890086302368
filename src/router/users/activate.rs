//! Redeem an invitation.

use axum::extract::{Path, State};
use axum::http::StatusCode;

use crate::AppState;
use crate::error::Result;

pub async fn handler(
    State(state): State<AppState>,
    Path(token): Path<String>,
) -> Result<StatusCode> {
    let user = state.users().activate(&token).await?;
    state.cache.remove(user.id).await;

    Ok(StatusCode::NO_CONTENT)
}
