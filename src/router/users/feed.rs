//! Feed of the authenticated user.

use std::collections::HashMap;

use axum::extract::{Query, State};
use axum::{Extension, Json};
use validator::Validate;

use crate::AppState;
use crate::error::Result;
use crate::feed::FeedQuery;
use crate::post::PostWithMetadata;
use crate::user::User;

pub async fn handler(
    State(state): State<AppState>,
    Extension(user): Extension<User>,
    Query(params): Query<HashMap<String, String>>,
) -> Result<Json<Vec<PostWithMetadata>>> {
    let query = FeedQuery::default().parse(&params);
    query.validate()?;

    let posts = state.posts().user_feed(user.id, &query).await?;
    Ok(Json(posts))
}
