use axum::{extract::State, http::StatusCode, response::IntoResponse};
use sns_types::api::{
    CreateCommentRequest, CreateReplyRequest, DeleteCommentRequest, DeleteResponse,
    EditCommentRequest,
};
use sns_types::models::Comment;

use crate::error::{ApiError, Json};
use crate::interceptor::Identity;
use crate::threading;
use crate::{AppState, blocking};

pub async fn create_comment(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateCommentRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let comment = blocking(&state, move |db| {
        threading::create_top_level(db, &identity, req.post_id, &req.content)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(comment)))
}

pub async fn create_reply(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<CreateReplyRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let reply = blocking(&state, move |db| {
        threading::create_reply(db, &identity, req.parent_comment_id, req.post_id, &req.content)
    })
    .await?;

    Ok((StatusCode::CREATED, Json(reply)))
}

pub async fn edit_comment(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<EditCommentRequest>,
) -> Result<Json<Comment>, ApiError> {
    let comment = blocking(&state, move |db| {
        threading::edit(db, &identity, req.comment_id, &req.content)
    })
    .await?;

    Ok(Json(comment))
}

pub async fn delete_comment(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<DeleteCommentRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let comment_id = req.comment_id;
    blocking(&state, move |db| threading::delete(db, &identity, comment_id)).await?;

    Ok(Json(DeleteResponse {
        message: format!("comment {} is deleted", comment_id),
    }))
}
