use axum::{extract::State, http::StatusCode, response::IntoResponse};
use tracing::info;
use uuid::Uuid;

use sns_db::Database;
use sns_db::models::Page;
use sns_types::api::{
    DeletePostRequest, DeleteResponse, GetPostRequest, ListPostsRequest, ListPostsResponse,
    PostResponse, UpdatePostRequest, WritePostRequest,
};
use sns_types::models::Post;

use crate::convert::{post_from_row, summary_from_row};
use crate::error::{ApiError, Json};
use crate::interceptor::Identity;
use crate::threading::{self, MAX_CONTENT_CHARS};
use crate::{AppState, blocking};

const DEFAULT_PAGE_SIZE: u32 = 20;
const MAX_PAGE_SIZE: u32 = 100;
const MAX_TITLE_CHARS: usize = 100;

pub async fn write_post(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<WritePostRequest>,
) -> Result<impl IntoResponse, ApiError> {
    validate(&req.title, MAX_TITLE_CHARS, "title")?;
    validate(&req.content, MAX_CONTENT_CHARS, "content")?;
    let author_id = identity.user_id()?;

    let post = blocking(&state, move |db| {
        let id = Uuid::new_v4().to_string();
        db.insert_post(&id, &author_id.to_string(), &req.title, &req.content)
            .map_err(|e| ApiError::internal("write post", e))?;
        load(db, &id)
    })
    .await?;

    info!("Post {} written by {}", post.id, post.author_id);
    Ok((StatusCode::CREATED, Json(post)))
}

pub async fn list_posts(
    State(state): State<AppState>,
    Json(req): Json<ListPostsRequest>,
) -> Result<Json<ListPostsResponse>, ApiError> {
    let page = page_window(req.page, req.limit);

    let rows = blocking(&state, move |db| {
        db.list_posts(page).map_err(|e| ApiError::internal("get posts", e))
    })
    .await?;

    Ok(Json(ListPostsResponse {
        posts: rows.into_iter().map(summary_from_row).collect(),
    }))
}

pub async fn get_post(
    State(state): State<AppState>,
    Json(req): Json<GetPostRequest>,
) -> Result<Json<PostResponse>, ApiError> {
    let response = blocking(&state, move |db| {
        let post = load(db, &req.id.to_string())?;
        let comments = threading::thread_for_post(db, req.id)?;
        Ok(PostResponse { post, comments })
    })
    .await?;

    Ok(Json(response))
}

pub async fn update_post(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<UpdatePostRequest>,
) -> Result<Json<Post>, ApiError> {
    // Empty fields mean "leave unchanged"
    let title = req.title.filter(|t| !t.is_empty());
    let content = req.content.filter(|c| !c.is_empty());
    if let Some(title) = &title {
        validate(title, MAX_TITLE_CHARS, "title")?;
    }
    if let Some(content) = &content {
        validate(content, MAX_CONTENT_CHARS, "content")?;
    }
    let caller = identity.user_id()?;

    let post = blocking(&state, move |db| {
        let id = req.id.to_string();
        authorize(&load(db, &id)?, caller)?;

        let updated = db
            .update_post(&id, &caller.to_string(), title.as_deref(), content.as_deref())
            .map_err(|e| ApiError::internal("update post", e))?;
        if !updated {
            return Err(ApiError::not_found("post is not exists"));
        }
        load(db, &id)
    })
    .await?;

    info!("Post {} updated by {}", post.id, caller);
    Ok(Json(post))
}

pub async fn delete_post(
    State(state): State<AppState>,
    identity: Identity,
    Json(req): Json<DeletePostRequest>,
) -> Result<Json<DeleteResponse>, ApiError> {
    let caller = identity.user_id()?;
    let post_id = req.id;

    blocking(&state, move |db| {
        let id = post_id.to_string();
        authorize(&load(db, &id)?, caller)?;

        let deleted = db
            .delete_post(&id, &caller.to_string())
            .map_err(|e| ApiError::internal("delete post", e))?;
        if !deleted {
            return Err(ApiError::not_found("post is not exists"));
        }
        Ok(())
    })
    .await?;

    info!("Post {} deleted by {}", post_id, caller);
    Ok(Json(DeleteResponse {
        message: format!("post {} is deleted", post_id),
    }))
}

/// `page == 0` lists everything; otherwise pages are 1-based.
fn page_window(page: u32, limit: u32) -> Option<Page> {
    if page == 0 {
        return None;
    }
    let limit = if limit == 0 { DEFAULT_PAGE_SIZE } else { limit.min(MAX_PAGE_SIZE) };
    Some(Page {
        limit,
        offset: (page - 1).saturating_mul(limit),
    })
}

fn validate(value: &str, max_chars: usize, field: &str) -> Result<(), ApiError> {
    let chars = value.chars().count();
    if chars == 0 || chars > max_chars {
        return Err(ApiError::invalid_argument(format!(
            "{} must be 1 to {} characters",
            field, max_chars
        )));
    }
    Ok(())
}

fn load(db: &Database, id: &str) -> Result<Post, ApiError> {
    db.get_post(id)
        .map_err(|e| ApiError::internal("get post", e))?
        .map(post_from_row)
        .ok_or_else(|| ApiError::not_found("post is not exists"))
}

fn authorize(post: &Post, caller: Uuid) -> Result<(), ApiError> {
    if post.author_id != caller {
        return Err(ApiError::permission_denied());
    }
    Ok(())
}
