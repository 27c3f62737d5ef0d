pub mod accounts;
pub mod comments;
mod convert;
pub mod error;
pub mod interceptor;
pub mod posts;
pub mod threading;
pub mod token;

use std::sync::Arc;
use std::time::Duration;

use axum::{BoxError, Router, error_handling::HandleErrorLayer, middleware, routing::post};
use tower::ServiceBuilder;
use tower::timeout::{TimeoutLayer, error::Elapsed};
use tracing::{error, warn};

use sns_db::Database;

use crate::error::ApiError;
use crate::interceptor::AuthInterceptor;
use crate::token::TokenService;

/// Full method names. Each one is served as `POST <name>`.
pub mod methods {
    pub const CREATE_ACCOUNT: &str = "/sns.v1.AccountService/CreateAccount";
    pub const LOGIN: &str = "/sns.v1.AccountService/Login";
    pub const GET_PROFILE: &str = "/sns.v1.AccountService/GetProfile";

    pub const WRITE_POST: &str = "/sns.v1.PostService/WritePost";
    pub const LIST_POSTS: &str = "/sns.v1.PostService/ListPosts";
    pub const GET_POST: &str = "/sns.v1.PostService/GetPost";
    pub const UPDATE_POST: &str = "/sns.v1.PostService/UpdatePost";
    pub const DELETE_POST: &str = "/sns.v1.PostService/DeletePost";

    pub const CREATE_COMMENT: &str = "/sns.v1.CommentService/CreateComment";
    pub const CREATE_REPLY: &str = "/sns.v1.CommentService/CreateReply";
    pub const EDIT_COMMENT: &str = "/sns.v1.CommentService/EditComment";
    pub const DELETE_COMMENT: &str = "/sns.v1.CommentService/DeleteComment";
}

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub tokens: Arc<TokenService>,
    pub interceptor: AuthInterceptor,
}

impl AppStateInner {
    pub fn new(db: Database, tokens: TokenService, public_reads: bool) -> AppState {
        let tokens = Arc::new(tokens);
        let mut interceptor = AuthInterceptor::new(tokens.clone());
        if public_reads {
            interceptor = interceptor.with_public_reads();
        }

        Arc::new(Self {
            db,
            tokens,
            interceptor,
        })
    }
}

/// Every RPC behind the auth interceptor.
pub fn router(state: AppState) -> Router {
    Router::new()
        .route(methods::CREATE_ACCOUNT, post(accounts::create_account))
        .route(methods::LOGIN, post(accounts::login))
        .route(methods::GET_PROFILE, post(accounts::get_profile))
        .route(methods::WRITE_POST, post(posts::write_post))
        .route(methods::LIST_POSTS, post(posts::list_posts))
        .route(methods::GET_POST, post(posts::get_post))
        .route(methods::UPDATE_POST, post(posts::update_post))
        .route(methods::DELETE_POST, post(posts::delete_post))
        .route(methods::CREATE_COMMENT, post(comments::create_comment))
        .route(methods::CREATE_REPLY, post(comments::create_reply))
        .route(methods::EDIT_COMMENT, post(comments::edit_comment))
        .route(methods::DELETE_COMMENT, post(comments::delete_comment))
        .layer(middleware::from_fn_with_state(state.clone(), interceptor::intercept))
        .with_state(state)
}

/// Bound every call on `app` to `timeout`. A call that runs out of time
/// answers as an internal error with the usual JSON body.
pub fn with_request_timeout(app: Router, timeout: Duration) -> Router {
    app.layer(
        ServiceBuilder::new()
            .layer(HandleErrorLayer::new(move |err: BoxError| async move {
                if err.is::<Elapsed>() {
                    warn!("Call exceeded its {:?} deadline", timeout);
                    ApiError::Internal("request timed out".into())
                } else {
                    ApiError::internal("serve request", err)
                }
            }))
            .layer(TimeoutLayer::new(timeout)),
    )
}

/// Run store work off the async runtime. Nothing touches the store if the
/// call is dropped before this is polled.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> Result<T, ApiError>
where
    F: FnOnce(&Database) -> Result<T, ApiError> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Internal("internal error".into())
        })?
}
