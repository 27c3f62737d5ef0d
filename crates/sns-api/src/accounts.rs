use argon2::{Argon2, PasswordHash, PasswordHasher, PasswordVerifier, password_hash::SaltString};
use axum::{extract::State, http::StatusCode, response::IntoResponse};
use rand_core::OsRng;
use tracing::info;
use uuid::Uuid;

use sns_db::models::NewUser;
use sns_types::api::{
    CreateAccountRequest, CreateAccountResponse, LoginRequest, LoginResponse, ProfileResponse,
};

use crate::convert::user_from_row;
use crate::error::{ApiError, Json};
use crate::interceptor::Identity;
use crate::{AppState, blocking};

/// Same answer for an unknown login id and a wrong password.
const BAD_CREDENTIALS: &str = "user is not exists or password is not correct";

pub async fn create_account(
    State(state): State<AppState>,
    Json(req): Json<CreateAccountRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    let login_chars = req.user_id.chars().count();
    if !(3..=32).contains(&login_chars) {
        return Err(ApiError::invalid_argument("user id must be 3 to 32 characters"));
    }
    if req.password.chars().count() < 8 {
        return Err(ApiError::invalid_argument("password must be at least 8 characters"));
    }

    let id = Uuid::new_v4();
    let login_id = req.user_id.clone();

    blocking(&state, move |db| {
        // Hash password with Argon2id
        let salt = SaltString::generate(&mut OsRng);
        let password_hash = Argon2::default()
            .hash_password(req.password.as_bytes(), &salt)
            .map_err(|e| ApiError::internal("create user", e))?
            .to_string();

        let birthday = req.birthday.map(|d| d.format("%Y-%m-%d").to_string());
        let created = db
            .create_user(&NewUser {
                id: &id.to_string(),
                user_id: &req.user_id,
                password_hash: &password_hash,
                name: &req.name,
                age: req.age,
                sex: &req.sex,
                birthday: birthday.as_deref(),
                introduce: &req.introduce,
            })
            .map_err(|e| ApiError::internal("create user", e))?;

        if !created {
            return Err(ApiError::AlreadyExists("user id is already exists".into()));
        }
        Ok(())
    })
    .await?;

    info!("Account {} created for '{}'", id, login_id);

    Ok((
        StatusCode::CREATED,
        Json(CreateAccountResponse {
            id,
            user_id: login_id,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let user_id = blocking(&state, move |db| {
        let user = db
            .get_user_by_login_id(&req.user_id)
            .map_err(|e| ApiError::internal("get user", e))?
            .ok_or_else(|| ApiError::not_found(BAD_CREDENTIALS))?;

        // Verify password
        let parsed_hash =
            PasswordHash::new(&user.password).map_err(|e| ApiError::internal("verify password", e))?;

        Argon2::default()
            .verify_password(req.password.as_bytes(), &parsed_hash)
            .map_err(|_| ApiError::not_found(BAD_CREDENTIALS))?;

        Ok(user.id)
    })
    .await?;

    let token = state.tokens.create_token(&user_id)?;
    info!("User {} logged in", user_id);

    Ok(Json(LoginResponse { token }))
}

pub async fn get_profile(
    State(state): State<AppState>,
    identity: Identity,
) -> Result<Json<ProfileResponse>, ApiError> {
    let user_id = identity.user_id()?;
    let user = blocking(&state, move |db| {
        db.get_user_by_id(&user_id.to_string())
            .map_err(|e| ApiError::internal("get user", e))?
            .ok_or_else(|| ApiError::not_found("user is not exists"))
    })
    .await?;

    let user = user_from_row(user);
    Ok(Json(ProfileResponse {
        id: user.id,
        user_id: user.user_id,
        name: user.name,
        age: user.age,
        sex: user.sex,
        birthday: user.birthday,
        introduce: user.introduce,
    }))
}
