use std::collections::HashSet;
use std::sync::Arc;

use axum::{
    extract::{FromRequestParts, Request, State},
    http::{HeaderMap, header, request::Parts},
    middleware::Next,
    response::Response,
};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::AppState;
use crate::error::ApiError;
use crate::methods;
use crate::token::{INVALID_TOKEN, TokenService};

pub const BEARER_PREFIX: &str = "Bearer ";

/// Verified caller identity: the `sub` claim of a token that passed
/// validation. Only [`AuthInterceptor`] creates one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity(String);

impl Identity {
    pub fn subject(&self) -> &str {
        &self.0
    }

    /// The account primary key this identity refers to.
    pub fn user_id(&self) -> Result<Uuid, ApiError> {
        self.0.parse().map_err(|_| {
            warn!("Token subject '{}' is not an account id", self.0);
            ApiError::unauthenticated(INVALID_TOKEN)
        })
    }

    #[cfg(test)]
    pub(crate) fn for_user(id: Uuid) -> Self {
        Self(id.to_string())
    }
}

/// Handlers name `identity: Identity` as a parameter to receive the caller.
impl<S> FromRequestParts<S> for Identity
where
    S: Send + Sync,
{
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .extensions
            .get::<Identity>()
            .cloned()
            .ok_or_else(|| ApiError::unauthenticated("user id is not provided"))
    }
}

/// Gatekeeper for every call: public methods pass straight through, all
/// others need a valid bearer token in the `authorization` metadata entry.
pub struct AuthInterceptor {
    tokens: Arc<TokenService>,
    bypass: HashSet<&'static str>,
}

impl AuthInterceptor {
    pub fn new(tokens: Arc<TokenService>) -> Self {
        Self {
            tokens,
            bypass: HashSet::from([methods::CREATE_ACCOUNT, methods::LOGIN]),
        }
    }

    /// Let anonymous callers read posts.
    pub fn with_public_reads(mut self) -> Self {
        self.bypass.extend([methods::LIST_POSTS, methods::GET_POST]);
        self
    }

    pub fn bypasses(&self, method: &str) -> bool {
        self.bypass.contains(method)
    }

    /// Resolve the caller from call metadata. Never touches the store.
    pub fn authenticate(&self, metadata: &HeaderMap) -> Result<Identity, ApiError> {
        let authorization = metadata.get(header::AUTHORIZATION).ok_or_else(|| {
            warn!("Call rejected: no authorization metadata");
            ApiError::unauthenticated("authorization token is not provided")
        })?;

        let token = authorization
            .to_str()
            .ok()
            .and_then(|v| v.strip_prefix(BEARER_PREFIX))
            .ok_or_else(|| {
                warn!("Call rejected: authorization is not a bearer token");
                ApiError::unauthenticated(INVALID_TOKEN)
            })?;

        let claims = self.tokens.validate_token(token)?;

        if claims.sub.is_empty() {
            warn!("Call rejected: token has an empty subject");
            return Err(ApiError::unauthenticated("access denied: invalid 'sub' field in token"));
        }

        Ok(Identity(claims.sub))
    }
}

/// Router middleware: the request path is the full method name.
pub async fn intercept(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    if state.interceptor.bypasses(req.uri().path()) {
        return Ok(next.run(req).await);
    }

    let identity = state.interceptor.authenticate(req.headers())?;
    debug!(subject = identity.subject(), method = req.uri().path(), "Call authenticated");

    req.extensions_mut().insert(identity);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    fn interceptor() -> (AuthInterceptor, Arc<TokenService>) {
        let tokens = Arc::new(TokenService::new("secret"));
        (AuthInterceptor::new(tokens.clone()), tokens)
    }

    fn metadata(authorization: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_str(authorization).unwrap());
        headers
    }

    #[test]
    fn only_account_entry_points_bypass() {
        let (interceptor, _) = interceptor();

        assert!(interceptor.bypasses(methods::CREATE_ACCOUNT));
        assert!(interceptor.bypasses(methods::LOGIN));
        for method in [
            methods::GET_PROFILE,
            methods::LIST_POSTS,
            methods::GET_POST,
            methods::CREATE_COMMENT,
            methods::DELETE_COMMENT,
            "/sns.v1.AccountService/CreateAccount/extra",
        ] {
            assert!(!interceptor.bypasses(method), "{method} must be protected");
        }

        let public = interceptor.with_public_reads();
        assert!(public.bypasses(methods::LIST_POSTS));
        assert!(public.bypasses(methods::GET_POST));
        assert!(!public.bypasses(methods::WRITE_POST));
    }

    #[test]
    fn missing_metadata_is_unauthenticated() {
        let (interceptor, _) = interceptor();
        let err = interceptor.authenticate(&HeaderMap::new()).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }

    #[test]
    fn non_bearer_values_are_unauthenticated() {
        let (interceptor, tokens) = interceptor();
        let token = tokens.create_token("42").unwrap();

        for value in [token.clone(), format!("bearer {token}"), format!("Basic {token}"), format!("Bearer  {token}")] {
            let err = interceptor.authenticate(&metadata(&value)).unwrap_err();
            assert!(matches!(err, ApiError::Unauthenticated(_)), "{value} accepted");
        }
    }

    #[test]
    fn valid_bearer_token_binds_its_subject() {
        let (interceptor, tokens) = interceptor();
        let user = Uuid::new_v4();
        let token = tokens.create_token(&user.to_string()).unwrap();

        let identity = interceptor.authenticate(&metadata(&format!("Bearer {token}"))).unwrap();
        assert_eq!(identity.user_id().unwrap(), user);
    }

    #[test]
    fn empty_subject_is_unauthenticated() {
        let (interceptor, tokens) = interceptor();
        let token = tokens.create_token("").unwrap();

        let err = interceptor.authenticate(&metadata(&format!("Bearer {token}"))).unwrap_err();
        assert!(matches!(err, ApiError::Unauthenticated(_)));
    }
}
