/// Authentication Routes
///
/// Signup, login, token refresh and the caller's own profile.

use actix_web::{web, HttpResponse};
use serde::{Deserialize, Serialize};

use crate::auth::{AuthService, BearerToken, TokenKind, TokenPair};
use crate::database::User;
use crate::error::{AppError, ErrorContext, ValidationError};
use crate::validators::{is_valid_email, is_valid_name, is_valid_password};

/// Fields are optional so a missing field is reported as a 422 validation
/// error rather than a body deserialization failure
#[derive(Deserialize)]
pub struct SignupRequest {
    pub name: Option<String>,
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: Option<String>,
    pub password: Option<String>,
}

#[derive(Serialize)]
pub struct SignupResponse {
    pub status: u16,
    pub message: String,
    pub user_id: String,
}

/// Access and refresh tokens
#[derive(Serialize)]
pub struct AuthResponse {
    pub status: u16,
    pub access_token: String,
    pub refresh_token: String,
    pub token_type: String,
    pub expires_in: i64,
}

impl AuthResponse {
    fn new(pair: TokenPair, service: &AuthService) -> Self {
        Self {
            status: 200,
            access_token: pair.access_token,
            refresh_token: pair.refresh_token,
            token_type: "Bearer".to_string(),
            expires_in: service.tokens().expiry_seconds(TokenKind::Access),
        }
    }
}

#[derive(Serialize)]
pub struct UserResponse {
    pub id: String,
    pub name: String,
    pub email: String,
    pub created_at: String,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id.to_string(),
            name: user.name,
            email: user.email,
            created_at: user.created_at.to_rfc3339(),
        }
    }
}

#[derive(Serialize)]
pub struct ProfileResponse {
    pub status: u16,
    pub user: UserResponse,
}

fn required<'a>(field: &'a Option<String>, name: &str) -> Result<&'a str, ValidationError> {
    field
        .as_deref()
        .ok_or_else(|| ValidationError::EmptyField(name.to_string()))
}

/// POST /api/signup
///
/// # Errors
/// - 422: invalid name/email/password, or email already registered
/// - 409: email claimed by a concurrent signup
pub async fn signup(
    form: web::Json<SignupRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_signup");

    let name = is_valid_name(required(&form.name, "name")?)?;
    let email = is_valid_email(required(&form.email, "email")?)?;
    let password = is_valid_password(required(&form.password, "password")?)?;

    let user_id = service
        .signup(&name, &email, &password)
        .await
        .map_err(|e| context.record(e))?;

    tracing::info!(
        request_id = %context.request_id,
        user_id = %user_id,
        "Signup completed"
    );

    Ok(HttpResponse::Created().json(SignupResponse {
        status: 201,
        message: "You have been successfully registered.".to_string(),
        user_id: user_id.to_string(),
    }))
}

/// POST /api/login
///
/// # Errors
/// - 422: invalid input, unregistered email, or incorrect password
/// - 500: the refresh token could not be whitelisted
pub async fn login(
    form: web::Json<LoginRequest>,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("user_login");

    let email = is_valid_email(required(&form.email, "email")?)?;
    let password = is_valid_password(required(&form.password, "password")?)?;

    let user = service.find_login_user(&email).await?;
    let context = context.with_user_id(user.id.to_string());

    let pair = service
        .login(&user, &password)
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, service.get_ref())))
}

/// GET|POST /api/refresh
///
/// Expects `Authorization: Bearer <refresh_token>`. The presented token is
/// rotated out; only the returned refresh token is valid afterwards.
///
/// # Errors
/// - 400: missing header or malformed token
/// - 401: expired, invalid, or no longer whitelisted token
/// - 500: rotation did not land (concurrent refresh of the same token)
pub async fn refresh(
    token: BearerToken,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let context = ErrorContext::new("token_refresh");

    let pair = service
        .refresh(token.as_str())
        .await
        .map_err(|e| context.record(e))?;

    Ok(HttpResponse::Ok().json(AuthResponse::new(pair, service.get_ref())))
}

/// GET /api/profile
///
/// Expects `Authorization: Bearer <access_token>`.
///
/// # Errors
/// - 400: missing header or malformed token
/// - 401: expired or invalid token
/// - 404: account no longer exists
pub async fn profile(
    token: BearerToken,
    service: web::Data<AuthService>,
) -> Result<HttpResponse, AppError> {
    let user = service.current_user(token.as_str()).await?;

    Ok(HttpResponse::Ok().json(ProfileResponse {
        status: 200,
        user: user.into(),
    }))
}
