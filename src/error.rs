/// Application Error Handling
///
/// Every failure in the service is expressed as an [`AppError`], built from a
/// handful of domain-specific error enums. The HTTP boundary turns an
/// `AppError` into a status code plus a structured [`ErrorResponse`]; the
/// lower-level cause (SQL, JWT, bcrypt) is logged but never sent to the client.
///
/// | Class                       | Status   |
/// |-----------------------------|----------|
/// | Client input invalid        | 400, 422 |
/// | Unauthenticated             | 401      |
/// | Not found                   | 404      |
/// | Internal invariant violated | 500      |

use actix_web::{error::ResponseError, http::StatusCode, HttpResponse};
use std::error::Error as StdError;
use std::fmt;

use crate::auth::TokenError;

/// ============================================================================
/// 1. DOMAIN-SPECIFIC ERROR TYPES
/// ============================================================================

/// Validation errors for request fields
#[derive(Debug, Clone, PartialEq)]
pub enum ValidationError {
    EmptyField(String),
    TooShort(String, usize),
    TooLong(String, usize),
    InvalidFormat(String),
    SuspiciousContent(String),
    /// Request body is not the JSON shape the endpoint expects
    MalformedBody,
    EmailAlreadyRegistered,
    EmailNotRegistered,
}

impl fmt::Display for ValidationError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationError::EmptyField(field) => write!(f, "{} must not be empty", field),
            ValidationError::TooShort(field, min) => {
                write!(f, "{} must be at least {} characters long", field, min)
            }
            ValidationError::TooLong(field, max) => {
                write!(f, "{} is too long (maximum {} characters)", field, max)
            }
            ValidationError::InvalidFormat(field) => write!(f, "{} has invalid format", field),
            ValidationError::SuspiciousContent(field) => {
                write!(f, "{} contains suspicious content", field)
            }
            ValidationError::MalformedBody => write!(f, "Request body must be a JSON object"),
            ValidationError::EmailAlreadyRegistered => {
                write!(f, "A user already exists with this e-mail address")
            }
            ValidationError::EmailNotRegistered => write!(f, "Your email is not registered."),
        }
    }
}

impl StdError for ValidationError {}

/// Database operation errors
#[derive(Debug, Clone, PartialEq)]
pub enum DatabaseError {
    UniqueConstraintViolation(String),
    NotFound(String),
    ConnectionPool(String),
    UnexpectedError(String),
}

impl fmt::Display for DatabaseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            DatabaseError::UniqueConstraintViolation(msg) => {
                write!(f, "Duplicate entry: {}", msg)
            }
            DatabaseError::NotFound(msg) => write!(f, "{}", msg),
            DatabaseError::ConnectionPool(msg) => write!(f, "Database connection error: {}", msg),
            DatabaseError::UnexpectedError(msg) => write!(f, "Database error: {}", msg),
        }
    }
}

impl StdError for DatabaseError {}

impl From<sqlx::Error> for DatabaseError {
    fn from(err: sqlx::Error) -> Self {
        match &err {
            sqlx::Error::Database(db_err) if db_err.code().as_deref() == Some("23505") => {
                DatabaseError::UniqueConstraintViolation(
                    "A user already exists with this e-mail address".to_string(),
                )
            }
            sqlx::Error::PoolTimedOut | sqlx::Error::PoolClosed | sqlx::Error::Io(_) => {
                DatabaseError::ConnectionPool(err.to_string())
            }
            _ => DatabaseError::UnexpectedError(err.to_string()),
        }
    }
}

/// Refresh token ledger errors
#[derive(Debug, Clone, PartialEq)]
pub enum LedgerError {
    /// The digest matched no entry, or more than one
    NotFound,
    /// A write that must touch exactly one row touched none (or several)
    WriteNotApplied {
        operation: &'static str,
        rows_affected: u64,
    },
    Storage(DatabaseError),
}

impl fmt::Display for LedgerError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LedgerError::NotFound => write!(f, "Refresh token not found in ledger"),
            LedgerError::WriteNotApplied {
                operation,
                rows_affected,
            } => write!(
                f,
                "Ledger {} affected {} rows, expected exactly 1",
                operation, rows_affected
            ),
            LedgerError::Storage(e) => write!(f, "{}", e),
        }
    }
}

impl StdError for LedgerError {}

impl From<DatabaseError> for LedgerError {
    fn from(err: DatabaseError) -> Self {
        LedgerError::Storage(err)
    }
}

impl From<sqlx::Error> for LedgerError {
    fn from(err: sqlx::Error) -> Self {
        LedgerError::Storage(DatabaseError::from(err))
    }
}

/// Configuration errors
#[derive(Debug)]
pub enum ConfigError {
    InvalidValue(String),
}

impl fmt::Display for ConfigError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigError::InvalidValue(msg) => write!(f, "Invalid config value: {}", msg),
        }
    }
}

impl StdError for ConfigError {}

/// Authentication errors
#[derive(Debug, Clone, PartialEq)]
pub enum AuthError {
    IncorrectPassword,
    MissingToken,
    Token(TokenError),
    UnrecognizedRefreshToken,
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AuthError::IncorrectPassword => write!(f, "Incorrect password!"),
            AuthError::MissingToken => write!(f, "Please provide a bearer token"),
            AuthError::Token(e) => write!(f, "{}", e),
            AuthError::UnrecognizedRefreshToken => {
                write!(f, "Unauthorized: Invalid Refresh Token.")
            }
        }
    }
}

impl StdError for AuthError {}

/// ============================================================================
/// 2. UNIFIED APPLICATION ERROR TYPE
/// ============================================================================

#[derive(Debug)]
pub enum AppError {
    Validation(ValidationError),
    Database(DatabaseError),
    Ledger(LedgerError),
    Auth(AuthError),
    Config(ConfigError),
    Internal(String),
}

impl fmt::Display for AppError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AppError::Validation(e) => write!(f, "{}", e),
            AppError::Database(e) => write!(f, "{}", e),
            AppError::Ledger(e) => write!(f, "{}", e),
            AppError::Auth(e) => write!(f, "{}", e),
            AppError::Config(e) => write!(f, "{}", e),
            AppError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl StdError for AppError {}

// ============================================================================
// FROM IMPLEMENTATIONS
// ============================================================================

impl From<ValidationError> for AppError {
    fn from(err: ValidationError) -> Self {
        AppError::Validation(err)
    }
}

impl From<DatabaseError> for AppError {
    fn from(err: DatabaseError) -> Self {
        AppError::Database(err)
    }
}

impl From<LedgerError> for AppError {
    fn from(err: LedgerError) -> Self {
        match err {
            LedgerError::NotFound => AppError::Auth(AuthError::UnrecognizedRefreshToken),
            other => AppError::Ledger(other),
        }
    }
}

impl From<AuthError> for AppError {
    fn from(err: AuthError) -> Self {
        AppError::Auth(err)
    }
}

impl From<TokenError> for AppError {
    fn from(err: TokenError) -> Self {
        match err {
            TokenError::Encoding(msg) => AppError::Internal(msg),
            other => AppError::Auth(AuthError::Token(other)),
        }
    }
}

impl From<ConfigError> for AppError {
    fn from(err: ConfigError) -> Self {
        AppError::Config(err)
    }
}

impl From<sqlx::Error> for AppError {
    fn from(err: sqlx::Error) -> Self {
        AppError::Database(DatabaseError::from(err))
    }
}

// ============================================================================
// 3. HTTP RESPONSE MAPPING
// ============================================================================

/// Error body returned to clients
#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    /// Unique error ID for tracking
    pub error_id: String,
    pub message: String,
    /// Error code for client-side handling
    pub code: String,
    pub status: u16,
    pub timestamp: String,
}

impl ErrorResponse {
    pub fn new(error_id: String, message: String, code: String, status: u16) -> Self {
        Self {
            error_id,
            message,
            code,
            status,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

impl AppError {
    /// Machine-readable code and client-safe message
    fn public_parts(&self) -> (&'static str, String) {
        match self {
            AppError::Validation(ValidationError::MalformedBody) => {
                ("MALFORMED_BODY", ValidationError::MalformedBody.to_string())
            }
            AppError::Validation(e) => ("VALIDATION_ERROR", e.to_string()),

            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => ("DUPLICATE_ENTRY", e.to_string()),
                DatabaseError::NotFound(_) => ("NOT_FOUND", e.to_string()),
                DatabaseError::ConnectionPool(_) => (
                    "SERVICE_UNAVAILABLE",
                    "Database service temporarily unavailable".to_string(),
                ),
                DatabaseError::UnexpectedError(_) => {
                    ("DATABASE_ERROR", "Database error occurred".to_string())
                }
            },

            AppError::Ledger(_) => (
                "TOKEN_WHITELIST_FAILED",
                "Failed to whitelist the refresh token.".to_string(),
            ),

            AppError::Auth(e) => match e {
                AuthError::IncorrectPassword => ("INCORRECT_PASSWORD", e.to_string()),
                AuthError::MissingToken => ("MISSING_TOKEN", e.to_string()),
                AuthError::Token(TokenError::Malformed) => ("TOKEN_MALFORMED", e.to_string()),
                AuthError::Token(TokenError::Expired) => ("TOKEN_EXPIRED", e.to_string()),
                AuthError::Token(_) => ("TOKEN_INVALID", e.to_string()),
                AuthError::UnrecognizedRefreshToken => ("REFRESH_TOKEN_INVALID", e.to_string()),
            },

            AppError::Config(_) => ("CONFIG_ERROR", "Server configuration error".to_string()),

            AppError::Internal(_) => ("INTERNAL_ERROR", "Internal Server Error".to_string()),
        }
    }

    fn log(&self, request_id: &str) {
        match self {
            AppError::Validation(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Validation error");
            }
            AppError::Auth(e) => {
                tracing::warn!(request_id = request_id, error = %e, "Authentication error");
            }
            AppError::Database(DatabaseError::NotFound(_)) => {
                tracing::info!(request_id = request_id, error = %self, "Record not found");
            }
            AppError::Database(DatabaseError::UniqueConstraintViolation(_)) => {
                tracing::warn!(request_id = request_id, error = %self, "Duplicate entry attempt");
            }
            AppError::Database(e) => {
                tracing::error!(request_id = request_id, error = %e, "Database error");
            }
            AppError::Ledger(e) => {
                tracing::error!(request_id = request_id, error = %e, "Refresh token ledger error");
            }
            AppError::Config(e) => {
                tracing::error!(request_id = request_id, error = %e, "Configuration error");
            }
            AppError::Internal(msg) => {
                tracing::error!(request_id = request_id, error = %msg, "Internal error");
            }
        }
    }
}

impl ResponseError for AppError {
    fn status_code(&self) -> StatusCode {
        match self {
            AppError::Validation(ValidationError::MalformedBody) => StatusCode::BAD_REQUEST,
            AppError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AppError::Database(e) => match e {
                DatabaseError::UniqueConstraintViolation(_) => StatusCode::CONFLICT,
                DatabaseError::NotFound(_) => StatusCode::NOT_FOUND,
                DatabaseError::ConnectionPool(_) => StatusCode::SERVICE_UNAVAILABLE,
                DatabaseError::UnexpectedError(_) => StatusCode::INTERNAL_SERVER_ERROR,
            },
            AppError::Ledger(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Auth(e) => match e {
                AuthError::IncorrectPassword => StatusCode::UNPROCESSABLE_ENTITY,
                AuthError::MissingToken => StatusCode::BAD_REQUEST,
                AuthError::Token(token_error) => token_error.status_code(),
                AuthError::UnrecognizedRefreshToken => StatusCode::UNAUTHORIZED,
            },
            AppError::Config(_) => StatusCode::INTERNAL_SERVER_ERROR,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let request_id = uuid::Uuid::new_v4().to_string();
        self.log(&request_id);

        let status = self.status_code();
        let (code, message) = self.public_parts();
        HttpResponse::build(status).json(ErrorResponse::new(
            request_id,
            message,
            code.to_string(),
            status.as_u16(),
        ))
    }
}

// ============================================================================
// 4. ERROR CONTEXT
// ============================================================================

/// Per-request context attached to handler logs
#[derive(Debug, Clone)]
pub struct ErrorContext {
    pub request_id: String,
    pub user_id: Option<String>,
    pub operation: String,
}

impl ErrorContext {
    pub fn new(operation: impl Into<String>) -> Self {
        Self {
            request_id: uuid::Uuid::new_v4().to_string(),
            user_id: None,
            operation: operation.into(),
        }
    }

    pub fn with_user_id(mut self, user_id: String) -> Self {
        self.user_id = Some(user_id);
        self
    }

    /// Log a failure with this context, then hand the error back
    pub fn record(&self, error: AppError) -> AppError {
        tracing::warn!(
            request_id = %self.request_id,
            operation = %self.operation,
            user_id = ?self.user_id,
            error = %error,
            "Operation failed"
        );
        error
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::TokenKind;

    #[test]
    fn test_validation_error_display() {
        let err = ValidationError::TooShort("password".to_string(), 4);
        assert_eq!(err.to_string(), "password must be at least 4 characters long");
    }

    #[test]
    fn test_validation_maps_to_422() {
        let err: AppError = ValidationError::EmailNotRegistered.into();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[test]
    fn test_malformed_body_is_bad_request() {
        let err: AppError = ValidationError::MalformedBody.into();
        let (code, message) = err.public_parts();

        assert_eq!(err.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(code, "MALFORMED_BODY");
        assert_eq!(message, "Request body must be a JSON object");
    }

    #[test]
    fn test_ledger_not_found_becomes_unauthenticated() {
        let err: AppError = LedgerError::NotFound.into();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
        assert!(matches!(
            err,
            AppError::Auth(AuthError::UnrecognizedRefreshToken)
        ));
    }

    #[test]
    fn test_ledger_write_failure_is_internal() {
        let err: AppError = LedgerError::WriteNotApplied {
            operation: "rotate",
            rows_affected: 0,
        }
        .into();
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[test]
    fn test_token_errors_keep_their_status() {
        let malformed: AppError = TokenError::Malformed.into();
        let expired: AppError = TokenError::Expired.into();
        let wrong_kind: AppError = TokenError::WrongKind {
            expected: TokenKind::Refresh,
            found: TokenKind::Access,
        }
        .into();

        assert_eq!(malformed.status_code(), StatusCode::BAD_REQUEST);
        assert_eq!(expired.status_code(), StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_kind.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[test]
    fn test_internal_message_is_not_leaked() {
        let err = AppError::Internal("bcrypt exploded: details".to_string());
        let (code, message) = err.public_parts();
        assert_eq!(code, "INTERNAL_ERROR");
        assert!(!message.contains("bcrypt"));
    }

    #[test]
    fn test_error_response_creation() {
        let response = ErrorResponse::new(
            "test-123".to_string(),
            "Test error".to_string(),
            "TEST_ERROR".to_string(),
            400,
        );

        assert_eq!(response.error_id, "test-123");
        assert_eq!(response.code, "TEST_ERROR");
        assert_eq!(response.status, 400);
    }

    #[test]
    fn test_error_context_creation() {
        let ctx = ErrorContext::new("token_refresh");
        assert_eq!(ctx.operation, "token_refresh");
        assert!(ctx.user_id.is_none());

        let ctx = ctx.with_user_id("user-123".to_string());
        assert_eq!(ctx.user_id, Some("user-123".to_string()));
    }
}
