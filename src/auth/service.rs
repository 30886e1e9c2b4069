/// Signup, login, refresh and authenticated fetch.
///
/// Refresh-token lifecycle: `issued -> current -> rotated-out`. A rotated-out
/// token has no ledger entry, so presenting it again fails the same way as
/// presenting a token that was never issued.

use std::sync::Arc;

use uuid::Uuid;

use crate::auth::password::{hash_password, verify_password};
use crate::auth::{RefreshTokenLedger, TokenCodec, TokenError, TokenKind};
use crate::database::{User, UserStore};
use crate::error::{AppError, AuthError, DatabaseError, LedgerError, ValidationError};

/// A freshly minted access/refresh token pair
#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Clone)]
pub struct AuthService {
    users: Arc<dyn UserStore>,
    ledger: RefreshTokenLedger,
    tokens: TokenCodec,
}

impl AuthService {
    pub fn new(users: Arc<dyn UserStore>, ledger: RefreshTokenLedger, tokens: TokenCodec) -> Self {
        Self {
            users,
            ledger,
            tokens,
        }
    }

    pub fn tokens(&self) -> &TokenCodec {
        &self.tokens
    }

    /// Register a new account. No tokens are issued here.
    ///
    /// # Errors
    /// - 422 if the email is already registered
    /// - 409 if a concurrent signup claimed the email first
    pub async fn signup(&self, name: &str, email: &str, password: &str) -> Result<Uuid, AppError> {
        if self.users.find_by_email(email).await?.is_some() {
            return Err(ValidationError::EmailAlreadyRegistered.into());
        }

        let password_hash = hash_password(password)?;
        let user_id = self.users.insert(name, email, &password_hash).await?;

        tracing::info!(user_id = %user_id, "User registered");
        Ok(user_id)
    }

    /// Resolve the account a login attempt refers to
    pub async fn find_login_user(&self, email: &str) -> Result<User, AppError> {
        self.users
            .find_by_email(email)
            .await?
            .ok_or_else(|| AppError::from(ValidationError::EmailNotRegistered))
    }

    /// Check the password and, on success, issue and whitelist a token pair.
    ///
    /// A wrong password leaves the ledger untouched.
    pub async fn login(&self, user: &User, password: &str) -> Result<TokenPair, AppError> {
        if !verify_password(password, &user.password_hash) {
            return Err(AuthError::IncorrectPassword.into());
        }

        let pair = self.issue_pair(user.id)?;
        self.ledger.record(user.id, &pair.refresh_token).await?;

        tracing::info!(user_id = %user.id, "User logged in");
        Ok(pair)
    }

    /// Exchange a current refresh token for a new pair, rotating the ledger
    /// entry.
    ///
    /// # Errors
    /// - 400/401 from token parsing
    /// - 401 if the token is not (or no longer) in the ledger
    /// - 500 if the rotation did not land, e.g. a concurrent refresh of the
    ///   same token won the race
    pub async fn refresh(&self, refresh_token: &str) -> Result<TokenPair, AppError> {
        let claims = self.tokens.parse(refresh_token, TokenKind::Refresh)?;
        let user_id = claims.user_id()?;

        let entry = match self.ledger.lookup(refresh_token).await {
            Ok(entry) => entry,
            Err(LedgerError::NotFound) => {
                // Also what a replayed, already-rotated token looks like
                tracing::warn!(user_id = %user_id, "Refresh token not whitelisted");
                return Err(AuthError::UnrecognizedRefreshToken.into());
            }
            Err(e) => return Err(e.into()),
        };

        if entry.user_id != user_id {
            tracing::error!(
                user_id = %user_id,
                owner_id = %entry.user_id,
                "Refresh token subject does not match ledger owner"
            );
            return Err(AuthError::UnrecognizedRefreshToken.into());
        }

        let pair = self.issue_pair(user_id)?;
        self.ledger.rotate(refresh_token, &pair.refresh_token).await?;

        tracing::info!(user_id = %user_id, entry_id = %entry.id, "Refresh token rotated");
        Ok(pair)
    }

    /// Resolve the account behind an access token
    ///
    /// # Errors
    /// - 400/401 from token parsing
    /// - 404 if the account no longer exists
    pub async fn current_user(&self, access_token: &str) -> Result<User, AppError> {
        let claims = self.tokens.parse(access_token, TokenKind::Access)?;
        let user_id = claims.user_id()?;

        self.users.find_by_id(user_id).await?.ok_or_else(|| {
            AppError::from(DatabaseError::NotFound("User Details not found".to_string()))
        })
    }

    fn issue_pair(&self, user_id: Uuid) -> Result<TokenPair, TokenError> {
        Ok(TokenPair {
            access_token: self.tokens.issue(user_id, TokenKind::Access)?,
            refresh_token: self.tokens.issue(user_id, TokenKind::Refresh)?,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::StatusCode;
    use actix_web::ResponseError;
    use async_trait::async_trait;
    use chrono::{Duration, Utc};

    use crate::configuration::JwtSettings;
    use crate::database::{
        InMemoryLedgerStore, InMemoryUserStore, LedgerEntry, LedgerStore,
    };

    fn jwt_settings() -> JwtSettings {
        JwtSettings {
            secret: "test-secret-key-at-least-32-characters-long".to_string(),
            access_token_expiry: 900,
            refresh_token_expiry: 604800,
            issuer: "test".to_string(),
        }
    }

    fn service_with_ledger(store: Arc<dyn LedgerStore>) -> AuthService {
        AuthService::new(
            Arc::new(InMemoryUserStore::default()),
            RefreshTokenLedger::new(store),
            TokenCodec::new(&jwt_settings()).unwrap(),
        )
    }

    fn service() -> AuthService {
        service_with_ledger(Arc::new(InMemoryLedgerStore::default()))
    }

    async fn signed_up_and_logged_in(service: &AuthService) -> (User, TokenPair) {
        service.signup("Alice", "a@x.com", "pass1").await.unwrap();
        let user = service.find_login_user("a@x.com").await.unwrap();
        let pair = service.login(&user, "pass1").await.unwrap();
        (user, pair)
    }

    /// Inserts report zero rows, as if the whitelist write was lost
    struct DroppingInsertStore;

    #[async_trait]
    impl LedgerStore for DroppingInsertStore {
        async fn insert(&self, _: &LedgerEntry) -> Result<u64, LedgerError> {
            Ok(0)
        }
        async fn find_by_digest(&self, _: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
            Ok(Vec::new())
        }
        async fn replace_digest(&self, _: &str, _: &str) -> Result<u64, LedgerError> {
            Ok(0)
        }
        async fn delete_by_digest(&self, _: &str) -> Result<u64, LedgerError> {
            Ok(0)
        }
        async fn delete_by_user(&self, _: Uuid) -> Result<u64, LedgerError> {
            Ok(0)
        }
    }

    /// Behaves normally except that every rotation loses the race
    #[derive(Default)]
    struct LosingRotationStore {
        inner: InMemoryLedgerStore,
    }

    #[async_trait]
    impl LedgerStore for LosingRotationStore {
        async fn insert(&self, entry: &LedgerEntry) -> Result<u64, LedgerError> {
            self.inner.insert(entry).await
        }
        async fn find_by_digest(&self, hash: &str) -> Result<Vec<LedgerEntry>, LedgerError> {
            self.inner.find_by_digest(hash).await
        }
        async fn replace_digest(&self, _: &str, _: &str) -> Result<u64, LedgerError> {
            Ok(0)
        }
        async fn delete_by_digest(&self, hash: &str) -> Result<u64, LedgerError> {
            self.inner.delete_by_digest(hash).await
        }
        async fn delete_by_user(&self, user_id: Uuid) -> Result<u64, LedgerError> {
            self.inner.delete_by_user(user_id).await
        }
    }

    #[tokio::test]
    async fn test_signup_returns_id_of_stored_user() {
        let service = service();
        let user_id = service.signup("Alice", "a@x.com", "pass1").await.unwrap();

        let user = service.find_login_user("a@x.com").await.unwrap();
        assert_eq!(user.id, user_id);
        assert_ne!(user.password_hash, "pass1");
    }

    #[tokio::test]
    async fn test_signup_rejects_taken_email() {
        let service = service();
        service.signup("Alice", "a@x.com", "pass1").await.unwrap();

        let err = service.signup("Alicia", "a@x.com", "pass2").await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_unknown_email_cannot_log_in() {
        let err = service().find_login_user("nobody@x.com").await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Validation(ValidationError::EmailNotRegistered)
        ));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
    }

    #[tokio::test]
    async fn test_wrong_password_issues_nothing() {
        let ledger_store = Arc::new(InMemoryLedgerStore::default());
        let service = service_with_ledger(ledger_store.clone());
        service.signup("Alice", "a@x.com", "pass1").await.unwrap();
        let user = service.find_login_user("a@x.com").await.unwrap();

        let err = service.login(&user, "pass2").await.unwrap_err();

        assert!(matches!(err, AppError::Auth(AuthError::IncorrectPassword)));
        assert_eq!(err.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(ledger_store.delete_by_user(user.id).await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_login_issues_pair_for_user() {
        let service = service();
        let (user, pair) = signed_up_and_logged_in(&service).await;

        let access = service.tokens().parse(&pair.access_token, TokenKind::Access).unwrap();
        let refresh = service.tokens().parse(&pair.refresh_token, TokenKind::Refresh).unwrap();
        assert_eq!(access.user_id().unwrap(), user.id);
        assert_eq!(refresh.user_id().unwrap(), user.id);
    }

    #[tokio::test]
    async fn test_login_aborts_when_whitelist_write_is_lost() {
        let service = service_with_ledger(Arc::new(DroppingInsertStore));
        service.signup("Alice", "a@x.com", "pass1").await.unwrap();
        let user = service.find_login_user("a@x.com").await.unwrap();

        let err = service.login(&user, "pass1").await.unwrap_err();

        assert!(matches!(err, AppError::Ledger(_)));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test]
    async fn test_refresh_rotates_and_retires_old_token() {
        let service = service();
        let (_, first) = signed_up_and_logged_in(&service).await;

        let second = service.refresh(&first.refresh_token).await.unwrap();
        assert_ne!(first.refresh_token, second.refresh_token);
        assert_ne!(first.access_token, second.access_token);

        let replay = service.refresh(&first.refresh_token).await.unwrap_err();
        assert!(matches!(
            replay,
            AppError::Auth(AuthError::UnrecognizedRefreshToken)
        ));
        assert_eq!(replay.status_code(), StatusCode::UNAUTHORIZED);

        assert!(service.refresh(&second.refresh_token).await.is_ok());
    }

    #[tokio::test]
    async fn test_refresh_rejects_access_token() {
        let service = service();
        let (_, pair) = signed_up_and_logged_in(&service).await;

        let err = service.refresh(&pair.access_token).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_rejects_expired_token() {
        let service = service();
        let (user, _) = signed_up_and_logged_in(&service).await;
        let stale = service
            .tokens()
            .issue_at(user.id, TokenKind::Refresh, Utc::now() - Duration::days(30))
            .unwrap();

        let err = service.refresh(&stale).await.unwrap_err();
        assert!(matches!(
            err,
            AppError::Auth(AuthError::Token(TokenError::Expired))
        ));
    }

    #[tokio::test]
    async fn test_refresh_rejects_signed_but_unlisted_token() {
        let service = service();
        let (user, _) = signed_up_and_logged_in(&service).await;
        let unlisted = service.tokens().issue(user.id, TokenKind::Refresh).unwrap();

        let err = service.refresh(&unlisted).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_refresh_surfaces_lost_rotation_as_internal_error() {
        let service = service_with_ledger(Arc::new(LosingRotationStore::default()));
        let (_, pair) = signed_up_and_logged_in(&service).await;

        let err = service.refresh(&pair.refresh_token).await.unwrap_err();

        assert!(matches!(
            err,
            AppError::Ledger(LedgerError::WriteNotApplied { .. })
        ));
        assert_eq!(err.status_code(), StatusCode::INTERNAL_SERVER_ERROR);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_refresh_with_same_token_has_one_winner() {
        let service = service();
        let (_, pair) = signed_up_and_logged_in(&service).await;

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let service = service.clone();
                let token = pair.refresh_token.clone();
                tokio::spawn(async move { service.refresh(&token).await })
            })
            .collect();

        let mut winners = 0;
        for handle in handles {
            match handle.await.unwrap() {
                Ok(_) => winners += 1,
                Err(e) => {
                    let status = e.status_code();
                    assert!(
                        status == StatusCode::UNAUTHORIZED
                            || status == StatusCode::INTERNAL_SERVER_ERROR,
                        "unexpected status {}",
                        status
                    );
                }
            }
        }

        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_current_user_resolves_account() {
        let service = service();
        let (user, pair) = signed_up_and_logged_in(&service).await;

        let fetched = service.current_user(&pair.access_token).await.unwrap();
        assert_eq!(fetched, user);
    }

    #[tokio::test]
    async fn test_current_user_for_missing_account_is_404() {
        let service = service();
        let orphan = service.tokens().issue(Uuid::new_v4(), TokenKind::Access).unwrap();

        let err = service.current_user(&orphan).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn test_current_user_rejects_expired_access_token() {
        let service = service();
        let (user, _) = signed_up_and_logged_in(&service).await;
        let stale = service
            .tokens()
            .issue_at(user.id, TokenKind::Access, Utc::now() - Duration::hours(1))
            .unwrap();

        let err = service.current_user(&stale).await.unwrap_err();
        assert_eq!(err.status_code(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_current_user_rejects_refresh_token_and_garbage() {
        let service = service();
        let (_, pair) = signed_up_and_logged_in(&service).await;

        let wrong_kind = service.current_user(&pair.refresh_token).await.unwrap_err();
        assert_eq!(wrong_kind.status_code(), StatusCode::UNAUTHORIZED);

        let garbage = service.current_user("garbage").await.unwrap_err();
        assert_eq!(garbage.status_code(), StatusCode::BAD_REQUEST);
    }
}
