/// Bearer token extraction
///
/// Pulls the raw token out of `Authorization: Bearer <token>`. Verifying it
/// is left to the handler, which knows whether an access or a refresh token
/// is expected.

use actix_web::dev::Payload;
use actix_web::http::header::{HeaderMap, AUTHORIZATION};
use actix_web::{FromRequest, HttpRequest};
use futures::future::{ready, Ready};

use crate::error::{AppError, AuthError};

const BEARER_PREFIX: &str = "Bearer ";

/// Raw token string from the Authorization header, prefix stripped
#[derive(Debug, Clone)]
pub struct BearerToken(pub String);

impl BearerToken {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

fn bearer_from_headers(headers: &HeaderMap) -> Result<BearerToken, AuthError> {
    let value = headers
        .get(AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or(AuthError::MissingToken)?;

    let token = value
        .strip_prefix(BEARER_PREFIX)
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or(AuthError::MissingToken)?;

    Ok(BearerToken(token.to_string()))
}

impl FromRequest for BearerToken {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _: &mut Payload) -> Self::Future {
        ready(bearer_from_headers(req.headers()).map_err(AppError::from))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::http::header::HeaderValue;

    fn headers_with(value: &str) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(AUTHORIZATION, HeaderValue::from_str(value).unwrap());
        headers
    }

    #[test]
    fn test_extracts_token() {
        let token = bearer_from_headers(&headers_with("Bearer abc.def.ghi")).unwrap();
        assert_eq!(token.as_str(), "abc.def.ghi");
    }

    #[test]
    fn test_missing_header() {
        assert_eq!(
            bearer_from_headers(&HeaderMap::new()).unwrap_err(),
            AuthError::MissingToken
        );
    }

    #[test]
    fn test_rejects_malformed_headers() {
        for value in ["Bearer", "Bearer ", "Basic dXNlcjpwYXNz", "BearerToken", ""] {
            assert!(
                bearer_from_headers(&headers_with(value)).is_err(),
                "accepted {:?}",
                value
            );
        }
    }
}
