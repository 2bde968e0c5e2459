use crate::auth::models::{JwtClaims, UserContext};
use crate::error::HttpAppError;
use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Response},
};
use dropkit_core::AppError;
use jsonwebtoken::{decode, Algorithm, DecodingKey, Validation};
use std::sync::Arc;

#[derive(Clone)]
pub struct AuthState {
    decoding_key: DecodingKey,
    validation: Validation,
}

impl AuthState {
    pub fn new(jwt_secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.validate_exp = true;
        Self {
            decoding_key: DecodingKey::from_secret(jwt_secret.as_bytes()),
            validation,
        }
    }

    fn decode(&self, token: &str) -> Result<JwtClaims, AppError> {
        decode::<JwtClaims>(token, &self.decoding_key, &self.validation)
            .map(|data| data.claims)
            .map_err(|e| AppError::Unauthorized(format!("Invalid token: {}", e)))
    }
}

/// Resolve the bearer token to a [`UserContext`] or reject with 401.
///
/// The 401 never reveals whether a referenced resource exists; ownership
/// checks (403 vs 404) happen per-handler once the identity is known.
pub async fn auth_middleware(
    State(auth_state): State<Arc<AuthState>>,
    mut request: Request,
    next: Next,
) -> Response {
    let auth_header = match request
        .headers()
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
    {
        Some(h) => h,
        None => {
            return HttpAppError(AppError::Unauthorized(
                "Missing authorization header".to_string(),
            ))
            .into_response();
        }
    };

    let Some(token) = auth_header.strip_prefix("Bearer ") else {
        return HttpAppError(AppError::Unauthorized(
            "Invalid authorization header format".to_string(),
        ))
        .into_response();
    };

    match auth_state.decode(token) {
        Ok(claims) => {
            request.extensions_mut().insert(UserContext {
                user_id: claims.sub,
            });
            next.run(request).await
        }
        Err(e) => HttpAppError(e).into_response(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn token(secret: &str, claims: &JwtClaims) -> String {
        encode(
            &Header::new(Algorithm::HS256),
            claims,
            &EncodingKey::from_secret(secret.as_bytes()),
        )
        .unwrap()
    }

    #[test]
    fn valid_token_roundtrip() {
        let user_id = Uuid::new_v4();
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: user_id,
            exp: now + 3600,
            iat: now,
        };

        let state = AuthState::new("test-secret");
        let decoded = state.decode(&token("test-secret", &claims)).unwrap();
        assert_eq!(decoded.sub, user_id);
    }

    #[test]
    fn wrong_secret_rejected() {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: Uuid::new_v4(),
            exp: now + 3600,
            iat: now,
        };

        let state = AuthState::new("right-secret");
        assert!(state.decode(&token("wrong-secret", &claims)).is_err());
    }

    #[test]
    fn expired_token_rejected() {
        let now = Utc::now().timestamp();
        let claims = JwtClaims {
            sub: Uuid::new_v4(),
            exp: now - 3600,
            iat: now - 7200,
        };

        let state = AuthState::new("test-secret");
        assert!(state.decode(&token("test-secret", &claims)).is_err());
    }
}
