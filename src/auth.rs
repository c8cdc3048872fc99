// src/auth.rs
use crate::db::{accounts, Database};
use crate::error::AuthError;
use crate::models::UserId;
use bcrypt::{hash, verify};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use log::{info, warn};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tokio::task;

#[derive(Debug, Serialize, Deserialize)]
struct Claims {
    sub: String,
    username: String,
    exp: usize,
}

#[derive(Debug, Deserialize)]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub confirmation: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct LoginResponse {
    pub token: String,
    pub user_id: UserId,
    pub expires_in: u64,
}

/// Registers users, checks passwords and issues the tokens the API trusts.
pub struct AuthService {
    db: Database,
    secret: Vec<u8>,
    token_ttl: Duration,
    bcrypt_cost: u32,
    starting_cash: Decimal,
}

impl AuthService {
    pub fn new(
        db: Database,
        secret: &str,
        token_ttl: Duration,
        bcrypt_cost: u32,
        starting_cash: Decimal,
    ) -> Self {
        Self {
            db,
            secret: secret.as_bytes().to_vec(),
            token_ttl,
            bcrypt_cost,
            starting_cash,
        }
    }

    /// Creates the user and its account funded with the starting cash.
    pub async fn register(&self, req: &RegisterRequest) -> Result<UserId, AuthError> {
        let username = req.username.trim();
        if username.is_empty() {
            return Err(AuthError::Validation("must provide username".to_string()));
        }
        if req.password.is_empty() {
            return Err(AuthError::Validation("must provide password".to_string()));
        }
        if req.confirmation.is_empty() {
            return Err(AuthError::Validation("must confirm password".to_string()));
        }
        if req.confirmation != req.password {
            return Err(AuthError::Validation(
                "confirmation password must match the password".to_string(),
            ));
        }

        let password = req.password.clone();
        let cost = self.bcrypt_cost;
        let password_hash = task::spawn_blocking(move || hash(password, cost)).await??;
        let starting_cash = self.starting_cash;
        let user_id = self
            .db
            .write(|conn| {
                if accounts::username_exists(conn, username)? {
                    return Err(AuthError::UsernameTaken);
                }
                Ok(accounts::create(conn, username, &password_hash, starting_cash)?)
            })
            .await?;

        info!("Registered user {} as {}", username, user_id);
        Ok(user_id)
    }

    pub async fn login(&self, req: &LoginRequest) -> Result<LoginResponse, AuthError> {
        let username = req.username.trim();
        if username.is_empty() || req.password.is_empty() {
            return Err(AuthError::Validation(
                "must provide username and password".to_string(),
            ));
        }

        let credentials = self
            .db
            .read(|conn| accounts::find_credentials(conn, username))
            .await?;
        let user_id = match credentials {
            Some((user_id, stored_hash)) => {
                let password = req.password.clone();
                task::spawn_blocking(move || verify(password, &stored_hash))
                    .await??
                    .then_some(user_id)
            }
            None => None,
        };
        let user_id = match user_id {
            Some(user_id) => user_id,
            None => {
                warn!("Failed login for {}", username);
                return Err(AuthError::InvalidCredentials);
            }
        };

        let token = self.create_token(user_id, username)?;
        info!("User {} logged in", user_id);
        Ok(LoginResponse {
            token,
            user_id,
            expires_in: self.token_ttl.as_secs(),
        })
    }

    pub fn create_token(&self, user_id: UserId, username: &str) -> Result<String, AuthError> {
        let exp = Utc::now().timestamp().max(0) as u64 + self.token_ttl.as_secs();
        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            exp: exp as usize,
        };
        Ok(encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(&self.secret),
        )?)
    }

    /// Resolves a bearer token to the user it was issued for.
    pub fn verify_token(&self, token: &str) -> Result<UserId, AuthError> {
        let data = decode::<Claims>(
            token,
            &DecodingKey::from_secret(&self.secret),
            &Validation::default(),
        )
        .map_err(|_| AuthError::Unauthorized)?;
        data.claims
            .sub
            .parse::<UserId>()
            .map_err(|_| AuthError::Unauthorized)
    }
}
