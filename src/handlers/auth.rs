use axum::{
    extract::State,
    http::StatusCode,
    response::Json,
    Extension,
};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::Utc;
use jsonwebtoken::{encode, EncodingKey, Header};
use mongodb::bson::{doc, oid::ObjectId};
use validator::Validate;

use crate::database::repository::{is_duplicate_key, Repository};
use crate::errors::{AppError, Result};
use crate::models::user::{
    AuthResponse, Claims, LoginUser, RegisterUser, User, UserResponse, UserRole,
};
use crate::state::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterUser>,
) -> Result<(StatusCode, Json<AuthResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::invalid_data(e.to_string()))?;

    // Friendly check first; the unique email index still catches races
    let existing = state
        .users
        .collection()
        .find_one(doc! { "email": &payload.email })
        .await?;
    if existing.is_some() {
        return Err(AppError::DuplicateKey);
    }

    let password_hash = hash(&payload.password, DEFAULT_COST)
        .map_err(|_| AppError::service("Failed to hash password"))?;

    let mut user = User {
        _id: None,
        name: payload.name,
        email: payload.email,
        password_hash,
        image: None,
        role: UserRole::default(),
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let inserted_id = match state.users.create(&user).await {
        Ok(id) => id,
        Err(AppError::MongoDB(ref err)) if is_duplicate_key(err) => {
            return Err(AppError::DuplicateKey)
        }
        Err(err) => return Err(err),
    };
    user._id = Some(inserted_id);

    let token = issue_token(&user, &state.config.jwt_secret)?;

    Ok((
        StatusCode::CREATED,
        Json(AuthResponse {
            user: UserResponse::from(&user),
            token,
        }),
    ))
}

pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginUser>,
) -> Result<Json<AuthResponse>> {
    let user = state
        .users
        .collection()
        .find_one(doc! { "email": &payload.email })
        .await?
        .ok_or(AppError::AuthError)?;

    // Verify password
    let valid = verify(&payload.password, &user.password_hash).map_err(|_| AppError::AuthError)?;
    if !valid {
        return Err(AppError::AuthError);
    }

    let token = issue_token(&user, &state.config.jwt_secret)?;

    Ok(Json(AuthResponse {
        user: UserResponse::from(&user),
        token,
    }))
}

pub async fn me(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> Result<Json<UserResponse>> {
    let user_id = ObjectId::parse_str(&claims.sub)?;
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok(Json(UserResponse::from(&user)))
}

// Tokens carry the role so admin checks never need a user lookup.
fn issue_token(user: &User, secret: &str) -> Result<String> {
    let claims = Claims {
        sub: user._id.map(|id| id.to_hex()).unwrap_or_default(),
        email: user.email.clone(),
        role: user.role,
        exp: (Utc::now().timestamp() + 86400) as usize, // 24 hours
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|_| AppError::AuthError)
}
