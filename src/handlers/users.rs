use axum::{
    extract::{Path, Query, State},
    response::Json,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::{doc, oid::ObjectId, DateTime as BsonDateTime};
use serde::{Deserialize, Serialize};

use crate::database::repository::Repository;
use crate::errors::{AppError, Result};
use crate::models::user::{UpdateUserRole, User, UserResponse, UserRole};
use crate::state::AppState;

#[derive(Debug, Deserialize)]
pub struct UserListQuery {
    pub page: Option<u64>,
    pub limit: Option<i64>,
    pub role: Option<UserRole>,
}

#[derive(Debug, Serialize)]
pub struct Pagination {
    pub page: u64,
    pub limit: i64,
    pub total: u64,
    pub pages: u64,
}

#[derive(Debug, Serialize)]
pub struct UserListResponse {
    pub users: Vec<UserResponse>,
    pub pagination: Pagination,
}

pub async fn list_users(
    State(state): State<AppState>,
    Query(query): Query<UserListQuery>,
) -> Result<Json<UserListResponse>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query.limit.unwrap_or(10).clamp(1, 100);

    let mut filter = doc! {};
    if let Some(role) = query.role {
        filter.insert("role", role.as_str());
    }

    let collection = state.users.collection();
    let total = collection.count_documents(filter.clone()).await?;

    let cursor = collection
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip((page - 1) * limit as u64)
        .limit(limit)
        .await?;
    let users: Vec<User> = cursor.try_collect().await?;

    Ok(Json(UserListResponse {
        users: users.iter().map(UserResponse::from).collect(),
        pagination: Pagination {
            page,
            limit,
            total,
            pages: (total + limit as u64 - 1) / limit as u64,
        },
    }))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<UserResponse>> {
    let user_id = ObjectId::parse_str(&id)?;
    let user = state
        .users
        .find_by_id(user_id)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok(Json(UserResponse::from(&user)))
}

pub async fn update_user_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRole>,
) -> Result<Json<UserResponse>> {
    let user_id = ObjectId::parse_str(&id)?;

    let update = doc! {
        "$set": {
            "role": payload.role.as_str(),
            "updated_at": BsonDateTime::from_chrono(Utc::now()),
        }
    };
    let user = state
        .users
        .update(user_id, update)
        .await?
        .ok_or(AppError::UserNotFound)?;

    Ok(Json(UserResponse::from(&user)))
}

pub async fn delete_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let user_id = ObjectId::parse_str(&id)?;

    let deleted = state.users.delete(user_id).await?;
    if !deleted {
        return Err(AppError::UserNotFound);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "User deleted"
    })))
}
