use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::Json,
    Extension,
};
use chrono::Utc;
use futures_util::TryStreamExt;
use mongodb::bson::{self, doc, oid::ObjectId};
use validator::Validate;

use crate::database::repository::{is_duplicate_key, Repository};
use crate::errors::{AppError, Result};
use crate::models::trip::{CreateTripRequest, Trip, TripQuery, TripResponse, UpdateTripRequest};
use crate::models::user::Claims;
use crate::state::AppState;

const DEFAULT_LIST_LIMIT: i64 = 50;

pub async fn list_trips(
    State(state): State<AppState>,
    Query(query): Query<TripQuery>,
) -> Result<Json<Vec<TripResponse>>> {
    let mut filter = doc! {};
    if let Some(featured) = query.featured {
        filter.insert("featured", featured);
    }
    if let Some(trending) = query.trending {
        filter.insert("trending", trending);
    }
    if let Some(difficulty) = query.difficulty {
        filter.insert("difficulty", difficulty.as_str());
    }

    let limit = query.limit.unwrap_or(DEFAULT_LIST_LIMIT).clamp(1, 200);
    let cursor = state
        .trips
        .collection()
        .find(filter)
        .sort(doc! { "created_at": -1 })
        .skip(query.skip.unwrap_or(0))
        .limit(limit)
        .await?;
    let trips: Vec<Trip> = cursor.try_collect().await?;

    Ok(Json(trips.iter().map(TripResponse::from).collect()))
}

// Detail pages link by slug, admin tools by id; accept either.
pub async fn get_trip(
    State(state): State<AppState>,
    Path(id_or_slug): Path<String>,
) -> Result<Json<TripResponse>> {
    let trip = match ObjectId::parse_str(&id_or_slug) {
        Ok(id) => state.trips.find_by_id(id).await?,
        // The slug index is unique, so at most one match comes back
        Err(_) => state
            .trips
            .find(doc! { "slug": &id_or_slug })
            .await?
            .into_iter()
            .next(),
    };

    let trip = trip.ok_or(AppError::TripNotFound)?;
    Ok(Json(TripResponse::from(&trip)))
}

pub async fn create_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(payload): Json<CreateTripRequest>,
) -> Result<(StatusCode, Json<TripResponse>)> {
    payload
        .validate()
        .map_err(|e| AppError::invalid_data(e.to_string()))?;

    let slug = match payload.slug {
        Some(ref s) if !s.trim().is_empty() => s.trim().to_string(),
        _ => slugify(&payload.title),
    };

    let mut trip = Trip {
        _id: None,
        title: payload.title,
        slug,
        description: payload.description,
        price: payload.price,
        duration: payload.duration,
        max_group_size: payload.max_group_size,
        difficulty: payload.difficulty,
        locations: payload.locations,
        cover_image: payload.cover_image,
        featured: payload.featured,
        trending: payload.trending,
        created_by: ObjectId::parse_str(&claims.sub).ok(),
        updated_by: None,
        created_at: Utc::now(),
        updated_at: Utc::now(),
    };

    let inserted_id = match state.trips.create(&trip).await {
        Ok(id) => id,
        Err(AppError::MongoDB(ref err)) if is_duplicate_key(err) => {
            return Err(AppError::DuplicateKey)
        }
        Err(err) => return Err(err),
    };
    trip._id = Some(inserted_id);

    Ok((StatusCode::CREATED, Json(TripResponse::from(&trip))))
}

pub async fn update_trip(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateTripRequest>,
) -> Result<Json<TripResponse>> {
    let trip_id = ObjectId::parse_str(&id)?;

    let mut set = bson::to_document(&payload)
        .map_err(|e| AppError::invalid_data(format!("Invalid update payload: {}", e)))?;
    if set.is_empty() {
        return Err(AppError::invalid_data("No fields to update"));
    }

    set.insert("updated_at", bson::DateTime::from_chrono(Utc::now()));
    if let Ok(updated_by) = ObjectId::parse_str(&claims.sub) {
        set.insert("updated_by", updated_by);
    }

    let trip = state
        .trips
        .update(trip_id, doc! { "$set": set })
        .await?
        .ok_or(AppError::TripNotFound)?;

    Ok(Json(TripResponse::from(&trip)))
}

pub async fn delete_trip(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<serde_json::Value>> {
    let trip_id = ObjectId::parse_str(&id)?;

    let deleted = state.trips.delete(trip_id).await?;
    if !deleted {
        return Err(AppError::TripNotFound);
    }

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Trip deleted"
    })))
}

fn slugify(title: &str) -> String {
    let mut slug = String::with_capacity(title.len());
    let mut last_dash = true;
    for ch in title.chars() {
        if ch.is_ascii_alphanumeric() {
            slug.push(ch.to_ascii_lowercase());
            last_dash = false;
        } else if !last_dash {
            slug.push('-');
            last_dash = true;
        }
    }
    slug.trim_end_matches('-').to_string()
}
