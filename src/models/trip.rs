use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_with::skip_serializing_none;
use mongodb::bson::oid::ObjectId;
use mongodb::bson;
use validator::Validate;

fn default_currency() -> String {
    "INR".to_string()
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Price {
    pub amount: f64,
    #[serde(default = "default_currency")]
    pub currency: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TripDuration {
    pub days: i32,
    pub nights: i32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TripDifficulty {
    Easy,
    Moderate,
    Difficult,
}

impl TripDifficulty {
    pub fn as_str(&self) -> &'static str {
        match self {
            TripDifficulty::Easy => "easy",
            TripDifficulty::Moderate => "moderate",
            TripDifficulty::Difficult => "difficult",
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Trip {
    #[serde(rename = "_id", skip_serializing_if = "Option::is_none")]
    pub _id: Option<ObjectId>,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: Price,
    pub duration: TripDuration,
    pub max_group_size: i32,
    pub difficulty: TripDifficulty,
    pub locations: Vec<String>,
    pub cover_image: String,

    #[serde(default)]
    pub featured: bool,

    #[serde(default)]
    pub trending: bool,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_by: Option<ObjectId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub updated_by: Option<ObjectId>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,

    #[serde(with = "bson::serde_helpers::chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
}

// For creating new trips
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateTripRequest {
    #[validate(length(min = 1, message = "Title is required"))]
    pub title: String,
    pub slug: Option<String>,
    #[validate(length(min = 1, message = "Description is required"))]
    pub description: String,
    pub price: Price,
    pub duration: TripDuration,
    pub max_group_size: i32,
    pub difficulty: TripDifficulty,
    #[serde(default)]
    pub locations: Vec<String>,
    pub cover_image: String,
    #[serde(default)]
    pub featured: bool,
    #[serde(default)]
    pub trending: bool,
}

// For partial updates, only set fields make it into the $set document.
// Wire names are camelCase; the serialized form keeps the stored field names.
#[skip_serializing_none]
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all(deserialize = "camelCase"))]
pub struct UpdateTripRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub price: Option<Price>,
    pub duration: Option<TripDuration>,
    pub max_group_size: Option<i32>,
    pub difficulty: Option<TripDifficulty>,
    pub locations: Option<Vec<String>>,
    pub cover_image: Option<String>,
    pub featured: Option<bool>,
    pub trending: Option<bool>,
}

// For query parameters
#[derive(Debug, Deserialize)]
pub struct TripQuery {
    pub featured: Option<bool>,
    pub trending: Option<bool>,
    pub difficulty: Option<TripDifficulty>,
    pub limit: Option<i64>,
    pub skip: Option<u64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TripResponse {
    pub id: String,
    pub title: String,
    pub slug: String,
    pub description: String,
    pub price: Price,
    pub duration: TripDuration,
    pub max_group_size: i32,
    pub difficulty: TripDifficulty,
    pub locations: Vec<String>,
    pub cover_image: String,
    pub featured: bool,
    pub trending: bool,
}

impl From<&Trip> for TripResponse {
    fn from(trip: &Trip) -> Self {
        TripResponse {
            id: trip
                ._id
                .map(|id| id.to_hex())
                .unwrap_or_default(),
            title: trip.title.clone(),
            slug: trip.slug.clone(),
            description: trip.description.clone(),
            price: trip.price.clone(),
            duration: trip.duration.clone(),
            max_group_size: trip.max_group_size,
            difficulty: trip.difficulty,
            locations: trip.locations.clone(),
            cover_image: trip.cover_image.clone(),
            featured: trip.featured,
            trending: trip.trending,
        }
    }
}
