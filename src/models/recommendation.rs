//! Packing recommendations and trip/forecast links

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

use super::{ForecastId, TripId};

/// Clothing category, one recommendation per category per trip
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum ClothingCategory {
    Outerwear,
    Tops,
    Bottoms,
    Footwear,
    Accessories,
}

impl ClothingCategory {
    pub const ALL: [ClothingCategory; 5] = [
        ClothingCategory::Outerwear,
        ClothingCategory::Tops,
        ClothingCategory::Bottoms,
        ClothingCategory::Footwear,
        ClothingCategory::Accessories,
    ];

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            ClothingCategory::Outerwear => "outerwear",
            ClothingCategory::Tops => "tops",
            ClothingCategory::Bottoms => "bottoms",
            ClothingCategory::Footwear => "footwear",
            ClothingCategory::Accessories => "accessories",
        }
    }
}

impl fmt::Display for ClothingCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Recommendation {
    pub id: Uuid,
    pub trip_id: TripId,
    pub category: ClothingCategory,
    pub details: String,
    pub created_at: DateTime<Utc>,
}

impl Recommendation {
    #[must_use]
    pub fn new(trip_id: TripId, category: ClothingCategory, details: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            category,
            details: details.into(),
            created_at: Utc::now(),
        }
    }
}

/// Join record between a trip and a shared forecast.
///
/// Carries the forecast's (city, date) key so stores can resolve it without a
/// secondary index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TripForecastLink {
    pub id: Uuid,
    pub trip_id: TripId,
    pub forecast_id: ForecastId,
    pub city: String,
    pub date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

impl TripForecastLink {
    #[must_use]
    pub fn new(trip_id: TripId, forecast: &super::Forecast) -> Self {
        Self {
            id: Uuid::new_v4(),
            trip_id,
            forecast_id: forecast.id,
            city: forecast.city.clone(),
            date: forecast.date(),
            created_at: Utc::now(),
        }
    }
}
