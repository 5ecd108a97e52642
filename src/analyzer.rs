//! Clothing recommendations from a trip's daily forecasts
//!
//! Temperatures are in °F. Every threshold is an exclusive upper bound: a value
//! sitting exactly on a bound belongs to the warmer tier.

use crate::models::{ClothingCategory, Forecast, Recommendation, TripId};

pub const VERY_COLD: f64 = 41.0;
pub const COLD: f64 = 50.0;
pub const COOL: f64 = 68.0;
pub const WARM: f64 = 77.0;

/// Precipitation probability (%) above which rain gear is packed
pub const RAIN_THRESHOLD: f64 = 30.0;
/// UV index at or above which sun protection is packed
pub const HIGH_UV: u32 = 6;

pub const NO_DATA: &str = "No data available";
pub const NO_ACCESSORIES: &str = "No special accessories needed";
const RAIN_JACKET_SUFFIX: &str = ". Also bring a waterproof rain jacket";

/// Ordered (exclusive upper bound, label) tiers with a fallback for anything warmer
struct Tiers {
    bounds: &'static [(f64, &'static str)],
    warmest: &'static str,
}

impl Tiers {
    fn pick(&self, value: f64) -> &'static str {
        self.bounds
            .iter()
            .find(|(bound, _)| value < *bound)
            .map_or(self.warmest, |&(_, label)| label)
    }
}

const OUTERWEAR: Tiers = Tiers {
    bounds: &[
        (VERY_COLD, "Heavy winter coat or insulated parka"),
        (COLD, "Winter jacket or heavy sweater"),
        (COOL, "Light jacket, cardigan, or sweater"),
    ],
    warmest: "Light cardigan or no jacket needed",
};

const TOPS: Tiers = Tiers {
    bounds: &[
        (VERY_COLD, "Thermal base layers and long-sleeve sweaters"),
        (COLD, "Long-sleeve shirts and sweaters"),
        (COOL, "Long-sleeve shirts or light sweaters"),
        (WARM, "T-shirts, polo shirts, and light tops"),
    ],
    warmest: "T-shirts, tank tops, and breathable fabrics",
};

const BOTTOMS: Tiers = Tiers {
    bounds: &[
        (VERY_COLD, "Insulated pants or jeans with thermal layers"),
        (COOL, "Jeans or casual pants"),
    ],
    warmest: "Shorts, light pants, or skirts",
};

const FOOTWEAR: Tiers = Tiers {
    bounds: &[(COLD, "Insulated boots or closed-toe shoes")],
    warmest: "Sneakers, sandals, or comfortable walking shoes",
};

const WATERPROOF_FOOTWEAR: &str = "Waterproof boots or water-resistant shoes";

/// Aggregate statistics over the trip's days
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WeatherSummary {
    pub min_temp: f64,
    pub max_temp: f64,
    pub avg_temp: f64,
    pub max_uv: u32,
    pub will_rain: bool,
    pub high_uv: bool,
}

impl WeatherSummary {
    /// Summarize the given forecasts; `None` when there are none.
    ///
    /// Missing per-day values are skipped. When no day reports a min or max
    /// temperature the average stands in for it.
    #[must_use]
    pub fn from_forecasts(forecasts: &[Forecast]) -> Option<Self> {
        if forecasts.is_empty() {
            return None;
        }

        let days = || forecasts.iter().map(|f| &f.weather);

        let averages: Vec<f64> = days().filter_map(|d| d.temperature_avg).collect();
        let avg_temp = if averages.is_empty() {
            0.0
        } else {
            averages.iter().sum::<f64>() / averages.len() as f64
        };

        let min_temp = days()
            .filter_map(|d| d.temperature_min)
            .reduce(f64::min)
            .unwrap_or(avg_temp);
        let max_temp = days()
            .filter_map(|d| d.temperature_max)
            .reduce(f64::max)
            .unwrap_or(avg_temp);
        let max_uv = days().filter_map(|d| d.uv_index_max).max().unwrap_or(0);

        let will_rain = days().any(|d| d.precipitation_probability.unwrap_or(0.0) > RAIN_THRESHOLD);
        let high_uv = days().any(|d| d.uv_index_max.unwrap_or(0) >= HIGH_UV);

        Some(Self {
            min_temp,
            max_temp,
            avg_temp,
            max_uv,
            will_rain,
            high_uv,
        })
    }
}

/// One recommendation text per clothing category
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PackingList {
    pub outerwear: String,
    pub tops: String,
    pub bottoms: String,
    pub footwear: String,
    pub accessories: String,
}

impl PackingList {
    fn no_data() -> Self {
        Self {
            outerwear: NO_DATA.to_string(),
            tops: NO_DATA.to_string(),
            bottoms: NO_DATA.to_string(),
            footwear: NO_DATA.to_string(),
            accessories: NO_DATA.to_string(),
        }
    }

    #[must_use]
    pub fn get(&self, category: ClothingCategory) -> &str {
        match category {
            ClothingCategory::Outerwear => &self.outerwear,
            ClothingCategory::Tops => &self.tops,
            ClothingCategory::Bottoms => &self.bottoms,
            ClothingCategory::Footwear => &self.footwear,
            ClothingCategory::Accessories => &self.accessories,
        }
    }

    /// One recommendation per category, in category order
    #[must_use]
    pub fn into_recommendations(self, trip_id: TripId) -> Vec<Recommendation> {
        ClothingCategory::ALL
            .iter()
            .map(|&category| Recommendation::new(trip_id, category, self.get(category)))
            .collect()
    }
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ClothingAnalyzer;

impl ClothingAnalyzer {
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Recommend clothing for the given days. Input order does not matter.
    #[must_use]
    pub fn analyze(&self, forecasts: &[Forecast]) -> PackingList {
        let mut days = forecasts.to_vec();
        days.sort_by_key(Forecast::date);

        match WeatherSummary::from_forecasts(&days) {
            Some(summary) => Self::recommend(&summary),
            None => PackingList::no_data(),
        }
    }

    fn recommend(summary: &WeatherSummary) -> PackingList {
        PackingList {
            outerwear: Self::outerwear(summary),
            tops: TOPS.pick(summary.avg_temp).to_string(),
            bottoms: BOTTOMS.pick(summary.min_temp).to_string(),
            footwear: Self::footwear(summary),
            accessories: Self::accessories(summary),
        }
    }

    fn outerwear(summary: &WeatherSummary) -> String {
        let base = OUTERWEAR.pick(summary.avg_temp);
        if summary.will_rain {
            format!("{base}{RAIN_JACKET_SUFFIX}")
        } else {
            base.to_string()
        }
    }

    fn footwear(summary: &WeatherSummary) -> String {
        if summary.will_rain {
            WATERPROOF_FOOTWEAR.to_string()
        } else {
            FOOTWEAR.pick(summary.min_temp).to_string()
        }
    }

    fn accessories(summary: &WeatherSummary) -> String {
        let mut items = Vec::new();
        if summary.will_rain {
            items.push("Umbrella".to_string());
        }
        if summary.min_temp < VERY_COLD {
            items.push("Hat, scarf, and gloves".to_string());
        }
        if summary.high_uv || summary.max_temp > WARM {
            items.push(format!(
                "Sunglasses and sunscreen (UV index {})",
                summary.max_uv
            ));
        }

        if items.is_empty() {
            NO_ACCESSORIES.to_string()
        } else {
            items.join(", ")
        }
    }
}
