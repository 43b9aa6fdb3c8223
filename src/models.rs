use crate::attributes::CategoryAttributes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::fmt;

/// Ad categories offered by the marketplace.
///
/// The wire names are the labels the ad service stores; snake_case English
/// aliases are accepted on input so API clients do not need Cyrillic keys.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, Default, PartialEq, Eq, Hash)]
pub enum AdCategory {
    #[default]
    #[serde(rename = "Недвижимость", alias = "real_estate")]
    RealEstate,
    #[serde(rename = "Транспорт", alias = "vehicle")]
    Vehicle,
    #[serde(rename = "Одежда", alias = "clothing")]
    Clothing,
    #[serde(rename = "Электроника", alias = "electronics")]
    Electronics,
    #[serde(rename = "Услуги", alias = "service")]
    Service,
}

impl AdCategory {
    pub const ALL: [AdCategory; 5] = [
        AdCategory::RealEstate,
        AdCategory::Vehicle,
        AdCategory::Clothing,
        AdCategory::Electronics,
        AdCategory::Service,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            AdCategory::RealEstate => "Недвижимость",
            AdCategory::Vehicle => "Транспорт",
            AdCategory::Clothing => "Одежда",
            AdCategory::Electronics => "Электроника",
            AdCategory::Service => "Услуги",
        }
    }

    pub fn slug(&self) -> &'static str {
        match self {
            AdCategory::RealEstate => "real_estate",
            AdCategory::Vehicle => "vehicle",
            AdCategory::Clothing => "clothing",
            AdCategory::Electronics => "electronics",
            AdCategory::Service => "service",
        }
    }

    pub fn from_label(input: &str) -> Option<Self> {
        let trimmed = input.trim();
        AdCategory::ALL
            .into_iter()
            .find(|category| category.label() == trimmed || category.slug() == trimmed)
    }
}

impl fmt::Display for AdCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Identifier of a published ad. The service hands out numeric ids but the
/// client never does arithmetic on them.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct AdId(String);

impl AdId {
    pub fn new(value: impl Into<String>) -> Self {
        Self(value.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for AdId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for AdId {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        #[derive(Deserialize)]
        #[serde(untagged)]
        enum RawId {
            Number(u64),
            Text(String),
        }

        Ok(match RawId::deserialize(deserializer)? {
            RawId::Number(value) => AdId(value.to_string()),
            RawId::Text(value) => AdId(value),
        })
    }
}

/// Record handed to the create-ad endpoint.
#[skip_serializing_none]
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateAdRequest {
    pub title: Option<String>,
    pub description: String,
    pub price: f64,
    pub category: AdCategory,
    pub city_tag: String,
    pub phone: Option<String>,
    pub image_urls: Vec<String>,
    pub category_attributes: CategoryAttributes,
}

/// Ad as returned by the detail and list endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AdRecord {
    pub id: AdId,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub description: String,
    pub price: f64,
    pub category: AdCategory,
    #[serde(alias = "city")]
    pub city_tag: String,
    #[serde(default)]
    pub phone: Option<String>,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, alias = "imageUrl", alias = "image_url")]
    pub image_urls: Vec<String>,
    #[serde(default)]
    pub category_attributes: Option<Value>,
}

impl AdRecord {
    /// Decodes the attribute payload into the variant selected by `category`.
    /// Records created before attributes existed decode to an empty variant.
    pub fn attributes(&self) -> Result<CategoryAttributes, serde_json::Error> {
        match &self.category_attributes {
            Some(Value::Null) | None => Ok(CategoryAttributes::empty(self.category)),
            Some(value) => CategoryAttributes::decode(self.category, value.clone()),
        }
    }
}

#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct StageReport {
    pub name: String,
    pub elapsed_ms: u128,
    pub timestamp: DateTime<Utc>,
    pub output: Value,
}

impl StageReport {
    pub fn new(name: &str, elapsed_ms: u128, output: Value) -> Self {
        Self {
            name: name.to_string(),
            elapsed_ms,
            timestamp: Utc::now(),
            output,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
}
