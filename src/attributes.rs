use crate::models::AdCategory;
use crate::schema::{FieldKind, FieldSpec, schema_for};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use serde_with::skip_serializing_none;
use std::fmt;
use thiserror::Error;

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealEstateAttributes {
    pub rooms: Option<u32>,
    pub floor: Option<i32>,
    pub building_type: Option<String>,
    pub land_size: Option<f64>,
    pub house_area: Option<f64>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VehicleAttributes {
    pub brand: Option<String>,
    pub model: Option<String>,
    pub year: Option<u32>,
    pub mileage: Option<u64>,
    pub fuel: Option<String>,
    pub transmission: Option<String>,
    pub condition: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClothingAttributes {
    pub size: Option<String>,
    pub gender: Option<String>,
    pub material: Option<String>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ElectronicsAttributes {
    pub device_brand: Option<String>,
    pub device_model: Option<String>,
    pub warranty: Option<bool>,
}

#[skip_serializing_none]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServiceAttributes {
    pub service_type: Option<String>,
    pub duration: Option<String>,
}

/// Category-specific attributes of an ad. Exactly one variant is active and
/// it always matches the draft's category.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CategoryAttributes {
    RealEstate(RealEstateAttributes),
    Vehicle(VehicleAttributes),
    Clothing(ClothingAttributes),
    Electronics(ElectronicsAttributes),
    Service(ServiceAttributes),
}

#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    Text(String),
    Number(f64),
    Boolean(bool),
}

impl fmt::Display for FieldValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldValue::Text(value) => f.write_str(value),
            FieldValue::Number(value) if value.fract() == 0.0 => write!(f, "{value:.0}"),
            FieldValue::Number(value) => write!(f, "{value}"),
            FieldValue::Boolean(true) => f.write_str("да"),
            FieldValue::Boolean(false) => f.write_str("нет"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AttributeError {
    #[error("`{field}` is not an attribute of category {category}")]
    UnknownField { category: AdCategory, field: String },
    #[error("`{field}` expects {expected}, got `{value}`")]
    InvalidValue {
        field: String,
        expected: &'static str,
        value: String,
    },
}

impl CategoryAttributes {
    pub fn empty(category: AdCategory) -> Self {
        match category {
            AdCategory::RealEstate => Self::RealEstate(RealEstateAttributes::default()),
            AdCategory::Vehicle => Self::Vehicle(VehicleAttributes::default()),
            AdCategory::Clothing => Self::Clothing(ClothingAttributes::default()),
            AdCategory::Electronics => Self::Electronics(ElectronicsAttributes::default()),
            AdCategory::Service => Self::Service(ServiceAttributes::default()),
        }
    }

    pub fn category(&self) -> AdCategory {
        match self {
            Self::RealEstate(_) => AdCategory::RealEstate,
            Self::Vehicle(_) => AdCategory::Vehicle,
            Self::Clothing(_) => AdCategory::Clothing,
            Self::Electronics(_) => AdCategory::Electronics,
            Self::Service(_) => AdCategory::Service,
        }
    }

    /// Decodes a stored attribute object into the variant `category` selects.
    pub fn decode(category: AdCategory, value: Value) -> Result<Self, serde_json::Error> {
        Ok(match category {
            AdCategory::RealEstate => Self::RealEstate(serde_json::from_value(value)?),
            AdCategory::Vehicle => Self::Vehicle(serde_json::from_value(value)?),
            AdCategory::Clothing => Self::Clothing(serde_json::from_value(value)?),
            AdCategory::Electronics => Self::Electronics(serde_json::from_value(value)?),
            AdCategory::Service => Self::Service(serde_json::from_value(value)?),
        })
    }

    /// Parses `raw` for the field `name` and stores it. A blank value clears
    /// the field.
    pub fn set(&mut self, name: &str, raw: &str) -> Result<(), AttributeError> {
        match self {
            Self::RealEstate(attrs) => match name {
                "rooms" => attrs.rooms = integer(name, raw)?,
                "floor" => attrs.floor = integer(name, raw)?,
                "buildingType" => attrs.building_type = text(raw),
                "landSize" => attrs.land_size = decimal(name, raw)?,
                "houseArea" => attrs.house_area = decimal(name, raw)?,
                _ => return Err(unknown(AdCategory::RealEstate, name)),
            },
            Self::Vehicle(attrs) => match name {
                "brand" => attrs.brand = text(raw),
                "model" => attrs.model = text(raw),
                "year" => attrs.year = integer(name, raw)?,
                "mileage" => attrs.mileage = integer(name, raw)?,
                "fuel" => attrs.fuel = text(raw),
                "transmission" => attrs.transmission = text(raw),
                "condition" => attrs.condition = text(raw),
                _ => return Err(unknown(AdCategory::Vehicle, name)),
            },
            Self::Clothing(attrs) => match name {
                "size" => attrs.size = text(raw),
                "gender" => attrs.gender = text(raw),
                "material" => attrs.material = text(raw),
                _ => return Err(unknown(AdCategory::Clothing, name)),
            },
            Self::Electronics(attrs) => match name {
                "deviceBrand" => attrs.device_brand = text(raw),
                "deviceModel" => attrs.device_model = text(raw),
                "warranty" => attrs.warranty = boolean(name, raw)?,
                _ => return Err(unknown(AdCategory::Electronics, name)),
            },
            Self::Service(attrs) => match name {
                "serviceType" => attrs.service_type = text(raw),
                "duration" => attrs.duration = text(raw),
                _ => return Err(unknown(AdCategory::Service, name)),
            },
        }
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<FieldValue> {
        match self {
            Self::RealEstate(attrs) => match name {
                "rooms" => attrs.rooms.map(number),
                "floor" => attrs.floor.map(number),
                "buildingType" => attrs.building_type.clone().map(FieldValue::Text),
                "landSize" => attrs.land_size.map(FieldValue::Number),
                "houseArea" => attrs.house_area.map(FieldValue::Number),
                _ => None,
            },
            Self::Vehicle(attrs) => match name {
                "brand" => attrs.brand.clone().map(FieldValue::Text),
                "model" => attrs.model.clone().map(FieldValue::Text),
                "year" => attrs.year.map(number),
                "mileage" => attrs.mileage.map(|value| FieldValue::Number(value as f64)),
                "fuel" => attrs.fuel.clone().map(FieldValue::Text),
                "transmission" => attrs.transmission.clone().map(FieldValue::Text),
                "condition" => attrs.condition.clone().map(FieldValue::Text),
                _ => None,
            },
            Self::Clothing(attrs) => match name {
                "size" => attrs.size.clone().map(FieldValue::Text),
                "gender" => attrs.gender.clone().map(FieldValue::Text),
                "material" => attrs.material.clone().map(FieldValue::Text),
                _ => None,
            },
            Self::Electronics(attrs) => match name {
                "deviceBrand" => attrs.device_brand.clone().map(FieldValue::Text),
                "deviceModel" => attrs.device_model.clone().map(FieldValue::Text),
                "warranty" => attrs.warranty.map(FieldValue::Boolean),
                _ => None,
            },
            Self::Service(attrs) => match name {
                "serviceType" => attrs.service_type.clone().map(FieldValue::Text),
                "duration" => attrs.duration.clone().map(FieldValue::Text),
                _ => None,
            },
        }
    }

    /// Required fields of the active variant that have no value.
    pub fn missing_required(&self) -> Vec<&'static FieldSpec> {
        schema_for(self.category())
            .iter()
            .filter(|spec| spec.required && self.get(spec.name).is_none())
            .collect()
    }
}

fn unknown(category: AdCategory, name: &str) -> AttributeError {
    AttributeError::UnknownField {
        category,
        field: name.to_string(),
    }
}

fn number<T: Into<f64>>(value: T) -> FieldValue {
    FieldValue::Number(value.into())
}

fn text(raw: &str) -> Option<String> {
    let trimmed = raw.trim();
    (!trimmed.is_empty()).then(|| trimmed.to_string())
}

fn invalid(field: &str, expected: FieldKind, raw: &str) -> AttributeError {
    AttributeError::InvalidValue {
        field: field.to_string(),
        expected: expected.describe(),
        value: raw.to_string(),
    }
}

fn integer<T: std::str::FromStr>(field: &str, raw: &str) -> Result<Option<T>, AttributeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    trimmed
        .parse::<T>()
        .map(Some)
        .map_err(|_| invalid(field, FieldKind::Number, raw))
}

fn decimal(field: &str, raw: &str) -> Result<Option<f64>, AttributeError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Ok(None);
    }
    match trimmed.replace(',', ".").parse::<f64>() {
        Ok(value) if value.is_finite() && value >= 0.0 => Ok(Some(value)),
        _ => Err(invalid(field, FieldKind::Number, raw)),
    }
}

fn boolean(field: &str, raw: &str) -> Result<Option<bool>, AttributeError> {
    match raw.trim().to_lowercase().as_str() {
        "" => Ok(None),
        "true" | "yes" | "1" | "да" => Ok(Some(true)),
        "false" | "no" | "0" | "нет" => Ok(Some(false)),
        _ => Err(invalid(field, FieldKind::Boolean, raw)),
    }
}
