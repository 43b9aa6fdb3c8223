//! Read-side views of published ads.

use crate::ad_service::ReadError;
use crate::models::{AdCategory, AdId, AdRecord};
use crate::schema::schema_for;
use chrono::{DateTime, Utc};
use serde::Serialize;

const SUMMARY_TITLE_CHARS: usize = 60;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttributeRow {
    pub name: &'static str,
    pub label: &'static str,
    pub value: String,
}

/// Full ad page: the attribute rows follow the category schema order and
/// skip fields without a value.
#[derive(Debug, Clone, Serialize)]
pub struct AdDetail {
    pub id: AdId,
    pub title: Option<String>,
    pub description: String,
    pub price: String,
    pub category: AdCategory,
    pub city: String,
    pub phone: Option<String>,
    pub created_at: Option<DateTime<Utc>>,
    pub cover_image: Option<String>,
    pub images: Vec<String>,
    pub attributes: Vec<AttributeRow>,
}

/// Card shown in listings.
#[derive(Debug, Clone, Serialize)]
pub struct AdSummary {
    pub id: AdId,
    pub headline: String,
    pub price: String,
    pub category: AdCategory,
    pub city: String,
    pub cover_image: Option<String>,
}

pub fn render_detail(record: &AdRecord) -> Result<AdDetail, ReadError> {
    let attributes = record
        .attributes()
        .map_err(|err| ReadError::InvalidResponse(err.to_string()))?;
    let rows = schema_for(record.category)
        .iter()
        .filter_map(|spec| {
            attributes.get(spec.name).map(|value| AttributeRow {
                name: spec.name,
                label: spec.label,
                value: value.to_string(),
            })
        })
        .collect();

    Ok(AdDetail {
        id: record.id.clone(),
        title: record.title.clone().filter(|t| !t.trim().is_empty()),
        description: record.description.clone(),
        price: format_price(record.price),
        category: record.category,
        city: record.city_tag.clone(),
        phone: record.phone.clone().filter(|p| !p.trim().is_empty()),
        created_at: record.created_at,
        cover_image: record.image_urls.first().cloned(),
        images: record.image_urls.clone(),
        attributes: rows,
    })
}

pub fn summarize(record: &AdRecord) -> AdSummary {
    let headline = record
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or_else(|| record.description.trim());
    AdSummary {
        id: record.id.clone(),
        headline: truncate_chars(headline, SUMMARY_TITLE_CHARS),
        price: format_price(record.price),
        category: record.category,
        city: record.city_tag.clone(),
        cover_image: record.image_urls.first().cloned(),
    }
}

/// `150000.0` renders as `150 000 сом`.
fn format_price(price: f64) -> String {
    let total_cents = (price * 100.0).round() as u64;
    let (whole, cents) = (total_cents / 100, total_cents % 100);
    let digits = whole.to_string();
    let mut grouped = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, ch) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            grouped.push(' ');
        }
        grouped.push(ch);
    }
    if cents > 0 {
        format!("{grouped},{cents:02} сом")
    } else {
        format!("{grouped} сом")
    }
}

fn truncate_chars(text: &str, max: usize) -> String {
    if text.chars().count() <= max {
        return text.to_string();
    }
    let mut out: String = text.chars().take(max).collect();
    out.push('…');
    out
}
