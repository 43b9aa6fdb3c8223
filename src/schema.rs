use crate::models::AdCategory;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum FieldKind {
    Text,
    Number,
    Boolean,
}

impl FieldKind {
    pub fn describe(&self) -> &'static str {
        match self {
            FieldKind::Text => "text",
            FieldKind::Number => "a number",
            FieldKind::Boolean => "yes or no",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct FieldSpec {
    pub name: &'static str,
    pub label: &'static str,
    pub kind: FieldKind,
    pub required: bool,
}

const fn field(
    name: &'static str,
    label: &'static str,
    kind: FieldKind,
    required: bool,
) -> FieldSpec {
    FieldSpec {
        name,
        label,
        kind,
        required,
    }
}

const REAL_ESTATE_FIELDS: &[FieldSpec] = &[
    field("rooms", "Количество комнат", FieldKind::Number, true),
    field("floor", "Этаж", FieldKind::Number, false),
    field("buildingType", "Тип строения", FieldKind::Text, false),
    field("landSize", "Площадь участка", FieldKind::Number, false),
    field("houseArea", "Площадь дома", FieldKind::Number, false),
];

const VEHICLE_FIELDS: &[FieldSpec] = &[
    field("brand", "Марка", FieldKind::Text, true),
    field("model", "Модель", FieldKind::Text, true),
    field("year", "Год выпуска", FieldKind::Number, true),
    field("mileage", "Пробег", FieldKind::Number, false),
    field("fuel", "Топливо", FieldKind::Text, false),
    field("transmission", "Коробка передач", FieldKind::Text, false),
    field("condition", "Состояние", FieldKind::Text, false),
];

const CLOTHING_FIELDS: &[FieldSpec] = &[
    field("size", "Размер", FieldKind::Text, true),
    field("gender", "Пол", FieldKind::Text, false),
    field("material", "Материал", FieldKind::Text, false),
];

const ELECTRONICS_FIELDS: &[FieldSpec] = &[
    field("deviceBrand", "Бренд", FieldKind::Text, true),
    field("deviceModel", "Модель устройства", FieldKind::Text, false),
    field("warranty", "Гарантия", FieldKind::Boolean, false),
];

const SERVICE_FIELDS: &[FieldSpec] = &[
    field("serviceType", "Вид услуги", FieldKind::Text, true),
    field("duration", "Срок выполнения", FieldKind::Text, false),
];

/// Attribute schema of `category`, in display order.
pub fn schema_for(category: AdCategory) -> &'static [FieldSpec] {
    match category {
        AdCategory::RealEstate => REAL_ESTATE_FIELDS,
        AdCategory::Vehicle => VEHICLE_FIELDS,
        AdCategory::Clothing => CLOTHING_FIELDS,
        AdCategory::Electronics => ELECTRONICS_FIELDS,
        AdCategory::Service => SERVICE_FIELDS,
    }
}

pub fn field_spec(category: AdCategory, name: &str) -> Option<&'static FieldSpec> {
    schema_for(category).iter().find(|spec| spec.name == name)
}

pub fn required_fields(category: AdCategory) -> impl Iterator<Item = &'static FieldSpec> {
    schema_for(category).iter().filter(|spec| spec.required)
}
