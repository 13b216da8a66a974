//! Product records.
//!
//! Three shapes of the same product travel through the pipeline:
//!
//! - [`RawProduct`] - one decoded feed line, every field optional
//! - [`Product`] - the stored entity, keyed by its normalized `code`
//! - [`SearchRecord`] - the reduced projection pushed to the search index
//!
//! Feed lines are loosely typed: the same key may arrive as a string in one
//! file and as a number in the next. The deserializers in this module accept
//! either and fall back to `None` for shapes that cannot be used, so a single
//! odd field never rejects an otherwise valid record.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::{Error, Result};

/// Lifecycle status of a stored product.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProductStatus {
    /// Created but not yet visible.
    Draft,
    /// Soft-deleted; never indexed for search.
    Trash,
    /// Visible and searchable. Every imported product starts here.
    #[default]
    Published,
}

impl ProductStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Draft => "draft",
            Self::Trash => "trash",
            Self::Published => "published",
        }
    }
}

impl std::str::FromStr for ProductStatus {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "draft" => Ok(Self::Draft),
            "trash" => Ok(Self::Trash),
            "published" => Ok(Self::Published),
            other => Err(Error::UnknownStatus(other.to_string())),
        }
    }
}

impl std::fmt::Display for ProductStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Descriptive product fields, as mapped from the feed.
///
/// All optional. Shared by [`RawProduct`] (decoding) and [`Product`]
/// (storage) so the mapping from feed keys to columns lives in one place.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ProductFields {
    #[serde(deserialize_with = "lenient_text")]
    pub url: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub creator: Option<String>,
    /// Unix timestamp the product was created upstream.
    #[serde(deserialize_with = "lenient_int")]
    pub created_t: Option<i64>,
    /// Unix timestamp of the last upstream modification.
    #[serde(deserialize_with = "lenient_int")]
    pub last_modified_t: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub product_name: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub quantity: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub brands: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub categories: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub labels: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub cities: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub purchase_places: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub stores: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub ingredients_text: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub traces: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub serving_size: Option<String>,
    /// Zero and empty values are treated as absent.
    #[serde(deserialize_with = "lenient_float_nonzero")]
    pub serving_quantity: Option<f64>,
    /// Zero and empty values are treated as absent.
    #[serde(deserialize_with = "lenient_int_nonzero")]
    pub nutriscore_score: Option<i64>,
    #[serde(deserialize_with = "lenient_text")]
    pub nutriscore_grade: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub main_category: Option<String>,
    #[serde(deserialize_with = "lenient_text")]
    pub image_url: Option<String>,
}

/// One decoded feed line.
///
/// Absent keys default to `None`; unknown keys are ignored.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default)]
pub struct RawProduct {
    /// Business key as it appears in the feed (possibly quoted or zero-padded).
    #[serde(deserialize_with = "lenient_text")]
    pub code: Option<String>,

    #[serde(flatten)]
    pub fields: ProductFields,
}

impl RawProduct {
    /// The normalized upsert key for this record.
    pub fn normalized_code(&self) -> Result<i64> {
        match self.code.as_deref() {
            Some(code) if !code.trim().is_empty() => normalize_code(code),
            _ => Err(Error::MissingField("code")),
        }
    }
}

/// Normalize a feed product code into its integer store key.
///
/// Surrounding whitespace and quote characters are stripped, then leading
/// zeros, and the remainder must be a positive decimal integer. So
/// `'0042'`, `"42"`, `0042` and `"\"0042\""` all yield `42`.
pub fn normalize_code(raw: &str) -> Result<i64> {
    let unquoted = raw.trim().trim_matches(|c| c == '"' || c == '\'');
    if unquoted.is_empty() {
        return Err(Error::MissingField("code"));
    }

    let digits = unquoted.trim_start_matches('0');
    if digits.is_empty() {
        return Err(Error::InvalidField {
            field: "code",
            reason: format!("code {raw:?} is zero"),
        });
    }

    if !digits.bytes().all(|b| b.is_ascii_digit()) {
        return Err(Error::InvalidField {
            field: "code",
            reason: format!("code {raw:?} is not numeric"),
        });
    }

    digits.parse::<i64>().map_err(|e| Error::InvalidField {
        field: "code",
        reason: format!("code {raw:?}: {e}"),
    })
}

/// Parse one feed line into a record.
///
/// Returns `Ok(None)` for blank lines. Lines that are not JSON, decode to a
/// falsy value (`null`, `false`, `0`, `""`, `"0"`, `[]`, `{}`), or decode to
/// something other than an object are errors.
pub fn parse_record(line: &[u8]) -> Result<Option<RawProduct>> {
    let trimmed = line.trim_ascii();
    if trimmed.is_empty() {
        return Ok(None);
    }

    let value: Value = serde_json::from_slice(trimmed)?;

    if is_falsy(&value) {
        return Err(Error::NotARecord(format!("empty value {value}")));
    }

    if !value.is_object() {
        return Err(Error::NotARecord(format!(
            "expected an object, got {}",
            json_kind(&value)
        )));
    }

    Ok(Some(RawProduct::deserialize(value)?))
}

/// A stored product.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Product {
    /// Store-assigned row id.
    pub id: i64,
    /// Normalized business key, unique across products.
    pub code: i64,
    pub status: ProductStatus,
    /// When this product was last written by an import.
    pub imported_at: DateTime<Utc>,
    #[serde(flatten)]
    pub fields: ProductFields,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Product {
    /// Trashed products are kept out of the search index.
    pub fn is_searchable(&self) -> bool {
        self.status != ProductStatus::Trash
    }

    /// The reduced field set pushed to the search index.
    pub fn to_search_record(&self) -> SearchRecord {
        SearchRecord {
            object_id: self.code.to_string(),
            id: self.id,
            code: self.code,
            product_name: self.fields.product_name.clone(),
            brands: self.fields.brands.clone(),
            categories: self.fields.categories.clone(),
            ingredients_text: self.fields.ingredients_text.clone(),
            main_category: self.fields.main_category.clone(),
            status: self.status,
        }
    }
}

/// Searchable projection of a [`Product`].
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SearchRecord {
    /// Index object id; the product code, so re-indexing overwrites.
    #[serde(rename = "objectID")]
    pub object_id: String,
    pub id: i64,
    pub code: i64,
    pub product_name: Option<String>,
    pub brands: Option<String>,
    pub categories: Option<String>,
    pub ingredients_text: Option<String>,
    pub main_category: Option<String>,
    pub status: ProductStatus,
}

// =============================================================================
// Lenient field decoding
// =============================================================================

fn is_falsy(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Bool(b) => !b,
        Value::Number(n) => n.as_f64() == Some(0.0),
        Value::String(s) => s.is_empty() || s == "0",
        Value::Array(a) => a.is_empty(),
        Value::Object(o) => o.is_empty(),
    }
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "boolean",
        Value::Number(_) => "number",
        Value::String(_) => "string",
        Value::Array(_) => "array",
        Value::Object(_) => "object",
    }
}

fn text_of(value: Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s),
        Value::Number(n) => Some(n.to_string()),
        Value::Bool(b) => Some(b.to_string()),
        Value::Null | Value::Array(_) | Value::Object(_) => None,
    }
}

fn float_of(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|f| f.is_finite())
}

fn int_of(value: &Value) -> Option<i64> {
    match value {
        Value::Number(n) => n.as_i64().or_else(|| float_of(value).map(|f| f as i64)),
        Value::String(s) => {
            let s = s.trim();
            s.parse::<i64>()
                .ok()
                .or_else(|| float_of(value).map(|f| f as i64))
        }
        _ => None,
    }
}

fn lenient_text<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<String>, D::Error> {
    Ok(text_of(Value::deserialize(d)?))
}

fn lenient_int<'de, D: Deserializer<'de>>(d: D) -> std::result::Result<Option<i64>, D::Error> {
    Ok(int_of(&Value::deserialize(d)?))
}

fn lenient_int_nonzero<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<i64>, D::Error> {
    Ok(int_of(&Value::deserialize(d)?).filter(|v| *v != 0))
}

fn lenient_float_nonzero<'de, D: Deserializer<'de>>(
    d: D,
) -> std::result::Result<Option<f64>, D::Error> {
    Ok(float_of(&Value::deserialize(d)?).filter(|v| *v != 0.0))
}
