//! Product records as they arrive on the feed and as they are published.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;
use std::sync::Arc;

/// Price shown when the feed omits one.
pub const MISSING_PRICE: &str = "N/A";
/// Upper bound of the derived score.
pub const MAX_SCORE: f64 = 100.0;

/// Payload of one `data:` frame. Every field is optional.
///
/// A field of the wrong type reads as missing; only a payload that is not a JSON
/// object fails to parse.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RawRecord {
    /// Product name; the dedup key. Numbers are rendered as text.
    #[serde(default, deserialize_with = "text")]
    pub name: Option<String>,
    /// Display price; numbers are accepted and rendered as text.
    #[serde(default, deserialize_with = "text")]
    pub price: Option<String>,
    /// Rating on a 0–10 scale; numeric strings are accepted.
    #[serde(default, deserialize_with = "rating")]
    pub rating: Option<f64>,
    /// Strengths, in feed order.
    #[serde(default, deserialize_with = "strings")]
    pub pros: Option<Vec<String>>,
    /// Weaknesses, in feed order.
    #[serde(default, deserialize_with = "strings")]
    pub cons: Option<Vec<String>>,
    /// Explicit recommendation from the service.
    #[serde(default, deserialize_with = "lenient")]
    pub recommended: Option<bool>,
    /// Free-text verdict.
    #[serde(default, deserialize_with = "lenient")]
    pub verdict: Option<String>,
    /// Product page.
    #[serde(default, deserialize_with = "lenient")]
    pub url: Option<String>,
    /// Product image.
    #[serde(default, deserialize_with = "lenient")]
    pub image_url: Option<String>,
    /// Manufacturer or brand.
    #[serde(default, deserialize_with = "lenient")]
    pub brand: Option<String>,
    /// Product category.
    #[serde(default, deserialize_with = "lenient")]
    pub category: Option<String>,
    /// Number of reviews the rating was derived from.
    #[serde(default, deserialize_with = "lenient")]
    pub review_count: Option<i64>,
    /// Stock status text.
    #[serde(default, deserialize_with = "lenient")]
    pub availability: Option<String>,
}

impl RawRecord {
    /// Parses a frame payload. Anything but a JSON object is rejected.
    pub fn from_payload(payload: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(payload)
    }
}

fn lenient<'de, D, T>(deserializer: D) -> Result<Option<T>, D::Error>
where
    D: Deserializer<'de>,
    T: DeserializeOwned,
{
    let value = Option::<Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| T::deserialize(value).ok()))
}

fn text<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::String(text)) => Some(text),
        Some(Value::Number(number)) => Some(number.to_string()),
        _ => None,
    })
}

fn rating<'de, D>(deserializer: D) -> Result<Option<f64>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Number(number)) => number.as_f64(),
        Some(Value::String(text)) => text.trim().parse().ok(),
        _ => None,
    })
}

// Non-string entries are dropped; the rest keep their order.
fn strings<'de, D>(deserializer: D) -> Result<Option<Vec<String>>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<Value>::deserialize(deserializer)? {
        Some(Value::Array(items)) => Some(
            items
                .into_iter()
                .filter_map(|item| match item {
                    Value::String(text) => Some(text),
                    _ => None,
                })
                .collect(),
        ),
        _ => None,
    })
}

/// A record after the pipeline assigned its identity, score and recommendation.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EnrichedRecord {
    /// 1-based position in parse order.
    pub id: u64,
    /// Product name as sent by the feed.
    pub name: Option<String>,
    /// Display price, `N/A` when missing or empty.
    pub price: String,
    /// Rating, 0 when missing.
    pub rating: f64,
    /// Strengths, empty when missing.
    pub pros: Vec<String>,
    /// Weaknesses, empty when missing.
    pub cons: Vec<String>,
    /// `rating * 10`, clamped to `0..=100`.
    pub score: f64,
    /// Explicit flag from the feed, or the stream's default policy.
    pub is_recommended: bool,
    /// Free-text verdict.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub verdict: Option<String>,
    /// Product page.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
    /// Product image.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub image_url: Option<String>,
    /// Manufacturer or brand.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub brand: Option<String>,
    /// Product category.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    /// Review count behind the rating.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub review_count: Option<i64>,
    /// Stock status text.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub availability: Option<String>,
}

impl EnrichedRecord {
    /// Applies display defaults and the derived fields to `raw`.
    pub fn enrich(raw: RawRecord, id: u64, is_recommended: bool) -> Self {
        let rating = raw.rating.filter(|value| value.is_finite()).unwrap_or(0.0);
        Self {
            id,
            name: raw.name,
            price: raw
                .price
                .filter(|price| !price.is_empty())
                .unwrap_or_else(|| MISSING_PRICE.to_string()),
            rating,
            pros: raw.pros.unwrap_or_default(),
            cons: raw.cons.unwrap_or_default(),
            score: score_for(rating),
            is_recommended,
            verdict: raw.verdict,
            url: raw.url,
            image_url: raw.image_url,
            brand: raw.brand,
            category: raw.category,
            review_count: raw.review_count,
            availability: raw.availability,
        }
    }

    /// Display name; empty when the feed sent none.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }
}

/// Converts a 0–10 rating into a 0–100 score.
pub fn score_for(rating: f64) -> f64 {
    if !rating.is_finite() {
        return 0.0;
    }
    (rating * 10.0).clamp(0.0, MAX_SCORE)
}

/// Immutable snapshot of everything published so far for one query.
///
/// Cloning is cheap; appending builds a new snapshot and leaves `self` untouched.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ResultSet {
    query: Arc<str>,
    products: Arc<[EnrichedRecord]>,
}

impl ResultSet {
    /// Starts a snapshot holding a single product.
    pub fn first(query: Arc<str>, product: EnrichedRecord) -> Self {
        Self {
            query,
            products: Arc::from(vec![product]),
        }
    }

    /// Returns a new snapshot with `product` appended.
    pub fn with_product(&self, product: EnrichedRecord) -> Self {
        let mut products = Vec::with_capacity(self.products.len() + 1);
        products.extend_from_slice(&self.products);
        products.push(product);
        Self {
            query: Arc::clone(&self.query),
            products: Arc::from(products),
        }
    }

    /// The query this snapshot answers.
    pub fn query(&self) -> &str {
        &self.query
    }

    /// Products in first-arrival order.
    pub fn products(&self) -> &[EnrichedRecord] {
        &self.products
    }

    /// Number of products.
    pub fn len(&self) -> usize {
        self.products.len()
    }

    /// Whether no product has been published.
    pub fn is_empty(&self) -> bool {
        self.products.is_empty()
    }

    /// Whether a product with this dedup key is present.
    pub fn contains(&self, name: Option<&str>) -> bool {
        self.products
            .iter()
            .any(|product| product.name.as_deref() == name)
    }

    /// Looks a product up by name.
    pub fn get(&self, name: &str) -> Option<&EnrichedRecord> {
        self.products
            .iter()
            .find(|product| product.name.as_deref() == Some(name))
    }

    /// First product flagged as recommended.
    pub fn recommended(&self) -> Option<&EnrichedRecord> {
        self.products.iter().find(|product| product.is_recommended)
    }

    /// Every product not flagged as recommended, in order.
    pub fn others(&self) -> impl Iterator<Item = &EnrichedRecord> + '_ {
        self.products.iter().filter(|product| !product.is_recommended)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn parses_full_payload() {
        let raw = RawRecord::from_payload(
            r#"{"name":"Kettle","price":"$29","rating":8.5,"pros":["fast"],"cons":["loud"],
                "recommended":true,"verdict":"Solid","url":"https://shop.test/k",
                "imageUrl":"https://img.test/k.png","reviewCount":120,"extra":"ignored"}"#,
        )
        .expect("valid payload");
        assert_eq!(raw.name.as_deref(), Some("Kettle"));
        assert_eq!(raw.price.as_deref(), Some("$29"));
        assert_eq!(raw.rating, Some(8.5));
        assert_eq!(raw.image_url.as_deref(), Some("https://img.test/k.png"));
        assert_eq!(raw.review_count, Some(120));
        assert_eq!(raw.recommended, Some(true));
    }

    #[test]
    fn numeric_price_becomes_text() {
        let raw = RawRecord::from_payload(r#"{"name":"A","price":19.99}"#).expect("valid");
        assert_eq!(raw.price.as_deref(), Some("19.99"));
        let raw = RawRecord::from_payload(r#"{"name":"A","price":null}"#).expect("valid");
        assert_eq!(raw.price, None);
    }

    #[test]
    fn rejects_non_object_payloads() {
        assert!(RawRecord::from_payload("[1,2]").is_err());
        assert!(RawRecord::from_payload("\"text\"").is_err());
        assert!(RawRecord::from_payload("{malformed").is_err());
        assert!(RawRecord::from_payload("null").is_err());
    }

    #[test]
    fn wrong_typed_fields_read_as_missing() {
        let raw = RawRecord::from_payload(
            r#"{"name":"Fan","rating":"9","reviewCount":-3,"recommended":"yes",
                "pros":["quiet",4,"cheap"],"cons":"none","verdict":12,"brand":null}"#,
        )
        .expect("object payloads always parse");
        assert_eq!(raw.name.as_deref(), Some("Fan"));
        assert_eq!(raw.rating, Some(9.0));
        assert_eq!(raw.review_count, Some(-3));
        assert_eq!(raw.recommended, None);
        assert_eq!(raw.pros, Some(vec!["quiet".to_string(), "cheap".to_string()]));
        assert_eq!(raw.cons, None);
        assert_eq!(raw.verdict, None);
        assert_eq!(raw.brand, None);

        let record = EnrichedRecord::enrich(raw, 1, true);
        assert_eq!(record.score, 90.0);
        assert!(record.cons.is_empty());

        let raw = RawRecord::from_payload(r#"{"rating":"high","name":7}"#).expect("valid");
        assert_eq!(raw.rating, None);
        assert_eq!(raw.name.as_deref(), Some("7"));
    }

    #[test]
    fn empty_price_shows_placeholder() {
        let raw = RawRecord::from_payload(r#"{"name":"A","price":""}"#).expect("valid");
        assert_eq!(EnrichedRecord::enrich(raw, 1, true).price, MISSING_PRICE);
    }

    #[test]
    fn enrichment_applies_defaults() {
        let record = EnrichedRecord::enrich(RawRecord::default(), 3, false);
        assert_eq!(record.id, 3);
        assert_eq!(record.price, MISSING_PRICE);
        assert_eq!(record.rating, 0.0);
        assert_eq!(record.score, 0.0);
        assert!(record.pros.is_empty() && record.cons.is_empty());
        assert_eq!(record.display_name(), "");
    }

    #[test]
    fn score_is_clamped() {
        assert_eq!(score_for(9.0), 90.0);
        assert_eq!(score_for(12.0), 100.0);
        assert_eq!(score_for(-1.0), 0.0);
        assert_eq!(score_for(f64::NAN), 0.0);
    }

    #[test]
    fn serializes_camel_case_shape() {
        let raw = RawRecord {
            name: Some("Lamp".into()),
            rating: Some(7.0),
            image_url: Some("https://img.test/l.png".into()),
            ..RawRecord::default()
        };
        let value = serde_json::to_value(EnrichedRecord::enrich(raw, 1, true)).expect("json");
        assert_eq!(
            value,
            serde_json::json!({
                "id": 1,
                "name": "Lamp",
                "price": "N/A",
                "rating": 7.0,
                "pros": [],
                "cons": [],
                "score": 70.0,
                "isRecommended": true,
                "imageUrl": "https://img.test/l.png"
            })
        );
    }

    #[test]
    fn appending_leaves_previous_snapshot_untouched() {
        let first = ResultSet::first(
            Arc::from("kettles"),
            EnrichedRecord::enrich(
                RawRecord {
                    name: Some("A".into()),
                    ..RawRecord::default()
                },
                1,
                true,
            ),
        );
        let second = first.with_product(EnrichedRecord::enrich(
            RawRecord {
                name: Some("B".into()),
                ..RawRecord::default()
            },
            2,
            false,
        ));
        assert_eq!(first.len(), 1);
        assert_eq!(second.len(), 2);
        assert_eq!(second.query(), "kettles");
        assert!(second.contains(Some("B")));
        assert!(!first.contains(Some("B")));
        assert_eq!(second.recommended().map(|p| p.display_name()), Some("A"));
        let others: Vec<&str> = second.others().map(|p| p.display_name()).collect();
        assert_eq!(others, vec!["B"]);
        assert_eq!(second.get("B").map(|p| p.id), Some(2));
    }
}
