//! Shared data model for the catalog import pipeline.
//!
//! Rows travel through three shapes: a [`RawRow`] straight out of the CSV
//! decoder, a JSON message on the row queue, and a validated [`QueuedRecord`]
//! once the batch consumer has coerced it. Persisted entities are split into
//! [`ProductRecord`] and [`StockRecord`] the same way the catalog tables are.

use crate::error::PipelineError;
use serde::ser::SerializeMap;
use serde::{Deserialize, Serialize, Serializer};
use serde_json::{Map, Value};
use uuid::Uuid;

/// Subject attached to every batch notification
pub const NOTIFICATION_SUBJECT: &str = "Products Imported";

/// Notification attribute carrying the batch price category
pub const PRICE_CATEGORY_ATTRIBUTE: &str = "priceCategory";

/// Where uploads land and where they move after parsing
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntakeLayout {
    pub intake_prefix: String,
    pub processed_prefix: String,
}

impl IntakeLayout {
    pub fn new(intake_prefix: impl Into<String>, processed_prefix: impl Into<String>) -> Self {
        Self {
            intake_prefix: trim_prefix(intake_prefix.into()),
            processed_prefix: trim_prefix(processed_prefix.into()),
        }
    }

    /// Object key for a freshly uploaded file: `{intake}/{file_name}`
    pub fn intake_key(&self, file_name: &str) -> String {
        format!("{}/{}", self.intake_prefix, file_name)
    }

    /// Relocation target for an intake key, or `None` if the key is not under
    /// the intake prefix.
    pub fn processed_key(&self, intake_key: &str) -> Option<String> {
        let rest = intake_key
            .strip_prefix(self.intake_prefix.as_str())?
            .strip_prefix('/')?;
        if rest.is_empty() {
            return None;
        }
        Some(format!("{}/{}", self.processed_prefix, rest))
    }
}

impl Default for IntakeLayout {
    fn default() -> Self {
        Self::new("intake", "processed")
    }
}

fn trim_prefix(prefix: String) -> String {
    prefix.trim_matches('/').to_string()
}

/// A client's request to upload one file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UploadIntent {
    pub file_name: String,
}

impl UploadIntent {
    /// Validate a requested file name.
    ///
    /// Names must be present, non-blank, and a single path component so the
    /// signed handle cannot escape the intake prefix.
    pub fn parse(file_name: Option<&str>) -> Result<Self, PipelineError> {
        let file_name = match file_name.map(str::trim) {
            Some(name) if !name.is_empty() => name,
            _ => {
                return Err(PipelineError::Validation(
                    "Missing \"name\" query parameter.".to_string(),
                ))
            }
        };

        if file_name.contains(['/', '\\']) || file_name.chars().any(char::is_control) {
            return Err(PipelineError::Validation(
                "Invalid \"name\" query parameter: must be a plain file name.".to_string(),
            ));
        }

        if file_name == "." || file_name == ".." {
            return Err(PipelineError::Validation(
                "Invalid \"name\" query parameter: must be a plain file name.".to_string(),
            ));
        }

        Ok(Self {
            file_name: file_name.to_string(),
        })
    }

    pub fn container_path(&self, layout: &IntakeLayout) -> String {
        layout.intake_key(&self.file_name)
    }
}

/// One decoded CSV line: column name to raw cell text, in file order.
///
/// Serializes as a JSON object, which is the row queue message format.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RawRow {
    fields: Vec<(String, String)>,
}

impl RawRow {
    pub fn new(fields: Vec<(String, String)>) -> Self {
        Self { fields }
    }

    /// Pair a header row with a data row
    pub fn from_columns<'a>(
        headers: impl IntoIterator<Item = &'a str>,
        values: impl IntoIterator<Item = &'a str>,
    ) -> Self {
        let fields = headers
            .into_iter()
            .zip(values)
            .map(|(column, value)| (column.to_string(), value.to_string()))
            .collect();
        Self { fields }
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, value)| value.as_str())
    }

    /// Non-empty `id` cell, used as the queue message key
    pub fn id(&self) -> Option<&str> {
        self.get("id").map(str::trim).filter(|id| !id.is_empty())
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.fields.iter().map(|(name, _)| name.as_str())
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Queue message body
    pub fn to_message_body(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

impl Serialize for RawRow {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        let mut map = serializer.serialize_map(Some(self.fields.len()))?;
        for (column, value) in &self.fields {
            map.serialize_entry(column, value)?;
        }
        map.end()
    }
}

/// A validated catalog row, as carried in notification payloads
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct QueuedRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub id: Option<String>,
    pub title: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub price: f64,
    pub count: i64,
}

impl QueuedRecord {
    /// Decode a queue message body into a record candidate.
    ///
    /// Only the JSON shape is checked here; field rules live in
    /// [`QueuedRecord::from_candidate`].
    pub fn decode_candidate(body: &[u8]) -> Result<Map<String, Value>, PipelineError> {
        match serde_json::from_slice::<Value>(body) {
            Ok(Value::Object(map)) => Ok(map),
            Ok(other) => Err(PipelineError::Decode(format!(
                "expected a JSON object, got {}",
                json_type_name(&other)
            ))),
            Err(e) => Err(PipelineError::Decode(e.to_string())),
        }
    }

    /// Validate and coerce a candidate.
    ///
    /// CSV rows arrive with every cell as a string, so `price` and `count`
    /// accept numeric strings as well as JSON numbers.
    pub fn from_candidate(candidate: &Map<String, Value>) -> Result<Self, PipelineError> {
        let title = candidate
            .get("title")
            .and_then(as_text)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| invalid("\"title\" is required"))?;

        let price = candidate
            .get("price")
            .and_then(as_number)
            .ok_or_else(|| invalid("\"price\" must be numeric"))?;
        if price < 0.0 {
            return Err(invalid("\"price\" must not be negative"));
        }

        let count = match candidate.get("count") {
            None | Some(Value::Null) => 0,
            Some(Value::String(s)) if s.trim().is_empty() => 0,
            Some(value) => as_number(value)
                .filter(|n| n.fract() == 0.0 && *n >= 0.0 && *n <= i64::MAX as f64)
                .map(|n| n as i64)
                .ok_or_else(|| invalid("\"count\" must be a non-negative integer"))?,
        };

        let id = candidate
            .get("id")
            .and_then(as_text)
            .map(|id| id.trim().to_string())
            .filter(|id| !id.is_empty());

        let description = candidate.get("description").and_then(as_text);

        Ok(Self {
            id,
            title,
            description,
            price,
            count,
        })
    }

    /// Fill in a random id if the record has none
    pub fn with_assigned_id(mut self) -> Self {
        if self.id.is_none() {
            self.id = Some(Uuid::new_v4().to_string());
        }
        self
    }

    /// Split into the product and stock rows. Call after
    /// [`QueuedRecord::with_assigned_id`].
    pub fn to_store_records(&self) -> (ProductRecord, StockRecord) {
        let id = self.id.clone().unwrap_or_default();
        (
            ProductRecord {
                id: id.clone(),
                title: self.title.clone(),
                description: self.description.clone().unwrap_or_default(),
                price: self.price,
            },
            StockRecord {
                product_id: id,
                count: self.count,
            },
        )
    }
}

/// Message returned for a rejected create request
pub const INVALID_PRODUCT_MESSAGE: &str =
    "Invalid product data: \"title\" (string) and \"price\" (number) are required.";

impl QueuedRecord {
    /// Validate a direct create request.
    ///
    /// Stricter than queue coercion: `price` and `count` must be JSON
    /// numbers. A non-numeric `count` falls back to 0. Any `id` in the body is
    /// ignored and a fresh one assigned.
    pub fn from_create_request(body: &Value) -> Result<Self, PipelineError> {
        let rejected = || PipelineError::Validation(INVALID_PRODUCT_MESSAGE.to_string());

        let title = body
            .get("title")
            .and_then(Value::as_str)
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(rejected)?;
        let price = body
            .get("price")
            .and_then(Value::as_f64)
            .filter(|p| p.is_finite() && *p >= 0.0)
            .ok_or_else(rejected)?;
        let count = body
            .get("count")
            .and_then(Value::as_i64)
            .filter(|c| *c >= 0)
            .unwrap_or(0);
        let description = body
            .get("description")
            .and_then(Value::as_str)
            .map(str::to_string);

        Ok(Self {
            id: None,
            title: title.to_string(),
            description,
            price,
            count,
        }
        .with_assigned_id())
    }
}

/// A product joined with its stock, as served by the catalog read API
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, sqlx::FromRow)]
pub struct CatalogProduct {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
    pub count: i64,
}

impl CatalogProduct {
    pub fn from_records(product: ProductRecord, stock: StockRecord) -> Self {
        Self {
            id: product.id,
            title: product.title,
            description: product.description,
            price: product.price,
            count: stock.count,
        }
    }
}

fn invalid(message: &str) -> PipelineError {
    PipelineError::RecordValidation(message.to_string())
}

fn as_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn as_number(value: &Value) -> Option<f64> {
    let n = match value {
        Value::Number(n) => n.as_f64()?,
        Value::String(s) => s.trim().parse::<f64>().ok()?,
        _ => return None,
    };
    n.is_finite().then_some(n)
}

fn json_type_name(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

/// Row of the `products` table
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProductRecord {
    pub id: String,
    pub title: String,
    pub description: String,
    pub price: f64,
}

/// Row of the `stocks` table
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StockRecord {
    pub product_id: String,
    pub count: i64,
}

/// Batch-level price classification used for notification filtering
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PriceCategory {
    Low,
    High,
}

impl PriceCategory {
    /// `Low` iff the minimum price is strictly below the threshold. No prices
    /// at all classifies as `High`.
    pub fn classify(min_price: Option<f64>, threshold: f64) -> Self {
        match min_price {
            Some(min) if min < threshold => PriceCategory::Low,
            _ => PriceCategory::High,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            PriceCategory::Low => "low",
            PriceCategory::High => "high",
        }
    }
}

impl std::fmt::Display for PriceCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Aggregate over the records persisted by one consumer invocation
#[derive(Debug, Clone, PartialEq)]
pub struct BatchSummary {
    pub processed_count: usize,
    pub price_category: PriceCategory,
    pub items: Vec<QueuedRecord>,
}

impl BatchSummary {
    pub fn from_items(items: Vec<QueuedRecord>, threshold: f64) -> Self {
        let min_price = items.iter().map(|r| r.price).reduce(f64::min);
        Self {
            processed_count: items.len(),
            price_category: PriceCategory::classify(min_price, threshold),
            items,
        }
    }

    pub fn summary_line(&self) -> String {
        format!("Successfully processed {} product(s)", self.processed_count)
    }

    /// Build the single notification published for this batch
    pub fn to_notification(&self) -> Result<Notification, serde_json::Error> {
        let payload = serde_json::to_vec(&NotificationPayload {
            summary: self.summary_line(),
            processed_count: self.processed_count,
            price_category: self.price_category,
            products: &self.items,
        })?;

        Ok(Notification {
            subject: NOTIFICATION_SUBJECT.to_string(),
            attributes: vec![(
                PRICE_CATEGORY_ATTRIBUTE.to_string(),
                self.price_category.as_str().to_string(),
            )],
            payload,
        })
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct NotificationPayload<'a> {
    summary: String,
    processed_count: usize,
    price_category: PriceCategory,
    products: &'a [QueuedRecord],
}

/// A message for the notification sink: JSON payload plus filterable attributes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notification {
    pub subject: String,
    pub attributes: Vec<(String, String)>,
    pub payload: Vec<u8>,
}

impl Notification {
    pub fn attribute(&self, name: &str) -> Option<&str> {
        self.attributes
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }
}

/// An object landed in the store
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ObjectCreatedEvent {
    pub container_name: String,
    pub key: String,
}

impl ObjectCreatedEvent {
    pub fn new(container_name: impl Into<String>, key: impl Into<String>) -> Self {
        Self {
            container_name: container_name.into(),
            key: key.into(),
        }
    }
}

/// S3-style bucket notification, as emitted by S3 and MinIO
#[derive(Debug, Clone, Deserialize)]
pub struct S3EventNotification {
    #[serde(rename = "Records", default)]
    pub records: Vec<S3EventRecord>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3EventRecord {
    #[serde(rename = "eventName", default)]
    pub event_name: Option<String>,
    pub s3: S3Entity,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Entity {
    pub bucket: S3Bucket,
    pub object: S3Object,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Bucket {
    pub name: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct S3Object {
    pub key: String,
}

impl S3EventNotification {
    /// Object-created records only; other event kinds are dropped
    pub fn into_events(self) -> Vec<ObjectCreatedEvent> {
        self.records
            .into_iter()
            .filter(|r| {
                r.event_name
                    .as_deref()
                    .map_or(true, |name| name.contains("ObjectCreated"))
            })
            .map(|r| {
                let key = decode_object_key(&r.s3.object.key);
                ObjectCreatedEvent::new(r.s3.bucket.name, key)
            })
            .collect()
    }
}

/// Object keys arrive form-encoded (`+` for space, `%XX` escapes). A key
/// that does not decode to UTF-8 is kept as delivered.
pub fn decode_object_key(raw: &str) -> String {
    let spaced = raw.replace('+', " ");
    match urlencoding::decode(&spaced) {
        Ok(decoded) => decoded.into_owned(),
        Err(_) => raw.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn candidate(value: Value) -> Map<String, Value> {
        match value {
            Value::Object(map) => map,
            _ => panic!("test candidate must be an object"),
        }
    }

    #[test]
    fn test_intake_layout_keys() {
        let layout = IntakeLayout::new("intake/", "/processed");
        assert_eq!(layout.intake_key("products.csv"), "intake/products.csv");
        assert_eq!(
            layout.processed_key("intake/products.csv"),
            Some("processed/products.csv".to_string())
        );
        assert_eq!(layout.processed_key("other/products.csv"), None);
        assert_eq!(layout.processed_key("intakeproducts.csv"), None);
        assert_eq!(layout.processed_key("intake/"), None);
    }

    #[test]
    fn test_upload_intent_validation() {
        let intent = UploadIntent::parse(Some("products.csv")).unwrap();
        assert_eq!(
            intent.container_path(&IntakeLayout::default()),
            "intake/products.csv"
        );

        let missing = UploadIntent::parse(None).unwrap_err();
        assert_eq!(missing.to_string(), "Missing \"name\" query parameter.");
        assert!(UploadIntent::parse(Some("   ")).is_err());
        assert!(UploadIntent::parse(Some("../etc/passwd")).is_err());
        assert!(UploadIntent::parse(Some("a\\b.csv")).is_err());
        assert!(UploadIntent::parse(Some("..")).is_err());
    }

    #[test]
    fn test_raw_row_serializes_in_column_order() {
        let row = RawRow::from_columns(["title", "id", "price"], ["Widget", "1", "15"]);
        let body = String::from_utf8(row.to_message_body().unwrap()).unwrap();
        assert_eq!(body, r#"{"title":"Widget","id":"1","price":"15"}"#);
        assert_eq!(row.id(), Some("1"));
        assert_eq!(row.columns().collect::<Vec<_>>(), vec!["title", "id", "price"]);
    }

    #[test]
    fn test_candidate_coerces_csv_strings() {
        let record = QueuedRecord::from_candidate(&candidate(json!({
            "id": "1",
            "title": "Widget",
            "price": " 15.5 ",
            "count": "5"
        })))
        .unwrap();

        assert_eq!(record.id.as_deref(), Some("1"));
        assert_eq!(record.price, 15.5);
        assert_eq!(record.count, 5);
        assert_eq!(record.description, None);
    }

    #[test]
    fn test_candidate_count_defaults_to_zero() {
        let record =
            QueuedRecord::from_candidate(&candidate(json!({"title": "Gadget", "price": 25})))
                .unwrap();
        assert_eq!(record.count, 0);
        assert_eq!(record.id, None);
    }

    #[test]
    fn test_candidate_rejections() {
        let cases = [
            json!({"price": 10}),
            json!({"title": "", "price": 10}),
            json!({"title": "X", "price": "cheap"}),
            json!({"title": "X"}),
            json!({"title": "X", "price": -1}),
            json!({"title": "X", "price": 1, "count": "2.5"}),
            json!({"title": "X", "price": 1, "count": -3}),
        ];

        for case in cases {
            let err = QueuedRecord::from_candidate(&candidate(case.clone())).unwrap_err();
            assert!(
                matches!(err, PipelineError::RecordValidation(_)),
                "unexpected error for {case}: {err}"
            );
        }
    }

    #[test]
    fn test_decode_candidate() {
        assert!(QueuedRecord::decode_candidate(br#"{"title":"X"}"#).is_ok());
        assert!(matches!(
            QueuedRecord::decode_candidate(b"{ not valid JSON"),
            Err(PipelineError::Decode(_))
        ));
        assert!(matches!(
            QueuedRecord::decode_candidate(b"[1,2]"),
            Err(PipelineError::Decode(_))
        ));
    }

    #[test]
    fn test_assigned_id_is_kept_when_present() {
        let record = QueuedRecord {
            id: Some("abc".to_string()),
            title: "X".to_string(),
            description: None,
            price: 1.0,
            count: 1,
        };
        assert_eq!(record.clone().with_assigned_id().id.as_deref(), Some("abc"));

        let generated = QueuedRecord { id: None, ..record }.with_assigned_id();
        let id = generated.id.clone().unwrap();
        assert!(Uuid::parse_str(&id).is_ok());

        let (product, stock) = generated.to_store_records();
        assert_eq!(product.id, id);
        assert_eq!(product.description, "");
        assert_eq!(stock.product_id, id);
    }

    #[test]
    fn test_price_category_threshold_is_strict() {
        assert_eq!(PriceCategory::classify(Some(15.0), 20.0), PriceCategory::Low);
        assert_eq!(PriceCategory::classify(Some(20.0), 20.0), PriceCategory::High);
        assert_eq!(PriceCategory::classify(None, 20.0), PriceCategory::High);
    }

    #[test]
    fn test_notification_payload() {
        let items = vec![
            QueuedRecord {
                id: Some("1".to_string()),
                title: "Widget".to_string(),
                description: None,
                price: 15.0,
                count: 5,
            },
            QueuedRecord {
                id: Some("2".to_string()),
                title: "Gadget".to_string(),
                description: Some("shiny".to_string()),
                price: 25.0,
                count: 3,
            },
        ];
        let summary = BatchSummary::from_items(items, 20.0);
        assert_eq!(summary.processed_count, 2);
        assert_eq!(summary.price_category, PriceCategory::Low);

        let notification = summary.to_notification().unwrap();
        assert_eq!(notification.subject, NOTIFICATION_SUBJECT);
        assert_eq!(notification.attribute(PRICE_CATEGORY_ATTRIBUTE), Some("low"));

        let payload: Value = serde_json::from_slice(&notification.payload).unwrap();
        assert_eq!(payload["summary"], "Successfully processed 2 product(s)");
        assert_eq!(payload["processedCount"], 2);
        assert_eq!(payload["priceCategory"], "low");
        assert_eq!(payload["products"][1]["description"], "shiny");
    }

    #[test]
    fn test_s3_notification_filters_created_events() {
        let json = r#"{
            "Records": [
                {"eventName": "s3:ObjectCreated:Put",
                 "s3": {"bucket": {"name": "imports"}, "object": {"key": "intake/a.csv"}}},
                {"eventName": "s3:ObjectRemoved:Delete",
                 "s3": {"bucket": {"name": "imports"}, "object": {"key": "intake/b.csv"}}},
                {"s3": {"bucket": {"name": "imports"}, "object": {"key": "intake/c.csv"}}}
            ]
        }"#;

        let notification: S3EventNotification = serde_json::from_str(json).unwrap();
        let events = notification.into_events();
        assert_eq!(
            events,
            vec![
                ObjectCreatedEvent::new("imports", "intake/a.csv"),
                ObjectCreatedEvent::new("imports", "intake/c.csv"),
            ]
        );
    }

    #[test]
    fn test_event_key_matches_uploaded_name() {
        let json = r#"{"Records": [{"eventName": "s3:ObjectCreated:Put",
            "s3": {"bucket": {"name": "imports"},
                   "object": {"key": "intake/spring+sale+%282024%29.csv"}}}]}"#;

        let notification: S3EventNotification = serde_json::from_str(json).unwrap();
        let events = notification.into_events();

        let intent = UploadIntent::parse(Some("spring sale (2024).csv")).unwrap();
        assert_eq!(events[0].key, intent.container_path(&IntakeLayout::default()));
    }

    #[test]
    fn test_decode_object_key() {
        assert_eq!(decode_object_key("intake/plain.csv"), "intake/plain.csv");
        assert_eq!(decode_object_key("intake/a%2Bb.csv"), "intake/a+b.csv");
        assert_eq!(decode_object_key("intake/%C3%A9t%C3%A9.csv"), "intake/été.csv");
        assert_eq!(decode_object_key("intake/%FF.csv"), "intake/%FF.csv");
    }

    #[test]
    fn test_create_request_requires_title_and_numeric_price() {
        let err = QueuedRecord::from_create_request(&json!({"title": "Lamp", "price": "12"}))
            .unwrap_err();
        assert_eq!(err, PipelineError::Validation(INVALID_PRODUCT_MESSAGE.to_string()));

        assert!(QueuedRecord::from_create_request(&json!({"price": 12})).is_err());
        assert!(QueuedRecord::from_create_request(&json!({"title": "", "price": 12})).is_err());
    }

    #[test]
    fn test_create_request_defaults() {
        let record = QueuedRecord::from_create_request(
            &json!({"id": "mine", "title": "Lamp", "price": 12.5, "count": "3"}),
        )
        .unwrap();

        assert_ne!(record.id.as_deref(), Some("mine"));
        assert_eq!(record.count, 0);

        let (product, stock) = record.to_store_records();
        let served = CatalogProduct::from_records(product, stock);
        assert_eq!(served.description, "");
        assert_eq!(served.price, 12.5);
    }
}
