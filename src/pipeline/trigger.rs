//! Trigger decoding: storage notification → [`DocumentRef`].
//!
//! Object-created notifications nest the location under
//! `Records[0].s3.bucket.name` and `Records[0].s3.object.key`. Keys arrive
//! form-encoded (`+` for a space, `%XX` escapes) and are decoded before use,
//! otherwise a key such as `scans/my+invoice.png` would be looked up under
//! the wrong name.
//!
//! Anything missing is a [`RedactError::TriggerMalformed`]; no service is
//! contacted before this stage succeeds.

use crate::error::RedactError;
use crate::model::DocumentRef;
use serde::Deserialize;
use serde_json::Value;
use tracing::debug;

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records", default)]
    records: Vec<Record>,
}

#[derive(Debug, Deserialize)]
struct Record {
    s3: Option<S3Entity>,
}

#[derive(Debug, Deserialize)]
struct S3Entity {
    bucket: Option<BucketEntity>,
    object: Option<ObjectEntity>,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: Option<String>,
}

fn malformed(reason: impl Into<String>) -> RedactError {
    RedactError::TriggerMalformed {
        reason: reason.into(),
    }
}

/// Decode the first record of a notification into a document reference.
///
/// Only the first record is used; one notification drives one run.
pub fn parse_notification(event: &Value) -> Result<DocumentRef, RedactError> {
    let notification: Notification = serde_json::from_value(event.clone())
        .map_err(|e| malformed(format!("not a storage notification: {e}")))?;

    let record = notification
        .records
        .into_iter()
        .next()
        .ok_or_else(|| malformed("notification has no Records"))?;

    let s3 = record
        .s3
        .ok_or_else(|| malformed("record has no s3 entity"))?;

    let bucket = s3
        .bucket
        .and_then(|b| b.name)
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| malformed("missing s3.bucket.name"))?;

    let raw_key = s3
        .object
        .and_then(|o| o.key)
        .filter(|k| !k.trim().is_empty())
        .ok_or_else(|| malformed("missing s3.object.key"))?;

    let key = decode_key(&raw_key)?;
    debug!("Trigger resolved to {}/{}", bucket, key);
    Ok(DocumentRef { bucket, key })
}

/// Parse a notification from its JSON text.
pub fn parse_notification_str(event: &str) -> Result<DocumentRef, RedactError> {
    let value: Value = serde_json::from_str(event)
        .map_err(|e| malformed(format!("notification is not valid JSON: {e}")))?;
    parse_notification(&value)
}

/// Decode a form-encoded object key.
pub fn decode_key(raw: &str) -> Result<String, RedactError> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|k| k.into_owned())
        .map_err(|e| malformed(format!("object key '{raw}' is not valid UTF-8 once decoded: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn event(bucket: Value, key: Value) -> Value {
        json!({
            "Records": [{
                "eventName": "ObjectCreated:Put",
                "s3": {
                    "bucket": {"name": bucket, "arn": "arn:aws:s3:::docs"},
                    "object": {"key": key, "size": 1024}
                }
            }]
        })
    }

    #[test]
    fn parses_bucket_and_key() {
        let doc = parse_notification(&event(json!("docs"), json!("inbox/scan.png"))).unwrap();
        assert_eq!(doc, DocumentRef::new("docs", "inbox/scan.png"));
    }

    #[test]
    fn decodes_form_encoded_key() {
        let doc =
            parse_notification(&event(json!("docs"), json!("inbox/my+scan%281%29.png"))).unwrap();
        assert_eq!(doc.key, "inbox/my scan(1).png");
    }

    #[test]
    fn missing_key_is_malformed() {
        let ev = json!({"Records": [{"s3": {"bucket": {"name": "docs"}, "object": {}}}]});
        let err = parse_notification(&ev).unwrap_err();
        assert!(matches!(err, RedactError::TriggerMalformed { .. }));
        assert!(err.to_string().contains("s3.object.key"));
    }

    #[test]
    fn missing_bucket_is_malformed() {
        let ev = json!({"Records": [{"s3": {"object": {"key": "a.png"}}}]});
        let err = parse_notification(&ev).unwrap_err();
        assert!(err.to_string().contains("s3.bucket.name"));
    }

    #[test]
    fn empty_records_is_malformed() {
        let err = parse_notification(&json!({"Records": []})).unwrap_err();
        assert!(err.to_string().contains("no Records"));
    }

    #[test]
    fn blank_key_is_malformed() {
        assert!(parse_notification(&event(json!("docs"), json!("  "))).is_err());
    }

    #[test]
    fn non_object_is_malformed() {
        assert!(parse_notification(&json!("hello")).is_err());
        assert!(parse_notification_str("{not json").is_err());
    }
}
