//! Trigger payload normalization.
//!
//! Two shapes are accepted:
//! - a storage notification, `{"Records": [{"s3": {"bucket": {"name"}, "object": {"key", "size"}}}]}`,
//!   whose key is form-encoded (`%XX` escapes, `+` for space);
//! - a direct request body, `{"s3_bucket", "s3_key"}`, whose key is literal.
//!
//! Both produce the same [`ReplicationRequest`].

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::{ReplError, Result};

/// Canonical description of one object to replicate.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationRequest {
    /// Container the object was created in.
    pub source_container: String,
    /// Fully decoded object key. Also used as the destination key.
    pub object_key: String,
    /// Source object size, when known.
    pub size_hint: Option<u64>,
}

impl ReplicationRequest {
    /// Create a request.
    pub fn new(source_container: &str, object_key: &str, size_hint: Option<u64>) -> Self {
        Self {
            source_container: source_container.to_string(),
            object_key: object_key.to_string(),
            size_hint,
        }
    }

    /// Copy of this request with the size hint replaced.
    pub fn with_size_hint(&self, size_hint: Option<u64>) -> Self {
        Self {
            size_hint,
            ..self.clone()
        }
    }
}

#[derive(Debug, Deserialize)]
struct Notification {
    #[serde(rename = "Records")]
    records: Vec<NotificationRecord>,
}

#[derive(Debug, Deserialize)]
struct NotificationRecord {
    s3: StorageEntity,
}

#[derive(Debug, Deserialize)]
struct StorageEntity {
    bucket: BucketEntity,
    object: ObjectEntity,
}

#[derive(Debug, Deserialize)]
struct BucketEntity {
    name: String,
}

#[derive(Debug, Deserialize)]
struct ObjectEntity {
    key: String,
    #[serde(default)]
    size: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct DirectRequest {
    s3_bucket: String,
    s3_key: String,
}

/// Parse trigger payload text as JSON. Unparseable text is a malformed event.
pub fn parse_event(text: &str) -> Result<Value> {
    serde_json::from_str(text)
        .map_err(|e| ReplError::malformed(format!("event is not valid JSON: {}", e)))
}

/// Convert a raw trigger payload into a [`ReplicationRequest`].
///
/// Only the first notification record is replicated.
pub fn normalize(raw: &Value) -> Result<ReplicationRequest> {
    let object = raw
        .as_object()
        .ok_or_else(|| ReplError::malformed("event is not a JSON object"))?;

    if object.contains_key("Records") {
        let notification: Notification = serde_json::from_value(raw.clone())
            .map_err(|e| ReplError::malformed(format!("invalid notification: {}", e)))?;
        let record = notification
            .records
            .into_iter()
            .next()
            .ok_or_else(|| ReplError::malformed("notification has no records"))?;

        let key = decode_key(&record.s3.object.key)?;
        return build(record.s3.bucket.name, key, record.s3.object.size);
    }

    if object.contains_key("s3_bucket") || object.contains_key("s3_key") {
        let body: DirectRequest = serde_json::from_value(raw.clone())
            .map_err(|e| ReplError::malformed(format!("invalid request body: {}", e)))?;
        return build(body.s3_bucket, body.s3_key, None);
    }

    Err(ReplError::malformed(
        "unrecognised event: expected Records or s3_bucket/s3_key",
    ))
}

fn build(container: String, key: String, size_hint: Option<u64>) -> Result<ReplicationRequest> {
    if container.is_empty() {
        return Err(ReplError::malformed("source container name is empty"));
    }
    if key.is_empty() {
        return Err(ReplError::malformed("object key is empty"));
    }
    Ok(ReplicationRequest {
        source_container: container,
        object_key: key,
        size_hint,
    })
}

/// Decode a form-encoded object key: `+` becomes a space, then `%XX`
/// escapes are resolved. Applied exactly once.
pub fn decode_key(raw: &str) -> Result<String> {
    let spaced = raw.replace('+', " ");
    urlencoding::decode(&spaced)
        .map(|key| key.into_owned())
        .map_err(|_| ReplError::malformed(format!("object key {:?} is not valid UTF-8", raw)))
}
