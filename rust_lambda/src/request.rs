use aws_lambda_events::event::s3::{S3Event, S3EventRecord};
use lambda_runtime::tracing;
use serde::Deserialize;
use serde_json::Value;

const S3_EVENT_SOURCE: &str = "aws:s3";

/// What one invocation was asked to do.
#[derive(Debug, PartialEq)]
pub enum ScanRequest {
    /// Upload notifications, each naming one object.
    Objects(Vec<ScanTarget>),
    /// Scan every object of the configured bucket.
    Bucket(BucketScan),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanTarget {
    pub bucket: String,
    pub key: String,
    pub size: Option<u64>,
}

#[derive(Debug, Default, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct BucketScan {
    pub prefix: Option<String>,
    pub start_after: Option<String>,
}

impl ScanRequest {
    pub fn from_payload(payload: Value) -> Result<Self, serde_json::Error> {
        let has_records = payload
            .get("Records")
            .and_then(Value::as_array)
            .is_some_and(|records| !records.is_empty());

        if has_records {
            let event: S3Event = serde_json::from_value(payload)?;
            return Ok(Self::Objects(targets_from_event(event)));
        }

        match payload {
            Value::Null => Ok(Self::Bucket(BucketScan::default())),
            payload => Ok(Self::Bucket(serde_json::from_value(payload)?)),
        }
    }
}

fn targets_from_event(event: S3Event) -> Vec<ScanTarget> {
    event
        .records
        .into_iter()
        .filter_map(|record| {
            let target = target_from_record(&record);
            if target.is_none() {
                tracing::warn!(
                    event_source = record.event_source.as_deref(),
                    event_name = record.event_name.as_deref(),
                    "Ignoring record that does not name an S3 object"
                );
            }
            target
        })
        .collect()
}

fn target_from_record(record: &S3EventRecord) -> Option<ScanTarget> {
    if record
        .event_source
        .as_deref()
        .is_some_and(|source| source != S3_EVENT_SOURCE)
    {
        return None;
    }
    let bucket = record.s3.bucket.name.clone().filter(|b| !b.is_empty())?;
    let key = record.s3.object.key.as_deref().and_then(decode_object_key)?;
    Some(ScanTarget {
        bucket,
        key,
        size: record.s3.object.size.and_then(|size| u64::try_from(size).ok()),
    })
}

/// Event notifications carry keys form-encoded: `+` for space and `%XX` escapes.
pub fn decode_object_key(raw: &str) -> Option<String> {
    // `&` and `=` are always escaped in notification keys, so the whole key
    // parses as a single name.
    url::form_urlencoded::parse(raw.as_bytes())
        .next()
        .map(|(key, _)| key.into_owned())
        .filter(|key| !key.is_empty())
}
