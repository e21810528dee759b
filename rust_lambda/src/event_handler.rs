use lambda_runtime::{tracing, Error, LambdaEvent};
use serde_json::Value;

use crate::deadline::{Deadline, InvocationDeadline};
use crate::error::ScanError;
use crate::request::ScanRequest;
use crate::scan::ScanService;
use crate::scanner::VirusScanner;
use crate::store::ObjectStore;
use crate::summary::ScanSummary;

/// Scans the objects an upload event names, or the whole configured bucket
/// when the event carries no S3 records.
pub(crate) async fn handle<S, V, D>(
    payload: Value,
    deadline: &D,
    service: &ScanService<S, V>,
) -> Result<ScanSummary, ScanError>
where
    S: ObjectStore + Sync,
    V: VirusScanner + Sync,
    D: Deadline,
{
    match ScanRequest::from_payload(payload)? {
        ScanRequest::Objects(targets) => {
            tracing::info!(
                objects = targets.len(),
                remaining_ms = deadline.remaining().as_millis() as u64,
                "Scanning objects from S3 event"
            );
            Ok(service.scan_targets(&targets, deadline).await)
        }
        ScanRequest::Bucket(request) => {
            let bucket = service
                .config()
                .bucket
                .as_deref()
                .ok_or(ScanError::MissingBucket)?;
            tracing::info!(
                bucket,
                prefix = request.prefix.as_deref(),
                start_after = request.start_after.as_deref(),
                remaining_ms = deadline.remaining().as_millis() as u64,
                "Starting full bucket scan"
            );
            Ok(service.scan_bucket(bucket, &request, deadline).await?)
        }
    }
}

pub(crate) async fn function_handler<S, V>(
    event: LambdaEvent<Value>,
    service: &ScanService<S, V>,
) -> Result<Value, Error>
where
    S: ObjectStore + Sync,
    V: VirusScanner + Sync,
{
    let (payload, context) = event.into_parts();
    let deadline = InvocationDeadline::from_context(&context);
    let summary = handle(payload, &deadline, service).await?;
    tracing::info!(
        request_id = %context.request_id,
        total_scanned = summary.total_scanned,
        clean = summary.clean,
        infected = summary.infected,
        errors = summary.errors,
        skipped = summary.skipped,
        truncated = summary.truncated,
        "Scan complete"
    );
    Ok(serde_json::to_value(&summary)?)
}
