use lambda_runtime::tracing;
use std::path::Path;
use std::time::Duration;

use crate::config::Config;
use crate::deadline::Deadline;
use crate::error::ObjectError;
use crate::request::{BucketScan, ScanTarget};
use crate::scanner::{Verdict, VirusScanner};
use crate::store::{ListCursor, ObjectStore, StoreError};
use crate::summary::{ScanOutcome, ScanSummary};

/// Log marker for detections; the log group's metric filter matches on it.
pub const INFECTED_MARKER: &str = "VIRUS_DETECTED";

pub struct ScanService<S, V> {
    config: Config,
    store: S,
    scanner: V,
}

impl<S, V> ScanService<S, V>
where
    S: ObjectStore + Sync,
    V: VirusScanner + Sync,
{
    pub fn new(config: Config, store: S, scanner: V) -> Self {
        Self {
            config,
            store,
            scanner,
        }
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Scans the objects named by upload notifications, stopping at the same
    /// deadline margin as a bucket scan.
    pub async fn scan_targets<D: Deadline>(
        &self,
        targets: &[ScanTarget],
        deadline: &D,
    ) -> ScanSummary {
        let mut summary = ScanSummary::default();
        let mut last_key: Option<String> = None;
        for target in targets {
            if self.out_of_time(deadline) {
                self.stop_early(&mut summary, last_key, deadline);
                return summary;
            }
            summary.record(self.scan_object(target, deadline).await);
            last_key = Some(target.key.clone());
        }
        summary
    }

    /// Lists and scans the whole bucket, one object at a time, stopping early
    /// once the remaining invocation time falls to the configured margin.
    pub async fn scan_bucket<D: Deadline>(
        &self,
        bucket: &str,
        request: &BucketScan,
        deadline: &D,
    ) -> Result<ScanSummary, StoreError> {
        let mut summary = ScanSummary::default();
        let mut last_key = request.start_after.clone();
        let mut continuation: Option<String> = None;
        let mut pages = 0usize;

        loop {
            if self.out_of_time(deadline) {
                self.stop_early(&mut summary, last_key, deadline);
                return Ok(summary);
            }

            let cursor = ListCursor {
                prefix: request.prefix.as_deref(),
                // S3 only honours start-after on the first request of a listing
                start_after: match continuation {
                    Some(_) => None,
                    None => request.start_after.as_deref(),
                },
                continuation: continuation.take(),
            };
            let page = self.store.list_page(bucket, &cursor).await?;
            pages += 1;
            tracing::info!(
                bucket,
                page = pages,
                objects = page.objects.len(),
                "Listed bucket page"
            );

            for object in page.objects {
                if self.out_of_time(deadline) {
                    self.stop_early(&mut summary, last_key, deadline);
                    return Ok(summary);
                }
                let target = ScanTarget {
                    bucket: bucket.to_owned(),
                    key: object.key,
                    size: object.size,
                };
                summary.record(self.scan_object(&target, deadline).await);
                last_key = Some(target.key);
            }

            match page.next {
                Some(token) => continuation = Some(token),
                None => return Ok(summary),
            }
        }
    }

    /// Download and scan together must finish before the deadline margin is
    /// reached, otherwise the object is recorded as an error.
    pub async fn scan_object<D: Deadline>(
        &self,
        target: &ScanTarget,
        deadline: &D,
    ) -> ScanOutcome {
        let bucket = target.bucket.as_str();
        let key = target.key.as_str();

        let size = match target.size {
            Some(size) => size,
            None => match self.store.object_size(bucket, key).await {
                Ok(size) => size,
                Err(e) => {
                    tracing::error!(bucket, key, error = %e, "Could not read object size");
                    return ScanOutcome::error(key, 0, e);
                }
            },
        };

        if size >= self.config.max_file_size {
            tracing::info!(
                bucket,
                key,
                size,
                max_file_size = self.config.max_file_size,
                "Skipping object over the size limit"
            );
            return ScanOutcome::skipped(key, size);
        }

        let budget = deadline.remaining().saturating_sub(self.config.deadline_margin);
        match self.download_and_scan(target, budget).await {
            Ok(Verdict::Clean) => {
                tracing::info!(bucket, key, size, status = "clean", "Scanned object");
                ScanOutcome::clean(key, size)
            }
            Ok(Verdict::Infected { signature }) => {
                tracing::warn!(
                    bucket,
                    key,
                    size,
                    signature = signature.as_deref().unwrap_or("unknown"),
                    status = "infected",
                    "{INFECTED_MARKER}: s3://{bucket}/{key}"
                );
                ScanOutcome::infected(key, size, signature)
            }
            Err(e) => {
                tracing::error!(bucket, key, size, error = %e, status = "error", "Scan failed");
                ScanOutcome::error(key, size, e)
            }
        }
    }

    /// The downloaded copy is removed whatever the scan result.
    async fn download_and_scan(
        &self,
        target: &ScanTarget,
        budget: Duration,
    ) -> Result<Verdict, ObjectError> {
        let file = tempfile::Builder::new()
            .prefix("scan-")
            .tempfile_in(&self.config.scratch_dir)?;
        let result = tokio::time::timeout(budget, self.fetch_and_scan(target, file.path()))
            .await
            .unwrap_or(Err(ObjectError::OutOfTime(budget)));
        if let Err(e) = file.close() {
            tracing::warn!(key = %target.key, error = %e, "Could not remove temporary file");
        }
        result
    }

    async fn fetch_and_scan(
        &self,
        target: &ScanTarget,
        path: &Path,
    ) -> Result<Verdict, ObjectError> {
        let written = self.store.download(&target.bucket, &target.key, path).await?;
        tracing::debug!(key = %target.key, bytes = written, "Downloaded object");
        Ok(self.scanner.scan(path).await?)
    }

    fn out_of_time<D: Deadline>(&self, deadline: &D) -> bool {
        deadline.remaining() <= self.config.deadline_margin
    }

    fn stop_early<D: Deadline>(
        &self,
        summary: &mut ScanSummary,
        last_key: Option<String>,
        deadline: &D,
    ) {
        tracing::warn!(
            considered = summary.considered(),
            resume_after = last_key.as_deref(),
            remaining_ms = deadline.remaining().as_millis() as u64,
            "Stopping scan before the invocation deadline"
        );
        summary.truncate(last_key);
    }
}
