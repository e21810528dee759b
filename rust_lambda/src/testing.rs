//! In-memory stand-ins for S3, ClamAV and the invocation clock.

use lambda_runtime::tracing::subscriber::fmt::MakeWriter;
use serde_json::Value;
use std::collections::{BTreeMap, HashSet};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use crate::deadline::Deadline;
use crate::scanner::{ScannerError, Verdict, VirusScanner};
use crate::store::{ListCursor, ListPage, ListedObject, ObjectStore, StoreError};

pub const EICAR: &[u8] =
    br"X5O!P%@AP[4\PZX54(P^)7CC)7}$EICAR-STANDARD-ANTIVIRUS-TEST-FILE!$H+H*";
pub const EICAR_SIGNATURE: &str = "Eicar-Test-Signature";
/// Content the fake scanner refuses to classify.
pub const UNSCANNABLE: &[u8] = b"fake-scanner: unreadable archive";

struct FakeObject {
    body: Vec<u8>,
    size: u64,
}

#[derive(Default)]
pub struct FakeStore {
    objects: BTreeMap<String, FakeObject>,
    page_size: usize,
    fail_listing: bool,
    broken_downloads: HashSet<String>,
    pub list_calls: AtomicUsize,
    pub head_calls: AtomicUsize,
    pub downloaded: Mutex<Vec<PathBuf>>,
}

impl FakeStore {
    pub fn new() -> Self {
        Self {
            page_size: 1000,
            ..Default::default()
        }
    }

    pub fn with_object(mut self, key: &str, body: &[u8]) -> Self {
        self.objects.insert(
            key.to_owned(),
            FakeObject {
                body: body.to_vec(),
                size: body.len() as u64,
            },
        );
        self
    }

    /// An object that reports `size` without carrying that many bytes.
    pub fn with_sized_object(mut self, key: &str, size: u64) -> Self {
        self.objects.insert(
            key.to_owned(),
            FakeObject {
                body: b"padding".to_vec(),
                size,
            },
        );
        self
    }

    pub fn with_page_size(mut self, page_size: usize) -> Self {
        self.page_size = page_size;
        self
    }

    pub fn with_broken_download(mut self, key: &str) -> Self {
        self.broken_downloads.insert(key.to_owned());
        self
    }

    pub fn with_failing_listing(mut self) -> Self {
        self.fail_listing = true;
        self
    }

    pub fn list_calls(&self) -> usize {
        self.list_calls.load(Ordering::SeqCst)
    }

    pub fn head_calls(&self) -> usize {
        self.head_calls.load(Ordering::SeqCst)
    }

    pub fn downloads(&self) -> Vec<PathBuf> {
        self.downloaded.lock().unwrap().clone()
    }
}

impl ObjectStore for FakeStore {
    async fn list_page(
        &self,
        bucket: &str,
        cursor: &ListCursor<'_>,
    ) -> Result<ListPage, StoreError> {
        self.list_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_listing {
            return Err(StoreError::List {
                bucket: bucket.to_owned(),
                message: "AccessDenied".to_owned(),
            });
        }

        // the continuation token is the last key of the previous page
        let after = cursor.continuation.as_deref().or(cursor.start_after);
        let mut remaining = self
            .objects
            .iter()
            .filter(|(key, _)| cursor.prefix.is_none_or(|prefix| key.starts_with(prefix)))
            .filter(|(key, _)| after.is_none_or(|after| key.as_str() > after));

        let objects: Vec<ListedObject> = remaining
            .by_ref()
            .take(self.page_size)
            .map(|(key, object)| ListedObject {
                key: key.clone(),
                size: Some(object.size),
            })
            .collect();
        let next = remaining
            .next()
            .and_then(|_| objects.last().map(|object| object.key.clone()));
        Ok(ListPage { objects, next })
    }

    async fn object_size(&self, bucket: &str, key: &str) -> Result<u64, StoreError> {
        self.head_calls.fetch_add(1, Ordering::SeqCst);
        self.objects
            .get(key)
            .map(|object| object.size)
            .ok_or_else(|| StoreError::Head {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                message: "NotFound".to_owned(),
            })
    }

    async fn download(&self, bucket: &str, key: &str, dest: &Path) -> Result<u64, StoreError> {
        self.downloaded.lock().unwrap().push(dest.to_path_buf());
        let object = self
            .objects
            .get(key)
            .filter(|_| !self.broken_downloads.contains(key))
            .ok_or_else(|| StoreError::Download {
                bucket: bucket.to_owned(),
                key: key.to_owned(),
                message: "connection reset".to_owned(),
            })?;
        tokio::fs::write(dest, &object.body).await?;
        Ok(object.body.len() as u64)
    }
}

/// A clock that only moves when a fake scan runs.
pub struct FakeClock {
    remaining: Mutex<Duration>,
}

impl FakeClock {
    pub fn new(remaining: Duration) -> Self {
        Self {
            remaining: Mutex::new(remaining),
        }
    }

    pub fn advance(&self, by: Duration) {
        let mut remaining = self.remaining.lock().unwrap();
        *remaining = remaining.saturating_sub(by);
    }
}

impl Deadline for FakeClock {
    fn remaining(&self) -> Duration {
        *self.remaining.lock().unwrap()
    }
}

#[derive(Default)]
pub struct FakeScanner<'a> {
    clock: Option<(&'a FakeClock, Duration)>,
    delay: Duration,
    pub scans: AtomicUsize,
}

impl<'a> FakeScanner<'a> {
    /// Every scan consumes `per_scan` of the clock's remaining time.
    pub fn timed(clock: &'a FakeClock, per_scan: Duration) -> Self {
        Self {
            clock: Some((clock, per_scan)),
            ..Default::default()
        }
    }

    /// Every scan also sleeps for `delay` of real time.
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn scans(&self) -> usize {
        self.scans.load(Ordering::SeqCst)
    }
}

impl VirusScanner for FakeScanner<'_> {
    async fn scan(&self, path: &Path) -> Result<Verdict, ScannerError> {
        self.scans.fetch_add(1, Ordering::SeqCst);
        if let Some((clock, per_scan)) = self.clock {
            clock.advance(per_scan);
        }
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        let content = tokio::fs::read(path)
            .await
            .map_err(|source| ScannerError::Spawn {
                binary: "fake-scanner".to_owned(),
                source,
            })?;
        if content.windows(EICAR.len()).any(|window| window == EICAR) {
            Ok(Verdict::Infected {
                signature: Some(EICAR_SIGNATURE.to_owned()),
            })
        } else if content == UNSCANNABLE {
            Err(ScannerError::Failed {
                code: 2,
                detail: "Can't open file".to_owned(),
            })
        } else {
            Ok(Verdict::Clean)
        }
    }
}

/// Log sink for a test-local JSON subscriber.
#[derive(Clone, Default)]
pub struct CapturedLogs(Arc<Mutex<Vec<u8>>>);

impl CapturedLogs {
    /// One JSON value per emitted event.
    pub fn events(&self) -> Vec<Value> {
        let bytes = self.0.lock().unwrap().clone();
        String::from_utf8(bytes)
            .unwrap()
            .lines()
            .map(|line| serde_json::from_str(line).unwrap())
            .collect()
    }
}

impl io::Write for CapturedLogs {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl<'a> MakeWriter<'a> for CapturedLogs {
    type Writer = CapturedLogs;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
