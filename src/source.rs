use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use moka::future::Cache;
use object_store::aws::AmazonS3Builder;
use object_store::http::HttpBuilder;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::ObjectStore;
use parking_lot::Mutex;
use tracing::{debug, trace};
use url::Url;

use crate::error::{CogWindowError, Result};

/// Per-call accounting of the range requests issued by one partial read.
#[derive(Debug, Default)]
pub struct RequestStats {
    total_bytes_requested: AtomicU64,
    total_requests: AtomicU64,
    requested_ranges: Mutex<Vec<(u64, u64)>>,
}

impl RequestStats {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a completed request for the inclusive range `start..=end`.
    pub fn record(&self, start: u64, end: u64) {
        self.total_bytes_requested
            .fetch_add(end - start + 1, Ordering::Relaxed);
        self.total_requests.fetch_add(1, Ordering::Relaxed);
        self.requested_ranges.lock().push((start, end));
    }

    pub fn total_bytes_requested(&self) -> u64 {
        self.total_bytes_requested.load(Ordering::Relaxed)
    }

    pub fn total_requests(&self) -> u64 {
        self.total_requests.load(Ordering::Relaxed)
    }

    /// Inclusive byte ranges in completion order.
    pub fn requested_ranges(&self) -> Vec<(u64, u64)> {
        self.requested_ranges.lock().clone()
    }
}

/// Byte-range access to a single remote or local object.
///
/// Implementations must tolerate concurrent requests from the same partial read.
#[async_trait]
pub trait RangeReader: Send + Sync {
    /// Human readable location of the object, used in errors and logs.
    fn location(&self) -> String;

    /// Fetch the inclusive range `start..=start + length_minus_one`.
    ///
    /// Returns exactly `length_minus_one + 1` bytes; anything else is a fetch failure.
    async fn range_request(
        &self,
        start: u64,
        length_minus_one: u64,
        stats: &RequestStats,
    ) -> Result<Bytes>;
}

/// A [RangeReader] over any [ObjectStore] (local disk, HTTP, S3).
#[derive(Debug, Clone)]
pub struct ObjectStoreReader {
    store: Arc<dyn ObjectStore>,
    path: Path,
}

impl ObjectStoreReader {
    pub fn new(store: Arc<dyn ObjectStore>, path: Path) -> Self {
        Self { store, path }
    }

    /// Pick a store from the scheme of `location`.
    ///
    /// `http(s)://` uses an HTTP store, `s3://bucket/key` an S3 store configured
    /// from the environment, and `file://` or a bare path the local filesystem.
    pub fn from_location(location: &str) -> Result<Self> {
        match Url::parse(location) {
            Ok(url) => Self::from_url(&url, location),
            Err(url::ParseError::RelativeUrlWithoutBase) => Self::from_local_path(location),
            Err(err) => Err(err.into()),
        }
    }

    fn from_url(url: &Url, location: &str) -> Result<Self> {
        match url.scheme() {
            "http" | "https" => {
                let store = HttpBuilder::new()
                    .with_url(&url[..url::Position::BeforePath])
                    .build()?;
                let path = Path::from_url_path(url.path())?;
                Ok(Self::new(Arc::new(store), path))
            }
            "s3" => {
                let bucket = url.host_str().ok_or_else(|| {
                    CogWindowError::UnsupportedScheme(format!("missing bucket in {location}"))
                })?;
                let store = AmazonS3Builder::from_env()
                    .with_bucket_name(bucket)
                    .build()?;
                let path = Path::from_url_path(url.path())?;
                Ok(Self::new(Arc::new(store), path))
            }
            "file" => {
                let path = url.to_file_path().map_err(|_| {
                    CogWindowError::UnsupportedScheme(format!("not a local file url: {location}"))
                })?;
                Self::from_local_path(path)
            }
            // windows drive letter
            scheme if scheme.len() == 1 => Self::from_local_path(location),
            scheme => Err(CogWindowError::UnsupportedScheme(scheme.to_string())),
        }
    }

    fn from_local_path(path: impl AsRef<std::path::Path>) -> Result<Self> {
        let path = Path::from_filesystem_path(path)?;
        Ok(Self::new(Arc::new(LocalFileSystem::new()), path))
    }

    pub fn into_inner(self) -> (Arc<dyn ObjectStore>, Path) {
        (self.store, self.path)
    }
}

#[async_trait]
impl RangeReader for ObjectStoreReader {
    fn location(&self) -> String {
        format!("{}/{}", self.store, self.path)
    }

    async fn range_request(
        &self,
        start: u64,
        length_minus_one: u64,
        stats: &RequestStats,
    ) -> Result<Bytes> {
        let end = start + length_minus_one;
        let begin = Instant::now();
        let bytes = self
            .store
            .get_range(&self.path, start as usize..end as usize + 1)
            .await
            .map_err(|err| CogWindowError::Fetch {
                location: self.location(),
                start,
                end,
                source: Box::new(err),
            })?;

        if bytes.len() as u64 != length_minus_one + 1 {
            return Err(CogWindowError::Fetch {
                location: self.location(),
                start,
                end,
                source: format!(
                    "expected {} bytes, received {}",
                    length_minus_one + 1,
                    bytes.len()
                )
                .into(),
            });
        }

        stats.record(start, end);
        debug!(
            path = %self.path,
            elapsed = ?begin.elapsed(),
            "FINISHED REQUEST ({start}-{end})"
        );
        Ok(bytes)
    }
}

/// Default capacity of a [CachedRangeReader], in bytes.
pub const DEFAULT_BLOCK_CACHE_BYTES: u64 = 64 * 1024 * 1024;

type BlockKey = (Arc<str>, u64, u64);

/// A [RangeReader] that keeps the bytes of completed requests in memory.
///
/// Entries are keyed on `(location, start, length_minus_one)` and evicted by
/// size. Cache hits are not recorded in [RequestStats].
pub struct CachedRangeReader {
    inner: Arc<dyn RangeReader>,
    location: Arc<str>,
    cache: Cache<BlockKey, Bytes>,
}

impl CachedRangeReader {
    pub fn new(inner: Arc<dyn RangeReader>, max_size_bytes: u64) -> Self {
        let cache = Cache::builder()
            .weigher(|_key: &BlockKey, value: &Bytes| -> u32 {
                value.len().min(u32::MAX as usize) as u32
            })
            .max_capacity(max_size_bytes)
            .build();
        Self {
            location: inner.location().into(),
            inner,
            cache,
        }
    }

    /// Number of cached blocks.
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}

#[async_trait]
impl RangeReader for CachedRangeReader {
    fn location(&self) -> String {
        self.location.to_string()
    }

    async fn range_request(
        &self,
        start: u64,
        length_minus_one: u64,
        stats: &RequestStats,
    ) -> Result<Bytes> {
        let key = (Arc::clone(&self.location), start, length_minus_one);
        if let Some(bytes) = self.cache.get(&key).await {
            trace!(location = %self.location, start, length_minus_one, "block cache hit");
            return Ok(bytes);
        }
        let bytes = self
            .inner
            .range_request(start, length_minus_one, stats)
            .await?;
        self.cache.insert(key, bytes.clone()).await;
        Ok(bytes)
    }
}
