//! Downloading result files, decoding them and merging the results.

pub mod merge;
pub mod pool;

use std::{
    future::Future,
    path::{Path, PathBuf},
    sync::Arc,
};

use indicatif::ProgressBar;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

pub use merge::{merge, MergeFailure, MergedDataset};
pub use pool::WorkerPool;

use crate::{
    decode::Decoder,
    error::Result,
    table::NormalizedTable,
    transport::Transport,
    Config,
};

pub struct FetchMergePipeline {
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decoder>,
    pool: WorkerPool,
    concurrency_threshold: usize,
    progress: ProgressBar,
    cancel: CancellationToken,
}

impl FetchMergePipeline {
    pub fn new(transport: Arc<dyn Transport>, decoder: Arc<dyn Decoder>, config: &Config) -> Self {
        FetchMergePipeline {
            transport,
            decoder,
            pool: WorkerPool::new(config.max_workers),
            concurrency_threshold: config.concurrency_threshold,
            progress: ProgressBar::hidden(),
            cancel: CancellationToken::new(),
        }
    }

    /// Ticks `progress` once per finished file.
    pub fn with_progress(mut self, progress: ProgressBar) -> Self {
        self.progress = progress;
        self
    }

    /// Files not yet started when `cancel` fires are skipped and come back
    /// as `None`. The token belongs to the caller.
    pub fn with_cancellation(mut self, cancel: CancellationToken) -> Self {
        self.cancel = cancel;
        self
    }

    /// Downloads and merges `locations` in one go.
    pub async fn run(&self, locations: &[String]) -> Result<MergedDataset> {
        let tables = self.fetch_all(locations).await;
        merge(tables)
    }

    /// Fetches and normalises every location. Output `i` belongs to input `i`;
    /// failed files are `None`.
    pub async fn fetch_all(&self, locations: &[String]) -> Vec<Option<NormalizedTable>> {
        let transport = Arc::clone(&self.transport);
        let decoder = Arc::clone(&self.decoder);

        self.dispatch(locations, move |location| {
            let (transport, decoder) = (Arc::clone(&transport), Arc::clone(&decoder));
            async move { process_one(transport, decoder, location).await }
        })
        .await
    }

    pub async fn process_one(&self, location: &str) -> Option<NormalizedTable> {
        process_one(
            Arc::clone(&self.transport),
            Arc::clone(&self.decoder),
            location.to_string(),
        )
        .await
    }

    /// Saves the raw bytes of every location into `dir`, for formats without a
    /// bundled decoder.
    pub async fn download_all(&self, locations: &[String], dir: &Path) -> Vec<Option<PathBuf>> {
        let transport = Arc::clone(&self.transport);
        let dir = dir.to_path_buf();

        self.dispatch(locations, move |location| {
            let (transport, dir) = (Arc::clone(&transport), dir.clone());
            async move {
                match download_to(transport.as_ref(), &location, &dir).await {
                    Ok(path) => Some(path),
                    Err(e) => {
                        warn!(url = %location, error = %e, "failed to download");
                        None
                    }
                }
            }
        })
        .await
    }

    /// Runs `job` over `locations`, pooled above the concurrency threshold and
    /// in order otherwise.
    async fn dispatch<O, F, Fut>(&self, locations: &[String], job: F) -> Vec<Option<O>>
    where
        O: Send + 'static,
        F: Fn(String) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Option<O>> + Send + 'static,
    {
        let progress = self.progress.clone();
        let job = move |location: String| {
            let progress = progress.clone();
            let work = job(location);
            async move {
                let output = work.await;
                progress.inc(1);
                output
            }
        };

        if locations.len() > self.concurrency_threshold {
            debug!(files = locations.len(), workers = self.pool.max_workers(), "fetching in parallel");
            self.pool
                .run(locations.to_vec(), &self.cancel, job)
                .await
                .into_iter()
                .map(Option::flatten)
                .collect()
        } else {
            let mut outputs = Vec::with_capacity(locations.len());
            for location in locations {
                if self.cancel.is_cancelled() {
                    outputs.push(None);
                    continue;
                }
                outputs.push(job(location.clone()).await);
            }
            outputs
        }
    }
}

/// Downloads and normalises one file. Failures are logged, never raised.
async fn process_one(
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decoder>,
    location: String,
) -> Option<NormalizedTable> {
    let bytes = match transport.get_bytes(&location).await {
        Ok(bytes) => bytes,
        Err(e) => {
            warn!(url = %location, error = %e, "failed to download");
            return None;
        }
    };

    let decoded = tokio::task::spawn_blocking(move || {
        decoder
            .decode(bytes)
            .and_then(NormalizedTable::from_raw)
    })
    .await;

    match decoded {
        Ok(Ok(table)) => {
            debug!(url = %location, rows = table.len(), "processed");
            Some(table)
        }
        Ok(Err(e)) => {
            warn!(url = %location, error = %e, "failed to process");
            None
        }
        Err(e) => {
            warn!(url = %location, error = %e, "decode task failed");
            None
        }
    }
}

async fn download_to(transport: &dyn Transport, location: &str, dir: &Path) -> Result<PathBuf> {
    let bytes = transport.get_bytes(location).await?;
    let file_name = location
        .rsplit('/')
        .next()
        .filter(|name| !name.is_empty())
        .unwrap_or("result.dat");
    let path = dir.join(file_name);
    tokio::fs::write(&path, &bytes).await?;
    Ok(path)
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use bytes::Bytes;
    use tempfile::TempDir;

    use super::*;
    use crate::{decode::tests::parquet_fixture, decode::ParquetDecoder, transport::fake::FakeTransport};

    fn url(i: usize) -> String {
        format!("https://opendap.example.org/files/deployment0001_{:02}.parquet", i)
    }

    fn pipeline(transport: FakeTransport) -> FetchMergePipeline {
        FetchMergePipeline::new(Arc::new(transport), Arc::new(ParquetDecoder), &Config::default())
    }

    #[tokio::test]
    async fn should_tolerate_a_failed_download() {
        let mut fake = FakeTransport::new();
        for i in 0..5 {
            let status = if i == 2 { 500 } else { 200 };
            let times = [(i * 10) as i32, (i * 10 + 1) as i32];
            fake = fake.with_bytes(&url(i), status, parquet_fixture(&times));
        }
        let pipeline = pipeline(fake);
        let locations: Vec<String> = (0..5).map(url).collect();

        let tables = pipeline.fetch_all(&locations).await;

        assert_eq!(tables.len(), 5);
        assert_eq!(tables.iter().filter(|t| t.is_some()).count(), 4);
        assert!(tables[2].is_none());

        let merged = merge(tables).unwrap();
        assert_eq!(merged.skipped_inputs, 1);
        assert_eq!(merged.table.time(), &[0.0, 1.0, 10.0, 11.0, 30.0, 31.0, 40.0, 41.0]);
    }

    #[tokio::test]
    async fn should_preserve_order_on_the_pooled_path() {
        let mut fake = FakeTransport::new();
        for i in 0..10 {
            fake = fake
                .with_bytes(&url(i), 200, parquet_fixture(&[(i * 10) as i32]))
                .with_delay(&url(i), Duration::from_millis(((10 - i) * 5) as u64));
        }
        let pipeline = pipeline(fake);
        let locations: Vec<String> = (0..10).map(url).collect();

        let tables = pipeline.fetch_all(&locations).await;

        for (i, table) in tables.iter().enumerate() {
            let table = table.as_ref().unwrap();
            assert_eq!(table.time(), &[(i * 10) as f64]);
        }
    }

    #[tokio::test]
    async fn should_skip_files_after_cancellation_on_both_paths() {
        let mut fake = FakeTransport::new();
        for i in 0..6 {
            fake = fake.with_bytes(&url(i), 200, parquet_fixture(&[i as i32]));
        }
        let cancel = CancellationToken::new();
        cancel.cancel();
        let pipeline = pipeline(fake).with_cancellation(cancel);

        let pooled = pipeline.fetch_all(&(0..6).map(url).collect::<Vec<_>>()).await;
        let sequential = pipeline.fetch_all(&(0..2).map(url).collect::<Vec<_>>()).await;

        assert!(pooled.iter().all(Option::is_none));
        assert!(sequential.iter().all(Option::is_none));
    }

    #[tokio::test]
    async fn should_serve_repeated_runs() {
        let mut fake = FakeTransport::new();
        for i in 0..6 {
            fake = fake.with_bytes(&url(i), 200, parquet_fixture(&[i as i32]));
        }
        let pipeline = pipeline(fake);
        let locations: Vec<String> = (0..6).map(url).collect();

        let first = pipeline.fetch_all(&locations).await;
        let second = pipeline.run(&locations).await.unwrap();

        assert!(first.iter().all(Option::is_some));
        assert_eq!(second.table.time(), &[0.0, 1.0, 2.0, 3.0, 4.0, 5.0]);
    }

    #[tokio::test]
    async fn should_drop_bookkeeping_and_sort() {
        let fake = FakeTransport::new().with_bytes(&url(0), 200, parquet_fixture(&[5, 3, 4]));
        let pipeline = pipeline(fake);

        let table = pipeline.process_one(&url(0)).await.unwrap();

        assert_eq!(table.time(), &[3.0, 4.0, 5.0]);
        assert!(table.column("obs").is_none());
        assert!(table.column("temperature").is_some());
    }

    #[tokio::test]
    async fn should_return_none_for_undecodable_file() {
        let fake = FakeTransport::new().with_bytes(&url(0), 200, b"CDF\x01".to_vec());
        let pipeline = pipeline(fake);

        assert!(pipeline.process_one(&url(0)).await.is_none());
    }

    #[tokio::test]
    async fn should_fail_merge_when_every_file_fails() {
        let fake = FakeTransport::new();
        let pipeline = pipeline(fake);
        let locations: Vec<String> = (0..3).map(url).collect();

        let err = pipeline.run(&locations).await.unwrap_err();

        assert!(matches!(err, crate::Error::AllEmpty));
    }

    #[tokio::test]
    async fn should_save_raw_files() {
        let dir = TempDir::new().unwrap();
        let fake = FakeTransport::new()
            .with_bytes(&url(0), 200, b"first".to_vec())
            .with_bytes(&url(1), 404, Vec::new());
        let pipeline = pipeline(fake);

        let saved = pipeline.download_all(&[url(0), url(1)], dir.path()).await;

        let path = saved[0].as_ref().unwrap();
        assert_eq!(Bytes::from(std::fs::read(path).unwrap()), Bytes::from_static(b"first"));
        assert!(saved[1].is_none());
    }
}
