//! One request from descriptor to dataset.
//!
//! The job cache is consulted first; only a miss submits a new job. Either
//! way the job is polled before its catalog is read, so a cached job that
//! never finished is checked again rather than trusted.

use std::sync::Arc;

use tracing::{info, warn};

use crate::{
    cache::JobCache,
    catalog::FileSetResolver,
    decode::Decoder,
    error::Result,
    job::{Completion, JobClient, JobHandle},
    pipeline::{FetchMergePipeline, MergedDataset},
    request::{Format, RequestDescriptor},
    transport::Transport,
    Config,
};

/// A finished job and its result files.
#[derive(Debug, Clone, PartialEq)]
pub struct Prepared {
    pub handle: JobHandle,
    pub files: Vec<String>,
    pub from_cache: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Prepare {
    Ready(Prepared),
    /// The job is still running; try again later.
    NotReady { attempts: u32 },
}

#[derive(Debug, Clone, PartialEq)]
pub enum Fetch {
    Dataset(MergedDataset),
    NoFiles,
    NotReady { attempts: u32 },
}

pub struct Session<'a> {
    jobs: JobClient,
    resolver: FileSetResolver,
    format: Format,
    cache: &'a mut JobCache,
}

impl<'a> Session<'a> {
    pub fn new(transport: Arc<dyn Transport>, config: &Config, cache: &'a mut JobCache) -> Result<Self> {
        let jobs = JobClient::new(Arc::clone(&transport), config);
        let resolver = FileSetResolver::new(transport, &config.file_pattern())?
            .with_exclude(config.exclude.clone());

        Ok(Session {
            jobs,
            resolver,
            format: config.format,
            cache,
        })
    }

    pub async fn prepare(&mut self, descriptor: &RequestDescriptor) -> Result<Prepare> {
        let cached = self.cache.lookup(descriptor, self.format).and_then(|entry| entry.handle());

        let (handle, from_cache) = match cached {
            Some(handle) => {
                info!(%descriptor, "reusing cached job");
                (handle, true)
            }
            None => {
                let handle = self.jobs.submit(descriptor).await?;
                self.cache.store(descriptor, self.format, &handle);
                if let Err(e) = self.cache.persist() {
                    warn!(error = %e, "could not save job cache");
                }
                (handle, false)
            }
        };

        let handle = match self.jobs.await_completion(&handle).await {
            Completion::Ready(handle) => handle,
            Completion::TimedOut { attempts } => return Ok(Prepare::NotReady { attempts }),
        };

        let files = self.resolver.resolve(&handle).await?;

        Ok(Prepare::Ready(Prepared {
            handle,
            files,
            from_cache,
        }))
    }

    pub async fn fetch(
        &mut self,
        descriptor: &RequestDescriptor,
        pipeline: &FetchMergePipeline,
    ) -> Result<Fetch> {
        let prepared = match self.prepare(descriptor).await? {
            Prepare::Ready(prepared) => prepared,
            Prepare::NotReady { attempts } => return Ok(Fetch::NotReady { attempts }),
        };

        if prepared.files.is_empty() {
            info!(%descriptor, "job produced no result files");
            return Ok(Fetch::NoFiles);
        }

        let dataset = pipeline.run(&prepared.files).await?;
        Ok(Fetch::Dataset(dataset))
    }
}

/// Convenience wrapper building the pipeline from `config`.
pub async fn fetch(
    transport: Arc<dyn Transport>,
    decoder: Arc<dyn Decoder>,
    config: &Config,
    cache: &mut JobCache,
    descriptor: &RequestDescriptor,
) -> Result<Fetch> {
    let pipeline = FetchMergePipeline::new(Arc::clone(&transport), decoder, config);
    let mut session = Session::new(transport, config, cache)?;
    session.fetch(descriptor, &pipeline).await
}

// -- Tests -------------------------------------------------------------------
