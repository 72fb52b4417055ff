use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Result};
use ooi_m2m::{
    output::save_dataset,
    session::{Prepare, Prepared},
    Config, FetchMergePipeline, Format, HttpTransport, JobCache, ParquetDecoder,
    RequestDescriptor, Session, Transport,
};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::cli::{create_progress_bar, create_spinner, RequestArgs};

use super::{make_download_dir, make_parquet_file_name};

/// Prepares the request and lists its result files.
pub async fn files(config: &Config, request: &RequestArgs) -> Result<String> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::authenticated(config)?);
    let descriptor = request.descriptor()?;

    match prepare(config, transport, &descriptor).await? {
        Some(prepared) => Ok(prepared.files.join("\n")),
        None => Ok(not_ready_message()),
    }
}

/// Prepares the request and downloads its result files, merging them when
/// the format can be decoded.
pub async fn fetch(
    config: &Config,
    request: &RequestArgs,
    output: Option<PathBuf>,
    output_dir: Option<PathBuf>,
) -> Result<String> {
    let transport: Arc<dyn Transport> = Arc::new(HttpTransport::authenticated(config)?);
    let descriptor = request.descriptor()?;

    let Some(prepared) = prepare(config, Arc::clone(&transport), &descriptor).await? else {
        return Ok(not_ready_message());
    };
    if prepared.files.is_empty() {
        return Ok("Job finished without result files".to_string());
    }

    let pb = create_progress_bar(prepared.files.len() as u64, "Processing files".to_string());
    let cancel = CancellationToken::new();
    let interrupt = cancel_on_interrupt(cancel.clone());

    match config.format {
        Format::Parquet => {
            let pipeline = FetchMergePipeline::new(transport, Arc::new(ParquetDecoder), config)
                .with_progress(pb.clone())
                .with_cancellation(cancel.clone());
            let dataset = pipeline.run(&prepared.files).await;
            interrupt.abort();
            if cancel.is_cancelled() {
                pb.abandon_with_message("Interrupted");
                bail!("interrupted before all files were processed, nothing saved");
            }
            let dataset = dataset?;
            pb.finish_with_message("Files processed");

            if dataset.skipped_inputs > 0 || dataset.failed_tables > 0 {
                eprintln!(
                    "Warning: {} files could not be read, {} could not be merged",
                    dataset.skipped_inputs, dataset.failed_tables
                );
            }

            let file_name = output.unwrap_or_else(|| make_parquet_file_name(&descriptor));
            save_dataset(&dataset, &file_name)?;

            Ok(format!("File saved to `{}`", file_name.to_string_lossy()))
        }
        Format::NetCdf => {
            let dir = output_dir.unwrap_or_else(|| make_download_dir(&descriptor));
            tokio::fs::create_dir_all(&dir).await?;

            // download_all never decodes
            let pipeline = FetchMergePipeline::new(transport, Arc::new(ParquetDecoder), config)
                .with_progress(pb.clone())
                .with_cancellation(cancel.clone());
            let saved = pipeline.download_all(&prepared.files, &dir).await;
            interrupt.abort();
            if cancel.is_cancelled() {
                pb.abandon_with_message("Interrupted");
            } else {
                pb.finish_with_message("Files downloaded");
            }

            let count = saved.iter().flatten().count();
            if count == 0 {
                return Err(anyhow!("none of the {} result files could be downloaded", saved.len()));
            }

            Ok(format!(
                "{} of {} files saved to `{}`",
                count,
                saved.len(),
                dir.to_string_lossy()
            ))
        }
    }
}

/// Cancels `cancel` on Ctrl-C. Abort the returned task once the work is done.
fn cancel_on_interrupt(cancel: CancellationToken) -> JoinHandle<()> {
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            eprintln!("Interrupted, finishing files in progress");
            cancel.cancel();
        }
    })
}

async fn prepare(
    config: &Config,
    transport: Arc<dyn Transport>,
    descriptor: &RequestDescriptor,
) -> Result<Option<Prepared>> {
    let mut cache = JobCache::load(&config.cache_path, config.expiry_days);
    let mut session = Session::new(transport, config, &mut cache)?;

    let bar = create_spinner(format!("Waiting for {}...", descriptor.stream));
    let prepared = session.prepare(descriptor).await?;

    match prepared {
        Prepare::Ready(prepared) => {
            bar.finish_with_message(format!("{} result files ready", prepared.files.len()));
            Ok(Some(prepared))
        }
        Prepare::NotReady { attempts } => {
            bar.finish_with_message(format!("Not ready after {} status checks", attempts));
            Ok(None)
        }
    }
}

fn not_ready_message() -> String {
    "The request is still being prepared, try again later".to_string()
}
