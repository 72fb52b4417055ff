//! Client for the Ocean Observatories Initiative machine-to-machine data API.
//!
//! A data request is answered asynchronously: the service prepares result
//! files out of band while the client polls for completion, then the files
//! are downloaded, normalised onto a time axis and merged into one dataset.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use ooi_m2m::{session, Config, JobCache, ParquetDecoder, HttpTransport, RequestDescriptor};
//!
//! # async fn run() -> ooi_m2m::Result<()> {
//! let config = Config::default();
//! let transport = Arc::new(HttpTransport::authenticated(&config)?);
//! let mut cache = JobCache::load(&config.cache_path, config.expiry_days);
//! let descriptor = RequestDescriptor {
//!     site: "CE02SHSM".into(),
//!     node: "RID27".into(),
//!     sensor: "03-CTDBPC000".into(),
//!     method: "telemetered".into(),
//!     stream: "ctdbp_cdef_dcl_instrument".into(),
//!     begin: "2023-01-01T00:00:00.000Z".into(),
//!     end: "2023-01-08T00:00:00.000Z".into(),
//! };
//! let outcome = session::fetch(transport, Arc::new(ParquetDecoder), &config, &mut cache, &descriptor).await?;
//! # let _ = outcome;
//! # Ok(())
//! # }
//! ```

pub mod cache;
pub mod catalog;
pub mod config;
pub mod decode;
pub mod error;
pub mod inventory;
pub mod job;
pub mod logging;
pub mod output;
pub mod pipeline;
pub mod request;
pub mod session;
pub mod table;
pub mod transport;

pub use cache::{CacheEntry, JobCache};
pub use catalog::FileSetResolver;
pub use config::Config;
pub use decode::{Decoder, ParquetDecoder};
pub use error::{Error, Result};
pub use inventory::Inventory;
pub use job::{Completion, JobClient, JobHandle};
pub use pipeline::{merge, FetchMergePipeline, MergedDataset, WorkerPool};
pub use request::{Format, RequestDescriptor};
pub use session::{Fetch, Prepare, Session};
pub use table::{Column, NormalizedTable, RawTable};
pub use transport::{HttpTransport, Transport};
