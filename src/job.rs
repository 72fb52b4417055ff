//! Submitting prepare-requests and waiting for the service to finish them.
//!
//! The service answers a data request immediately with a list of URLs. One
//! of them points at an `async_results` directory that only gains a
//! `status.txt` once the job is done, so completion is detected by polling
//! that file: 200 means ready, 404 means still working, anything else is
//! logged and polling carries on until the attempt budget runs out.

use std::{sync::Arc, time::Duration};

use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, info, warn};

use crate::{error::Result, request::RequestDescriptor, transport::Transport, Config, Error};

const ASYNC_MARKER: &str = "async_results";
const STATUS_FILE: &str = "status.txt";

/// A submitted job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct JobHandle {
    /// First entry of `allURLs`: the catalog listing the result files.
    pub catalog_url: String,
    pub async_result_url: String,
    pub status_check_url: String,
    /// Seconds since the Unix epoch.
    pub submitted_at: f64,
}

impl JobHandle {
    pub fn new(catalog_url: String, async_result_url: String, submitted_at: f64) -> Self {
        let status_check_url = format!("{}/{}", async_result_url.trim_end_matches('/'), STATUS_FILE);
        JobHandle {
            catalog_url,
            async_result_url,
            status_check_url,
            submitted_at,
        }
    }
}

/// Terminal states of [`JobClient::await_completion`].
#[derive(Debug, Clone, PartialEq)]
pub enum Completion {
    Ready(JobHandle),
    TimedOut { attempts: u32 },
}

pub struct JobClient {
    transport: Arc<dyn Transport>,
    base_url: String,
    format: &'static str,
    max_attempts: u32,
    poll_interval: Duration,
}

impl JobClient {
    pub fn new(transport: Arc<dyn Transport>, config: &Config) -> Self {
        JobClient {
            transport,
            base_url: config.base_url.clone(),
            format: config.format.mime(),
            max_attempts: config.max_attempts,
            poll_interval: config.poll_interval,
        }
    }

    pub fn with_polling(mut self, max_attempts: u32, poll_interval: Duration) -> Self {
        self.max_attempts = max_attempts;
        self.poll_interval = poll_interval;
        self
    }

    /// Submits the prepare-request and extracts the completion handle.
    pub async fn submit(&self, descriptor: &RequestDescriptor) -> Result<JobHandle> {
        let url = format!("{}{}", self.base_url, descriptor.path());
        let params = self.request_params(descriptor);

        info!(%descriptor, "submitting data request");
        let response = self.transport.get_json(&url, &params).await?;

        let urls = result_urls(&response).ok_or(Error::NoResultUrl { url })?;
        let handle = handle_from_urls(urls, now())?;
        debug!(status = %handle.status_check_url, "job submitted");

        Ok(handle)
    }

    /// Polls the status file until it exists or the attempt budget is spent.
    pub async fn await_completion(&self, handle: &JobHandle) -> Completion {
        for attempt in 1..=self.max_attempts {
            match self.transport.status(&handle.status_check_url).await {
                Ok(200) => {
                    info!(attempt, "job ready");
                    return Completion::Ready(handle.clone());
                }
                Ok(404) => debug!(attempt, "job not ready yet"),
                Ok(status) => warn!(attempt, status, "unexpected status while polling"),
                Err(e) => warn!(attempt, error = %e, "status check failed"),
            }

            if attempt < self.max_attempts {
                tokio::time::sleep(self.poll_interval).await;
            }
        }

        warn!(attempts = self.max_attempts, "job did not finish in time, try again later");
        Completion::TimedOut {
            attempts: self.max_attempts,
        }
    }

    fn request_params(&self, descriptor: &RequestDescriptor) -> Vec<(&'static str, String)> {
        vec![
            ("beginDT", descriptor.begin.clone()),
            ("endDT", descriptor.end.clone()),
            ("format", self.format.to_string()),
            ("include_provenance", "true".to_string()),
            ("include_annotations", "true".to_string()),
        ]
    }
}

fn result_urls(response: &Value) -> Option<Vec<String>> {
    let urls = response.get("allURLs")?.as_array()?;
    Some(
        urls.iter()
            .filter_map(|u| u.as_str().map(str::to_string))
            .collect(),
    )
}

fn handle_from_urls(urls: Vec<String>, submitted_at: f64) -> Result<JobHandle> {
    let async_url = urls.iter().find(|u| u.contains(ASYNC_MARKER)).cloned();
    let catalog_url = urls.first().cloned();

    match (catalog_url, async_url) {
        (Some(catalog_url), Some(async_url)) => {
            Ok(JobHandle::new(catalog_url, async_url, submitted_at))
        }
        _ => Err(Error::NoAsyncUrl { urls }),
    }
}

pub(crate) fn now() -> f64 {
    Utc::now().timestamp_millis() as f64 / 1000.0
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use serde_json::json;

    use super::*;
    use crate::{request::tests::descriptor_fixture, transport::fake::FakeTransport};

    pub(crate) const CATALOG: &str =
        "https://opendap.oceanobservatories.org/thredds/catalog/ooi/user/20230101T000000-CTD/catalog.html";
    pub(crate) const ASYNC: &str =
        "https://opendap.oceanobservatories.org/async_results/user/20230101T000000-CTD";
    pub(crate) const STATUS: &str =
        "https://opendap.oceanobservatories.org/async_results/user/20230101T000000-CTD/status.txt";

    pub(crate) fn submit_url() -> String {
        format!("{}{}", crate::config::DEFAULT_BASE_URL, descriptor_fixture().path())
    }

    fn client(transport: FakeTransport, max_attempts: u32) -> (Arc<FakeTransport>, JobClient) {
        let transport = Arc::new(transport);
        let client = JobClient::new(transport.clone(), &Config::default())
            .with_polling(max_attempts, Duration::ZERO);
        (transport, client)
    }

    #[tokio::test]
    async fn should_extract_handle_from_submit_response() {
        let fake = FakeTransport::new().with_json(
            &submit_url(),
            json!({ "requestUUID": "abc", "allURLs": [CATALOG, ASYNC] }),
        );
        let (_, client) = client(fake, 1);

        let handle = client.submit(&descriptor_fixture()).await.unwrap();

        assert_eq!(handle.catalog_url, CATALOG);
        assert_eq!(handle.async_result_url, ASYNC);
        assert_eq!(handle.status_check_url, STATUS);
        assert!(handle.submitted_at > 0.0);
    }

    #[tokio::test]
    async fn should_fail_without_result_urls() {
        let fake = FakeTransport::new().with_json(&submit_url(), json!({ "message": "no data" }));
        let (_, client) = client(fake, 1);

        let err = client.submit(&descriptor_fixture()).await.unwrap_err();

        assert!(matches!(err, Error::NoResultUrl { .. }));
    }

    #[tokio::test]
    async fn should_fail_without_async_url() {
        let fake = FakeTransport::new().with_json(&submit_url(), json!({ "allURLs": [CATALOG] }));
        let (_, client) = client(fake, 1);

        let err = client.submit(&descriptor_fixture()).await.unwrap_err();

        assert!(matches!(err, Error::NoAsyncUrl { .. }));
    }

    #[tokio::test]
    async fn should_time_out_after_exactly_max_attempts() {
        let fake = FakeTransport::new().with_statuses(STATUS, vec![Some(404)]);
        let (transport, client) = client(fake, 7);
        let handle = JobHandle::new(CATALOG.to_string(), ASYNC.to_string(), 0.0);

        let outcome = client.await_completion(&handle).await;

        assert_eq!(outcome, Completion::TimedOut { attempts: 7 });
        assert_eq!(transport.count(STATUS), 7);
    }

    #[tokio::test]
    async fn should_keep_polling_through_transient_errors() {
        let script = vec![Some(404), Some(500), None, Some(503), Some(200)];
        let fake = FakeTransport::new().with_statuses(STATUS, script);
        let (transport, client) = client(fake, 10);
        let handle = JobHandle::new(CATALOG.to_string(), ASYNC.to_string(), 0.0);

        let outcome = client.await_completion(&handle).await;

        assert_eq!(outcome, Completion::Ready(handle));
        assert_eq!(transport.count(STATUS), 5);
    }

    #[test]
    fn should_append_status_file_once() {
        let handle = JobHandle::new(CATALOG.to_string(), format!("{}/", ASYNC), 0.0);
        assert_eq!(handle.status_check_url, STATUS);
    }
}
