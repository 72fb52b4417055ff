//! Expands a completed job into the result files listed on its catalog page.

use std::sync::{Arc, OnceLock};

use regex::Regex;
use tracing::{debug, info};
use url::Url;

use crate::{error::Result, job::JobHandle, transport::Transport};

fn anchor_href() -> &'static Regex {
    static ANCHOR: OnceLock<Regex> = OnceLock::new();
    ANCHOR.get_or_init(|| {
        Regex::new(r#"(?i)<a\s[^>]*?href\s*=\s*["']([^"']+)["']"#).expect("valid anchor regex")
    })
}

pub struct FileSetResolver {
    transport: Arc<dyn Transport>,
    pattern: Regex,
    exclude: Option<String>,
}

impl FileSetResolver {
    pub fn new(transport: Arc<dyn Transport>, pattern: &str) -> Result<Self> {
        Ok(FileSetResolver {
            transport,
            pattern: Regex::new(pattern)?,
            exclude: None,
        })
    }

    /// Drops locations containing `exclude`, e.g. `VELPT` ancillary streams.
    pub fn with_exclude(mut self, exclude: Option<String>) -> Self {
        self.exclude = exclude;
        self
    }

    /// Lists result files in document order. An empty list is not an error.
    pub async fn resolve(&self, handle: &JobHandle) -> Result<Vec<String>> {
        let page = self.transport.get_text(&handle.catalog_url).await?;
        let base = Url::parse(&handle.catalog_url)?;

        let files = self.filter(&base, &page);
        info!(files = files.len(), "resolved result files");

        Ok(files)
    }

    fn filter(&self, base: &Url, page: &str) -> Vec<String> {
        let mut files = Vec::new();
        for href in extract_hrefs(page) {
            if !self.pattern.is_match(href) {
                continue;
            }
            if let Some(exclude) = &self.exclude {
                if href.contains(exclude.as_str()) {
                    debug!(href, "excluded");
                    continue;
                }
            }
            match base.join(href) {
                Ok(url) => files.push(url.to_string()),
                Err(e) => debug!(href, error = %e, "skipping unparseable href"),
            }
        }
        files
    }
}

/// Targets of every anchor tag on the page, in document order.
pub fn extract_hrefs(page: &str) -> Vec<&str> {
    anchor_href()
        .captures_iter(page)
        .filter_map(|c| c.get(1).map(|m| m.as_str()))
        .collect()
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        job::tests::{ASYNC, CATALOG},
        transport::fake::FakeTransport,
    };

    const PAGE: &str = r#"
        <html><body><table>
        <tr><td><a href="catalog.html?dataset=ooi/user/ncml">ncml</a></td></tr>
        <tr><td><a href='deployment0001_CE02SHSM-CTDBP_20230101-20230104.nc'><tt>one</tt></a></td></tr>
        <tr><td><A HREF="deployment0001_CE02SHSM-VELPT_20230101-20230108.nc">velpt</A></td></tr>
        <tr><td><a class="x" href="deployment0001_CE02SHSM-CTDBP_20230104-20230108.nc">two</a></td></tr>
        <tr><td><a href="/thredds/fileServer/ooi/user/other.nc">three</a></td></tr>
        </table></body></html>
    "#;

    fn resolver(exclude: Option<&str>) -> FileSetResolver {
        let fake = FakeTransport::new().with_text(CATALOG, PAGE);
        FileSetResolver::new(Arc::new(fake), r"\.nc$")
            .unwrap()
            .with_exclude(exclude.map(str::to_string))
    }

    fn handle() -> JobHandle {
        JobHandle::new(CATALOG.to_string(), ASYNC.to_string(), 0.0)
    }

    #[test]
    fn should_extract_hrefs_in_order() {
        let hrefs = extract_hrefs(PAGE);
        assert_eq!(hrefs.len(), 5);
        assert_eq!(hrefs[0], "catalog.html?dataset=ooi/user/ncml");
        assert_eq!(hrefs[2], "deployment0001_CE02SHSM-VELPT_20230101-20230108.nc");
    }

    #[tokio::test]
    async fn should_resolve_matching_files_against_catalog() {
        let files = resolver(None).resolve(&handle()).await.unwrap();

        assert_eq!(files.len(), 4);
        assert_eq!(
            files[0],
            "https://opendap.oceanobservatories.org/thredds/catalog/ooi/user/20230101T000000-CTD/deployment0001_CE02SHSM-CTDBP_20230101-20230104.nc"
        );
        assert_eq!(
            files[3],
            "https://opendap.oceanobservatories.org/thredds/fileServer/ooi/user/other.nc"
        );
    }

    #[tokio::test]
    async fn should_drop_excluded_files() {
        let files = resolver(Some("VELPT")).resolve(&handle()).await.unwrap();

        assert_eq!(files.len(), 3);
        assert!(files.iter().all(|f| !f.contains("VELPT")));
    }

    #[tokio::test]
    async fn should_return_empty_when_nothing_matches() {
        let fake = FakeTransport::new().with_text(CATALOG, "<html>no files yet</html>");
        let resolver = FileSetResolver::new(Arc::new(fake), r"\.nc$").unwrap();

        let files = resolver.resolve(&handle()).await.unwrap();

        assert!(files.is_empty());
    }
}
