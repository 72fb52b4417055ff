//! What to ask the data-delivery service for.

use std::fmt;

pub(crate) const FINGERPRINT_SEPARATOR: &str = "|";

/// Identifies one instrument stream over a time range.
///
/// Equality on every field is the cache fingerprint.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RequestDescriptor {
    pub site: String,
    pub node: String,
    pub sensor: String,
    pub method: String,
    pub stream: String,
    pub begin: String,
    pub end: String,
}

impl RequestDescriptor {
    /// Path below the sensor inventory root, e.g. `CE02SHSM/RID27/.../telemetered/stream`.
    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}/{}/{}",
            self.site, self.node, self.sensor, self.method, self.stream
        )
    }

    /// Composite key of every field. Stream names contain underscores, so
    /// fields are joined with `|`.
    pub fn fingerprint(&self) -> String {
        [
            &self.site,
            &self.node,
            &self.sensor,
            &self.method,
            &self.stream,
            &self.begin,
            &self.end,
        ]
        .map(String::as_str)
        .join(FINGERPRINT_SEPARATOR)
    }
}

impl fmt::Display for RequestDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} [{} .. {}]", self.path(), self.begin, self.end)
    }
}

/// Delivery format for result files.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Format {
    #[default]
    #[value(name = "netcdf")]
    NetCdf,
    Parquet,
}

impl Format {
    pub fn mime(&self) -> &'static str {
        match self {
            Format::NetCdf => "application/netcdf",
            Format::Parquet => "application/vnd.apache.parquet",
        }
    }

    pub fn file_pattern(&self) -> &'static str {
        match self {
            Format::NetCdf => r"\.nc$",
            Format::Parquet => r"\.parquet$",
        }
    }
}

// -- Tests -------------------------------------------------------------------

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    pub(crate) fn descriptor_fixture() -> RequestDescriptor {
        RequestDescriptor {
            site: "CE02SHSM".to_string(),
            node: "RID27".to_string(),
            sensor: "03-CTDBPC000".to_string(),
            method: "telemetered".to_string(),
            stream: "ctdbp_cdef_dcl_instrument".to_string(),
            begin: "2023-01-01T00:00:00.000Z".to_string(),
            end: "2023-01-08T00:00:00.000Z".to_string(),
        }
    }

    #[test]
    fn should_make_path() {
        let d = descriptor_fixture();
        assert_eq!(
            d.path(),
            "CE02SHSM/RID27/03-CTDBPC000/telemetered/ctdbp_cdef_dcl_instrument"
        );
    }

    #[test]
    fn should_include_time_range_in_fingerprint() {
        let a = descriptor_fixture();
        let mut b = descriptor_fixture();
        b.end = "2023-02-01T00:00:00.000Z".to_string();

        assert_ne!(a.fingerprint(), b.fingerprint());
        assert!(a.fingerprint().starts_with("CE02SHSM|RID27|03-CTDBPC000|telemetered|"));
    }

    #[test]
    fn should_not_confuse_fields_split_at_underscores() {
        let mut a = descriptor_fixture();
        a.method = "recovered".to_string();
        a.stream = "host_ctdbp".to_string();
        let mut b = descriptor_fixture();
        b.method = "recovered_host".to_string();
        b.stream = "ctdbp".to_string();

        assert_ne!(a.fingerprint(), b.fingerprint());
    }
}
