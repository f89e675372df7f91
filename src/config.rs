use std::path::PathBuf;

use chrono::FixedOffset;
use serde::Deserialize;

use crate::catalog::{Catalog, CatalogError};
use crate::members::StaticDirectory;
use crate::model::ReservationRecord;

/// Process settings, read from `CLUBSLOT_*` environment variables.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Config {
    /// Facility catalog JSON. The built-in club catalog when unset.
    pub catalog_path: Option<PathBuf>,
    /// Member directory JSON. No members when unset.
    pub members_path: Option<PathBuf>,
    /// Existing reservations to load into the in-memory store.
    pub seed_path: Option<PathBuf>,
    /// Club timezone as minutes east of UTC. Host local time when unset.
    pub utc_offset: Option<FixedOffset>,
    /// Facility whose month grid the binary prints.
    pub facility: String,
    pub metrics_port: Option<u16>,
}

pub const DEFAULT_FACILITY: &str = "grill-central";

impl Default for Config {
    fn default() -> Self {
        Self {
            catalog_path: None,
            members_path: None,
            seed_path: None,
            utc_offset: None,
            facility: DEFAULT_FACILITY.to_string(),
            metrics_port: None,
        }
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum SeedFile {
    Wrapped { reservations: Vec<ReservationRecord> },
    Bare(Vec<ReservationRecord>),
}

impl Config {
    pub fn from_env() -> Self {
        Self::from_vars(|key| std::env::var(key).ok())
    }

    /// Build from any key lookup. Unparseable values fall back to defaults.
    pub fn from_vars(var: impl Fn(&str) -> Option<String>) -> Self {
        let path = |key: &str| var(key).filter(|s| !s.trim().is_empty()).map(PathBuf::from);
        let utc_offset = var("CLUBSLOT_UTC_OFFSET_MINUTES")
            .and_then(|s| s.trim().parse::<i32>().ok())
            .and_then(|minutes| minutes.checked_mul(60))
            .and_then(FixedOffset::east_opt);
        let metrics_port = var("CLUBSLOT_METRICS_PORT").and_then(|s| s.trim().parse().ok());

        Self {
            catalog_path: path("CLUBSLOT_CATALOG"),
            members_path: path("CLUBSLOT_MEMBERS"),
            seed_path: path("CLUBSLOT_SEED"),
            utc_offset,
            facility: var("CLUBSLOT_FACILITY")
                .filter(|s| !s.trim().is_empty())
                .unwrap_or_else(|| DEFAULT_FACILITY.to_string()),
            metrics_port,
        }
    }

    pub fn load_catalog(&self) -> Result<Catalog, CatalogError> {
        match &self.catalog_path {
            Some(path) => Catalog::load(path),
            None => Catalog::club_default(),
        }
    }

    pub fn load_members(&self) -> std::io::Result<StaticDirectory> {
        match &self.members_path {
            Some(path) => StaticDirectory::load(path),
            None => Ok(StaticDirectory::default()),
        }
    }

    /// Seed records, as a bare array or `{"reservations": [...]}`.
    pub fn load_seed(&self) -> std::io::Result<Vec<ReservationRecord>> {
        let Some(path) = &self.seed_path else {
            return Ok(Vec::new());
        };
        let json = std::fs::read_to_string(path)?;
        parse_seed(&json).map_err(std::io::Error::other)
    }
}

pub fn parse_seed(json: &str) -> Result<Vec<ReservationRecord>, serde_json::Error> {
    Ok(match serde_json::from_str(json)? {
        SeedFile::Wrapped { reservations } => reservations,
        SeedFile::Bare(records) => records,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn defaults_when_unset() {
        let config = Config::from_vars(|_| None);
        assert_eq!(config, Config::default());
        assert_eq!(config.load_catalog().unwrap().len(), 14);
        assert!(config.load_members().unwrap().is_empty());
        assert!(config.load_seed().unwrap().is_empty());
    }

    #[test]
    fn reads_all_keys() {
        let env = vars(&[
            ("CLUBSLOT_CATALOG", "/etc/clubslot/catalog.json"),
            ("CLUBSLOT_UTC_OFFSET_MINUTES", "-300"),
            ("CLUBSLOT_FACILITY", "tennis-2"),
            ("CLUBSLOT_METRICS_PORT", "9100"),
        ]);
        let config = Config::from_vars(|k| env.get(k).cloned());
        assert_eq!(
            config.catalog_path,
            Some(PathBuf::from("/etc/clubslot/catalog.json"))
        );
        assert_eq!(config.utc_offset, FixedOffset::west_opt(5 * 3600));
        assert_eq!(config.facility, "tennis-2");
        assert_eq!(config.metrics_port, Some(9100));
        assert_eq!(config.members_path, None);
    }

    #[test]
    fn bad_values_fall_back() {
        let env = vars(&[
            ("CLUBSLOT_UTC_OFFSET_MINUTES", "lima"),
            ("CLUBSLOT_METRICS_PORT", "99999"),
            ("CLUBSLOT_FACILITY", "  "),
            ("CLUBSLOT_SEED", ""),
        ]);
        let config = Config::from_vars(|k| env.get(k).cloned());
        assert_eq!(config, Config::default());
    }

    #[test]
    fn seed_accepts_both_shapes() {
        let record = r#"{"id": "r1", "slot": "grill-1/2025-06-01", "status": "confirmed",
            "requester_name": "Ana", "requester_contact": "555", "party_size": 12,
            "created_at": "2025-05-01T10:00:00Z"}"#;
        assert_eq!(parse_seed(&format!("[{record}]")).unwrap().len(), 1);
        let wrapped = parse_seed(&format!("{{\"reservations\": [{record}, {record}]}}")).unwrap();
        assert_eq!(wrapped.len(), 2);
        assert!(parse_seed("{\"reservations\": 1}").is_err());
    }

    #[test]
    fn missing_file_is_an_error() {
        let config = Config {
            seed_path: Some(PathBuf::from("/nonexistent/clubslot-seed.json")),
            ..Config::default()
        };
        assert!(config.load_seed().is_err());
    }
}
