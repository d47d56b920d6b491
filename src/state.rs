//! Application state
//!
//! Holds the runtime configuration and shared component handles.

use crate::area_map::AreaMapClient;
use crate::dashboard::SnapshotSource;
use crate::person_registry::PersonRegistry;
use crate::publisher::{DashboardPublisher, FileSink};
use crate::scheduler::RebuildScheduler;
use crate::supervision::{SupervisionEvaluator, DEFAULT_WATCH_WINDOW_SECS};
use chrono::NaiveTime;
use clap::ValueEnum;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

/// Application configuration
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Home Assistant base URL
    pub ha_url: String,
    /// Long-lived access token; without it the REST push and area query
    /// are disabled and only the file sink runs
    pub ha_token: Option<String>,
    /// Static persons declaration file
    pub persons_file: PathBuf,
    /// Directory the generated documents are written into
    pub output_dir: PathBuf,
    /// Include-directory name referenced by the package document, relative
    /// to the platform's configuration directory
    pub include_dir: String,
    /// Topic prefix of the identity transport
    pub topic_prefix: String,
    /// Snapshot entity strategy
    pub snapshot_source: SnapshotSource,
    /// Supervision watch window in seconds
    pub watch_window_secs: i64,
    /// Debounce window of the rebuild scheduler in seconds
    pub debounce_secs: u64,
    /// Poll interval for persons-file modification checks in seconds
    pub poll_interval_secs: u64,
    /// Local time of the daily full refresh (HH:MM), empty to disable
    pub daily_refresh: Option<NaiveTime>,
    /// Explicit camera-to-area overrides, winning over the queried registry
    pub camera_areas: HashMap<String, String>,
    /// Emit the package document wiring the generated includes
    pub emit_package: bool,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            ha_url: std::env::var("HASS_URL")
                .unwrap_or_else(|_| "http://127.0.0.1:8123".to_string()),
            ha_token: std::env::var("HASS_TOKEN").ok().filter(|t| !t.is_empty()),
            persons_file: std::env::var("PERSONS_FILE")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/config/frigate_identity/persons.yaml")),
            output_dir: std::env::var("OUTPUT_DIR")
                .map(PathBuf::from)
                .unwrap_or_else(|_| PathBuf::from("/config/frigate_identity")),
            include_dir: std::env::var("INCLUDE_DIR")
                .unwrap_or_else(|_| "frigate_identity".to_string()),
            topic_prefix: std::env::var("TOPIC_PREFIX")
                .unwrap_or_else(|_| "frigate_identity".to_string()),
            snapshot_source: std::env::var("SNAPSHOT_SOURCE")
                .ok()
                .and_then(|s| SnapshotSource::from_str(&s, true).ok())
                .unwrap_or(SnapshotSource::Mqtt),
            watch_window_secs: std::env::var("WATCH_WINDOW_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(DEFAULT_WATCH_WINDOW_SECS),
            debounce_secs: std::env::var("DEBOUNCE_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(crate::scheduler::DEFAULT_DEBOUNCE.as_secs()),
            poll_interval_secs: std::env::var("PERSONS_POLL_SECS")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(30),
            daily_refresh: std::env::var("DAILY_REFRESH_TIME")
                .ok()
                .and_then(|v| parse_refresh_time(&v))
                .or_else(|| parse_refresh_time("03:00")),
            camera_areas: std::env::var("CAMERA_AREAS")
                .map(|v| parse_camera_areas(&v))
                .unwrap_or_default(),
            emit_package: std::env::var("EMIT_PACKAGE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(true),
        }
    }
}

/// Parse `HH:MM`; empty or unparsable disables the daily refresh.
pub fn parse_refresh_time(value: &str) -> Option<NaiveTime> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return None;
    }
    NaiveTime::parse_from_str(trimmed, "%H:%M").ok()
}

/// Parse `camera=Area,other_cam=Other Area` override pairs.
pub fn parse_camera_areas(value: &str) -> HashMap<String, String> {
    value
        .split(',')
        .filter_map(|pair| {
            let (camera, area) = pair.split_once('=')?;
            let camera = camera.trim();
            let area = area.trim();
            if camera.is_empty() || area.is_empty() {
                None
            } else {
                Some((camera.to_string(), area.to_string()))
            }
        })
        .collect()
}

/// Shared components wired at startup.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub registry: Arc<PersonRegistry>,
    pub scheduler: Arc<RebuildScheduler>,
    pub evaluator: Arc<SupervisionEvaluator>,
    pub sink: Arc<FileSink>,
    /// REST push sink; absent when no token is configured.
    pub publisher: Option<Arc<DashboardPublisher>>,
    /// Area-registry query client; absent when no token is configured.
    pub area_client: Option<Arc<AreaMapClient>>,
}

impl AppState {
    /// Wire all components from configuration. Returns the state together
    /// with the receiving end of the rebuild queue.
    pub fn init(
        config: AppConfig,
    ) -> crate::Result<(Self, mpsc::UnboundedReceiver<String>)> {
        let evaluator = Arc::new(SupervisionEvaluator::new(config.watch_window_secs)?);
        let registry = Arc::new(PersonRegistry::new());
        let (scheduler, rebuild_rx) =
            RebuildScheduler::new(Duration::from_secs(config.debounce_secs));
        let sink = Arc::new(FileSink::new(config.output_dir.clone()));
        let (publisher, area_client) = match &config.ha_token {
            Some(token) => (
                Some(Arc::new(DashboardPublisher::new(&config.ha_url, token)?)),
                Some(Arc::new(AreaMapClient::new(&config.ha_url, token)?)),
            ),
            None => (None, None),
        };
        Ok((
            Self {
                config,
                registry,
                scheduler,
                evaluator,
                sink,
                publisher,
                area_client,
            },
            rebuild_rx,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_camera_areas() {
        let map = parse_camera_areas("patio=Backyard, gate = Driveway ,bad,=x,y=");
        assert_eq!(map.len(), 2);
        assert_eq!(map["patio"], "Backyard");
        assert_eq!(map["gate"], "Driveway");
    }

    #[test]
    fn test_parse_refresh_time() {
        assert_eq!(
            parse_refresh_time("03:00"),
            NaiveTime::from_hms_opt(3, 0, 0)
        );
        assert!(parse_refresh_time("").is_none());
        assert!(parse_refresh_time("25:99").is_none());
    }

    #[test]
    fn test_init_rejects_invalid_watch_window() {
        let mut config = AppConfig::default();
        config.watch_window_secs = 0;
        config.ha_token = None;
        assert!(AppState::init(config).is_err());
    }

    #[test]
    fn test_init_without_token_disables_rest_sinks() {
        let mut config = AppConfig::default();
        config.ha_token = None;
        let (state, _rx) = AppState::init(config).unwrap();
        assert!(state.publisher.is_none());
        assert!(state.area_client.is_none());
    }
}
