//! Frigate Identity engine
//!
//! Tracks persons identified by the camera recognition pipeline, merges
//! live detections with static per-person metadata, and generates the
//! declarative Home Assistant artifacts around them: per-person sensors,
//! supervision rules, danger-zone automations, and the dashboard view.
//!
//! ## Components
//!
//! 1. PersonRegistry - live records + static metadata, change listeners
//! 2. SupervisionEvaluator - child/adult co-location by camera zone
//! 3. Config Generator - deterministic YAML documents + dashboard view
//! 4. RebuildScheduler - debounced regeneration triggers
//! 5. Publisher - Lovelace REST push with file-sink fallback
//! 6. Orchestrator - wiring and background loops

pub mod area_map;
pub mod dashboard;
pub mod orchestrator;
pub mod person_registry;
pub mod publisher;
pub mod scheduler;
pub mod supervision;
pub mod template;
pub mod zones;

pub mod error;
pub mod state;

pub use error::{Error, Result};
pub use state::{AppConfig, AppState};
