//! Camera-to-zone resolution
//!
//! Detector zones are pixel regions scoped to a single camera and cannot be
//! used for cross-camera checks. The zone map assigns each camera a logical
//! supervision zone; cameras sharing a zone name are treated as co-located.
//! A camera without an entry resolves to its own name.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Mapping of raw camera identifier to logical supervision zone name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CameraZoneMap(HashMap<String, String>);

impl CameraZoneMap {
    pub fn insert(&mut self, camera: impl Into<String>, zone: impl Into<String>) {
        self.0.insert(camera.into(), zone.into());
    }

    /// Logical zone for a camera, falling back to the camera name itself.
    pub fn resolve<'a>(&'a self, camera: &'a str) -> &'a str {
        self.0.get(camera).map(String::as_str).unwrap_or(camera)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Entries sorted by camera name, for deterministic rendering.
    pub fn sorted_entries(&self) -> Vec<(&str, &str)> {
        let mut entries: Vec<(&str, &str)> = self
            .0
            .iter()
            .map(|(k, v)| (k.as_str(), v.as_str()))
            .collect();
        entries.sort();
        entries
    }
}

impl<const N: usize> From<[(&str, &str); N]> for CameraZoneMap {
    fn from(entries: [(&str, &str); N]) -> Self {
        Self(
            entries
                .into_iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_mapped() {
        let zones = CameraZoneMap::from([("backyard", "yard"), ("patio", "yard")]);
        assert_eq!(zones.resolve("backyard"), "yard");
        assert_eq!(zones.resolve("patio"), "yard");
    }

    #[test]
    fn test_resolve_falls_back_to_camera_name() {
        let zones = CameraZoneMap::default();
        assert_eq!(zones.resolve("driveway"), "driveway");
    }

    #[test]
    fn test_sorted_entries_deterministic() {
        let zones = CameraZoneMap::from([("patio", "yard"), ("backyard", "yard")]);
        assert_eq!(
            zones.sorted_entries(),
            vec![("backyard", "yard"), ("patio", "yard")]
        );
    }
}
