//! Config Generator
//!
//! ## Responsibilities
//!
//! - Turn a registry snapshot into the declarative artifacts: snapshot
//!   source documents, per-person template sensors, supervision rules,
//!   danger-zone automations, the dashboard view, and the package wiring
//! - Stay pure and deterministic: identical inputs reproduce byte-identical
//!   documents, and identifying keys are stable so republishing replaces
//!   rather than duplicates

mod documents;
mod view;

pub use view::{area_icon, build_view, VIEW_PATH};

use crate::person_registry::{slug, PersonMetadata, RegistrySnapshot};
use crate::supervision::SupervisionEvaluator;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Every file name a generation run can produce. The file sink only ever
/// prunes names from this set, so foreign files sharing the output
/// directory (the persons file included) are never touched.
pub const GENERATED_FILES: &[&str] = &[
    "mqtt_cameras.yaml",
    "template_sensors.yaml",
    "danger_zone_automations.yaml",
    "dashboard.yaml",
    "frigate_identity_package.yaml",
];

/// Header prepended to every file-sink document.
pub const FILE_HEADER: &str = "# Generated by frigate-identity\n\
     # Re-run generation to update this file after adding or removing persons.\n\n";

/// Strategy used to obtain a person's latest cropped snapshot entity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
#[value(rename_all = "snake_case")]
pub enum SnapshotSource {
    /// One camera entity per person, fed from the snapshots topic.
    Mqtt,
    /// One templated image entity per person, built from `snapshot_url`.
    FrigateApi,
    /// Reuse pre-existing per-camera `image.<camera>_person` entities.
    FrigateIntegration,
}

impl SnapshotSource {
    pub fn as_str(self) -> &'static str {
        match self {
            SnapshotSource::Mqtt => "mqtt",
            SnapshotSource::FrigateApi => "frigate_api",
            SnapshotSource::FrigateIntegration => "frigate_integration",
        }
    }
}

impl fmt::Display for SnapshotSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Entity id of the snapshot card for one person.
///
/// In `frigate_integration` mode the camera comes from the person's
/// metadata hint, falling back to the person's own slug when unmapped.
pub fn snapshot_entity_id(
    person: &str,
    source: SnapshotSource,
    meta: Option<&PersonMetadata>,
) -> String {
    let person_slug = slug(person);
    match source {
        SnapshotSource::Mqtt => format!("camera.frigate_identity_{person_slug}_snapshot"),
        SnapshotSource::FrigateApi => {
            format!("image.frigate_identity_{person_slug}_snapshot_image")
        }
        SnapshotSource::FrigateIntegration => {
            let camera = meta
                .and_then(|m| m.camera.as_deref())
                .map(slug)
                .unwrap_or(person_slug);
            format!("image.{camera}_person")
        }
    }
}

/// Entity id of a person's location sensor.
pub fn location_entity_id(person: &str) -> String {
    format!("sensor.frigate_identity_{}_location", slug(person))
}

/// Entity id of a child's supervision binary sensor.
pub fn supervised_entity_id(person: &str) -> String {
    format!("binary_sensor.frigate_identity_{}_supervised", slug(person))
}

/// One generated file-sink document with a stable identifying name.
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    pub file_name: String,
    pub body: String,
}

/// Everything one generation run produces.
#[derive(Debug, Clone)]
pub struct GeneratedBundle {
    /// File documents, header included, in a stable order.
    pub files: Vec<Document>,
    /// The dashboard view, also pushed to the platform's dashboard storage.
    pub view: serde_yaml::Value,
}

/// Inputs to one generation run. Pure data; no live handles.
pub struct GenerationInput {
    pub snapshot: RegistrySnapshot,
    pub snapshot_source: SnapshotSource,
    /// Camera identifier to display-grouping area name.
    pub area_map: HashMap<String, String>,
    /// Topic prefix of the identity transport (live events and snapshots).
    pub topic_prefix: String,
    /// Include-directory path embedded in the package document.
    pub include_dir: String,
    /// Emit the package document wiring the generated includes.
    pub emit_package: bool,
}

/// Build all documents for the current registry state.
///
/// Fails with [`crate::Error::GenerationSkipped`] when no persons are known;
/// callers report the skip and wait for the next trigger.
pub fn build_documents(
    input: &GenerationInput,
    evaluator: &SupervisionEvaluator,
) -> crate::Result<GeneratedBundle> {
    let snapshot = &input.snapshot;
    let persons: Vec<String> = snapshot.persons.keys().cloned().collect();
    if persons.is_empty() {
        return Err(crate::Error::GenerationSkipped("no persons known".into()));
    }

    let mut adults: Vec<String> = snapshot
        .meta
        .iter()
        .filter(|(_, m)| m.is_adult())
        .map(|(n, _)| n.clone())
        .collect();
    adults.sort();

    let danger_children = documents::children_with_danger_zones(&snapshot.meta);
    // Supervision sensors live in template_sensors.yaml, which the
    // frigate_integration mode does not emit.
    let has_supervision =
        !adults.is_empty() && input.snapshot_source != SnapshotSource::FrigateIntegration;

    let mut files = Vec::new();

    if input.snapshot_source == SnapshotSource::Mqtt {
        files.push(document(
            "mqtt_cameras.yaml",
            &documents::mqtt_cameras(&persons, &input.topic_prefix),
        )?);
    }

    if input.snapshot_source != SnapshotSource::FrigateIntegration {
        files.push(document(
            "template_sensors.yaml",
            &documents::template_sensor_blocks(
                &persons,
                input.snapshot_source,
                snapshot,
                &adults,
                evaluator,
                &input.topic_prefix,
            ),
        )?);
    }

    if !danger_children.is_empty() {
        files.push(document(
            "danger_zone_automations.yaml",
            &documents::danger_zone_automations(
                &danger_children,
                has_supervision,
                &input.topic_prefix,
            ),
        )?);
    }

    let view = build_view(
        &persons,
        input.snapshot_source,
        snapshot,
        &input.area_map,
        has_supervision,
    );
    let dashboard = documents::ymap([("views", serde_yaml::Value::Sequence(vec![view.clone()]))]);
    files.push(document("dashboard.yaml", &dashboard)?);

    if input.emit_package {
        let has_automations = !danger_children.is_empty();
        files.push(Document {
            file_name: "frigate_identity_package.yaml".into(),
            body: documents::package_document(
                input.snapshot_source,
                &input.include_dir,
                has_automations,
            ),
        });
    }

    Ok(GeneratedBundle { files, view })
}

fn document(file_name: &str, value: &serde_yaml::Value) -> crate::Result<Document> {
    let body = format!("{FILE_HEADER}{}", serde_yaml::to_string(value)?);
    Ok(Document {
        file_name: file_name.to_string(),
        body,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person_registry::{LiveEventPayload, PersonRecord, Role};
    use crate::zones::CameraZoneMap;
    use chrono::Utc;
    use std::collections::BTreeMap;

    fn meta(role: Role, dangerous_zones: &[&str], camera: Option<&str>) -> PersonMetadata {
        PersonMetadata {
            role: Some(role),
            dangerous_zones: dangerous_zones.iter().map(|z| z.to_string()).collect(),
            camera: camera.map(String::from),
            ..Default::default()
        }
    }

    fn sighted(name: &str, camera: &str) -> PersonRecord {
        let mut record = PersonRecord::new(name);
        record.apply(
            &LiveEventPayload {
                person_id: Some(name.into()),
                camera: Some(camera.into()),
                confidence: Some(0.9),
                event_id: Some("e1".into()),
                timestamp: Some(1_700_000_000),
                snapshot_url: Some("http://frigate/snap.jpg".into()),
                ..Default::default()
            },
            Utc::now(),
        );
        record
    }

    fn family_snapshot() -> RegistrySnapshot {
        let mut persons = BTreeMap::new();
        for record in [sighted("Alice", "backyard"), sighted("Dad", "patio")] {
            persons.insert(record.name.clone(), record);
        }
        let mut meta_map = std::collections::HashMap::new();
        meta_map.insert(
            "Alice".to_string(),
            meta(Role::Child, &["street"], Some("backyard")),
        );
        meta_map.insert("Dad".to_string(), meta(Role::TrustedAdult, &[], None));
        RegistrySnapshot {
            persons,
            meta: meta_map,
            camera_zones: CameraZoneMap::from([("backyard", "yard"), ("patio", "yard")]),
        }
    }

    fn input(source: SnapshotSource) -> GenerationInput {
        GenerationInput {
            snapshot: family_snapshot(),
            snapshot_source: source,
            area_map: HashMap::new(),
            topic_prefix: "identity".into(),
            include_dir: "frigate_identity".into(),
            emit_package: false,
        }
    }

    #[test]
    fn test_snapshot_entity_derivation() {
        assert_eq!(
            snapshot_entity_id("Jo Ann", SnapshotSource::Mqtt, None),
            "camera.frigate_identity_jo_ann_snapshot"
        );
        assert_eq!(
            snapshot_entity_id("Jo Ann", SnapshotSource::FrigateApi, None),
            "image.frigate_identity_jo_ann_snapshot_image"
        );
        // Unmapped person falls back to their own slug as camera name.
        assert_eq!(
            snapshot_entity_id("Jo Ann", SnapshotSource::FrigateIntegration, None),
            "image.jo_ann_person"
        );
        let hinted = PersonMetadata {
            camera: Some("Front Door".into()),
            ..Default::default()
        };
        assert_eq!(
            snapshot_entity_id("Jo Ann", SnapshotSource::FrigateIntegration, Some(&hinted)),
            "image.front_door_person"
        );
    }

    #[test]
    fn test_zero_persons_is_skip() {
        let mut empty = input(SnapshotSource::Mqtt);
        empty.snapshot = RegistrySnapshot::default();
        let err = build_documents(&empty, &SupervisionEvaluator::default()).unwrap_err();
        assert!(err.is_skip());
    }

    #[test]
    fn test_mode_selects_documents() {
        let evaluator = SupervisionEvaluator::default();

        let bundle = build_documents(&input(SnapshotSource::Mqtt), &evaluator).unwrap();
        let names: Vec<&str> = bundle.files.iter().map(|d| d.file_name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                "mqtt_cameras.yaml",
                "template_sensors.yaml",
                "danger_zone_automations.yaml",
                "dashboard.yaml"
            ]
        );

        let bundle = build_documents(&input(SnapshotSource::FrigateApi), &evaluator).unwrap();
        let names: Vec<&str> = bundle.files.iter().map(|d| d.file_name.as_str()).collect();
        assert!(!names.contains(&"mqtt_cameras.yaml"));
        assert!(names.contains(&"template_sensors.yaml"));

        let bundle =
            build_documents(&input(SnapshotSource::FrigateIntegration), &evaluator).unwrap();
        let names: Vec<&str> = bundle.files.iter().map(|d| d.file_name.as_str()).collect();
        assert!(!names.contains(&"mqtt_cameras.yaml"));
        assert!(!names.contains(&"template_sensors.yaml"));
        assert!(names.contains(&"dashboard.yaml"));
    }

    #[test]
    fn test_generation_is_idempotent() {
        let evaluator = SupervisionEvaluator::default();
        let first = build_documents(&input(SnapshotSource::Mqtt), &evaluator).unwrap();
        let second = build_documents(&input(SnapshotSource::Mqtt), &evaluator).unwrap();
        assert_eq!(first.files, second.files);
        assert_eq!(first.view, second.view);
    }

    #[test]
    fn test_package_document_emitted_on_request() {
        let mut with_package = input(SnapshotSource::Mqtt);
        with_package.emit_package = true;
        let bundle = build_documents(&with_package, &SupervisionEvaluator::default()).unwrap();
        let package = bundle
            .files
            .iter()
            .find(|d| d.file_name == "frigate_identity_package.yaml")
            .unwrap();
        assert!(package.body.contains("mqtt_cameras.yaml"));
        assert!(package.body.contains("template_sensors.yaml"));
        assert!(package.body.contains("danger_zone_automations.yaml"));
    }

    #[test]
    fn test_file_header_present() {
        let bundle =
            build_documents(&input(SnapshotSource::Mqtt), &SupervisionEvaluator::default())
                .unwrap();
        for doc in &bundle.files {
            assert!(doc.body.starts_with("# Generated by frigate-identity"));
        }
    }
}
