//! Dashboard view assembly
//!
//! Groups person cards by display area (camera to area via the platform's
//! area registry), ordered by first appearance over the sorted person list,
//! with unmapped persons collected under a trailing "Unassigned" section.
//! Without an area map at all the cards are laid out flat, no sections.

use crate::person_registry::{PersonMetadata, RegistrySnapshot};
use serde_yaml::Value;
use std::collections::HashMap;

use super::documents::{ymap, ystr};
use super::{
    location_entity_id, snapshot_entity_id, supervised_entity_id, SnapshotSource,
};

/// Identifying path of the generated view; republishing replaces the view
/// with this path instead of appending a duplicate.
pub const VIEW_PATH: &str = "frigate-identity";

const UNASSIGNED_AREA: &str = "Unassigned";

/// Icon for an area section, chosen by keyword with outdoor terms winning
/// over entry terms, then indoor terms.
pub fn area_icon(area: &str) -> &'static str {
    let lower = area.to_lowercase();
    let matches = |keys: &[&str]| keys.iter().any(|k| lower.contains(k));
    if matches(&["yard", "garden", "outdoor", "outside", "back", "front"]) {
        "🌳"
    } else if matches(&["entry", "door", "drive", "garage"]) {
        "🚗"
    } else if matches(&["living", "lounge", "kitchen", "bed", "bath"]) {
        "🏡"
    } else {
        "🏠"
    }
}

/// Build the full dashboard view for the current person set.
pub fn build_view(
    persons: &[String],
    source: SnapshotSource,
    snapshot: &RegistrySnapshot,
    area_map: &HashMap<String, String>,
    has_supervision: bool,
) -> Value {
    let mut cards = vec![header_card(persons.len())];

    if area_map.is_empty() {
        // No area registry to group by; flat person cards, no sections.
        cards.extend(
            persons
                .iter()
                .map(|name| person_card(name, source, snapshot, has_supervision)),
        );
    } else {
        for (area, members) in group_by_area(persons, snapshot, area_map) {
            cards.push(ymap([
                ("type", ystr("markdown")),
                ("content", ystr(format!("## {} {area}", area_icon(&area)))),
            ]));

            let member_cards: Vec<Value> = members
                .iter()
                .map(|name| person_card(name, source, snapshot, has_supervision))
                .collect();
            if member_cards.len() > 1 {
                cards.push(ymap([
                    ("type", ystr("horizontal-stack")),
                    ("cards", Value::Sequence(member_cards)),
                ]));
            } else {
                cards.extend(member_cards);
            }
        }
    }

    cards.push(summary_card());

    ymap([
        ("title", ystr("Frigate Identity")),
        ("path", ystr(VIEW_PATH)),
        ("icon", ystr("mdi:account-search")),
        ("cards", Value::Sequence(cards)),
    ])
}

/// Partition the sorted person list into display areas. Section order
/// follows the first person seen in each area; Unassigned always trails.
fn group_by_area(
    persons: &[String],
    snapshot: &RegistrySnapshot,
    area_map: &HashMap<String, String>,
) -> Vec<(String, Vec<String>)> {
    let mut order: Vec<String> = Vec::new();
    let mut groups: HashMap<String, Vec<String>> = HashMap::new();

    for name in persons {
        let area = person_area(name, snapshot, area_map)
            .unwrap_or_else(|| UNASSIGNED_AREA.to_string());
        if !groups.contains_key(&area) && area != UNASSIGNED_AREA {
            order.push(area.clone());
        }
        groups.entry(area).or_default().push(name.clone());
    }

    if groups.contains_key(UNASSIGNED_AREA) {
        order.push(UNASSIGNED_AREA.to_string());
    }

    order
        .into_iter()
        .map(|area| {
            let members = groups.remove(&area).unwrap_or_default();
            (area, members)
        })
        .collect()
}

/// A person's display area: last-seen camera first, then the metadata
/// camera hint, then the person's own slug, looked up in the
/// camera-to-area map.
fn person_area(
    name: &str,
    snapshot: &RegistrySnapshot,
    area_map: &HashMap<String, String>,
) -> Option<String> {
    let record_camera = snapshot
        .persons
        .get(name)
        .and_then(|r| r.camera.as_deref());
    let hint_camera = snapshot
        .meta
        .get(name)
        .and_then(|m| m.camera.as_deref());
    let camera = record_camera
        .map(String::from)
        .or_else(|| hint_camera.map(String::from))
        .unwrap_or_else(|| crate::person_registry::slug(name));
    area_map.get(&camera).cloned()
}

fn header_card(person_count: usize) -> Value {
    ymap([
        ("type", ystr("markdown")),
        (
            "content",
            ystr(format!(
                "# Frigate Identity\nTracking {person_count} known person(s)."
            )),
        ),
    ])
}

fn summary_card() -> Value {
    ymap([
        ("type", ystr("entities")),
        ("title", ystr("Latest activity")),
        (
            "entities",
            Value::Sequence(vec![
                ymap([
                    ("entity", ystr("sensor.frigate_identity_last_person")),
                    ("name", ystr("Last person seen")),
                ]),
                ymap([
                    ("entity", ystr("sensor.frigate_identity_all_persons")),
                    ("name", ystr("Tracked persons")),
                ]),
            ]),
        ),
    ])
}

/// Snapshot picture plus the person's sensor rows. The supervised row sits
/// directly under the location row for children when supervision sensors
/// are generated.
fn person_card(
    name: &str,
    source: SnapshotSource,
    snapshot: &RegistrySnapshot,
    has_supervision: bool,
) -> Value {
    let meta = snapshot.meta.get(name);
    let location = location_entity_id(name);

    let mut rows = vec![ymap([
        ("entity", ystr(location.clone())),
        ("name", ystr("Location")),
    ])];
    if has_supervision && meta.is_some_and(PersonMetadata::is_child) {
        rows.push(ymap([
            ("entity", ystr(supervised_entity_id(name))),
            ("name", ystr("Supervised")),
        ]));
    }
    for (attribute, label) in [
        ("zones", "Zones"),
        ("confidence", "Confidence"),
        ("source", "Source"),
        ("last_seen", "Last seen"),
    ] {
        rows.push(ymap([
            ("entity", ystr(location.clone())),
            ("type", ystr("attribute")),
            ("attribute", ystr(attribute)),
            ("name", ystr(label)),
        ]));
    }

    ymap([
        ("type", ystr("vertical-stack")),
        (
            "cards",
            Value::Sequence(vec![
                ymap([
                    ("type", ystr("picture-entity")),
                    ("entity", ystr(snapshot_entity_id(name, source, meta))),
                    ("name", ystr(format!("{name} – Latest Snapshot"))),
                    ("camera_view", ystr("auto")),
                    ("show_state", Value::Bool(false)),
                ]),
                ymap([
                    ("type", ystr("entities")),
                    ("title", ystr(format!("{name} Status"))),
                    ("entities", Value::Sequence(rows)),
                ]),
            ]),
        ),
    ])
}
