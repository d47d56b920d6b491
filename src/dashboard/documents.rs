//! Per-domain generated documents
//!
//! Each builder returns a `serde_yaml::Value` ready for the include file it
//! targets. Ordering is deterministic everywhere: persons arrive sorted from
//! the registry snapshot and mapping keys are inserted in a fixed order.

use crate::person_registry::{slug, PersonMetadata};
use crate::supervision::{SupervisionEvaluator, ALL_PERSONS_ENTITY};
use crate::template::{Expr, TemplateProgram};
use crate::zones::CameraZoneMap;
use crate::person_registry::RegistrySnapshot;
use serde_json::json;
use serde_yaml::Value;
use std::collections::{BTreeMap, HashMap};

use super::{supervised_entity_id, SnapshotSource, FILE_HEADER};

/// Build a YAML mapping with the given entries, preserving insertion order.
pub(super) fn ymap<const N: usize>(entries: [(&str, Value); N]) -> Value {
    let mut map = serde_yaml::Mapping::new();
    for (key, value) in entries {
        map.insert(Value::String(key.to_string()), value);
    }
    Value::Mapping(map)
}

pub(super) fn ystr(s: impl Into<String>) -> Value {
    Value::String(s.into())
}

/// Children with at least one declared dangerous zone, sorted by name.
pub(super) fn children_with_danger_zones(
    meta: &HashMap<String, PersonMetadata>,
) -> BTreeMap<String, Vec<String>> {
    meta.iter()
        .filter(|(_, m)| m.is_child() && !m.dangerous_zones.is_empty())
        .map(|(name, m)| (name.clone(), m.dangerous_zones.clone()))
        .collect()
}

/// `trigger.payload_json`
fn payload() -> Expr {
    Expr::ident("trigger").attr("payload_json")
}

/// `trigger.payload_json.get('<key>'[, default])`
fn payload_get(key: &str, default: Option<serde_json::Value>) -> Expr {
    let mut args = vec![Expr::lit(json!(key))];
    if let Some(default) = default {
        args.push(Expr::Lit(default));
    }
    payload().method("get", args)
}

/// Identity of the triggering payload with the documented key precedence.
fn payload_identity() -> Expr {
    Expr::Or(vec![
        payload_get("person_id", None),
        payload_get("person", None),
        payload_get("name", None),
    ])
}

/// Lookup `persons[<name>].<field>` with a fallback when the person is
/// unknown or the field is unset.
fn person_field_or(name: &str, field: &str, default: serde_json::Value) -> TemplateProgram {
    let field_expr = Expr::ident("persons")
        .index(Expr::lit(json!(name)))
        .attr(field);
    let body = Expr::if_else(
        Expr::And(vec![
            Expr::lit(json!(name)).in_(Expr::ident("persons")),
            field_expr.clone(),
        ]),
        field_expr,
        Expr::Lit(default),
    );
    TemplateProgram::new(body).with_set(
        "persons",
        Expr::Or(vec![
            Expr::state_attr(ALL_PERSONS_ENTITY, "persons"),
            Expr::lit(json!({})),
        ]),
    )
}

/// MQTT snapshot cameras, one per person, fed from the snapshots topic.
pub(super) fn mqtt_cameras(persons: &[String], topic_prefix: &str) -> Value {
    let cameras: Vec<Value> = persons
        .iter()
        .map(|name| {
            let person_slug = slug(name);
            ymap([
                ("name", ystr(format!("Frigate Identity {name} Snapshot"))),
                (
                    "unique_id",
                    ystr(format!("frigate_identity_{person_slug}_snapshot")),
                ),
                ("topic", ystr(format!("{topic_prefix}/snapshots/{name}"))),
                ("image_encoding", ystr("b64")),
            ])
        })
        .collect();
    ymap([("camera", Value::Sequence(cameras))])
}

/// All template-integration blocks: the trigger-based aggregate sensors,
/// per-person location sensors, optional snapshot images, and supervision
/// binary sensors.
pub(super) fn template_sensor_blocks(
    persons: &[String],
    source: SnapshotSource,
    snapshot: &RegistrySnapshot,
    adults: &[String],
    evaluator: &SupervisionEvaluator,
    topic_prefix: &str,
) -> Value {
    let mut blocks = vec![aggregate_block(topic_prefix)];
    blocks.push(location_sensor_block(persons));

    if source == SnapshotSource::FrigateApi {
        blocks.push(snapshot_image_block(persons));
    }

    if !adults.is_empty() {
        let mut children: Vec<&String> = persons
            .iter()
            .filter(|name| snapshot.meta.get(*name).is_some_and(PersonMetadata::is_child))
            .collect();
        children.sort();
        if !children.is_empty() {
            blocks.push(supervision_block(
                &children,
                adults,
                evaluator,
                &snapshot.camera_zones,
            ));
        }
    }

    Value::Sequence(blocks)
}

/// Trigger-based block maintaining the all-persons aggregate and the
/// last-person sensor from the live event stream.
fn aggregate_block(topic_prefix: &str) -> Value {
    let name = payload_identity();
    let entry = Expr::Dict(vec![
        (
            Expr::lit(json!("camera")),
            Expr::Or(vec![
                payload_get("camera", None),
                payload_get("checkpoint", None),
            ]),
        ),
        (
            Expr::lit(json!("confidence")),
            payload_get("confidence", Some(json!(0))),
        ),
        (
            Expr::lit(json!("zones")),
            payload_get("frigate_zones", Some(json!([]))),
        ),
        (
            Expr::lit(json!("source")),
            payload_get("source", Some(json!("unknown"))),
        ),
        (
            Expr::lit(json!("snapshot_url")),
            payload_get("snapshot_url", Some(json!(""))),
        ),
        (
            Expr::lit(json!("last_seen")),
            Expr::call("now", vec![]).method("isoformat", vec![]),
        ),
    ]);

    // Payloads without an identity leave the aggregate untouched.
    let merged = Expr::if_else(
        Expr::ident("name"),
        Expr::ident("persons").filter(
            "combine",
            vec![Expr::Dict(vec![(Expr::ident("name"), entry)])],
        ),
        Expr::ident("persons"),
    );
    let prior = Expr::Or(vec![
        Expr::state_attr(ALL_PERSONS_ENTITY, "persons"),
        Expr::lit(json!({})),
    ]);

    let persons_attr = TemplateProgram::new(merged)
        .with_set("persons", prior.clone())
        .with_set("name", payload_identity());
    let count_state = TemplateProgram::new(
        Expr::if_else(
            Expr::ident("name"),
            Expr::ident("persons")
                .filter(
                    "combine",
                    vec![Expr::Dict(vec![(
                        Expr::ident("name"),
                        Expr::lit(json!({})),
                    )])],
                )
                .filter("length", vec![]),
            Expr::ident("persons").filter("length", vec![]),
        ),
    )
    .with_set("persons", prior)
    .with_set("name", payload_identity());

    let last_person_state = TemplateProgram::new(Expr::Or(vec![
        payload_identity(),
        Expr::lit(json!("unknown")),
    ]));

    ymap([
        (
            "trigger",
            Value::Sequence(vec![ymap([
                ("platform", ystr("mqtt")),
                ("topic", ystr(format!("{topic_prefix}/person/#"))),
            ])]),
        ),
        (
            "sensor",
            Value::Sequence(vec![
                ymap([
                    ("name", ystr("Frigate Identity All Persons")),
                    ("unique_id", ystr("frigate_identity_all_persons")),
                    ("state", ystr(count_state.render())),
                    (
                        "attributes",
                        ymap([("persons", ystr(persons_attr.render()))]),
                    ),
                ]),
                ymap([
                    ("name", ystr("Frigate Identity Last Person")),
                    ("unique_id", ystr("frigate_identity_last_person")),
                    ("state", ystr(last_person_state.render())),
                    (
                        "attributes",
                        ymap([
                            (
                                "camera",
                                ystr(
                                    TemplateProgram::new(Expr::Or(vec![
                                        payload_get("camera", None),
                                        payload_get("checkpoint", None),
                                        Expr::lit(json!("unknown")),
                                    ]))
                                    .render(),
                                ),
                            ),
                            (
                                "confidence",
                                ystr(payload_get("confidence", Some(json!(0))).inline()),
                            ),
                        ]),
                    ),
                ]),
            ]),
        ),
    ])
}

/// Per-person location sensors derived from the aggregate attribute.
fn location_sensor_block(persons: &[String]) -> Value {
    let sensors: Vec<Value> = persons
        .iter()
        .map(|name| {
            let person_slug = slug(name);
            ymap([
                ("name", ystr(format!("Frigate Identity {name} Location"))),
                (
                    "unique_id",
                    ystr(format!("frigate_identity_{person_slug}_location")),
                ),
                (
                    "state",
                    ystr(person_field_or(name, "camera", json!("unknown")).render()),
                ),
                (
                    "attributes",
                    ymap([
                        (
                            "zones",
                            ystr(person_field_or(name, "zones", json!([])).render()),
                        ),
                        (
                            "confidence",
                            ystr(person_field_or(name, "confidence", json!(0)).render()),
                        ),
                        (
                            "source",
                            ystr(person_field_or(name, "source", json!("unknown")).render()),
                        ),
                        (
                            "snapshot_url",
                            ystr(
                                person_field_or(name, "snapshot_url", json!("unavailable"))
                                    .render(),
                            ),
                        ),
                        (
                            "last_seen",
                            ystr(person_field_or(name, "last_seen", json!("unknown")).render()),
                        ),
                    ]),
                ),
            ])
        })
        .collect();
    ymap([("sensor", Value::Sequence(sensors))])
}

/// Snapshot image entities for the frigate_api mode, served from the
/// recognition service's snapshot URL.
fn snapshot_image_block(persons: &[String]) -> Value {
    let images: Vec<Value> = persons
        .iter()
        .map(|name| {
            let person_slug = slug(name);
            ymap([
                (
                    "name",
                    ystr(format!("Frigate Identity {name} Snapshot Image")),
                ),
                (
                    "unique_id",
                    ystr(format!("frigate_identity_{person_slug}_snapshot_image")),
                ),
                (
                    "url",
                    ystr(person_field_or(name, "snapshot_url", json!("")).render()),
                ),
            ])
        })
        .collect();
    ymap([("image", Value::Sequence(images))])
}

/// Supervision binary sensors, one per monitored child.
fn supervision_block(
    children: &[&String],
    adults: &[String],
    evaluator: &SupervisionEvaluator,
    zones: &CameraZoneMap,
) -> Value {
    let sensors: Vec<Value> = children
        .iter()
        .map(|child| {
            let child_slug = slug(child);
            ymap([
                ("name", ystr(format!("Frigate Identity {child} Supervised"))),
                (
                    "unique_id",
                    ystr(format!("frigate_identity_{child_slug}_supervised")),
                ),
                ("device_class", ystr("presence")),
                (
                    "state",
                    ystr(evaluator.state_template(child, adults, zones).render()),
                ),
            ])
        })
        .collect();
    ymap([("binary_sensor", Value::Sequence(sensors))])
}

/// Danger-zone automations, one per child with declared dangerous zones.
pub(super) fn danger_zone_automations(
    children: &BTreeMap<String, Vec<String>>,
    has_supervision: bool,
    topic_prefix: &str,
) -> Value {
    let automations: Vec<Value> = children
        .iter()
        .map(|(name, zones)| danger_zone_automation(name, zones, has_supervision, topic_prefix))
        .collect();
    Value::Sequence(automations)
}

fn danger_zone_automation(
    name: &str,
    zones: &[String],
    has_supervision: bool,
    topic_prefix: &str,
) -> Value {
    let person_slug = slug(name);
    let intersecting = payload_get("frigate_zones", Some(json!([])))
        .filter("select", vec![Expr::lit(json!("in")), Expr::lit(json!(zones))])
        .filter("list", vec![]);
    let zone_hit = intersecting
        .clone()
        .filter("length", vec![])
        .gt(Expr::lit(json!(0)));
    let zone_names = intersecting.filter("join", vec![Expr::lit(json!(", "))]);

    let mut conditions = vec![ymap([
        ("condition", ystr("template")),
        ("value_template", ystr(zone_hit.inline())),
    ])];
    if has_supervision {
        conditions.push(ymap([
            ("condition", ystr("state")),
            ("entity_id", ystr(supervised_entity_id(name))),
            ("state", ystr("off")),
        ]));
    }

    ymap([
        ("id", ystr(format!("frigate_identity_danger_zone_{person_slug}"))),
        (
            "alias",
            ystr(format!("Frigate Identity: {name} in danger zone")),
        ),
        ("mode", ystr("single")),
        ("max_exceeded", ystr("silent")),
        (
            "trigger",
            Value::Sequence(vec![ymap([
                ("platform", ystr("mqtt")),
                ("topic", ystr(format!("{topic_prefix}/person/{name}"))),
            ])]),
        ),
        ("condition", Value::Sequence(conditions)),
        (
            "action",
            Value::Sequence(vec![
                ymap([
                    ("service", ystr("notify.notify")),
                    (
                        "data",
                        ymap([
                            ("title", ystr(format!("{name} in a dangerous zone"))),
                            (
                                "message",
                                ystr(format!(
                                    "{name} was detected unsupervised near: {}",
                                    zone_names.inline()
                                )),
                            ),
                            (
                                "data",
                                ymap([
                                    (
                                        "image",
                                        ystr(
                                            payload_get("snapshot_url", Some(json!("")))
                                                .inline(),
                                        ),
                                    ),
                                    ("tag", ystr(format!("child_safety_{person_slug}"))),
                                    (
                                        "actions",
                                        Value::Sequence(vec![
                                            ymap([
                                                ("action", ystr("MARK_SUPERVISED")),
                                                ("title", ystr("Mark supervised")),
                                            ]),
                                            ymap([
                                                ("action", ystr("VIEW_CAMERA")),
                                                ("title", ystr("View camera")),
                                            ]),
                                        ]),
                                    ),
                                ]),
                            ),
                        ]),
                    ),
                ]),
                ymap([("delay", ystr("00:01:00"))]),
            ]),
        ),
    ])
}

/// Package document wiring the generated include files into the platform's
/// configuration. Written as text since the include directives are tags the
/// serializer cannot express.
pub(super) fn package_document(
    source: SnapshotSource,
    include_dir: &str,
    has_automations: bool,
) -> String {
    let mut body = String::from(FILE_HEADER);
    if source == SnapshotSource::Mqtt {
        body.push_str(&format!("mqtt: !include {include_dir}/mqtt_cameras.yaml\n"));
    }
    if source != SnapshotSource::FrigateIntegration {
        body.push_str(&format!(
            "template: !include {include_dir}/template_sensors.yaml\n"
        ));
    }
    if has_automations {
        body.push_str(&format!(
            "automation frigate_identity: !include {include_dir}/danger_zone_automations.yaml\n"
        ));
    }
    body
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person_registry::Role;

    fn yaml_str(value: &Value) -> String {
        serde_yaml::to_string(value).unwrap()
    }

    #[test]
    fn test_children_with_danger_zones_sorted() {
        let mut meta = HashMap::new();
        meta.insert(
            "Zoe".to_string(),
            PersonMetadata {
                role: Some(Role::Child),
                dangerous_zones: vec!["pool".into()],
                ..Default::default()
            },
        );
        meta.insert(
            "Alice".to_string(),
            PersonMetadata {
                role: Some(Role::Child),
                dangerous_zones: vec!["street".into()],
                ..Default::default()
            },
        );
        meta.insert(
            "Ben".to_string(),
            PersonMetadata {
                role: Some(Role::Child),
                ..Default::default()
            },
        );
        let children = children_with_danger_zones(&meta);
        let names: Vec<&String> = children.keys().collect();
        assert_eq!(names, vec!["Alice", "Zoe"]);
    }

    #[test]
    fn test_mqtt_cameras_document() {
        let doc = mqtt_cameras(&["Jo Ann".to_string()], "identity");
        let text = yaml_str(&doc);
        assert!(text.contains("unique_id: frigate_identity_jo_ann_snapshot"));
        assert!(text.contains("topic: identity/snapshots/Jo Ann"));
        assert!(text.contains("image_encoding: b64"));
    }

    #[test]
    fn test_aggregate_block_merges_by_identity() {
        let doc = aggregate_block("identity");
        let text = yaml_str(&doc);
        assert!(text.contains("topic: identity/person/#"));
        assert!(text.contains("unique_id: frigate_identity_all_persons"));
        // Identity precedence survives in the rendered template.
        assert!(text.contains(
            "trigger.payload_json.get('person_id') or trigger.payload_json.get('person') or trigger.payload_json.get('name')"
        ));
        assert!(text.contains("combine"));
    }

    #[test]
    fn test_location_sensor_defaults() {
        let doc = location_sensor_block(&["Alice".to_string()]);
        let text = yaml_str(&doc);
        assert!(text.contains("unique_id: frigate_identity_alice_location"));
        assert!(text.contains("else 'unknown'"));
        assert!(text.contains("else 'unavailable'"));
        assert!(text.contains("else []"));
        assert!(text.contains("else 0"));
    }

    #[test]
    fn test_danger_zone_automation_shape() {
        let mut children = BTreeMap::new();
        children.insert("Alice".to_string(), vec!["street".to_string()]);
        let doc = danger_zone_automations(&children, true, "identity");
        let text = yaml_str(&doc);
        assert!(text.contains("id: frigate_identity_danger_zone_alice"));
        assert!(text.contains("mode: single"));
        assert!(text.contains("max_exceeded: silent"));
        assert!(text.contains("topic: identity/person/Alice"));
        assert!(text.contains(
            "select('in', ['street'])) | list) | length) > 0"
        ));
        assert!(text.contains("entity_id: binary_sensor.frigate_identity_alice_supervised"));
        assert!(text.contains("state: 'off'") || text.contains("state: off"));
        assert!(text.contains("tag: child_safety_alice"));
        assert!(text.contains("action: MARK_SUPERVISED"));
        assert!(text.contains("delay: 00:01:00"));
    }

    #[test]
    fn test_alert_message_carries_triggering_zones() {
        let mut children = BTreeMap::new();
        children.insert(
            "Alice".to_string(),
            vec!["street".to_string(), "pool".to_string()],
        );
        let doc = danger_zone_automations(&children, true, "identity");
        let text = yaml_str(&doc);
        // The message renders the intersection from the event payload, not
        // the static declared list.
        assert!(text.contains("Alice was detected unsupervised near: {{"));
        assert!(text.contains("select('in', ['street', 'pool'])) | list) | join(', ') }}"));
        assert!(!text.contains("near: street, pool"));
    }

    #[test]
    fn test_danger_zone_automation_without_supervision_sensor() {
        let mut children = BTreeMap::new();
        children.insert("Alice".to_string(), vec!["street".to_string()]);
        let doc = danger_zone_automations(&children, false, "identity");
        let text = yaml_str(&doc);
        assert!(!text.contains("binary_sensor.frigate_identity_alice_supervised"));
    }

    #[test]
    fn test_package_document_per_mode() {
        let full = package_document(SnapshotSource::Mqtt, "frigate_identity", true);
        assert!(full.contains("mqtt: !include frigate_identity/mqtt_cameras.yaml"));
        assert!(full.contains("template: !include frigate_identity/template_sensors.yaml"));
        assert!(full.contains("danger_zone_automations.yaml"));

        let api = package_document(SnapshotSource::FrigateApi, "frigate_identity", false);
        assert!(!api.contains("mqtt_cameras"));
        assert!(api.contains("template_sensors"));
        assert!(!api.contains("danger_zone_automations"));

        let integration =
            package_document(SnapshotSource::FrigateIntegration, "frigate_identity", false);
        assert!(!integration.contains("template_sensors"));
    }
}
