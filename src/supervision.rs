//! Supervision Evaluator
//!
//! Decides, for a monitored child, whether a trusted adult is currently
//! co-located: the adult must have been seen within the watch window and
//! their camera must resolve to the same logical zone as the child's.
//!
//! The evaluator is re-derived on demand. When embedded in a generated
//! document it is emitted as a [`TemplateProgram`] evaluated by the host
//! platform at run time, not precomputed once.

use crate::person_registry::RegistrySnapshot;
use crate::template::{Expr, TemplateProgram};
use crate::zones::CameraZoneMap;
use chrono::{DateTime, Duration, Utc};
use serde_json::json;

/// Default watch window in seconds.
pub const DEFAULT_WATCH_WINDOW_SECS: i64 = 60;

/// Entity whose `persons` attribute aggregates all tracked person state.
pub const ALL_PERSONS_ENTITY: &str = "sensor.frigate_identity_all_persons";

pub struct SupervisionEvaluator {
    watch_window: Duration,
}

impl SupervisionEvaluator {
    /// Create an evaluator. The watch window must be positive.
    pub fn new(watch_window_secs: i64) -> crate::Result<Self> {
        if watch_window_secs <= 0 {
            return Err(crate::Error::ConfigFormat(format!(
                "watch window must be > 0 seconds, got {watch_window_secs}"
            )));
        }
        Ok(Self {
            watch_window: Duration::seconds(watch_window_secs),
        })
    }

    pub fn watch_window_secs(&self) -> i64 {
        self.watch_window.num_seconds()
    }

    /// Evaluate the supervision formula against a registry snapshot.
    pub fn supervised(
        &self,
        child: &str,
        adults: &[String],
        snapshot: &RegistrySnapshot,
        now: DateTime<Utc>,
    ) -> bool {
        let Some(child_record) = snapshot.persons.get(child) else {
            return false;
        };
        let Some(child_camera) = child_record.camera.as_deref() else {
            // No camera reading yet means unsupervised.
            return false;
        };
        let child_zone = snapshot.camera_zones.resolve(child_camera);

        adults.iter().any(|adult| {
            let Some(record) = snapshot.persons.get(adult) else {
                return false;
            };
            let Some(last_seen) = record.last_seen else {
                return false;
            };
            if now - last_seen >= self.watch_window {
                return false;
            }
            record
                .camera
                .as_deref()
                .is_some_and(|camera| snapshot.camera_zones.resolve(camera) == child_zone)
        })
    }

    /// Build the platform-evaluated supervision rule for one child.
    ///
    /// The zone map is embedded as a literal; adults are expanded into a
    /// disjunction at generation time since the set is static per document.
    pub fn state_template(
        &self,
        child: &str,
        adults: &[String],
        zones: &CameraZoneMap,
    ) -> TemplateProgram {
        let zone_literal: serde_json::Map<String, serde_json::Value> = zones
            .sorted_entries()
            .into_iter()
            .map(|(camera, zone)| (camera.to_string(), json!(zone)))
            .collect();

        let person_field = |name: &str, field: &str| {
            Expr::ident("persons")
                .index(Expr::lit(json!(name)))
                .attr(field)
        };
        let zone_of = |name: &str| {
            Expr::ident("camera_zones").method(
                "get",
                vec![person_field(name, "camera"), person_field(name, "camera")],
            )
        };

        let adult_clauses: Vec<Expr> = adults
            .iter()
            .map(|adult| {
                Expr::And(vec![
                    Expr::lit(json!(adult)).in_(Expr::ident("persons")),
                    person_field(adult, "last_seen"),
                    Expr::call("as_timestamp", vec![Expr::call("now", vec![])])
                        .sub(Expr::call(
                            "as_timestamp",
                            vec![person_field(adult, "last_seen")],
                        ))
                        .lt(Expr::lit(json!(self.watch_window.num_seconds()))),
                    person_field(adult, "camera"),
                    zone_of(adult).eq(zone_of(child)),
                ])
            })
            .collect();

        // No declared adults means the supervision concept does not apply;
        // callers skip the document, but keep the rendered rule total.
        let body = if adult_clauses.is_empty() {
            Expr::lit(json!(false))
        } else {
            Expr::And(vec![
                Expr::ident("persons"),
                Expr::lit(json!(child)).in_(Expr::ident("persons")),
                person_field(child, "camera"),
                Expr::Or(adult_clauses),
            ])
        };

        TemplateProgram::new(body)
            .with_set("persons", Expr::state_attr(ALL_PERSONS_ENTITY, "persons"))
            .with_set("camera_zones", Expr::lit(serde_json::Value::Object(zone_literal)))
    }
}

impl Default for SupervisionEvaluator {
    fn default() -> Self {
        Self {
            watch_window: Duration::seconds(DEFAULT_WATCH_WINDOW_SECS),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::person_registry::{LiveEventPayload, PersonRecord};
    use std::collections::BTreeMap;

    fn record(name: &str, camera: &str, seen_secs_ago: i64, now: DateTime<Utc>) -> PersonRecord {
        let mut record = PersonRecord::new(name);
        record.apply(
            &LiveEventPayload {
                person_id: Some(name.into()),
                camera: Some(camera.into()),
                ..Default::default()
            },
            now - Duration::seconds(seen_secs_ago),
        );
        record
    }

    fn snapshot_with(records: Vec<PersonRecord>, zones: CameraZoneMap) -> RegistrySnapshot {
        let persons: BTreeMap<String, PersonRecord> =
            records.into_iter().map(|r| (r.name.clone(), r)).collect();
        RegistrySnapshot {
            persons,
            meta: Default::default(),
            camera_zones: zones,
        }
    }

    #[test]
    fn test_zero_watch_window_rejected() {
        assert!(SupervisionEvaluator::new(0).is_err());
        assert!(SupervisionEvaluator::new(-5).is_err());
        assert!(SupervisionEvaluator::new(60).is_ok());
    }

    #[test]
    fn test_adult_in_same_zone_within_window() {
        let now = Utc::now();
        let zones = CameraZoneMap::from([("backyard", "yard"), ("patio", "yard")]);
        let snapshot = snapshot_with(
            vec![record("Alice", "backyard", 5, now), record("Dad", "patio", 10, now)],
            zones,
        );
        let eval = SupervisionEvaluator::new(60).unwrap();
        assert!(eval.supervised("Alice", &["Dad".into()], &snapshot, now));
    }

    #[test]
    fn test_adult_outside_watch_window() {
        let now = Utc::now();
        let zones = CameraZoneMap::from([("backyard", "yard"), ("patio", "yard")]);
        let snapshot = snapshot_with(
            vec![record("Alice", "backyard", 5, now), record("Dad", "patio", 90, now)],
            zones,
        );
        let eval = SupervisionEvaluator::new(60).unwrap();
        assert!(!eval.supervised("Alice", &["Dad".into()], &snapshot, now));
    }

    #[test]
    fn test_empty_zone_map_requires_same_camera() {
        let now = Utc::now();
        let snapshot = snapshot_with(
            vec![
                record("Alice", "backyard", 5, now),
                record("Dad", "driveway", 5, now),
            ],
            CameraZoneMap::default(),
        );
        let eval = SupervisionEvaluator::new(60).unwrap();
        assert!(!eval.supervised("Alice", &["Dad".into()], &snapshot, now));

        let snapshot = snapshot_with(
            vec![
                record("Alice", "backyard", 5, now),
                record("Dad", "backyard", 5, now),
            ],
            CameraZoneMap::default(),
        );
        assert!(eval.supervised("Alice", &["Dad".into()], &snapshot, now));
    }

    #[test]
    fn test_unknown_child_or_missing_camera() {
        let now = Utc::now();
        let eval = SupervisionEvaluator::new(60).unwrap();
        let snapshot = snapshot_with(vec![], CameraZoneMap::default());
        assert!(!eval.supervised("Alice", &["Dad".into()], &snapshot, now));

        // Pre-registered child without any sighting.
        let snapshot = snapshot_with(
            vec![PersonRecord::new("Alice"), record("Dad", "backyard", 5, now)],
            CameraZoneMap::default(),
        );
        assert!(!eval.supervised("Alice", &["Dad".into()], &snapshot, now));
    }

    #[test]
    fn test_state_template_embeds_zone_map_and_adults() {
        let eval = SupervisionEvaluator::new(60).unwrap();
        let zones = CameraZoneMap::from([("backyard", "yard")]);
        let rendered = eval
            .state_template("Alice", &["Dad".into(), "Mom".into()], &zones)
            .render();

        assert!(rendered.contains("{% set camera_zones = {'backyard': 'yard'} %}"));
        assert!(rendered.contains("'Alice' in persons"));
        assert!(rendered.contains("'Dad' in persons"));
        assert!(rendered.contains("'Mom' in persons"));
        assert!(rendered.contains("< 60"));
        assert!(rendered.contains("camera_zones.get(persons['Dad'].camera, persons['Dad'].camera)"));
    }
}
