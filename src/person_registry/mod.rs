//! PersonRegistry - Identity Registry
//!
//! ## Responsibilities
//!
//! - Own the set of tracked [`PersonRecord`]s
//! - Merge live identification events with static persons-file metadata
//! - Emit structural (create/remove) and refresh (field update) notifications
//!
//! The transport collaborator decodes payloads and hands them to
//! [`PersonRegistry::apply_live_event`]; subscription mechanics live outside
//! this crate.

mod types;

pub use types::{
    slug, HistoryEntry, LiveEventPayload, PersonMetadata, PersonRecord, Role,
    EVENT_HISTORY_CAPACITY,
};

use crate::zones::CameraZoneMap;
use chrono::Utc;
use serde_yaml::Value as YamlValue;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

/// Which registry mutations a listener wants to observe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ListenerClass {
    /// An identity was added or removed.
    Structural,
    /// Fields of an existing identity changed (fires on every applied event
    /// and on metadata reload).
    Refresh,
}

/// Opaque handle used to unregister a listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ListenerId(u64);

type ListenerFn = Box<dyn Fn() -> crate::Result<()> + Send + Sync>;

struct Listener {
    id: u64,
    class: ListenerClass,
    callback: ListenerFn,
}

/// Read-only view of the registry for the generator and evaluator.
#[derive(Debug, Clone, Default)]
pub struct RegistrySnapshot {
    /// Sorted by name (BTreeMap iteration order).
    pub persons: BTreeMap<String, PersonRecord>,
    pub meta: HashMap<String, PersonMetadata>,
    pub camera_zones: CameraZoneMap,
}

/// Central registry of all tracked persons.
pub struct PersonRegistry {
    persons: RwLock<BTreeMap<String, PersonRecord>>,
    meta: RwLock<HashMap<String, PersonMetadata>>,
    camera_zones: RwLock<CameraZoneMap>,
    listeners: Mutex<Vec<Listener>>,
    next_listener_id: AtomicU64,
    malformed_events: AtomicU64,
}

impl PersonRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self {
            persons: RwLock::new(BTreeMap::new()),
            meta: RwLock::new(HashMap::new()),
            camera_zones: RwLock::new(CameraZoneMap::default()),
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(1),
            malformed_events: AtomicU64::new(0),
        }
    }

    // ========================================
    // Metadata load
    // ========================================

    /// Load person metadata and the camera zone map from a persons file.
    ///
    /// A missing file is treated as "no metadata available": both snapshots
    /// are replaced with empty maps. A malformed file fails the load and the
    /// registry retains its prior snapshots.
    pub async fn load_metadata(&self, path: &Path) -> crate::Result<()> {
        if !path.exists() {
            let err = crate::Error::NotFound(path.display().to_string());
            warn!(error = %err, "Persons file not found; clearing metadata");
            *self.meta.write().await = HashMap::new();
            *self.camera_zones.write().await = CameraZoneMap::default();
            return Ok(());
        }

        let raw = tokio::fs::read_to_string(path).await?;
        let (meta, camera_zones) = parse_persons_file(&raw)?;

        let adults: Vec<&String> = meta.iter().filter(|(_, m)| m.is_adult()).map(|(n, _)| n).collect();
        let children: Vec<&String> = meta.iter().filter(|(_, m)| m.is_child()).map(|(n, _)| n).collect();
        info!(
            path = %path.display(),
            persons = meta.len(),
            adults = ?adults,
            children = ?children,
            "Loaded person metadata"
        );

        // Replace both snapshots atomically with respect to readers, then
        // pre-register declared persons so documents can be generated before
        // any live sighting arrives.
        let mut new_persons = 0usize;
        {
            let mut persons = self.persons.write().await;
            *self.meta.write().await = meta.clone();
            *self.camera_zones.write().await = camera_zones;
            for name in meta.keys() {
                if !persons.contains_key(name) {
                    persons.insert(name.clone(), PersonRecord::new(name));
                    new_persons += 1;
                }
            }
        }

        if new_persons > 0 {
            debug!(new_persons, "Persons pre-registered from metadata");
            self.notify(ListenerClass::Structural);
        }
        self.notify(ListenerClass::Refresh);
        Ok(())
    }

    // ========================================
    // Live event ingest
    // ========================================

    /// Decode a raw JSON payload and apply it.
    ///
    /// Unparsable payloads are dropped and counted, never surfaced.
    pub async fn ingest(&self, raw: &str) {
        match serde_json::from_str::<LiveEventPayload>(raw) {
            Ok(payload) => {
                self.apply_live_event(payload).await;
            }
            Err(e) => {
                self.malformed_events.fetch_add(1, Ordering::Relaxed);
                let err = crate::Error::MalformedEvent(e.to_string());
                debug!(error = %err, payload = raw, "Dropped malformed live event");
            }
        }
    }

    /// Update or create a person from an already-decoded live event.
    ///
    /// Returns the identity key the event was applied to, or `None` when the
    /// payload carried no identity and was dropped.
    pub async fn apply_live_event(&self, payload: LiveEventPayload) -> Option<String> {
        let Some(name) = payload.identity().map(String::from) else {
            self.malformed_events.fetch_add(1, Ordering::Relaxed);
            debug!("Dropped live event without identity field");
            return None;
        };

        let is_new = {
            let mut persons = self.persons.write().await;
            let is_new = !persons.contains_key(&name);
            let record = persons
                .entry(name.clone())
                .or_insert_with(|| PersonRecord::new(&name));
            record.apply(&payload, Utc::now());
            is_new
        };

        if is_new {
            info!(person = %name, "Discovered new person from live event");
            self.notify(ListenerClass::Structural);
        }
        self.notify(ListenerClass::Refresh);
        Some(name)
    }

    /// Number of dropped (malformed or identity-less) live events.
    pub fn malformed_event_count(&self) -> u64 {
        self.malformed_events.load(Ordering::Relaxed)
    }

    // ========================================
    // Accessors
    // ========================================

    /// All known person names in lexicographic order.
    pub async fn person_names(&self) -> Vec<String> {
        self.persons.read().await.keys().cloned().collect()
    }

    /// Person record by name.
    pub async fn get(&self, name: &str) -> Option<PersonRecord> {
        self.persons.read().await.get(name).cloned()
    }

    /// Names of trusted adults, sorted.
    pub async fn adults(&self) -> Vec<String> {
        let meta = self.meta.read().await;
        let mut names: Vec<String> = meta
            .iter()
            .filter(|(_, m)| m.is_adult())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Names of supervised children, sorted.
    pub async fn children(&self) -> Vec<String> {
        let meta = self.meta.read().await;
        let mut names: Vec<String> = meta
            .iter()
            .filter(|(_, m)| m.is_child())
            .map(|(n, _)| n.clone())
            .collect();
        names.sort();
        names
    }

    /// Children that declare at least one dangerous zone, sorted by name.
    pub async fn children_with_danger_zones(&self) -> BTreeMap<String, Vec<String>> {
        let meta = self.meta.read().await;
        meta.iter()
            .filter(|(_, m)| m.is_child() && !m.dangerous_zones.is_empty())
            .map(|(n, m)| (n.clone(), m.dangerous_zones.clone()))
            .collect()
    }

    /// Camera zone map snapshot.
    pub async fn camera_zones(&self) -> CameraZoneMap {
        self.camera_zones.read().await.clone()
    }

    /// Full read-only snapshot for generation.
    pub async fn snapshot(&self) -> RegistrySnapshot {
        RegistrySnapshot {
            persons: self.persons.read().await.clone(),
            meta: self.meta.read().await.clone(),
            camera_zones: self.camera_zones.read().await.clone(),
        }
    }

    // ========================================
    // Listeners
    // ========================================

    /// Register a listener for the given notification class.
    ///
    /// Listeners run synchronously in registration order; a failing listener
    /// is logged and does not prevent the rest from running.
    pub fn register_listener<F>(&self, class: ListenerClass, callback: F) -> ListenerId
    where
        F: Fn() -> crate::Result<()> + Send + Sync + 'static,
    {
        let id = self.next_listener_id.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .push(Listener {
                id,
                class,
                callback: Box::new(callback),
            });
        ListenerId(id)
    }

    /// Remove a previously registered listener. Unknown ids are a no-op.
    pub fn unregister_listener(&self, id: ListenerId) {
        self.listeners
            .lock()
            .expect("listener lock poisoned")
            .retain(|l| l.id != id.0);
    }

    fn notify(&self, class: ListenerClass) {
        let listeners = self.listeners.lock().expect("listener lock poisoned");
        for listener in listeners.iter().filter(|l| l.class == class) {
            if let Err(e) = (listener.callback)() {
                warn!(error = %e, class = ?class, "Registry listener failed");
            }
        }
    }
}

impl Default for PersonRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Parse the persons file: required `persons` mapping, optional
/// `camera_zones` mapping of camera name to zone name.
fn parse_persons_file(raw: &str) -> crate::Result<(HashMap<String, PersonMetadata>, CameraZoneMap)> {
    let doc: YamlValue = serde_yaml::from_str(raw)
        .map_err(|e| crate::Error::ConfigFormat(format!("unparsable persons file: {e}")))?;
    let YamlValue::Mapping(root) = doc else {
        return Err(crate::Error::ConfigFormat(
            "persons file must be a top-level mapping".into(),
        ));
    };

    let persons = root
        .get(YamlValue::from("persons"))
        .ok_or_else(|| crate::Error::ConfigFormat("missing required 'persons' mapping".into()))?;
    let YamlValue::Mapping(persons) = persons else {
        return Err(crate::Error::ConfigFormat(
            "'persons' must be a mapping of name to attributes".into(),
        ));
    };

    let mut meta = HashMap::new();
    for (key, attrs) in persons {
        let YamlValue::String(name) = key else {
            return Err(crate::Error::ConfigFormat(
                "person names must be strings".into(),
            ));
        };
        // Non-mapping attribute values are tolerated as an empty declaration.
        let parsed = match attrs {
            YamlValue::Mapping(_) => serde_yaml::from_value(attrs.clone()).map_err(|e| {
                crate::Error::ConfigFormat(format!("invalid attributes for '{name}': {e}"))
            })?,
            _ => PersonMetadata::default(),
        };
        meta.insert(name.clone(), parsed);
    }

    let mut camera_zones = CameraZoneMap::default();
    if let Some(raw_zones) = root.get(YamlValue::from("camera_zones")) {
        let YamlValue::Mapping(raw_zones) = raw_zones else {
            return Err(crate::Error::ConfigFormat(
                "'camera_zones' must be a mapping of camera name to zone name".into(),
            ));
        };
        for (camera, zone) in raw_zones {
            match (camera, zone) {
                (YamlValue::String(camera), YamlValue::String(zone)) => {
                    camera_zones.insert(camera.clone(), zone.clone());
                }
                _ => {
                    return Err(crate::Error::ConfigFormat(
                        "'camera_zones' entries must map string to string".into(),
                    ))
                }
            }
        }
    }

    Ok((meta, camera_zones))
}
