//! Area map retrieval
//!
//! The dashboard groups person cards by display area. Area assignments live
//! in the platform's own registry, so we ask the platform to render a small
//! template that maps every camera entity to its area name and returns the
//! result as JSON. Retrieval failures degrade to an empty map (everyone
//! lands in the Unassigned section) rather than blocking generation.
//! Explicit per-camera overrides from configuration win over queried values.

use reqwest::Client;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, warn};

/// Template rendered server-side by the platform. Produces a JSON object of
/// camera object-id to area name for every camera and image entity that has
/// an area assigned.
const AREA_MAP_TEMPLATE: &str = "\
{%- set ns = namespace(out={}) -%}
{%- for s in states.camera | list + states.image | list -%}
  {%- set area = area_name(s.entity_id) -%}
  {%- if area -%}
    {%- set ns.out = ns.out | combine({s.object_id: area}) -%}
  {%- endif -%}
{%- endfor -%}
{{ ns.out | to_json }}";

/// Source of the camera-to-area mapping.
pub trait AreaProvider: Send + Sync {
    /// Current camera-to-area map; implementations never fail, degrading to
    /// an empty map instead.
    fn fetch(&self) -> impl Future<Output = HashMap<String, String>> + Send;
}

/// Overlay explicit overrides onto a queried map; overrides win.
pub fn apply_overrides(
    mut queried: HashMap<String, String>,
    overrides: &HashMap<String, String>,
) -> HashMap<String, String> {
    for (camera, area) in overrides {
        queried.insert(camera.clone(), area.clone());
    }
    queried
}

pub struct AreaMapClient {
    http: Client,
    base_url: String,
    token: String,
}

impl AreaMapClient {
    pub fn new(base_url: &str, token: &str) -> crate::Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .connect_timeout(Duration::from_secs(5))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: token.to_string(),
        })
    }

    async fn try_fetch(&self) -> crate::Result<HashMap<String, String>> {
        let url = format!("{}/api/template", self.base_url);
        let body = serde_json::json!({ "template": AREA_MAP_TEMPLATE });
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.token)
            .json(&body)
            .send()
            .await?
            .error_for_status()?;
        let rendered = response.text().await?;
        let map: HashMap<String, String> = serde_json::from_str(&rendered)?;
        Ok(map)
    }
}

impl AreaProvider for AreaMapClient {
    async fn fetch(&self) -> HashMap<String, String> {
        match self.try_fetch().await {
            Ok(map) => {
                debug!(cameras = map.len(), "area map retrieved");
                map
            }
            Err(e) => {
                warn!(error = %e, "area map retrieval failed, using empty map");
                HashMap::new()
            }
        }
    }
}

/// Fixed map, used when no platform endpoint is configured.
pub struct StaticAreaProvider(pub HashMap<String, String>);

impl AreaProvider for StaticAreaProvider {
    async fn fetch(&self) -> HashMap<String, String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_unreachable_platform_yields_empty_map() {
        // Port 9 (discard) refuses connections immediately.
        let client = AreaMapClient::new("http://127.0.0.1:9/", "token").unwrap();
        let map = client.fetch().await;
        assert!(map.is_empty());
    }

    #[test]
    fn test_base_url_trailing_slash_trimmed() {
        let client = AreaMapClient::new("http://ha.local:8123/", "token").unwrap();
        assert_eq!(client.base_url, "http://ha.local:8123");
    }

    #[test]
    fn test_overrides_win() {
        let mut queried = HashMap::new();
        queried.insert("patio".to_string(), "Backyard".to_string());
        queried.insert("hall".to_string(), "Hallway".to_string());
        let mut overrides = HashMap::new();
        overrides.insert("patio".to_string(), "Terrace".to_string());
        overrides.insert("gate".to_string(), "Driveway".to_string());

        let merged = apply_overrides(queried, &overrides);
        assert_eq!(merged["patio"], "Terrace");
        assert_eq!(merged["hall"], "Hallway");
        assert_eq!(merged["gate"], "Driveway");
    }
}
