//! Level lookup against the level atlas.

use dashmap::DashMap;
use dustlobby_lobby::{Level, LevelResolver, LobbyError};
use reqwest::header::CONTENT_DISPOSITION;

/// Resolves level ids with `HEAD <base_url>?id=<id>`: the atlas names the
/// level's file in the `Content-Disposition` header. Results are cached.
pub struct AtlasLevels {
    client: reqwest::Client,
    base_url: String,
    cache: DashMap<u64, Level>,
}

impl AtlasLevels {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into(),
            cache: DashMap::new(),
        }
    }
}

impl LevelResolver for AtlasLevels {
    async fn resolve(&self, level_id: u64) -> Result<Level, LobbyError> {
        if let Some(level) = self.cache.get(&level_id).map(|e| e.value().clone()) {
            return Ok(level);
        }

        let response = self
            .client
            .head(&self.base_url)
            .query(&[("id", level_id)])
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(level_id, error = %e, "level lookup failed");
                LobbyError::LevelLookup(e.to_string())
            })?;
        if response.status().is_server_error() {
            return Err(LobbyError::LevelLookup(format!(
                "atlas returned {}",
                response.status()
            )));
        }

        let level = response
            .headers()
            .get(CONTENT_DISPOSITION)
            .and_then(|value| value.to_str().ok())
            .and_then(attachment_filename)
            .map(Level::from_filename)
            .filter(|level| level.id() == Some(level_id))
            .ok_or(LobbyError::UnknownLevel(level_id))?;
        self.cache.insert(level_id, level.clone());
        Ok(level)
    }
}

/// The quoted `filename="..."` parameter of a `Content-Disposition` value.
fn attachment_filename(value: &str) -> Option<&str> {
    let start = value.find("filename=\"")? + "filename=\"".len();
    let rest = &value[start..];
    let name = &rest[..rest.find('"')?];
    (!name.is_empty()).then_some(name)
}
