//! Levels and the lookup hook that turns a level id into one.
//!
//! A level is identified on the community atlas by its filename,
//! `<name>-<id>` (for example `Downhill-Rush-5518`). The game's built-in
//! levels have no id suffix. Every URI clients display is derived from
//! the filename.

use std::collections::HashMap;

use dustlobby_protocol::LevelInfo;

use crate::LobbyError;

/// A selectable level.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Level {
    filename: String,
    id: Option<u64>,
}

impl Level {
    /// Parses the id from the filename's last `-` segment, if numeric.
    pub fn from_filename(filename: impl Into<String>) -> Self {
        let filename = filename.into();
        let id = filename
            .rsplit_once('-')
            .and_then(|(_, suffix)| suffix.parse().ok());
        Self { filename, id }
    }

    pub fn filename(&self) -> &str {
        &self.filename
    }

    /// The atlas id. `None` for built-in levels.
    pub fn id(&self) -> Option<u64> {
        self.id
    }

    /// The filename without its id, dashes shown as spaces.
    pub fn name(&self) -> String {
        self.stem().replace('-', " ")
    }

    /// The descriptor sent to clients.
    pub fn info(&self) -> LevelInfo {
        let play_uri = match self.id {
            Some(id) => format!("dustforce://installPlay/{id}/{}", self.stem()),
            None => format!("dustforce://installPlay/0/{}", self.filename),
        };
        LevelInfo {
            name: self.name(),
            play_uri,
            image_uri: format!("https://atlas.dustforce.com/gi/maps/{}.png", self.filename),
            atlas_uri: self
                .id
                .map(|id| format!("https://atlas.dustforce.com/{id}/{}", self.stem())),
            leaderboard_uri: format!("https://dustkid.com/level/{}", self.filename),
        }
    }

    fn stem(&self) -> &str {
        match self.id {
            Some(_) => self
                .filename
                .rsplit_once('-')
                .map_or(self.filename.as_str(), |(stem, _)| stem),
            None => &self.filename,
        }
    }
}

/// Resolves an atlas level id into a [`Level`].
///
/// The admin adapter calls this before `start_game`/`start_round`, so a
/// slow lookup never holds up a lobby's command queue.
pub trait LevelResolver: Send + Sync + 'static {
    /// # Returns
    /// - `Ok(level)` for a known id
    /// - `Err(LobbyError::UnknownLevel)` if no level has this id
    /// - `Err(LobbyError::LevelLookup)` if the lookup itself failed
    fn resolve(
        &self,
        level_id: u64,
    ) -> impl std::future::Future<Output = Result<Level, LobbyError>> + Send;
}

/// A fixed id → filename table.
#[derive(Debug, Clone, Default)]
pub struct StaticLevels {
    levels: HashMap<u64, Level>,
}

impl StaticLevels {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a level by filename. Filenames without an id are skipped.
    pub fn with(mut self, filename: &str) -> Self {
        let level = Level::from_filename(filename);
        if let Some(id) = level.id() {
            self.levels.insert(id, level);
        }
        self
    }
}

impl LevelResolver for StaticLevels {
    async fn resolve(&self, level_id: u64) -> Result<Level, LobbyError> {
        self.levels
            .get(&level_id)
            .cloned()
            .ok_or(LobbyError::UnknownLevel(level_id))
    }
}
