//! Player data persistence.

use crate::error::StoreError;
use crate::player::PlayerData;
use crate::utils::current_timestamp;
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Saves player data when a registered player leaves.
#[async_trait]
pub trait PlayerStore: Send + Sync {
    async fn save(&self, player: PlayerData) -> Result<(), StoreError>;
}

/// One pretty-printed JSON file per player, named after the player.
#[derive(Debug, Clone)]
pub struct JsonPlayerStore {
    directory: PathBuf,
}

impl JsonPlayerStore {
    pub fn new(directory: impl Into<PathBuf>) -> Self {
        Self {
            directory: directory.into(),
        }
    }

    pub fn directory(&self) -> &Path {
        &self.directory
    }

    /// File a player is stored in. Characters outside `[A-Za-z0-9_-]` become `_`.
    pub fn path_for(&self, name: &str) -> PathBuf {
        let file: String = name
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.directory.join(format!("{file}.json"))
    }

    pub async fn load(&self, name: &str) -> Result<Option<PlayerData>, StoreError> {
        let path = self.path_for(name);
        match tokio::fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl PlayerStore for JsonPlayerStore {
    async fn save(&self, mut player: PlayerData) -> Result<(), StoreError> {
        let name = player.name.clone().ok_or(StoreError::Anonymous)?;
        player.last_online = current_timestamp();

        tokio::fs::create_dir_all(&self.directory).await?;
        let path = self.path_for(&name);
        let json = serde_json::to_vec_pretty(&player)?;
        tokio::fs::write(&path, json).await?;
        debug!("Saved player data for {} to {}", name, path.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::{IpAddr, Ipv4Addr};

    #[tokio::test]
    async fn test_save_and_load_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPlayerStore::new(dir.path().join("players"));

        let mut player = PlayerData::new(IpAddr::V4(Ipv4Addr::new(192, 168, 0, 4)), 9);
        player.name = Some("Nova".to_string());
        store.save(player.clone()).await.unwrap();

        let loaded = store.load("Nova").await.unwrap().unwrap();
        assert_eq!(loaded.name, player.name);
        assert_eq!(loaded.address, player.address);
        assert!(loaded.last_online > 0);
        assert!(store.load("Nobody").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_anonymous_player_is_refused() {
        let dir = tempfile::tempdir().unwrap();
        let store = JsonPlayerStore::new(dir.path());
        let player = PlayerData::new(IpAddr::V4(Ipv4Addr::LOCALHOST), 1);
        assert!(matches!(store.save(player).await, Err(StoreError::Anonymous)));
    }

    #[test]
    fn test_file_names_are_sanitized() {
        let store = JsonPlayerStore::new("players");
        assert_eq!(store.path_for("../evil name"), PathBuf::from("players/___evil_name.json"));
    }
}
