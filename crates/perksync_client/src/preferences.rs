//! Local moa skin preferences.
//!
//! The chosen skin lives in a small JSON customizations file so it survives
//! restarts; the last-ridden moa is tracked in memory as the game reports it.

use crate::error::ClientResult;
use crate::manager::DesiredStateSource;
use parking_lot::RwLock;
use perksync_protocol::{MoaSkin, MoaSkinPerk, UserKey};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};
use uuid::Uuid;

#[derive(Debug, Default, Serialize, Deserialize)]
struct Customizations {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    moa_skin: Option<String>,
}

/// Desired moa skin state of the local user.
///
/// A blank or unknown skin id means the user wants no record.
#[derive(Debug)]
pub struct MoaSkinPreferences {
    owner: UserKey,
    path: Option<PathBuf>,
    skin: RwLock<Option<&'static MoaSkin>>,
    last_ridden: RwLock<HashMap<UserKey, Uuid>>,
}

impl MoaSkinPreferences {
    /// Creates in-memory preferences with no skin chosen.
    pub fn new(owner: UserKey) -> Self {
        Self {
            owner,
            path: None,
            skin: RwLock::new(None),
            last_ridden: RwLock::new(HashMap::new()),
        }
    }

    /// Creates preferences backed by the customizations file at `path`.
    ///
    /// A missing file means no skin is chosen.
    pub fn open(owner: UserKey, path: impl Into<PathBuf>) -> ClientResult<Self> {
        let preferences = Self {
            path: Some(path.into()),
            ..Self::new(owner)
        };
        preferences.reload()?;
        Ok(preferences)
    }

    /// Returns the customizations file path, if any.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Re-reads the customizations file.
    pub fn reload(&self) -> ClientResult<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let customizations: Customizations = if path.exists() {
            serde_json::from_str(&fs::read_to_string(path)?)?
        } else {
            Customizations::default()
        };

        *self.skin.write() = resolve(customizations.moa_skin.as_deref());
        debug!(path = %path.display(), "customizations loaded");
        Ok(())
    }

    /// Chooses a skin by id; `None` or a blank id clears the choice.
    ///
    /// Writes the customizations file when the preferences are file-backed.
    pub fn set_skin(&self, id: Option<&str>) -> ClientResult<()> {
        let skin = resolve(id);
        *self.skin.write() = skin;

        if let Some(path) = &self.path {
            let customizations = Customizations {
                moa_skin: skin.map(|s| s.id().to_string()),
            };
            if let Some(parent) = path.parent() {
                if !parent.as_os_str().is_empty() {
                    fs::create_dir_all(parent)?;
                }
            }
            fs::write(path, serde_json::to_string_pretty(&customizations)?)?;
        }
        Ok(())
    }

    /// Returns the chosen skin.
    pub fn skin(&self) -> Option<&'static MoaSkin> {
        *self.skin.read()
    }

    /// Records the moa `user` most recently rode.
    pub fn set_last_ridden_moa(&self, user: UserKey, moa: Uuid) {
        self.last_ridden.write().insert(user, moa);
    }

    /// Forgets the moa `user` rode.
    pub fn clear_last_ridden_moa(&self, user: UserKey) {
        self.last_ridden.write().remove(&user);
    }
}

fn resolve(id: Option<&str>) -> Option<&'static MoaSkin> {
    let id = id.map(str::trim).filter(|id| !id.is_empty())?;
    let skin = MoaSkin::by_id(id);
    if skin.is_none() {
        warn!(id, "ignoring unknown moa skin");
    }
    skin
}

impl DesiredStateSource<MoaSkinPerk> for MoaSkinPreferences {
    fn desired_state(&self, user: UserKey) -> Option<MoaSkinPerk> {
        if user != self.owner {
            return None;
        }
        let skin = self.skin()?;
        let moa = self.last_ridden.read().get(&user).copied();
        Some(MoaSkinPerk::new(moa, Some(skin)))
    }
}
