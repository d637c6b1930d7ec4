use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{
    fs,
    path::PathBuf,
    sync::{PoisonError, RwLock},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
pub enum Theme {
    #[default]
    Light,
    Dark,
}

impl Theme {
    pub fn toggled(self) -> Self {
        match self {
            Theme::Light => Theme::Dark,
            Theme::Dark => Theme::Light,
        }
    }
}

/// Surface fields that survive a restart. Everything else starts fresh.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase", default)]
pub struct Preferences {
    pub theme: Theme,
    pub logged_in: bool,
}

pub struct SettingsStore {
    path: Option<PathBuf>,
    data: RwLock<Preferences>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            Preferences::default()
        };

        Ok(Self {
            path: Some(path),
            data: RwLock::new(data),
        })
    }

    /// A store that never touches the filesystem.
    pub fn ephemeral(preferences: Preferences) -> Self {
        Self {
            path: None,
            data: RwLock::new(preferences),
        }
    }

    pub fn preferences(&self) -> Preferences {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn set_theme(&self, theme: Theme) -> Result<()> {
        self.update(|prefs| prefs.theme = theme)
    }

    pub fn set_logged_in(&self, logged_in: bool) -> Result<()> {
        self.update(|prefs| prefs.logged_in = logged_in)
    }

    fn update(&self, apply: impl FnOnce(&mut Preferences)) -> Result<()> {
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        let before = guard.clone();
        apply(&mut *guard);
        if *guard == before {
            return Ok(());
        }
        self.persist(&guard)
    }

    fn persist(&self, data: &Preferences) -> Result<()> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).with_context(|| {
                format!("Failed to create settings directory {}", parent.display())
            })?;
        }
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(path, serialized)
            .with_context(|| format!("Failed to write settings to {}", path.display()))
    }
}
