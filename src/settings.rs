use std::{
    fs,
    path::{Path, PathBuf},
    sync::{PoisonError, RwLock},
};

use anyhow::{bail, Context, Result};
use log::warn;
use serde::{Deserialize, Serialize};

use crate::{ledger::FeeSchedule, recognition::RecognitionSettings};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct LotSettings {
    pub total_spots: u32,
    pub fees: FeeSchedule,
    pub recognition: RecognitionSettings,
}

impl Default for LotSettings {
    fn default() -> Self {
        Self {
            total_spots: 100,
            fees: FeeSchedule::default(),
            recognition: RecognitionSettings::default(),
        }
    }
}

impl LotSettings {
    fn validate(&self) -> Result<()> {
        if self.total_spots == 0 {
            bail!("total_spots must be at least 1");
        }
        if self.recognition.min_votes == 0 {
            bail!("recognition.min_votes must be at least 1");
        }
        if self.recognition.window_capacity < self.recognition.min_votes {
            bail!(
                "recognition.window_capacity ({}) is smaller than min_votes ({})",
                self.recognition.window_capacity,
                self.recognition.min_votes
            );
        }
        Ok(())
    }
}

/// Lot configuration persisted as JSON next to the database.
pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<LotSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            parse_or_default(&contents, &path)
        } else {
            LotSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn lot(&self) -> LotSettings {
        self.data
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn update_lot(&self, settings: LotSettings) -> Result<()> {
        settings.validate()?;
        let mut guard = self.data.write().unwrap_or_else(PoisonError::into_inner);
        self.persist(&settings)?;
        *guard = settings;
        Ok(())
    }

    pub fn reload(&self) -> Result<()> {
        let contents = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read settings from {}", self.path.display()))?;
        let data: LotSettings = serde_json::from_str(&contents)?;
        data.validate()?;
        *self.data.write().unwrap_or_else(PoisonError::into_inner) = data;
        Ok(())
    }

    fn persist(&self, data: &LotSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}

fn parse_or_default(contents: &str, path: &Path) -> LotSettings {
    let parsed = serde_json::from_str::<LotSettings>(contents)
        .map_err(anyhow::Error::from)
        .and_then(|settings| settings.validate().map(|_| settings));

    match parsed {
        Ok(settings) => settings,
        Err(err) => {
            warn!(
                "Ignoring settings in {}: {err:#}; using defaults",
                path.display()
            );
            LotSettings::default()
        }
    }
}
