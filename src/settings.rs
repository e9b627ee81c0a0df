use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// Curve used to map HDR lighting values to displayable output.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum ToneMapping {
    None,
    Linear,
    Reinhard,
    Cineon,
    #[default]
    AcesFilmic,
}

impl ToneMapping {
    /// All modes, in panel display order.
    pub const ALL: [ToneMapping; 5] = [
        ToneMapping::None,
        ToneMapping::Linear,
        ToneMapping::Reinhard,
        ToneMapping::Cineon,
        ToneMapping::AcesFilmic,
    ];

    pub fn label(self) -> &'static str {
        match self {
            ToneMapping::None => "None",
            ToneMapping::Linear => "Linear",
            ToneMapping::Reinhard => "Reinhard",
            ToneMapping::Cineon => "Cineon",
            ToneMapping::AcesFilmic => "ACESFilmic",
        }
    }

    /// Index understood by the shader's tone-mapping switch.
    pub fn shader_index(self) -> u32 {
        match self {
            ToneMapping::None => 0,
            ToneMapping::Linear => 1,
            ToneMapping::Reinhard => 2,
            ToneMapping::Cineon => 3,
            ToneMapping::AcesFilmic => 4,
        }
    }
}

/// A recorded mutation of [`Settings`], drained by the application and
/// dispatched before the next frame is drawn.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SettingChange {
    EnvMapIntensity(f32),
    ToneMapping(ToneMapping),
    ToneMappingExposure(f32),
}

impl SettingChange {
    /// Whether this change requires a material-updater pass before the
    /// next frame.
    pub fn requires_material_update(self) -> bool {
        matches!(
            self,
            SettingChange::EnvMapIntensity(_) | SettingChange::ToneMapping(_)
        )
    }
}

/// Live-tunable viewer parameters.
///
/// Writes go through setters that record [`SettingChange`] events; the
/// event loop drains them each frame so reactions (the material updater,
/// the renderer's tone-mapping uniform) happen before the frame renders.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    env_map_intensity: f32,
    tone_mapping: ToneMapping,
    tone_mapping_exposure: f32,
    #[serde(skip)]
    changes: Vec<SettingChange>,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            env_map_intensity: 5.0,
            tone_mapping: ToneMapping::AcesFilmic,
            tone_mapping_exposure: 1.0,
            changes: Vec::new(),
        }
    }
}

impl Settings {
    /// Reads settings from a JSON file.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .with_context(|| format!("unable to read settings file {}", path.display()))?;
        serde_json::from_str(&text)
            .with_context(|| format!("invalid settings file {}", path.display()))
    }

    pub fn env_map_intensity(&self) -> f32 {
        self.env_map_intensity
    }

    pub fn tone_mapping(&self) -> ToneMapping {
        self.tone_mapping
    }

    pub fn tone_mapping_exposure(&self) -> f32 {
        self.tone_mapping_exposure
    }

    pub fn set_env_map_intensity(&mut self, value: f32) {
        if value != self.env_map_intensity {
            self.env_map_intensity = value;
            self.changes.push(SettingChange::EnvMapIntensity(value));
        }
    }

    pub fn set_tone_mapping(&mut self, mode: ToneMapping) {
        if mode != self.tone_mapping {
            self.tone_mapping = mode;
            self.changes.push(SettingChange::ToneMapping(mode));
        }
    }

    pub fn set_tone_mapping_exposure(&mut self, value: f32) {
        if value != self.tone_mapping_exposure {
            self.tone_mapping_exposure = value;
            self.changes
                .push(SettingChange::ToneMappingExposure(value));
        }
    }

    /// Takes the changes recorded since the last drain.
    pub fn drain_changes(&mut self) -> Vec<SettingChange> {
        std::mem::take(&mut self.changes)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_startup_configuration() {
        let settings = Settings::default();
        assert_eq!(settings.env_map_intensity(), 5.0);
        assert_eq!(settings.tone_mapping(), ToneMapping::AcesFilmic);
        assert_eq!(settings.tone_mapping_exposure(), 1.0);
    }

    #[test]
    fn setters_record_one_change_per_mutation() {
        let mut settings = Settings::default();
        settings.set_env_map_intensity(2.5);
        settings.set_tone_mapping(ToneMapping::Reinhard);
        settings.set_tone_mapping_exposure(0.8);
        let changes = settings.drain_changes();
        assert_eq!(
            changes,
            vec![
                SettingChange::EnvMapIntensity(2.5),
                SettingChange::ToneMapping(ToneMapping::Reinhard),
                SettingChange::ToneMappingExposure(0.8),
            ]
        );
        assert!(settings.drain_changes().is_empty());
    }

    #[test]
    fn unchanged_writes_record_nothing() {
        let mut settings = Settings::default();
        settings.set_env_map_intensity(settings.env_map_intensity());
        settings.set_tone_mapping(settings.tone_mapping());
        assert!(settings.drain_changes().is_empty());
    }

    #[test]
    fn tone_mapping_changes_require_material_updates() {
        assert!(SettingChange::ToneMapping(ToneMapping::Linear).requires_material_update());
        assert!(SettingChange::EnvMapIntensity(1.0).requires_material_update());
        assert!(!SettingChange::ToneMappingExposure(1.0).requires_material_update());
    }

    #[test]
    fn reads_settings_from_json_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"env_map_intensity": 2.5, "tone_mapping": "Reinhard"}}"#
        )
        .unwrap();
        let settings = Settings::from_file(file.path()).unwrap();
        assert_eq!(settings.env_map_intensity(), 2.5);
        assert_eq!(settings.tone_mapping(), ToneMapping::Reinhard);
        // exposure falls back to the default
        assert_eq!(settings.tone_mapping_exposure(), 1.0);
    }

    #[test]
    fn settings_survive_a_json_round_trip() {
        let mut settings = Settings::default();
        settings.set_tone_mapping(ToneMapping::Cineon);
        settings.set_env_map_intensity(1.5);
        let json = serde_json::to_string(&settings).unwrap();
        let restored: Settings = serde_json::from_str(&json).unwrap();
        assert_eq!(restored.env_map_intensity(), 1.5);
        assert_eq!(restored.tone_mapping(), ToneMapping::Cineon);
        assert_eq!(
            restored.tone_mapping_exposure(),
            settings.tone_mapping_exposure()
        );
    }

    #[test]
    fn rejects_malformed_settings_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(Settings::from_file(file.path()).is_err());
    }

    #[test]
    fn shader_indices_are_stable() {
        let indices: Vec<u32> = ToneMapping::ALL.iter().map(|m| m.shader_index()).collect();
        assert_eq!(indices, vec![0, 1, 2, 3, 4]);
    }
}
