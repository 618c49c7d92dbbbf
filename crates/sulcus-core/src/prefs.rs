//! On-load preferences, threaded explicitly into load calls.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{Result, SulcusError};
use crate::orient::OrientationCode;

/// User preferences affecting how volumes are brought into memory. There is
/// no ambient global; callers resolve a value and pass it into `load`.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Preferences {
    /// Convention newly loaded volumes are permuted into.
    pub orientation_on_load: OrientationCode,
    /// Always copy voxel data out of the input buffer instead of aliasing it.
    pub force_copy_on_load: bool,
}

impl Preferences {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path)?;
        toml::from_str(&text).map_err(|e| SulcusError::Config(e.to_string()))
    }

    pub fn to_toml(&self) -> Result<String> {
        toml::to_string_pretty(self).map_err(|e| SulcusError::Config(e.to_string()))
    }

    /// An explicit request wins over the configured default.
    pub fn resolve(&self, requested: Option<OrientationCode>) -> OrientationCode {
        requested.unwrap_or(self.orientation_on_load)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_keep_native_orientation() {
        let prefs = Preferences::default();
        assert_eq!(prefs.orientation_on_load, OrientationCode::None);
        assert!(!prefs.force_copy_on_load);
    }

    #[test]
    fn parses_toml() {
        let prefs: Preferences =
            toml::from_str("orientation_on_load = \"RAS\"\nforce_copy_on_load = true\n").unwrap();
        assert_eq!(prefs.orientation_on_load, OrientationCode::Ras);
        assert!(prefs.force_copy_on_load);
    }

    #[test]
    fn round_trips_through_toml() {
        let prefs = Preferences {
            orientation_on_load: OrientationCode::Lps,
            force_copy_on_load: false,
        };
        let text = prefs.to_toml().unwrap();
        let back: Preferences = toml::from_str(&text).unwrap();
        assert_eq!(prefs, back);
    }

    #[test]
    fn explicit_request_wins() {
        let prefs = Preferences {
            orientation_on_load: OrientationCode::Lps,
            force_copy_on_load: false,
        };
        assert_eq!(prefs.resolve(None), OrientationCode::Lps);
        assert_eq!(
            prefs.resolve(Some(OrientationCode::Ras)),
            OrientationCode::Ras
        );
    }
}
