// Copyright 2020 Google LLC
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

//! Optional engine-tuning preset, loaded from a small RON document.
//! Every field here also has a CLI flag; the file only exists so a
//! commonly used set of timing parameters can be saved and reused
//! without retyping them.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;

#[derive(Serialize, Deserialize, Debug, PartialEq, Clone)]
pub struct EngineConfigPreset {
    pub timeout_ms: u64,
    pub interval_ms: u64,
    pub perhost_interval_ms: u64,
    pub retry: u32,
    pub backoff: f64,
}

impl Default for EngineConfigPreset {
    fn default() -> Self {
        Self {
            timeout_ms: 500,
            interval_ms: 25,
            perhost_interval_ms: 1000,
            retry: 3,
            backoff: 1.5,
        }
    }
}

impl EngineConfigPreset {
    pub fn from_filepath(filepath: &str) -> Result<Self, ConfigError> {
        let contents = fs::read_to_string(filepath).map_err(|source| ConfigError::Io {
            path: filepath.to_string(),
            source,
        })?;
        Self::from_str(&contents)
    }

    pub fn from_str(contents: &str) -> Result<Self, ConfigError> {
        Ok(ron::de::from_str(contents)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    const SAMPLE_CFG: &str = r#"
        EngineConfigPreset(
            timeout_ms: 750,
            interval_ms: 10,
            perhost_interval_ms: 2000,
            retry: 5,
            backoff: 1.2,
        )
    "#;

    #[test]
    fn from_str_empty_is_an_error() {
        assert!(EngineConfigPreset::from_str("").is_err());
    }

    #[test]
    fn from_str_valid() {
        let cfg = EngineConfigPreset::from_str(SAMPLE_CFG).unwrap();
        assert_eq!(cfg.timeout_ms, 750);
        assert_eq!(cfg.retry, 5);
        assert!((cfg.backoff - 1.2).abs() < 1e-9);
    }

    #[test]
    fn from_filepath_reads_and_parses() {
        let mut tmpfile = tempfile::NamedTempFile::new().unwrap();
        write!(tmpfile.as_file_mut(), "{}", SAMPLE_CFG).unwrap();
        let path = tmpfile.into_temp_path();
        let cfg = EngineConfigPreset::from_filepath(path.to_str().unwrap()).unwrap();
        assert_eq!(cfg.perhost_interval_ms, 2000);
        path.close().unwrap();
    }

    #[test]
    fn from_filepath_missing_file_is_an_error() {
        let err = EngineConfigPreset::from_filepath("/nonexistent/path/to/config.ron").unwrap_err();
        assert!(matches!(err, ConfigError::Io { .. }));
    }

    #[test]
    fn default_matches_documented_fping_defaults() {
        let cfg = EngineConfigPreset::default();
        assert_eq!(cfg.timeout_ms, 500);
        assert_eq!(cfg.interval_ms, 25);
        assert_eq!(cfg.perhost_interval_ms, 1000);
        assert_eq!(cfg.retry, 3);
    }
}
