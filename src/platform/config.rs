//! `protomut.toml` config loading.

use serde::{Deserialize, Serialize};

use std::path::Path;

use crate::{ProtomutError, ProtomutResult};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct Config {
    /// Maximum nesting depth (in edges from the root) the engine will build or descend into.
    #[serde(default = "default_max_depth")]
    pub max_depth: usize,

    /// Upper bound on elementary mutations per `mutate` call.
    #[serde(default = "default_max_mutations")]
    pub max_mutations: usize,

    /// Repeated containers never grow past this many elements.
    #[serde(default = "default_max_repeated_len")]
    pub max_repeated_len: usize,

    /// Let enum mutation produce indices past the declared values.
    #[serde(default)]
    pub allow_out_of_range_enums: bool,

    /// Float mutation substitutes a special value once in this many draws.
    #[serde(default = "default_special_float_one_in")]
    pub special_float_one_in: u32,

    /// Fill missing required fields before mutating.
    #[serde(default = "default_keep_initialized")]
    pub keep_initialized: bool,

    /// Encode attempts the custom-mutator glue makes before giving up.
    #[serde(default = "default_max_encode_attempts")]
    pub max_encode_attempts: usize,
}

fn default_max_depth() -> usize {
    16
}

fn default_max_mutations() -> usize {
    4
}

fn default_max_repeated_len() -> usize {
    64
}

fn default_special_float_one_in() -> u32 {
    16
}

fn default_keep_initialized() -> bool {
    true
}

fn default_max_encode_attempts() -> usize {
    4
}

impl Default for Config {
    fn default() -> Self {
        Self {
            max_depth: default_max_depth(),
            max_mutations: default_max_mutations(),
            max_repeated_len: default_max_repeated_len(),
            allow_out_of_range_enums: false,
            special_float_one_in: default_special_float_one_in(),
            keep_initialized: default_keep_initialized(),
            max_encode_attempts: default_max_encode_attempts(),
        }
    }
}

impl Config {
    pub fn load_optional(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(s) => match toml::from_str::<Config>(&s) {
                Ok(cfg) => match cfg.validate() {
                    Ok(()) => cfg,
                    Err(err) => {
                        tracing::warn!("ignoring config {}: {err}", path.display());
                        Self::default()
                    }
                },
                Err(err) => {
                    tracing::warn!("failed to parse config {}: {err}", path.display());
                    Self::default()
                }
            },
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Self::default(),
            Err(err) => {
                tracing::warn!("failed to read config {}: {err}", path.display());
                Self::default()
            }
        }
    }

    pub fn validate(&self) -> ProtomutResult<()> {
        if self.max_mutations == 0 {
            return Err(ProtomutError::Config("max_mutations must be at least 1".to_string()));
        }
        if self.special_float_one_in == 0 {
            return Err(ProtomutError::Config(
                "special_float_one_in must be at least 1".to_string(),
            ));
        }
        if self.max_encode_attempts == 0 {
            return Err(ProtomutError::Config(
                "max_encode_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn missing_file_yields_defaults() {
        let path = std::env::temp_dir().join("protomut-config-does-not-exist.toml");
        assert_eq!(Config::load_optional(&path), Config::default());
    }

    #[test]
    fn partial_toml_keeps_other_defaults() {
        let cfg: Config = toml::from_str("max_depth = 3\nallow_out_of_range_enums = true\n")
            .expect("parse");
        assert_eq!(cfg.max_depth, 3);
        assert!(cfg.allow_out_of_range_enums);
        assert_eq!(cfg.max_mutations, 4);
        assert!(cfg.keep_initialized);
    }

    #[test]
    fn zero_mutation_cap_is_rejected() {
        let cfg = Config {
            max_mutations: 0,
            ..Config::default()
        };
        let err = cfg.validate().expect_err("must reject");
        assert!(err.to_string().contains("max_mutations"));
    }
}
