//! Configuration file loading.
//!
//! The on-disk format is picked by file extension; every format
//! deserializes into the same serde structs, so a deployment can keep its
//! configuration in whichever of YAML, TOML, or JSON the rest of its
//! tooling prefers.

use crate::error::ConfigError;
use serde::de::DeserializeOwned;
use std::path::Path;

/// A recognized configuration file format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ConfigFormat {
    /// `.yaml` / `.yml`
    #[default]
    Yaml,
    /// `.toml`
    Toml,
    /// `.json`
    Json,
}

impl ConfigFormat {
    /// Picks the format from a path's extension, if recognized.
    #[must_use]
    pub fn from_path(path: &Path) -> Option<Self> {
        match path.extension()?.to_str()?.to_lowercase().as_str() {
            "yaml" | "yml" => Some(Self::Yaml),
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            _ => None,
        }
    }

    /// Deserializes `content` in this format.
    pub fn parse<T: DeserializeOwned>(self, content: &str) -> Result<T, ConfigError> {
        match self {
            Self::Yaml => serde_yaml::from_str(content).map_err(|e| ConfigError::Parse {
                reason: format!("YAML parse error: {e}"),
            }),
            Self::Toml => toml::from_str(content).map_err(|e| ConfigError::Parse {
                reason: format!("TOML parse error: {e}"),
            }),
            Self::Json => serde_json::from_str(content).map_err(|e| ConfigError::Parse {
                reason: format!("JSON parse error: {e}"),
            }),
        }
    }
}

/// Loads configuration files with format auto-detection.
#[derive(Debug, Clone, Copy, Default)]
pub struct ConfigLoader;

impl ConfigLoader {
    /// Creates a loader.
    #[must_use]
    pub fn new() -> Self {
        Self
    }

    /// Reads and parses a configuration file, detecting the format from
    /// its extension.
    pub fn load_file<T, P>(&self, path: P) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
        P: AsRef<Path>,
    {
        let path = path.as_ref();
        let format = ConfigFormat::from_path(path).ok_or_else(|| ConfigError::InvalidFormat {
            path: path.display().to_string(),
            reason: "expected a .yaml, .yml, .toml, or .json file".to_string(),
        })?;
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::FileRead {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        self.load_str(&content, format)
    }

    /// Parses configuration content in an explicitly chosen format.
    pub fn load_str<T>(&self, content: &str, format: ConfigFormat) -> Result<T, ConfigError>
    where
        T: DeserializeOwned,
    {
        format.parse(content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::Deserialize;

    #[derive(Debug, Deserialize, PartialEq)]
    struct Knobs {
        retries: u32,
        label: String,
    }

    #[test]
    fn test_format_detection() {
        for (name, expected) in [
            ("mutt.yaml", Some(ConfigFormat::Yaml)),
            ("mutt.YML", Some(ConfigFormat::Yaml)),
            ("mutt.toml", Some(ConfigFormat::Toml)),
            ("mutt.json", Some(ConfigFormat::Json)),
            ("mutt.conf", None),
            ("mutt", None),
        ] {
            assert_eq!(ConfigFormat::from_path(Path::new(name)), expected, "{name}");
        }
    }

    #[test]
    fn test_same_struct_from_every_format() {
        let expected = Knobs {
            retries: 3,
            label: "queue".to_string(),
        };
        let loader = ConfigLoader::new();

        let yaml: Knobs = loader
            .load_str("retries: 3\nlabel: queue\n", ConfigFormat::Yaml)
            .unwrap();
        let toml: Knobs = loader
            .load_str("retries = 3\nlabel = \"queue\"\n", ConfigFormat::Toml)
            .unwrap();
        let json: Knobs = loader
            .load_str(r#"{"retries": 3, "label": "queue"}"#, ConfigFormat::Json)
            .unwrap();

        assert_eq!(yaml, expected);
        assert_eq!(toml, expected);
        assert_eq!(json, expected);
    }

    #[test]
    fn test_malformed_content_is_a_parse_error() {
        let result: Result<Knobs, _> =
            ConfigLoader::new().load_str("{broken", ConfigFormat::Json);
        assert!(matches!(result, Err(ConfigError::Parse { .. })));
    }

    #[test]
    fn test_missing_file_is_a_read_error() {
        let result: Result<Knobs, _> = ConfigLoader::new().load_file("/nonexistent/mutt.yaml");
        assert!(matches!(result, Err(ConfigError::FileRead { .. })));
    }
}
