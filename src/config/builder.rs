use serde::Deserialize;
use std::path::Path;

#[derive(Debug, Clone, Deserialize)]
pub struct BuilderConfig {
    #[serde(default = "default_rules_file")]
    pub rules_file: String,
    #[serde(default = "default_image_directory")]
    pub image_directory: String,
    #[serde(default = "default_image_prefix")]
    pub image_prefix: String,
    #[serde(default)]
    pub off_map_image: Option<String>,
    #[serde(default = "default_time_of_day")]
    pub time_of_day: String,
    #[serde(default = "default_border_terrain")]
    pub border_terrain: String,
    #[serde(default = "default_snapshot_directory")]
    pub snapshot_directory: String,
    #[serde(default = "default_max_snapshots")]
    pub max_snapshots: u32,
    #[serde(default = "default_log_level")]
    pub log_level: String,
    #[serde(default = "default_log_format")]
    pub log_format: String,
}

fn default_rules_file() -> String {
    "./terrain-graphics.toml".to_string()
}
fn default_image_directory() -> String {
    "./images".to_string()
}
fn default_image_prefix() -> String {
    "terrain/".to_string()
}
fn default_time_of_day() -> String {
    "morning".to_string()
}
fn default_border_terrain() -> String {
    crate::map::OFF_MAP_USER.to_string()
}
fn default_snapshot_directory() -> String {
    "./snapshots".to_string()
}
fn default_max_snapshots() -> u32 {
    10
}
fn default_log_level() -> String {
    "info".to_string()
}
fn default_log_format() -> String {
    "text".to_string()
}

impl Default for BuilderConfig {
    fn default() -> Self {
        Self {
            rules_file: default_rules_file(),
            image_directory: default_image_directory(),
            image_prefix: default_image_prefix(),
            off_map_image: None,
            time_of_day: default_time_of_day(),
            border_terrain: default_border_terrain(),
            snapshot_directory: default_snapshot_directory(),
            max_snapshots: default_max_snapshots(),
            log_level: default_log_level(),
            log_format: default_log_format(),
        }
    }
}

impl BuilderConfig {
    /// Load the config, falling back to defaults when the file does not exist.
    pub fn from_file_or_default(path: &Path) -> Result<Self, String> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        let config: BuilderConfig =
            toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), String> {
        let mut errors = Vec::new();

        if self.rules_file.trim().is_empty() {
            errors.push(
                "rules_file must not be empty. Example: rules_file = \"./terrain-graphics.toml\""
                    .to_string(),
            );
        }

        if self.time_of_day.trim().is_empty() {
            errors.push(
                "time_of_day must not be empty. Example: time_of_day = \"morning\"".to_string(),
            );
        }

        if self.border_terrain.trim().is_empty() || self.border_terrain.contains(',') {
            errors.push(format!(
                "border_terrain must be a single terrain code, got '{}'. Example: border_terrain = \"_off^_usr\"",
                self.border_terrain
            ));
        }

        if let Some(image) = &self.off_map_image {
            if image.trim().is_empty() {
                errors.push(
                    "off_map_image must not be empty when set. Example: off_map_image = \"off-map/alpha.png\""
                        .to_string(),
                );
            }
        }

        if self.max_snapshots == 0 {
            errors.push(format!(
                "max_snapshots must be > 0, got {}. Example: max_snapshots = 10",
                self.max_snapshots
            ));
        }

        let valid_levels = ["error", "warn", "info", "debug", "trace"];
        if !valid_levels.contains(&self.log_level.as_str()) {
            errors.push(format!(
                "log_level must be one of {:?}, got '{}'. Example: log_level = \"info\"",
                valid_levels, self.log_level
            ));
        }

        let valid_formats = ["text", "json"];
        if !valid_formats.contains(&self.log_format.as_str()) {
            errors.push(format!(
                "log_format must be one of {:?}, got '{}'. Example: log_format = \"text\"",
                valid_formats, self.log_format
            ));
        }

        if errors.is_empty() {
            Ok(())
        } else {
            Err(errors.join("\n"))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;
    use tempfile::NamedTempFile;

    fn test_path() -> PathBuf {
        PathBuf::from("test-builder.toml")
    }

    #[test]
    fn valid_config_loads_all_fields() {
        let toml = r#"
            rules_file = "./data/terrain.toml"
            image_directory = "./data/images"
            image_prefix = ""
            off_map_image = "off-map/alpha.png"
            time_of_day = "dusk"
            border_terrain = "Xv"
            snapshot_directory = "./out"
            max_snapshots = 3
            log_level = "debug"
            log_format = "json"
        "#;
        let config = BuilderConfig::from_toml_str(toml, &test_path()).unwrap();
        assert_eq!(config.rules_file, "./data/terrain.toml");
        assert_eq!(config.image_directory, "./data/images");
        assert_eq!(config.image_prefix, "");
        assert_eq!(config.off_map_image.as_deref(), Some("off-map/alpha.png"));
        assert_eq!(config.time_of_day, "dusk");
        assert_eq!(config.border_terrain, "Xv");
        assert_eq!(config.snapshot_directory, "./out");
        assert_eq!(config.max_snapshots, 3);
        assert_eq!(config.log_level, "debug");
        assert_eq!(config.log_format, "json");
    }

    #[test]
    fn defaults_applied_for_empty_config() {
        let config = BuilderConfig::from_toml_str("", &test_path()).unwrap();
        assert_eq!(config.rules_file, "./terrain-graphics.toml");
        assert_eq!(config.image_directory, "./images");
        assert_eq!(config.image_prefix, "terrain/");
        assert!(config.off_map_image.is_none());
        assert_eq!(config.time_of_day, "morning");
        assert_eq!(config.border_terrain, "_off^_usr");
        assert_eq!(config.max_snapshots, 10);
        assert_eq!(config.log_level, "info");
        assert_eq!(config.log_format, "text");
    }

    #[test]
    fn invalid_log_level_rejected() {
        let err =
            BuilderConfig::from_toml_str(r#"log_level = "verbose""#, &test_path()).unwrap_err();
        assert!(err.contains("log_level"));
    }

    #[test]
    fn border_terrain_must_be_single_code() {
        let err = BuilderConfig::from_toml_str(r#"border_terrain = "Xv,Xu""#, &test_path())
            .unwrap_err();
        assert!(err.contains("border_terrain"));
    }

    #[test]
    fn multiple_errors_reported_together() {
        let toml = "max_snapshots = 0\ntime_of_day = \"\"\nlog_format = \"xml\"";
        let err = BuilderConfig::from_toml_str(toml, &test_path()).unwrap_err();
        assert!(err.contains("max_snapshots"));
        assert!(err.contains("time_of_day"));
        assert!(err.contains("log_format"));
    }

    #[test]
    fn malformed_toml_includes_source_path() {
        let err = BuilderConfig::from_toml_str("max_snapshots = [", &test_path()).unwrap_err();
        assert!(err.contains("test-builder.toml"));
    }

    #[test]
    fn from_file_loads_valid_config() {
        let mut tmp = NamedTempFile::new().unwrap();
        use std::io::Write;
        writeln!(tmp, "time_of_day = \"second_watch\"").unwrap();
        let config = BuilderConfig::from_file(tmp.path()).unwrap();
        assert_eq!(config.time_of_day, "second_watch");
    }

    #[test]
    fn missing_file_falls_back_to_defaults() {
        let config =
            BuilderConfig::from_file_or_default(Path::new("/nonexistent/builder.toml")).unwrap();
        assert_eq!(config.time_of_day, "morning");
        assert!(BuilderConfig::from_file(Path::new("/nonexistent/builder.toml"))
            .unwrap_err()
            .contains("Cannot read"));
    }
}
