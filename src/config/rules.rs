//! Declarative terrain graphics rules as they come out of a rule file.
//!
//! Values are kept close to their authored form (comma lists stay strings)
//! and are interpreted by the rule compiler.

use serde::{Deserialize, Serialize};
use std::path::Path;

/// A collection of rule descriptions, usually one TOML file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RuleFile {
    #[serde(default, rename = "rule")]
    pub rules: Vec<RuleDescription>,
}

/// One `[[rule]]` entry.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuleDescription {
    /// 1-based absolute column; the rule only fires there when `y` is also set.
    pub x: Option<i32>,
    pub y: Option<i32>,
    pub probability: Option<u32>,
    /// Six comma-separated names substituted for `@R0`..`@R5`.
    pub rotations: Option<String>,
    pub precedence: i32,
    pub map: Option<String>,
    pub set_flag: Option<String>,
    pub no_flag: Option<String>,
    pub has_flag: Option<String>,
    pub set_no_flag: Option<String>,
    pub tile: Vec<TileDescription>,
    /// Rule-level images, cut per cell and drawn anchored to the world.
    pub image: Vec<ImageDescription>,
}

/// One `[[rule.tile]]` entry constraining a single cell relative to the anchor.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TileDescription {
    pub x: Option<i32>,
    pub y: Option<i32>,
    /// `"x,y"` shorthand for `x` and `y`.
    pub loc: Option<String>,
    /// Anchor index from the rule's `map` diagram.
    pub pos: Option<u32>,
    #[serde(rename = "type")]
    pub terrain: Option<String>,
    pub set_flag: Option<String>,
    pub no_flag: Option<String>,
    pub has_flag: Option<String>,
    pub set_no_flag: Option<String>,
    pub image: Vec<ImageDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImageDescription {
    pub layer: i32,
    /// `"x,y"` pixel position of the image's base point.
    pub base: Option<String>,
    /// `"x,y"` pixel center override for rule-level images.
    pub center: Option<String>,
    pub name: String,
    pub variant: Vec<VariantDescription>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VariantDescription {
    pub name: String,
    /// Comma-separated time-of-day labels; empty applies to all.
    pub tod: Option<String>,
    pub probability: Option<u32>,
}

impl RuleFile {
    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::from_toml_str(&content, path)
    }

    pub fn from_toml_str(content: &str, source_path: &Path) -> Result<Self, String> {
        toml::from_str(content).map_err(|e| format!("{}: {}", source_path.display(), e))
    }
}

/// Split a comma list, trimming entries and dropping empty ones.
pub fn split_list(list: Option<&str>) -> Vec<String> {
    list.map(|l| {
        l.split(',')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string)
            .collect()
    })
    .unwrap_or_default()
}

/// Parse an `"x,y"` pair. Returns `None` unless both halves are integers.
pub fn parse_pair(value: &str) -> Option<(i32, i32)> {
    let parts = split_list(Some(value));
    match parts.as_slice() {
        [x, y, ..] => Some((x.parse().ok()?, y.parse().ok()?)),
        _ => None,
    }
}
