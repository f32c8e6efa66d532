use serde::{Deserialize, Serialize};
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::warn;

use crate::builder::{Animation, RuleSet, TerrainBuilder, TerrainLayer};
use crate::map::Location;

/// One selected image, as frame identities plus its phase offset.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AnimationSnapshot {
    pub frames: Vec<String>,
    pub phase: u32,
}

impl From<&Animation> for AnimationSnapshot {
    fn from(animation: &Animation) -> Self {
        Self {
            frames: animation
                .frames()
                .iter()
                .map(|f| f.image.to_string())
                .collect(),
            phase: animation.phase(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CellSnapshot {
    pub location: Location,
    pub flags: Vec<String>,
    pub background: Vec<AnimationSnapshot>,
    pub foreground: Vec<AnimationSnapshot>,
}

/// Everything a build produced for one time of day, cell by cell.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BuildSnapshot {
    pub width: i32,
    pub height: i32,
    pub time_of_day: String,
    /// Every cell including the two-cell margin, row by row.
    pub cells: Vec<CellSnapshot>,
}

impl CellSnapshot {
    /// Resolve one cell, or `None` outside the builder's tiles.
    pub fn capture(
        builder: &mut TerrainBuilder,
        rules: &RuleSet,
        location: Location,
        time_of_day: &str,
    ) -> Option<Self> {
        let flags = builder.flags_at(location)?.iter().cloned().collect();
        let mut resolve = |layer| -> Vec<AnimationSnapshot> {
            builder
                .get_terrain_at(location, time_of_day, layer, rules)
                .unwrap_or_default()
                .iter()
                .map(AnimationSnapshot::from)
                .collect()
        };
        let background = resolve(TerrainLayer::Background);
        let foreground = resolve(TerrainLayer::Foreground);
        Some(Self {
            location,
            flags,
            background,
            foreground,
        })
    }
}

impl BuildSnapshot {
    /// Resolve every cell of `builder` for `time_of_day`.
    pub fn capture(builder: &mut TerrainBuilder, rules: &RuleSet, time_of_day: &str) -> Self {
        let cells = builder
            .tiles()
            .locations()
            .filter_map(|location| CellSnapshot::capture(builder, rules, location, time_of_day))
            .collect();
        Self {
            width: builder.width(),
            height: builder.height(),
            time_of_day: time_of_day.to_string(),
            cells,
        }
    }

    pub fn cell(&self, location: Location) -> Option<&CellSnapshot> {
        self.cells.iter().find(|c| c.location == location)
    }

    fn expected_cells(&self) -> usize {
        ((self.width + 4) * (self.height + 4)) as usize
    }
}

/// Metadata about a snapshot file on disk.
#[derive(Debug, Clone)]
pub struct SnapshotMetadata {
    pub path: PathBuf,
    pub width: i32,
    pub height: i32,
    pub timestamp: u64,
    pub file_size: u64,
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
    #[error("Serialization error: {0}")]
    Serialize(String),
    #[error("Deserialization error: {0}")]
    Deserialize(String),
    #[error("Corrupt snapshot: {}", .0.display())]
    Corrupt(PathBuf),
    #[error("No valid snapshots found. Create one with: tilebuilder build --map <FILE> --snapshot")]
    NoValidSnapshots,
}

fn snapshot_filename(width: i32, height: i32, timestamp: u64) -> String {
    format!("build-{}x{}-{}.bin", width, height, timestamp)
}

/// Expected format: `build-{W}x{H}-{timestamp}.bin`
fn parse_snapshot_filename(filename: &str) -> Option<(i32, i32, u64)> {
    let stem = filename.strip_suffix(".bin")?;
    let rest = stem.strip_prefix("build-")?;
    let (size, ts_str) = rest.split_once('-')?;
    let (w_str, h_str) = size.split_once('x')?;
    let width = w_str.parse::<i32>().ok()?;
    let height = h_str.parse::<i32>().ok()?;
    let ts = ts_str.parse::<u64>().ok()?;
    Some((width, height, ts))
}

fn unix_timestamp_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

/// Save a build snapshot using a temporary file and an atomic rename, so a
/// partial write never replaces an existing snapshot.
pub fn save_snapshot(
    snapshot: &BuildSnapshot,
    snapshot_dir: &Path,
) -> Result<PathBuf, SnapshotError> {
    fs::create_dir_all(snapshot_dir)?;

    let filename = snapshot_filename(snapshot.width, snapshot.height, unix_timestamp_now());
    let target = snapshot_dir.join(&filename);
    let tmp = snapshot_dir.join(format!(".{}.tmp", filename));

    let encoded =
        bincode::serialize(snapshot).map_err(|e| SnapshotError::Serialize(e.to_string()))?;

    if let Err(e) = fs::write(&tmp, &encoded) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    if let Err(e) = fs::rename(&tmp, &target) {
        let _ = fs::remove_file(&tmp);
        return Err(SnapshotError::Io(e));
    }

    Ok(target)
}

/// Load a snapshot, checking that it holds one cell per addressable location.
pub fn load_snapshot(path: &Path) -> Result<BuildSnapshot, SnapshotError> {
    let data = fs::read(path)?;
    let snapshot: BuildSnapshot =
        bincode::deserialize(&data).map_err(|e| SnapshotError::Deserialize(e.to_string()))?;

    if snapshot.width < 0 || snapshot.height < 0 {
        return Err(SnapshotError::Corrupt(path.to_path_buf()));
    }
    if snapshot.cells.len() != snapshot.expected_cells() {
        return Err(SnapshotError::Corrupt(path.to_path_buf()));
    }

    Ok(snapshot)
}

/// List snapshots in a directory, newest first.
pub fn list_snapshots(snapshot_dir: &Path) -> Result<Vec<SnapshotMetadata>, SnapshotError> {
    if !snapshot_dir.exists() {
        return Ok(Vec::new());
    }

    let mut snapshots = Vec::new();

    for entry in fs::read_dir(snapshot_dir)? {
        let entry = entry?;
        let path = entry.path();

        if !path.is_file() {
            continue;
        }

        let filename = match path.file_name().and_then(|n| n.to_str()) {
            Some(n) => n.to_string(),
            None => continue,
        };

        // In-flight writes
        if filename.starts_with('.') {
            continue;
        }

        if let Some((width, height, timestamp)) = parse_snapshot_filename(&filename) {
            let file_size = entry.metadata().map(|m| m.len()).unwrap_or(0);
            snapshots.push(SnapshotMetadata {
                path: path.clone(),
                width,
                height,
                timestamp,
                file_size,
            });
        }
    }

    snapshots.sort_by(|a, b| b.timestamp.cmp(&a.timestamp).then(b.path.cmp(&a.path)));

    Ok(snapshots)
}

/// Delete all but the `max_snapshots` most recent snapshots.
///
/// Returns the deleted paths.
pub fn prune_snapshots(
    snapshot_dir: &Path,
    max_snapshots: usize,
) -> Result<Vec<PathBuf>, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    let mut deleted = Vec::new();
    if snapshots.len() > max_snapshots {
        for snapshot in &snapshots[max_snapshots..] {
            fs::remove_file(&snapshot.path)?;
            deleted.push(snapshot.path.clone());
        }
    }

    Ok(deleted)
}

/// Load the most recent snapshot that decodes, skipping corrupt ones.
pub fn load_latest_valid_snapshot(snapshot_dir: &Path) -> Result<BuildSnapshot, SnapshotError> {
    let snapshots = list_snapshots(snapshot_dir)?;

    for snapshot in &snapshots {
        match load_snapshot(&snapshot.path) {
            Ok(loaded) => return Ok(loaded),
            Err(e) => {
                warn!(
                    path = %snapshot.path.display(),
                    error = %e,
                    "Corrupt snapshot, trying next"
                );
            }
        }
    }

    Err(SnapshotError::NoValidSnapshots)
}
