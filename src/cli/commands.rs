use std::path::Path;
use std::sync::Arc;

use tracing::info;

use crate::builder::{BuildSettings, CompileSettings, ImageDirectory, RuleSet, TerrainBuilder};
use crate::config::builder::BuilderConfig;
use crate::config::rules::RuleFile;
use crate::map::{Location, TerrainCode, TerrainGrid, TerrainMap};
use crate::persistence::{self, AnimationSnapshot, BuildSnapshot, CellSnapshot};

/// Rules, grid and builder for one map, ready to query.
pub struct Session {
    pub rules: RuleSet,
    pub grid: TerrainMap,
    pub builder: TerrainBuilder,
}

impl Session {
    /// Load the map, compile global rules (and level rules when given), and build.
    pub fn open(
        config: &BuilderConfig,
        map_path: &Path,
        level_path: Option<&Path>,
    ) -> Result<Self, String> {
        let grid = TerrainMap::from_file(map_path)?
            .with_border(TerrainCode::new(config.border_terrain.as_str()));
        let catalog = ImageDirectory::scan(Path::new(&config.image_directory))?;
        eprintln!(
            "Map loaded: {}x{} from {}",
            grid.width(),
            grid.height(),
            map_path.display()
        );

        let rule_file = Arc::new(RuleFile::from_file(Path::new(&config.rules_file))?);
        let mut rules = RuleSet::new(CompileSettings {
            image_prefix: config.image_prefix.clone(),
            off_map_image: config.off_map_image.clone(),
        });
        rules.recompile_if_stale(&rule_file, &catalog);

        if let Some(level) = level_path {
            let local = RuleFile::from_file(level)?;
            let summary = rules.load_local(&local.rules, &catalog);
            eprintln!(
                "Level rules from {}: {} accepted, {} rejected",
                level.display(),
                summary.accepted,
                summary.rejected
            );
        }
        eprintln!("Rules compiled: {} active", rules.len());

        let builder = TerrainBuilder::new(&grid, &rules, BuildSettings::default());
        Ok(Self {
            rules,
            grid,
            builder,
        })
    }
}

/// Build a map and print a summary, optionally saving a snapshot.
pub fn build(
    config: &BuilderConfig,
    map_path: &Path,
    level_path: Option<&Path>,
    tod: Option<&str>,
    save: bool,
) -> Result<(), String> {
    let mut session = Session::open(config, map_path, level_path)?;
    let tod = tod.unwrap_or(&config.time_of_day);
    let report = session.builder.last_report().clone();

    let snapshot = BuildSnapshot::capture(&mut session.builder, &session.rules, tod);
    let drawn = snapshot
        .cells
        .iter()
        .filter(|c| !c.background.is_empty() || !c.foreground.is_empty())
        .count();

    println!("=== Build: {} ===", map_path.display());
    println!("Size: {}x{}", snapshot.width, snapshot.height);
    println!("Time of day: {}", tod);
    println!("Rules applied: {}", report.rules);
    println!("Anchors probed: {}", report.anchors_probed);
    println!("Matches: {}", report.matches.len());
    println!("Cells with images: {} of {}", drawn, snapshot.cells.len());

    if save {
        let snapshot_dir = Path::new(&config.snapshot_directory);
        let path = persistence::save_snapshot(&snapshot, snapshot_dir)
            .map_err(|e| format!("Failed to save snapshot: {}", e))?;
        println!("\nSnapshot saved to {}", path.display());
        info!(path = %path.display(), "Snapshot saved");

        if let Err(e) = persistence::prune_snapshots(snapshot_dir, config.max_snapshots as usize) {
            eprintln!("Warning: snapshot pruning failed: {}", e);
        }
    }

    Ok(())
}

/// Show the flags and images of one cell.
pub fn inspect(
    config: &BuilderConfig,
    map_path: &Path,
    location: Location,
    level_path: Option<&Path>,
    tod: Option<&str>,
    json: bool,
) -> Result<(), String> {
    let mut session = Session::open(config, map_path, level_path)?;
    let tod = tod.unwrap_or(&config.time_of_day);

    let cell = CellSnapshot::capture(&mut session.builder, &session.rules, location, tod)
        .ok_or_else(|| {
            format!(
                "Location {} is outside the map ({}x{} plus a 2-cell border)",
                location,
                session.grid.width(),
                session.grid.height()
            )
        })?;

    if json {
        let out = serde_json::to_string_pretty(&cell)
            .map_err(|e| format!("Cannot encode cell: {}", e))?;
        println!("{}", out);
        return Ok(());
    }

    print_cell(&cell, session.grid.terrain_at(location), tod);
    Ok(())
}

fn print_cell(cell: &CellSnapshot, terrain: &TerrainCode, tod: &str) {
    println!("=== Cell {} ===", cell.location);
    println!("Terrain: {}", terrain);
    println!("Time of day: {}", tod);
    println!();
    println!("--- Flags ---");
    if cell.flags.is_empty() {
        println!("  (none)");
    } else {
        println!("  {}", cell.flags.join(", "));
    }
    print_layer("Background", &cell.background);
    print_layer("Foreground", &cell.foreground);
}

fn print_layer(name: &str, images: &[AnimationSnapshot]) {
    println!();
    println!("--- {} ---", name);
    if images.is_empty() {
        println!("  (none)");
    }
    for image in images {
        println!("  {} (phase {})", image.frames.join(", "), image.phase);
    }
}

/// Print a summary of a saved snapshot.
pub fn print_snapshot_summary(snapshot: &BuildSnapshot) {
    let drawn = snapshot
        .cells
        .iter()
        .filter(|c| !c.background.is_empty() || !c.foreground.is_empty())
        .count();
    let flagged = snapshot.cells.iter().filter(|c| !c.flags.is_empty()).count();
    let images: usize = snapshot
        .cells
        .iter()
        .map(|c| c.background.len() + c.foreground.len())
        .sum();

    println!("Size: {}x{}", snapshot.width, snapshot.height);
    println!("Time of day: {}", snapshot.time_of_day);
    println!("Cells: {} ({} with images, {} with flags)", snapshot.cells.len(), drawn, flagged);
    println!("Images: {}", images);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn setup(dir: &Path) -> BuilderConfig {
        fs::create_dir_all(dir.join("images/terrain")).unwrap();
        fs::write(dir.join("images/terrain/grass.png"), b"png").unwrap();
        fs::write(dir.join("images/terrain/water.png"), b"png").unwrap();
        fs::write(
            dir.join("rules.toml"),
            r#"
            [[rule]]
            [[rule.tile]]
            x = 0
            y = 0
            type = "Gg"
            set_flag = "grass"
            [[rule.tile.image]]
            name = "grass.png"
            "#,
        )
        .unwrap();
        fs::write(
            dir.join("level.toml"),
            "[[rule]]\n[[rule.tile]]\nx = 0\ny = 0\ntype = \"Ww\"\n[[rule.tile.image]]\nname = \"water.png\"\n",
        )
        .unwrap();
        fs::write(dir.join("map.txt"), "Gg, Ww\nWw, Gg\n").unwrap();

        BuilderConfig {
            rules_file: dir.join("rules.toml").display().to_string(),
            image_directory: dir.join("images").display().to_string(),
            snapshot_directory: dir.join("snapshots").display().to_string(),
            ..BuilderConfig::default()
        }
    }

    #[test]
    fn session_builds_global_and_level_rules() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());

        let mut session = Session::open(
            &config,
            &dir.path().join("map.txt"),
            Some(&dir.path().join("level.toml")),
        )
        .unwrap();
        assert_eq!(session.rules.len(), 2);

        let water = CellSnapshot::capture(
            &mut session.builder,
            &session.rules,
            Location::new(1, 0),
            "morning",
        )
        .unwrap();
        assert_eq!(water.background[0].frames, vec!["terrain/water.png"]);

        let grass = session.builder.flags_at(Location::new(0, 0)).unwrap();
        assert!(grass.contains("grass"));
    }

    #[test]
    fn build_saves_a_snapshot() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());

        build(&config, &dir.path().join("map.txt"), None, Some("dusk"), true).unwrap();

        let restored =
            persistence::load_latest_valid_snapshot(&dir.path().join("snapshots")).unwrap();
        assert_eq!(restored.time_of_day, "dusk");
        assert_eq!((restored.width, restored.height), (2, 2));
    }

    #[test]
    fn inspect_rejects_cells_outside_the_border() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());

        let err = inspect(
            &config,
            &dir.path().join("map.txt"),
            Location::new(10, 10),
            None,
            None,
            false,
        )
        .unwrap_err();
        assert!(err.contains("outside the map"));
    }

    #[test]
    fn missing_map_is_reported() {
        let dir = TempDir::new().unwrap();
        let config = setup(dir.path());
        let err = Session::open(&config, &dir.path().join("nope.txt"), None)
            .err()
            .unwrap();
        assert!(err.contains("nope.txt"));
    }
}
