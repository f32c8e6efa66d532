//! Rule matching over a terrain grid and the query interface on its result.

use std::collections::{BTreeMap, BTreeSet};

use tracing::{debug, info, warn};

use crate::builder::animation::{Animation, ImageLocator};
use crate::builder::rule::{BuildingRule, TerrainLayer};
use crate::builder::ruleset::RuleSet;
use crate::builder::tilemap::{Tile, TileMap};
use crate::map::{Location, TerrainCode, TerrainGrid};

/// Deterministic hash of a location and a rule index.
///
/// Feeds both the rule probability check and the per-image variant seed, so
/// the same map and rules always produce the same picture.
pub fn noise(loc: Location, index: u32) -> u32 {
    let a = (loc.x as u32).wrapping_add(92_872_973) ^ 918_273;
    let b = (loc.y as u32).wrapping_add(1_672_517) ^ 128_123;
    let c = index.wrapping_add(127_390) ^ 13_923_787;
    let ab = a.wrapping_mul(b);
    let abc = ab
        .wrapping_mul(c)
        .wrapping_add(ab)
        .wrapping_add(b.wrapping_mul(c))
        .wrapping_add(a.wrapping_mul(c))
        .wrapping_add(a)
        .wrapping_add(b)
        .wrapping_add(c);
    abc.wrapping_mul(abc)
}

/// How candidate anchors are enumerated for a rule.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum MatchStrategy {
    /// Probe only cells accepted by the rule's most selective constraint.
    #[default]
    MinimalConstraint,
    /// Probe every anchor that puts a constraint on the grid.
    Exhaustive,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildSettings {
    pub strategy: MatchStrategy,
}

/// What one build did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuildReport {
    pub rules: usize,
    pub anchors_probed: usize,
    /// `(rule_index, anchor)` for every application, in application order.
    pub matches: Vec<(usize, Location)>,
}

/// Composes terrain images for one grid.
///
/// The builder owns its tile cache; the [`RuleSet`] stays with the caller and
/// is passed to every call that needs it. Queries made with a rule set that
/// changed since the last build answer `None` until the next build.
#[derive(Debug)]
pub struct TerrainBuilder {
    tiles: TileMap,
    terrain_index: BTreeMap<TerrainCode, Vec<Location>>,
    settings: BuildSettings,
    generation: u64,
    last_report: BuildReport,
}

impl TerrainBuilder {
    pub fn new(grid: &dyn TerrainGrid, rules: &RuleSet, settings: BuildSettings) -> Self {
        let mut builder = Self {
            tiles: TileMap::new(grid.width(), grid.height()),
            terrain_index: BTreeMap::new(),
            settings,
            generation: rules.generation(),
            last_report: BuildReport::default(),
        };
        builder.build_terrains(grid, rules);
        builder
    }

    pub fn width(&self) -> i32 {
        self.tiles.width()
    }

    pub fn height(&self) -> i32 {
        self.tiles.height()
    }

    pub fn tiles(&self) -> &TileMap {
        &self.tiles
    }

    pub fn last_report(&self) -> &BuildReport {
        &self.last_report
    }

    /// Match every rule against the grid, accumulating into the current tiles.
    fn build_terrains(&mut self, grid: &dyn TerrainGrid, rules: &RuleSet) -> BuildReport {
        self.generation = rules.generation();
        self.index_terrain(grid);

        let mut report = BuildReport::default();
        for (rule_index, rule) in rules.ordered().into_iter().enumerate() {
            report.rules += 1;
            match self.settings.strategy {
                MatchStrategy::MinimalConstraint => {
                    self.match_minimal(rule, rule_index, grid, &mut report)
                }
                MatchStrategy::Exhaustive => {
                    self.match_exhaustive(rule, rule_index, grid, &mut report)
                }
            }
        }

        info!(
            width = self.tiles.width(),
            height = self.tiles.height(),
            rules = report.rules,
            anchors_probed = report.anchors_probed,
            matches = report.matches.len(),
            "Terrain built"
        );
        self.last_report = report.clone();
        report
    }

    /// Clear every tile and build again.
    pub fn rebuild_all(&mut self, grid: &dyn TerrainGrid, rules: &RuleSet) -> BuildReport {
        self.tiles.reset();
        self.build_terrains(grid, rules)
    }

    /// Reallocate for the grid's current dimensions and build.
    pub fn reload_map(&mut self, grid: &dyn TerrainGrid, rules: &RuleSet) -> BuildReport {
        self.tiles.reload(grid.width(), grid.height());
        self.build_terrains(grid, rules)
    }

    fn index_terrain(&mut self, grid: &dyn TerrainGrid) {
        self.terrain_index.clear();
        for loc in self.tiles.locations() {
            self.terrain_index
                .entry(grid.terrain_at(loc).clone())
                .or_default()
                .push(loc);
        }
        debug!(codes = self.terrain_index.len(), "Terrain indexed");
    }

    fn match_minimal(
        &mut self,
        rule: &BuildingRule,
        rule_index: usize,
        grid: &dyn TerrainGrid,
        report: &mut BuildReport,
    ) {
        let mut min_size = usize::MAX;
        let mut min_constraint = None;
        for constraint in rule.constraints.values() {
            let mut size = 0;
            for (code, locations) in &self.terrain_index {
                if constraint.terrain.matches(code) {
                    size += locations.len();
                    if size >= min_size {
                        break;
                    }
                }
            }
            if size < min_size {
                min_size = size;
                min_constraint = Some(constraint);
                if size == 0 {
                    break;
                }
            }
        }

        let Some(min) = min_constraint.filter(|_| min_size > 0) else {
            debug!(rule_index, precedence = rule.precedence, "No candidate cells, rule skipped");
            return;
        };

        // Same probing order as the exhaustive path.
        let anchors: BTreeSet<Location> = self
            .terrain_index
            .iter()
            .filter(|(code, _)| min.terrain.matches(code))
            .flat_map(|(_, locations)| locations.iter().map(|loc| loc.offset_back(min.loc)))
            .collect();
        for anchor in anchors {
            report.anchors_probed += 1;
            if rule_matches(rule, anchor, rule_index, grid, &self.tiles, Some(min.loc)) {
                apply_rule(rule, anchor, rule_index, &mut self.tiles);
                report.matches.push((rule_index, anchor));
            }
        }
    }

    fn match_exhaustive(
        &mut self,
        rule: &BuildingRule,
        rule_index: usize,
        grid: &dyn TerrainGrid,
        report: &mut BuildReport,
    ) {
        let mut anchors = BTreeSet::new();
        for loc in self.tiles.locations() {
            for offset in rule.constraints.keys() {
                anchors.insert(loc.offset_back(*offset));
            }
        }
        for anchor in anchors {
            report.anchors_probed += 1;
            if rule_matches(rule, anchor, rule_index, grid, &self.tiles, None) {
                apply_rule(rule, anchor, rule_index, &mut self.tiles);
                report.matches.push((rule_index, anchor));
            }
        }
    }

    fn current_tile(&mut self, loc: Location, rules: &RuleSet) -> Option<&mut Tile> {
        if rules.generation() != self.generation {
            warn!(
                x = loc.x,
                y = loc.y,
                built = self.generation,
                current = rules.generation(),
                "Rule set changed since the last build"
            );
            return None;
        }
        self.tiles.get_mut(loc)
    }

    /// Images to draw at `loc` for `tod` on one layer, or `None` when there
    /// are none.
    pub fn get_terrain_at(
        &mut self,
        loc: Location,
        tod: &str,
        layer: TerrainLayer,
        rules: &RuleSet,
    ) -> Option<&[Animation]> {
        let tile = self.current_tile(loc, rules)?;
        if tile.last_tod.as_deref() != Some(tod) {
            tile.rebuild_cache(tod, rules);
        }
        let list = tile.animations(layer);
        (!list.is_empty()).then_some(list)
    }

    pub fn flags_at(&self, loc: Location) -> Option<&BTreeSet<String>> {
        self.tiles.get(loc).map(|t| &t.flags)
    }

    pub fn tile(&self, loc: Location) -> Option<&Tile> {
        self.tiles.get(loc)
    }

    /// Advance the animations at `loc` to `now_ms`.
    ///
    /// Returns true if any of them shows a different frame than when it was
    /// last drawn.
    pub fn update_animation(&mut self, loc: Location, now_ms: u64) -> bool {
        let Some(tile) = self.tiles.get_mut(loc) else {
            return false;
        };
        let mut changed = false;
        for animation in tile
            .images_background
            .iter_mut()
            .chain(tile.images_foreground.iter_mut())
        {
            if animation.needs_update(now_ms) {
                changed = true;
            }
            animation.mark_drawn(now_ms);
        }
        changed
    }

    /// Show the grid's static images for the terrain at `loc` until the next
    /// time-of-day change or build. Rule output is left in place.
    ///
    /// Returns false when there is nothing to show.
    pub fn rebuild_terrain(&mut self, loc: Location, grid: &dyn TerrainGrid) -> bool {
        let Some(tile) = self.tiles.get_mut(loc) else {
            return false;
        };
        let images = grid.fallback_images(grid.terrain_at(loc));
        if images.is_empty() {
            return false;
        }
        tile.images_foreground.clear();
        tile.images_background = images
            .into_iter()
            .map(|path| Animation::single(ImageLocator::new(path)))
            .collect();
        true
    }
}

fn rule_matches(
    rule: &BuildingRule,
    anchor: Location,
    rule_index: usize,
    grid: &dyn TerrainGrid,
    tiles: &TileMap,
    proven: Option<Location>,
) -> bool {
    if rule.location.is_some_and(|loc| loc != anchor) {
        return false;
    }
    if let Some(probability) = rule.probability {
        if noise(anchor, rule_index as u32) % 100 >= probability {
            return false;
        }
    }

    rule.constraints.values().all(|constraint| {
        let loc = anchor.offset_by(constraint.loc);
        let Some(tile) = tiles.get(loc) else {
            return false;
        };
        if proven != Some(constraint.loc) && !constraint.terrain.matches(grid.terrain_at(loc)) {
            return false;
        }
        !constraint.no_flag.iter().any(|f| tile.flags.contains(f))
            && constraint.has_flag.iter().all(|f| tile.flags.contains(f))
    })
}

fn apply_rule(rule: &BuildingRule, anchor: Location, rule_index: usize, tiles: &mut TileMap) {
    let seed = noise(anchor, rule_index as u32);
    for constraint in rule.constraints.values() {
        let Some(tile) = tiles.get_mut(anchor.offset_by(constraint.loc)) else {
            continue;
        };
        if !constraint.images.is_empty() {
            tile.images
                .extend(constraint.images.iter().map(|&image| (image, seed)));
            tile.sorted_images = false;
            tile.last_tod = None;
        }
        tile.flags.extend(constraint.set_flag.iter().cloned());
    }
}
