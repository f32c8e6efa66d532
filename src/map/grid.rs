use std::path::Path;

use crate::map::location::Location;
use crate::map::terrain::TerrainCode;

/// Read-only view of the map a [`TerrainBuilder`](crate::builder::TerrainBuilder)
/// composes images for.
pub trait TerrainGrid {
    fn width(&self) -> i32;
    fn height(&self) -> i32;

    /// Terrain at `loc`. Must answer for the two-cell border around the map as well.
    fn terrain_at(&self, loc: Location) -> &TerrainCode;

    /// Static images shown for a terrain while its rule output is being rebuilt.
    fn fallback_images(&self, _code: &TerrainCode) -> Vec<String> {
        Vec::new()
    }
}

/// A rectangular terrain map held in memory.
#[derive(Debug, Clone, PartialEq)]
pub struct TerrainMap {
    width: i32,
    height: i32,
    cells: Vec<TerrainCode>,
    border: TerrainCode,
}

impl TerrainMap {
    /// Create a map filled with one terrain.
    pub fn filled(width: i32, height: i32, code: TerrainCode) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            cells: vec![code; (width * height) as usize],
            border: TerrainCode::off_map(),
        }
    }

    /// Parse rows of comma-separated terrain codes. Blank lines are ignored.
    ///
    /// All rows must have the same number of cells.
    pub fn parse(text: &str) -> Result<Self, String> {
        let rows: Vec<Vec<TerrainCode>> = text
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'))
            .map(|l| l.split(',').map(|c| TerrainCode::new(c.trim())).collect())
            .collect();

        let width = rows.first().map(|r| r.len()).unwrap_or(0);
        for (i, row) in rows.iter().enumerate() {
            if row.len() != width {
                return Err(format!(
                    "row {} has {} cells, expected {}",
                    i + 1,
                    row.len(),
                    width
                ));
            }
            if let Some(empty) = row.iter().position(|c| c.as_str().is_empty()) {
                return Err(format!("row {} has an empty cell at column {}", i + 1, empty + 1));
            }
        }

        Ok(Self {
            width: width as i32,
            height: rows.len() as i32,
            cells: rows.into_iter().flatten().collect(),
            border: TerrainCode::off_map(),
        })
    }

    pub fn from_file(path: &Path) -> Result<Self, String> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| format!("Cannot read {}: {}", path.display(), e))?;
        Self::parse(&content).map_err(|e| format!("{}: {}", path.display(), e))
    }

    pub fn with_border(mut self, border: TerrainCode) -> Self {
        self.border = border;
        self
    }

    pub fn contains(&self, loc: Location) -> bool {
        loc.x >= 0 && loc.y >= 0 && loc.x < self.width && loc.y < self.height
    }

    /// Change the terrain of an on-map cell. Returns false for cells outside the map.
    pub fn set_terrain(&mut self, loc: Location, code: TerrainCode) -> bool {
        if !self.contains(loc) {
            return false;
        }
        let idx = (loc.y * self.width + loc.x) as usize;
        self.cells[idx] = code;
        true
    }
}

impl TerrainGrid for TerrainMap {
    fn width(&self) -> i32 {
        self.width
    }

    fn height(&self) -> i32 {
        self.height
    }

    fn terrain_at(&self, loc: Location) -> &TerrainCode {
        if self.contains(loc) {
            &self.cells[(loc.y * self.width + loc.x) as usize]
        } else {
            &self.border
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_rectangular_map() {
        let map = TerrainMap::parse("Gg, Gg, Ww\nHh, Gs^Fp, Ww\n").unwrap();
        assert_eq!(map.width(), 3);
        assert_eq!(map.height(), 2);
        assert_eq!(map.terrain_at(Location::new(1, 1)).as_str(), "Gs^Fp");
        assert_eq!(map.terrain_at(Location::new(2, 0)).as_str(), "Ww");
    }

    #[test]
    fn border_cells_report_off_map() {
        let map = TerrainMap::parse("Gg").unwrap();
        assert_eq!(map.terrain_at(Location::new(-1, 0)), &TerrainCode::off_map());
        assert_eq!(map.terrain_at(Location::new(1, 1)), &TerrainCode::off_map());

        let custom = map.with_border(TerrainCode::new("Xv"));
        assert_eq!(custom.terrain_at(Location::new(-2, -2)).as_str(), "Xv");
    }

    #[test]
    fn ragged_rows_rejected() {
        let err = TerrainMap::parse("Gg, Gg\nGg").unwrap_err();
        assert!(err.contains("row 2"));
    }

    #[test]
    fn comments_and_blank_lines_skipped() {
        let map = TerrainMap::parse("# test map\n\nGg, Ww\n\n").unwrap();
        assert_eq!(map.width(), 2);
        assert_eq!(map.height(), 1);
    }

    #[test]
    fn set_terrain_only_inside_map() {
        let mut map = TerrainMap::filled(2, 2, TerrainCode::new("Gg"));
        assert!(map.set_terrain(Location::new(1, 1), TerrainCode::new("Ww")));
        assert!(!map.set_terrain(Location::new(2, 0), TerrainCode::new("Ww")));
        assert_eq!(map.terrain_at(Location::new(1, 1)).as_str(), "Ww");
    }
}
