use std::collections::BTreeSet;

use crate::builder::animation::Animation;
use crate::builder::rule::{ImageId, RuleImage, TerrainLayer};
use crate::builder::ruleset::RuleSet;
use crate::map::Location;

/// Rule output for one cell, plus the render lists derived from it.
#[derive(Debug, Clone, Default)]
pub struct Tile {
    pub flags: BTreeSet<String>,
    /// Image handles with the noise seed of the anchor that placed them.
    pub images: Vec<(ImageId, u32)>,
    pub images_background: Vec<Animation>,
    pub images_foreground: Vec<Animation>,
    /// Time of day the render lists were last built for.
    pub last_tod: Option<String>,
    pub sorted_images: bool,
}

impl Tile {
    pub fn clear(&mut self) {
        *self = Tile::default();
    }

    pub fn animations(&self, layer: TerrainLayer) -> &[Animation] {
        match layer {
            TerrainLayer::Background => &self.images_background,
            TerrainLayer::Foreground => &self.images_foreground,
        }
    }

    /// Rebuild the render lists for `tod`.
    ///
    /// Each placed image picks one variant: `seed % 100 + 1` walks down the
    /// weights of the variants valid at `tod`, and the variant whose weight
    /// covers the remainder is drawn. An image whose variants are all
    /// exhausted draws nothing.
    pub fn rebuild_cache(&mut self, tod: &str, rules: &RuleSet) {
        self.images_background.clear();
        self.images_foreground.clear();

        if !self.sorted_images {
            self.images
                .sort_by_key(|&(id, _)| rules.image(id).map(RuleImage::sort_key));
            self.sorted_images = true;
        }

        for &(id, seed) in &self.images {
            let Some(image) = rules.image(id) else {
                continue;
            };
            let mut rnd = seed % 100 + 1;
            for variant in &image.variants {
                if !variant.applies_to(tod) {
                    continue;
                }
                if rnd > variant.probability {
                    rnd -= variant.probability;
                    continue;
                }
                if let Some(animation) = &variant.animation {
                    let mut animation = animation.clone();
                    animation.set_phase(seed % animation.duration());
                    match image.pass {
                        TerrainLayer::Background => self.images_background.push(animation),
                        TerrainLayer::Foreground => self.images_foreground.push(animation),
                    }
                }
                break;
            }
        }

        self.last_tod = Some(tod.to_string());
    }
}

/// Tiles for a `width` x `height` map plus a two-cell margin on every side.
#[derive(Debug, Clone)]
pub struct TileMap {
    width: i32,
    height: i32,
    tiles: Vec<Tile>,
}

impl TileMap {
    pub fn new(width: i32, height: i32) -> Self {
        let width = width.max(0);
        let height = height.max(0);
        Self {
            width,
            height,
            tiles: vec![Tile::default(); ((width + 4) * (height + 4)) as usize],
        }
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    /// True for map cells and the margin around them.
    pub fn on_map(&self, loc: Location) -> bool {
        loc.x >= -2 && loc.x <= self.width + 1 && loc.y >= -2 && loc.y <= self.height + 1
    }

    fn index(&self, loc: Location) -> Option<usize> {
        self.on_map(loc)
            .then(|| ((loc.x + 2) + (loc.y + 2) * (self.width + 4)) as usize)
    }

    pub fn get(&self, loc: Location) -> Option<&Tile> {
        self.index(loc).map(|i| &self.tiles[i])
    }

    pub fn get_mut(&mut self, loc: Location) -> Option<&mut Tile> {
        self.index(loc).map(|i| &mut self.tiles[i])
    }

    /// Every addressable location, row by row.
    pub fn locations(&self) -> impl Iterator<Item = Location> + use<> {
        let (width, height) = (self.width, self.height);
        (-2..height + 2).flat_map(move |y| (-2..width + 2).map(move |x| Location::new(x, y)))
    }

    pub fn reset(&mut self) {
        self.tiles.iter_mut().for_each(Tile::clear);
    }

    pub fn reload(&mut self, width: i32, height: i32) {
        *self = TileMap::new(width, height);
    }
}
