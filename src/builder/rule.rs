//! Compiled rule data: constraints, image references and their variants.

use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

use crate::builder::animation::Animation;
use crate::config::rules::split_list;
use crate::map::{Location, TerrainMatch};

/// Width of a hex tile in pixels.
pub const TILE_WIDTH: i32 = 72;

/// Images on layer 0 whose base lies above this line are drawn behind units.
pub const UNIT_POSITION: i32 = TILE_WIDTH / 2 + TILE_WIDTH / 4;

/// Default probability weight of an image variant.
pub const DEFAULT_VARIANT_PROBABILITY: u32 = 100;

/// Which render pass an image belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TerrainLayer {
    Background,
    Foreground,
}

/// Whether a rule survives map reloads or belongs to the current level only.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum RuleScope {
    Global,
    Local,
}

/// Stable handle to a [`RuleImage`] stored in a [`RuleSet`](crate::builder::RuleSet).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ImageId {
    pub(crate) scope: RuleScope,
    pub(crate) index: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ImageVariant {
    pub image_string: String,
    /// Time-of-day labels this variant applies to; empty means all.
    pub tods: BTreeSet<String>,
    pub probability: u32,
    /// Filled in when the owning rule's images are loaded.
    pub animation: Option<Animation>,
}

impl ImageVariant {
    pub fn new(image_string: impl Into<String>, tod: Option<&str>, probability: u32) -> Self {
        Self {
            image_string: image_string.into(),
            tods: split_list(tod).into_iter().collect(),
            probability,
            animation: None,
        }
    }

    pub fn applies_to(&self, tod: &str) -> bool {
        self.tods.is_empty() || self.tods.contains(tod)
    }
}

/// An image reference attached to one constraint.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleImage {
    pub layer: i32,
    /// Base point in tile pixel space; orders images within a layer.
    pub base: (i32, i32),
    pub center: Option<(i32, i32)>,
    /// World-anchored image cut per cell rather than drawn whole in each cell.
    pub global_image: bool,
    pub pass: TerrainLayer,
    /// Conditional variants first, the unconditional default last.
    pub variants: Vec<ImageVariant>,
}

impl RuleImage {
    pub fn new(
        layer: i32,
        base: (i32, i32),
        center: Option<(i32, i32)>,
        global_image: bool,
        variants: Vec<ImageVariant>,
    ) -> Self {
        let mut image = Self {
            layer,
            base,
            center,
            global_image,
            pass: TerrainLayer::Background,
            variants,
        };
        image.pass = image.classify();
        image
    }

    pub fn classify(&self) -> TerrainLayer {
        if self.layer < 0 || (self.layer == 0 && self.base.1 < UNIT_POSITION) {
            TerrainLayer::Background
        } else {
            TerrainLayer::Foreground
        }
    }

    /// Draw order within a cell: layer, then base y.
    pub fn sort_key(&self) -> (i32, i32) {
        (self.layer, self.base.1)
    }
}

/// Requirements on a single cell, relative to the rule's anchor.
#[derive(Debug, Clone, PartialEq)]
pub struct Constraint<I> {
    pub loc: Location,
    pub terrain: TerrainMatch,
    pub set_flag: Vec<String>,
    pub no_flag: Vec<String>,
    pub has_flag: Vec<String>,
    pub images: Vec<I>,
}

impl<I> Constraint<I> {
    pub fn new(loc: Location) -> Self {
        Self {
            loc,
            terrain: TerrainMatch::any(),
            set_flag: Vec::new(),
            no_flag: Vec::new(),
            has_flag: Vec::new(),
            images: Vec::new(),
        }
    }
}

/// A rule with its constraints keyed (and iterated) by relative location.
#[derive(Debug, Clone, PartialEq)]
pub struct Rule<I> {
    /// Absolute anchor the rule is restricted to.
    pub location: Option<Location>,
    /// Percent chance per anchor; `None` always fires.
    pub probability: Option<u32>,
    pub precedence: i32,
    pub scope: RuleScope,
    pub constraints: BTreeMap<Location, Constraint<I>>,
}

impl<I> Rule<I> {
    pub fn new(scope: RuleScope, precedence: i32) -> Self {
        Self {
            location: None,
            probability: None,
            precedence,
            scope,
            constraints: BTreeMap::new(),
        }
    }
}

/// A rule as produced by the compiler, owning its images.
pub type RuleTemplate = Rule<RuleImage>;

/// A rule stored in a rule set, referring to images by handle.
pub type BuildingRule = Rule<ImageId>;
