//! Six-fold rotation of rules around the hex grid.
//!
//! Cell offsets rotate exactly in axial space; image base points rotate in
//! the squashed pixel space of a tile and are rounded back to whole pixels.

use glam::{DMat2, DVec2};
use std::collections::BTreeMap;

use crate::builder::rule::{RuleTemplate, TILE_WIDTH};
use crate::map::Location;

/// Axial rotation matrices `[ii, ij, ji, jj]` for 0..6 clockwise steps of 60°.
const ROTATIONS: [[i32; 4]; 6] = [
    [1, 0, 0, 1],
    [1, 1, -1, 0],
    [0, 1, -1, -1],
    [-1, 0, 0, -1],
    [-1, -1, 1, 0],
    [0, -1, 1, 1],
];

// r = s^-1 * t * s, where t is the 60° rotation and s maps tile pixel space
// onto a regular hexagon (y scaled by -sqrt(3)/2). Rows are I, r, r^2 .. r^5.
const PIXEL_ROTATIONS: [[f64; 4]; 6] = [
    [1.0, 0.0, 0.0, 1.0],
    [0.5, -0.75, 1.0, 0.5],
    [-0.5, -0.75, 1.0, -0.5],
    [-1.0, 0.0, 0.0, -1.0],
    [-0.5, 0.75, -1.0, -0.5],
    [0.5, 0.75, -1.0, 0.5],
];

pub fn rotate_location(loc: Location, steps: usize) -> Location {
    let [ii, ij, ji, jj] = ROTATIONS[steps % 6];
    let (vj, vi) = loc.offset_axial();
    let ri = ii * vi + ij * vj;
    let rj = ji * vi + jj * vj;
    Location::from_offset_axial(rj, ri)
}

/// Rotate a pixel position around the tile centre.
pub fn rotate_pixel(point: (i32, i32), steps: usize) -> (i32, i32) {
    let [xx, xy, yx, yy] = PIXEL_ROTATIONS[steps % 6];
    let matrix = DMat2::from_cols(DVec2::new(xx, yx), DVec2::new(xy, yy));
    let center = DVec2::splat(f64::from(TILE_WIDTH) / 2.0);
    let v = DVec2::new(f64::from(point.0), f64::from(point.1)) - center;
    let r = matrix * v + center;
    (r.x.round() as i32, r.y.round() as i32)
}

/// Rotate every constraint offset and image base point, then renormalize.
pub fn rotate_template(rule: &RuleTemplate, steps: usize) -> RuleTemplate {
    let mut constraints = BTreeMap::new();
    for constraint in rule.constraints.values() {
        let mut rotated = constraint.clone();
        rotated.loc = rotate_location(constraint.loc, steps);
        for image in &mut rotated.images {
            image.base = rotate_pixel(image.base, steps);
            image.pass = image.classify();
        }
        constraints.insert(rotated.loc, rotated);
    }

    let mut out = RuleTemplate {
        location: rule.location,
        probability: rule.probability,
        precedence: rule.precedence,
        scope: rule.scope,
        constraints,
    };
    normalize(&mut out);
    out
}

/// Translate all constraints so the smallest x and the smallest y are both 0.
pub fn normalize(rule: &mut RuleTemplate) {
    let Some(min_x) = rule.constraints.keys().map(|l| l.x).min() else {
        return;
    };
    let shifted: Vec<Location> = rule
        .constraints
        .keys()
        .map(|l| translate(*l, -min_x, 0))
        .collect();
    let min_y = shifted.iter().map(|l| l.y).min().unwrap_or(0);

    let old = std::mem::take(&mut rule.constraints);
    for (mut constraint, loc) in old.into_values().zip(shifted) {
        constraint.loc = translate(loc, 0, -min_y);
        rule.constraints.insert(constraint.loc, constraint);
    }
}

fn translate(loc: Location, dq: i32, dr: i32) -> Location {
    let (q, r) = loc.offset_axial();
    Location::from_offset_axial(q + dq, r + dr)
}

/// Rotate a rule by `angle` steps and substitute its `@R0`..`@R5` tokens.
///
/// `@Ri` becomes `names[(angle + i) % 6]` in every flag and image string, so
/// a flag written for one neighbour direction follows the rotation.
pub fn rotate_rule(rule: &RuleTemplate, angle: usize, names: &[String]) -> RuleTemplate {
    let mut rotated = rotate_template(rule, angle);
    if names.len() == 6 {
        for i in 0..6 {
            let token = format!("@R{i}");
            replace_token(&mut rotated, &token, &names[(angle + i) % 6]);
        }
    }
    rotated
}

fn replace_token(rule: &mut RuleTemplate, token: &str, replacement: &str) {
    for constraint in rule.constraints.values_mut() {
        let flags = constraint
            .set_flag
            .iter_mut()
            .chain(constraint.no_flag.iter_mut())
            .chain(constraint.has_flag.iter_mut());
        for flag in flags {
            if flag.contains(token) {
                *flag = flag.replace(token, replacement);
            }
        }
        for image in &mut constraint.images {
            for variant in &mut image.variants {
                if variant.image_string.contains(token) {
                    variant.image_string = variant.image_string.replace(token, replacement);
                }
            }
        }
    }
}
