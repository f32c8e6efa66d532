//! Turns rule descriptions into rule templates and resolves their images.

use std::collections::BTreeMap;

use thiserror::Error;
use tracing::{debug, warn};

use crate::builder::animation::{parse_frames, Animation, Frame, ImageLocator, Placement};
use crate::builder::images::ImageCatalog;
use crate::builder::rotation;
use crate::builder::rule::{
    Constraint, ImageVariant, RuleImage, RuleScope, RuleTemplate, DEFAULT_VARIANT_PROBABILITY,
    TILE_WIDTH,
};
use crate::config::rules::{
    parse_pair, split_list, ImageDescription, RuleDescription, TileDescription,
};
use crate::map::{Location, TerrainMatch, OFF_MAP_USER};

/// Why a rule was dropped during compilation.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CompileError {
    #[error("rule has no constraints")]
    NoConstraints,
    #[error("invalid symbol '{symbol}' on line {line} of the builder map")]
    InvalidMapSymbol { symbol: String, line: usize },
    #[error("expected 6 rotation names, got {0}")]
    InvalidRotations(usize),
    #[error("image '{0}' not found")]
    MissingImage(String),
    #[error("image string '{0}' has no frames")]
    EmptyImage(String),
}

/// Cells found in a rule's `map` diagram.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BuilderMap {
    /// `*` cells, in diagram order.
    pub stars: Vec<Location>,
    /// Anchor index to every cell carrying it, in diagram order.
    pub anchors: BTreeMap<u32, Vec<Location>>,
}

/// Parse a builder map diagram.
///
/// Lines alternate between even columns (`x = 0, 2, 4, ...`) and odd columns
/// (`x = 1, 3, 5, ...`, written with a leading empty entry); `y` advances
/// after every odd line. A diagram whose first line starts with an empty
/// entry begins on an odd line.
///
/// ```text
/// .,  .
/// ,  *,  .
/// 1,  .
/// ```
pub fn parse_builder_map(diagram: &str) -> Result<BuilderMap, CompileError> {
    let mut map = BuilderMap::default();
    let lines: Vec<(usize, Vec<&str>)> = diagram
        .lines()
        .enumerate()
        .filter(|(_, l)| !l.trim().is_empty())
        .map(|(n, l)| (n + 1, l.split(',').map(str::trim).collect()))
        .collect();

    let Some((_, first)) = lines.first() else {
        return Ok(map);
    };
    let mut odd = first.first().is_some_and(|e| e.is_empty());
    let mut y = 0;

    for (line_no, entries) in &lines {
        let skip = usize::from(odd);
        let mut x = i32::from(odd);
        let last = entries.iter().rposition(|e| !e.is_empty()).map_or(0, |p| p + 1);
        for &entry in entries.iter().take(last).skip(skip) {
            let loc = Location::new(x, y);
            match entry {
                "." => {}
                "*" => map.stars.push(loc),
                _ => match entry.parse::<u32>() {
                    Ok(index) => map.anchors.entry(index).or_default().push(loc),
                    Err(_) => {
                        return Err(CompileError::InvalidMapSymbol {
                            symbol: entry.to_string(),
                            line: *line_no,
                        });
                    }
                },
            }
            x += 2;
        }
        if odd {
            y += 1;
        }
        odd = !odd;
    }

    Ok(map)
}

/// Pixel position of a cell's top-left corner relative to the rule origin.
fn cell_pixel_origin(loc: Location) -> (i32, i32) {
    (
        loc.x * TILE_WIDTH * 3 / 4,
        loc.y * TILE_WIDTH + loc.x.rem_euclid(2) * TILE_WIDTH / 2,
    )
}

fn add_images(
    images: &mut Vec<RuleImage>,
    descriptions: &[ImageDescription],
    global: bool,
    (dx, dy): (i32, i32),
) {
    for desc in descriptions {
        let (base_x, base_y) = desc
            .base
            .as_deref()
            .and_then(parse_pair)
            .unwrap_or((TILE_WIDTH / 2 + dx, TILE_WIDTH / 2 + dy));
        let center = desc.center.as_deref().and_then(parse_pair);

        let mut variants: Vec<ImageVariant> = desc
            .variant
            .iter()
            .map(|v| {
                ImageVariant::new(
                    v.name.clone(),
                    v.tod.as_deref(),
                    v.probability.unwrap_or(DEFAULT_VARIANT_PROBABILITY),
                )
            })
            .collect();
        variants.push(ImageVariant::new(
            desc.name.clone(),
            None,
            DEFAULT_VARIANT_PROBABILITY,
        ));

        images.push(RuleImage::new(
            desc.layer,
            (base_x - dx, base_y - dy),
            center,
            global,
            variants,
        ));
    }
}

/// Get or create the constraint at `loc`, attaching the rule-level images.
fn ensure_constraint<'a>(
    rule: &'a mut RuleTemplate,
    loc: Location,
    terrain: Option<TerrainMatch>,
    rule_images: &[ImageDescription],
) -> &'a mut Constraint<RuleImage> {
    let constraint = rule
        .constraints
        .entry(loc)
        .or_insert_with(|| Constraint::new(loc));
    if let Some(terrain) = terrain {
        constraint.terrain = terrain;
    }
    add_images(
        &mut constraint.images,
        rule_images,
        true,
        cell_pixel_origin(loc),
    );
    constraint
}

fn add_tile_constraint(
    rule: &mut RuleTemplate,
    loc: Location,
    tile: &TileDescription,
    rule_images: &[ImageDescription],
) {
    let terrain = tile
        .terrain
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .map(TerrainMatch::parse);
    let constraint = ensure_constraint(rule, loc, terrain, rule_images);

    constraint.set_flag.extend(split_list(tile.set_flag.as_deref()));
    constraint.has_flag.extend(split_list(tile.has_flag.as_deref()));
    constraint.no_flag.extend(split_list(tile.no_flag.as_deref()));
    let set_no = split_list(tile.set_no_flag.as_deref());
    constraint.set_flag.extend(set_no.iter().cloned());
    constraint.no_flag.extend(set_no);

    add_images(&mut constraint.images, &tile.image, false, (0, 0));
}

fn tile_location(tile: &TileDescription) -> Option<Location> {
    let (mut x, mut y) = (tile.x, tile.y);
    if let Some((lx, ly)) = tile.loc.as_deref().and_then(parse_pair) {
        x = Some(lx);
        y = Some(ly);
    }
    Some(Location::new(x?, y?))
}

/// Compile one rule description.
///
/// Returns one template, or six when the rule asks for rotations. Images are
/// not checked here; see [`load_images`].
pub fn compile_rule(
    desc: &RuleDescription,
    scope: RuleScope,
) -> Result<Vec<RuleTemplate>, CompileError> {
    let mut rule = RuleTemplate::new(scope, desc.precedence);

    if let (Some(x), Some(y)) = (desc.x, desc.y) {
        rule.location = Some(Location::new(x - 1, y - 1));
    }
    rule.probability = desc.probability;

    let diagram = match desc.map.as_deref() {
        Some(map) => parse_builder_map(map)?,
        None => BuilderMap::default(),
    };

    for &star in &diagram.stars {
        ensure_constraint(&mut rule, star, Some(TerrainMatch::any()), &desc.image);
    }

    for tile in &desc.tile {
        if let Some(loc) = tile_location(tile) {
            add_tile_constraint(&mut rule, loc, tile, &desc.image);
        }
        if let Some(pos) = tile.pos {
            let Some(locations) = diagram.anchors.get(&pos) else {
                warn!(pos, precedence = desc.precedence, "Invalid anchor, tile entry skipped");
                continue;
            };
            for &loc in locations {
                add_tile_constraint(&mut rule, loc, tile, &desc.image);
            }
        }
    }

    let set_flag = split_list(desc.set_flag.as_deref());
    let no_flag = split_list(desc.no_flag.as_deref());
    let has_flag = split_list(desc.has_flag.as_deref());
    let set_no_flag = split_list(desc.set_no_flag.as_deref());
    for constraint in rule.constraints.values_mut() {
        constraint.set_flag.extend(set_flag.iter().cloned());
        constraint.no_flag.extend(no_flag.iter().cloned());
        constraint.has_flag.extend(has_flag.iter().cloned());
        constraint.set_flag.extend(set_no_flag.iter().cloned());
        constraint.no_flag.extend(set_no_flag.iter().cloned());
    }

    let names = split_list(desc.rotations.as_deref());
    if desc.rotations.is_none() || names.is_empty() {
        return Ok(vec![rule]);
    }
    if names.len() != 6 {
        return Err(CompileError::InvalidRotations(names.len()));
    }
    Ok((0..6)
        .map(|angle| rotation::rotate_rule(&rule, angle, &names))
        .collect())
}

fn image_exists(catalog: &dyn ImageCatalog, name: &str) -> bool {
    if catalog.exists(name) {
        return true;
    }
    if !name.contains(".png") && catalog.exists(&format!("{name}.png")) {
        warn!(image = name, "Terrain image misses the '.png' extension");
    }
    false
}

/// Resolve every variant of every image into an animation.
///
/// Fails closed: one missing frame rejects the whole rule.
pub fn load_images(
    rule: &mut RuleTemplate,
    catalog: &dyn ImageCatalog,
    prefix: &str,
) -> Result<(), CompileError> {
    if rule.constraints.is_empty() {
        return Err(CompileError::NoConstraints);
    }

    for constraint in rule.constraints.values_mut() {
        let loc = constraint.loc;
        for image in &mut constraint.images {
            let placement = image.global_image.then_some(Placement {
                location: loc,
                center: image.center,
            });
            image.pass = image.classify();

            for variant in &mut image.variants {
                let specs = parse_frames(&variant.image_string);
                let mut frames = Vec::with_capacity(specs.len());
                for spec in specs {
                    let path = format!("{prefix}{}", spec.file);
                    if !image_exists(catalog, &path) {
                        return Err(CompileError::MissingImage(path));
                    }
                    frames.push(Frame {
                        duration: spec.duration,
                        image: ImageLocator {
                            path,
                            modifications: spec.modifications,
                            placement: placement.clone(),
                        },
                    });
                }
                variant.animation = Animation::new(frames);
                if variant.animation.is_none() {
                    return Err(CompileError::EmptyImage(variant.image_string.clone()));
                }
            }
        }
    }

    debug!(
        constraints = rule.constraints.len(),
        precedence = rule.precedence,
        "Rule images loaded"
    );
    Ok(())
}

/// The built-in rule painting off-map cells with `image`.
pub fn off_map_rule(image: &str) -> RuleDescription {
    RuleDescription {
        probability: Some(100),
        no_flag: Some("base".to_string()),
        set_flag: Some("base".to_string()),
        tile: vec![TileDescription {
            x: Some(0),
            y: Some(0),
            terrain: Some(OFF_MAP_USER.to_string()),
            image: vec![ImageDescription {
                layer: -1000,
                name: image.to_string(),
                ..Default::default()
            }],
            ..Default::default()
        }],
        ..Default::default()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::rules::{RuleFile, VariantDescription};
    use std::collections::HashSet;
    use std::path::Path;

    fn catalog(names: &[&str]) -> HashSet<String> {
        names.iter().map(|n| format!("terrain/{n}")).collect()
    }

    fn tile_at(x: i32, y: i32, terrain: &str, image: &str) -> TileDescription {
        TileDescription {
            x: Some(x),
            y: Some(y),
            terrain: Some(terrain.to_string()),
            image: if image.is_empty() {
                Vec::new()
            } else {
                vec![ImageDescription {
                    name: image.to_string(),
                    ..Default::default()
                }]
            },
            ..Default::default()
        }
    }

    fn parse_rules(toml: &str) -> Vec<RuleDescription> {
        RuleFile::from_toml_str(toml, Path::new("rules.toml"))
            .unwrap()
            .rules
    }

    #[test]
    fn builder_map_layout() {
        let map = parse_builder_map(
            "
            .,   *
            ,  1,  .
            2,   .",
        )
        .unwrap();
        assert_eq!(map.stars, vec![Location::new(2, 0)]);
        assert_eq!(map.anchors[&1], vec![Location::new(1, 0)]);
        assert_eq!(map.anchors[&2], vec![Location::new(0, 1)]);
    }

    #[test]
    fn builder_map_starting_on_odd_line() {
        let map = parse_builder_map(", 1\n2, 3\n, 4").unwrap();
        assert_eq!(map.anchors[&1], vec![Location::new(1, 0)]);
        assert_eq!(map.anchors[&2], vec![Location::new(0, 1)]);
        assert_eq!(map.anchors[&3], vec![Location::new(2, 1)]);
        assert_eq!(map.anchors[&4], vec![Location::new(1, 1)]);
    }

    #[test]
    fn builder_map_shared_anchor_index() {
        let map = parse_builder_map("1, 1\n, 1,").unwrap();
        assert_eq!(
            map.anchors[&1],
            vec![Location::new(0, 0), Location::new(2, 0), Location::new(1, 0)]
        );
    }

    #[test]
    fn builder_map_rejects_unknown_symbols() {
        let err = parse_builder_map(".\n, Gg").unwrap_err();
        assert_eq!(
            err,
            CompileError::InvalidMapSymbol {
                symbol: "Gg".to_string(),
                line: 2
            }
        );
    }

    #[test]
    fn empty_builder_map() {
        assert_eq!(parse_builder_map("\n  \n").unwrap(), BuilderMap::default());
    }

    #[test]
    fn tile_entries_build_constraints() {
        let desc = RuleDescription {
            precedence: 3,
            x: Some(2),
            y: Some(5),
            probability: Some(25),
            tile: vec![
                TileDescription {
                    set_flag: Some("a, b".into()),
                    has_flag: Some("c".into()),
                    no_flag: Some("d".into()),
                    set_no_flag: Some("e".into()),
                    ..tile_at(0, 0, "Gg", "grass.png")
                },
                TileDescription {
                    loc: Some("1,0".into()),
                    ..tile_at(9, 9, "Ww", "")
                },
            ],
            ..Default::default()
        };
        let rules = compile_rule(&desc, RuleScope::Local).unwrap();
        assert_eq!(rules.len(), 1);
        let rule = &rules[0];
        assert_eq!(rule.precedence, 3);
        assert_eq!(rule.scope, RuleScope::Local);
        assert_eq!(rule.location, Some(Location::new(1, 4)));
        assert_eq!(rule.probability, Some(25));

        let origin = &rule.constraints[&Location::new(0, 0)];
        assert_eq!(origin.set_flag, vec!["a", "b", "e"]);
        assert_eq!(origin.has_flag, vec!["c"]);
        assert_eq!(origin.no_flag, vec!["d", "e"]);
        assert_eq!(origin.images.len(), 1);
        assert_eq!(origin.images[0].base, (36, 36));
        assert!(!origin.images[0].global_image);

        assert!(rule.constraints.contains_key(&Location::new(1, 0)));
        assert!(!rule.constraints.contains_key(&Location::new(9, 9)));
    }

    #[test]
    fn tile_without_type_keeps_existing_match() {
        let desc = RuleDescription {
            tile: vec![
                tile_at(0, 0, "Hh", ""),
                TileDescription {
                    terrain: None,
                    set_flag: Some("hill".into()),
                    ..tile_at(0, 0, "", "")
                },
            ],
            ..Default::default()
        };
        let rule = compile_rule(&desc, RuleScope::Global).unwrap().remove(0);
        let c = &rule.constraints[&Location::new(0, 0)];
        assert_eq!(c.terrain, TerrainMatch::parse("Hh"));
        assert_eq!(c.set_flag, vec!["hill"]);
    }

    #[test]
    fn pos_entries_resolve_through_the_map() {
        let rules = parse_rules(
            r#"
            [[rule]]
            map = """
            1,  .
            ,  2"""
            [[rule.tile]]
            pos = 1
            type = "Gg"
            [[rule.tile]]
            pos = 2
            type = "Ww"
            [[rule.tile]]
            pos = 7
            type = "Hh"
            "#,
        );
        let rule = compile_rule(&rules[0], RuleScope::Global).unwrap().remove(0);
        assert_eq!(rule.constraints.len(), 2);
        assert_eq!(
            rule.constraints[&Location::new(0, 0)].terrain,
            TerrainMatch::parse("Gg")
        );
        assert_eq!(
            rule.constraints[&Location::new(1, 0)].terrain,
            TerrainMatch::parse("Ww")
        );
    }

    #[test]
    fn rule_flags_apply_to_every_constraint() {
        let desc = RuleDescription {
            set_flag: Some("done".into()),
            has_flag: Some("base".into()),
            set_no_flag: Some("once".into()),
            tile: vec![tile_at(0, 0, "Gg", ""), tile_at(0, 1, "Gg", "")],
            ..Default::default()
        };
        let rule = compile_rule(&desc, RuleScope::Global).unwrap().remove(0);
        for c in rule.constraints.values() {
            assert_eq!(c.set_flag, vec!["done", "once"]);
            assert_eq!(c.has_flag, vec!["base"]);
            assert_eq!(c.no_flag, vec!["once"]);
        }
    }

    #[test]
    fn rule_level_images_are_cut_per_cell() {
        let desc = RuleDescription {
            map: Some("*\n,*".into()),
            image: vec![ImageDescription {
                name: "keep.png".into(),
                base: Some("90,100".into()),
                center: Some("54,72".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let rule = compile_rule(&desc, RuleScope::Global).unwrap().remove(0);
        let first = &rule.constraints[&Location::new(0, 0)].images[0];
        assert!(first.global_image);
        assert_eq!(first.base, (90, 100));
        assert_eq!(first.center, Some((54, 72)));

        let second = &rule.constraints[&Location::new(1, 0)].images[0];
        assert_eq!(second.base, (90 - 54, 100 - 36));
    }

    #[test]
    fn variants_precede_the_default() {
        let desc = RuleDescription {
            tile: vec![TileDescription {
                image: vec![ImageDescription {
                    name: "default.png".into(),
                    variant: vec![
                        VariantDescription {
                            name: "night.png".into(),
                            tod: Some("first_watch".into()),
                            probability: None,
                        },
                        VariantDescription {
                            name: "rare.png".into(),
                            tod: None,
                            probability: Some(10),
                        },
                    ],
                    ..Default::default()
                }],
                ..tile_at(0, 0, "Gg", "")
            }],
            ..Default::default()
        };
        let rule = compile_rule(&desc, RuleScope::Global).unwrap().remove(0);
        let variants = &rule.constraints[&Location::new(0, 0)].images[0].variants;
        let names: Vec<&str> = variants.iter().map(|v| v.image_string.as_str()).collect();
        assert_eq!(names, vec!["night.png", "rare.png", "default.png"]);
        assert_eq!(variants[0].probability, 100);
        assert_eq!(variants[1].probability, 10);
        assert!(variants[2].tods.is_empty());
    }

    #[test]
    fn rotations_expand_to_six_rules() {
        let desc = RuleDescription {
            rotations: Some("n,ne,se,s,sw,nw".into()),
            tile: vec![
                tile_at(0, 0, "Gg", ""),
                TileDescription {
                    set_flag: Some("edge-@R0".into()),
                    ..tile_at(0, 1, "Ww", "")
                },
            ],
            ..Default::default()
        };
        let rules = compile_rule(&desc, RuleScope::Global).unwrap();
        assert_eq!(rules.len(), 6);
        let flags: Vec<String> = rules
            .iter()
            .flat_map(|r| r.constraints.values().flat_map(|c| c.set_flag.clone()))
            .collect();
        assert_eq!(
            flags,
            vec!["edge-n", "edge-ne", "edge-se", "edge-s", "edge-sw", "edge-nw"]
        );
    }

    #[test]
    fn wrong_rotation_count_rejected() {
        let desc = RuleDescription {
            rotations: Some("n,ne,se".into()),
            tile: vec![tile_at(0, 0, "Gg", "")],
            ..Default::default()
        };
        assert_eq!(
            compile_rule(&desc, RuleScope::Global).unwrap_err(),
            CompileError::InvalidRotations(3)
        );
    }

    #[test]
    fn invalid_map_symbol_rejects_the_rule() {
        let desc = RuleDescription {
            map: Some("1, Q".into()),
            ..Default::default()
        };
        assert!(matches!(
            compile_rule(&desc, RuleScope::Global),
            Err(CompileError::InvalidMapSymbol { .. })
        ));
    }

    #[test]
    fn load_images_resolves_animations() {
        let desc = RuleDescription {
            map: Some("*".into()),
            image: vec![ImageDescription {
                name: "water/a.png:150,water/b.png~FL():50".into(),
                center: Some("10,20".into()),
                ..Default::default()
            }],
            ..Default::default()
        };
        let mut rule = compile_rule(&desc, RuleScope::Global).unwrap().remove(0);
        let images = catalog(&["water/a.png", "water/b.png"]);
        load_images(&mut rule, &images, "terrain/").unwrap();

        let image = &rule.constraints[&Location::new(0, 0)].images[0];
        let anim = image.variants[0].animation.as_ref().unwrap();
        assert_eq!(anim.duration(), 200);
        assert_eq!(anim.frames()[0].image.path, "terrain/water/a.png");
        assert_eq!(anim.frames()[1].image.modifications, "FL()");
        assert_eq!(
            anim.frames()[0].image.placement,
            Some(Placement {
                location: Location::new(0, 0),
                center: Some((10, 20)),
            })
        );
    }

    #[test]
    fn missing_image_rejects_the_rule() {
        let desc = RuleDescription {
            tile: vec![TileDescription {
                image: vec![ImageDescription {
                    name: "present.png".into(),
                    variant: vec![VariantDescription {
                        name: "absent.png".into(),
                        ..Default::default()
                    }],
                    ..Default::default()
                }],
                ..tile_at(0, 0, "Gg", "")
            }],
            ..Default::default()
        };
        let mut rule = compile_rule(&desc, RuleScope::Global).unwrap().remove(0);
        let err = load_images(&mut rule, &catalog(&["present.png"]), "terrain/").unwrap_err();
        assert_eq!(err, CompileError::MissingImage("terrain/absent.png".into()));
    }

    #[test]
    fn nameless_image_rejects_the_rule() {
        let mut rule = compile_rule(
            &RuleDescription {
                tile: vec![TileDescription {
                    image: vec![ImageDescription::default()],
                    ..tile_at(0, 0, "Gg", "")
                }],
                ..Default::default()
            },
            RuleScope::Global,
        )
        .unwrap()
        .remove(0);
        assert_eq!(
            load_images(&mut rule, &catalog(&[]), "terrain/").unwrap_err(),
            CompileError::EmptyImage(String::new())
        );
    }

    #[test]
    fn empty_rule_rejected_on_load() {
        let mut rule = compile_rule(&RuleDescription::default(), RuleScope::Global)
            .unwrap()
            .remove(0);
        assert_eq!(
            load_images(&mut rule, &catalog(&[]), "terrain/").unwrap_err(),
            CompileError::NoConstraints
        );
    }

    #[test]
    fn off_map_rule_shape() {
        let rule = compile_rule(&off_map_rule("off-map/alpha.png"), RuleScope::Global)
            .unwrap()
            .remove(0);
        assert_eq!(rule.probability, Some(100));
        let c = &rule.constraints[&Location::new(0, 0)];
        assert_eq!(c.terrain, TerrainMatch::parse(OFF_MAP_USER));
        assert_eq!(c.set_flag, vec!["base"]);
        assert_eq!(c.no_flag, vec!["base"]);
        assert_eq!(c.images[0].layer, -1000);
    }
}
