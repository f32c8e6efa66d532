//! Compiled rules, split into a global scope that follows the rule file and a
//! local scope that follows the current level.

use std::ops::AddAssign;
use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::builder::compiler::{self, CompileError};
use crate::builder::images::ImageCatalog;
use crate::builder::rule::{
    BuildingRule, Constraint, ImageId, Rule, RuleImage, RuleScope, RuleTemplate,
};
use crate::config::rules::{RuleDescription, RuleFile};

/// How rule images are resolved while compiling.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompileSettings {
    /// Prepended to every frame path before it is looked up.
    pub image_prefix: String,
    /// Image of the built-in off-map rule; no off-map rule when unset.
    pub off_map_image: Option<String>,
}

impl Default for CompileSettings {
    fn default() -> Self {
        Self {
            image_prefix: "terrain/".to_string(),
            off_map_image: None,
        }
    }
}

/// Outcome of compiling a batch of descriptions.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompileSummary {
    pub accepted: usize,
    pub rejected: usize,
}

impl AddAssign for CompileSummary {
    fn add_assign(&mut self, other: Self) {
        self.accepted += other.accepted;
        self.rejected += other.rejected;
    }
}

#[derive(Debug, Default)]
struct ScopeStore {
    rules: Vec<BuildingRule>,
    images: Vec<RuleImage>,
}

/// Caller-owned store of compiled rules.
///
/// Every mutation bumps [`RuleSet::generation`], which builders use to notice
/// that the image handles they hold no longer refer to this set's contents.
#[derive(Debug)]
pub struct RuleSet {
    settings: CompileSettings,
    global: ScopeStore,
    local: ScopeStore,
    source: Option<Arc<RuleFile>>,
    generation: u64,
}

impl RuleSet {
    pub fn new(settings: CompileSettings) -> Self {
        Self {
            settings,
            global: ScopeStore::default(),
            local: ScopeStore::default(),
            source: None,
            generation: 0,
        }
    }

    /// Recompile the global scope unless `source` is the rule file it was
    /// last compiled from. Local rules are dropped on recompilation.
    ///
    /// Returns whether anything was recompiled.
    pub fn recompile_if_stale(
        &mut self,
        source: &Arc<RuleFile>,
        catalog: &dyn ImageCatalog,
    ) -> bool {
        if self
            .source
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, source))
        {
            return false;
        }

        self.global = ScopeStore::default();
        self.local = ScopeStore::default();
        self.generation += 1;

        let mut summary = CompileSummary::default();
        if let Some(image) = self.settings.off_map_image.clone() {
            let off_map = compiler::off_map_rule(&image);
            summary += self.add_description(&off_map, RuleScope::Global, catalog);
        }
        for desc in &source.rules {
            summary += self.add_description(desc, RuleScope::Global, catalog);
        }
        self.source = Some(Arc::clone(source));

        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            images = self.global.images.len(),
            "Global terrain rules compiled"
        );
        true
    }

    /// Replace the local scope with `rules`.
    pub fn load_local(
        &mut self,
        rules: &[RuleDescription],
        catalog: &dyn ImageCatalog,
    ) -> CompileSummary {
        self.flush_local();
        let mut summary = CompileSummary::default();
        for desc in rules {
            summary += self.add_description(desc, RuleScope::Local, catalog);
        }
        info!(
            accepted = summary.accepted,
            rejected = summary.rejected,
            "Local terrain rules compiled"
        );
        summary
    }

    pub fn flush_local(&mut self) {
        self.local = ScopeStore::default();
        self.generation += 1;
    }

    /// Compile one description (one rule, or six with rotations) into `scope`.
    pub fn add_description(
        &mut self,
        desc: &RuleDescription,
        scope: RuleScope,
        catalog: &dyn ImageCatalog,
    ) -> CompileSummary {
        let mut summary = CompileSummary::default();
        let templates = match compiler::compile_rule(desc, scope) {
            Ok(templates) => templates,
            Err(e) => {
                match &e {
                    CompileError::InvalidMapSymbol { .. } => {
                        error!(precedence = desc.precedence, error = %e, "Invalid builder map")
                    }
                    CompileError::InvalidRotations(_) => {
                        warn!(precedence = desc.precedence, error = %e, "Bad rotation list")
                    }
                    _ => debug!(precedence = desc.precedence, error = %e, "Rule rejected"),
                }
                summary.rejected += 1;
                return summary;
            }
        };

        for template in templates {
            match self.add_rule(template, catalog) {
                Ok(()) => summary.accepted += 1,
                Err(e) => {
                    debug!(precedence = desc.precedence, error = %e, "Rule rejected");
                    summary.rejected += 1;
                }
            }
        }
        summary
    }

    /// Resolve a template's images and store it in the template's scope.
    pub fn add_rule(
        &mut self,
        mut template: RuleTemplate,
        catalog: &dyn ImageCatalog,
    ) -> Result<(), CompileError> {
        compiler::load_images(&mut template, catalog, &self.settings.image_prefix)?;

        let scope = template.scope;
        let store = match scope {
            RuleScope::Global => &mut self.global,
            RuleScope::Local => &mut self.local,
        };

        let mut rule = Rule::new(scope, template.precedence);
        rule.location = template.location;
        rule.probability = template.probability;
        for (loc, constraint) in template.constraints {
            let mut images = Vec::with_capacity(constraint.images.len());
            for image in constraint.images {
                images.push(ImageId {
                    scope,
                    index: store.images.len() as u32,
                });
                store.images.push(image);
            }
            rule.constraints.insert(
                loc,
                Constraint {
                    loc: constraint.loc,
                    terrain: constraint.terrain,
                    set_flag: constraint.set_flag,
                    no_flag: constraint.no_flag,
                    has_flag: constraint.has_flag,
                    images,
                },
            );
        }
        store.rules.push(rule);
        self.generation += 1;
        Ok(())
    }

    /// All rules in application order: ascending precedence, global before
    /// local on ties, then insertion order.
    pub fn ordered(&self) -> Vec<&BuildingRule> {
        let mut rules: Vec<&BuildingRule> =
            self.global.rules.iter().chain(&self.local.rules).collect();
        rules.sort_by_key(|r| r.precedence);
        rules
    }

    pub fn image(&self, id: ImageId) -> Option<&RuleImage> {
        let store = match id.scope {
            RuleScope::Global => &self.global,
            RuleScope::Local => &self.local,
        };
        store.images.get(id.index as usize)
    }

    pub fn len(&self) -> usize {
        self.global.rules.len() + self.local.rules.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::new(CompileSettings::default())
    }
}
