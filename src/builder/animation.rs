use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::Arc;

use crate::map::Location;

/// Default frame duration in milliseconds when a frame does not specify one.
pub const DEFAULT_FRAME_DURATION: u32 = 100;

/// Where a world-anchored image piece is cut from.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Placement {
    /// Offset of the cell within the rule, i.e. which piece of the large image to draw.
    pub location: Location,
    pub center: Option<(i32, i32)>,
}

/// Identity of one drawable image: file, modification string, optional placement.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ImageLocator {
    pub path: String,
    pub modifications: String,
    pub placement: Option<Placement>,
}

impl ImageLocator {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            modifications: String::new(),
            placement: None,
        }
    }
}

impl fmt::Display for ImageLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.path)?;
        if !self.modifications.is_empty() {
            write!(f, "~{}", self.modifications)?;
        }
        if let Some(placement) = &self.placement {
            write!(f, "@{}", placement.location)?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    pub duration: u32,
    pub image: ImageLocator,
}

/// A looping frame sequence with a per-instance phase.
///
/// Frames are shared between clones, so handing the same animation to many
/// cells only copies the phase and draw state.
#[derive(Debug, Clone, PartialEq)]
pub struct Animation {
    frames: Arc<[Frame]>,
    duration: u32,
    phase: u32,
    last_drawn: Option<usize>,
}

impl Animation {
    /// Returns `None` for an empty frame list.
    pub fn new(frames: Vec<Frame>) -> Option<Self> {
        if frames.is_empty() {
            return None;
        }
        let duration = frames
            .iter()
            .fold(0u32, |acc, f| acc.saturating_add(f.duration))
            .max(1);
        Some(Self {
            frames: frames.into(),
            duration,
            phase: 0,
            last_drawn: None,
        })
    }

    pub fn single(image: ImageLocator) -> Self {
        Self {
            frames: vec![Frame {
                duration: DEFAULT_FRAME_DURATION,
                image,
            }]
            .into(),
            duration: DEFAULT_FRAME_DURATION,
            phase: 0,
            last_drawn: None,
        }
    }

    pub fn frames(&self) -> &[Frame] {
        &self.frames
    }

    /// Total cycle length; never zero.
    pub fn duration(&self) -> u32 {
        self.duration
    }

    pub fn phase(&self) -> u32 {
        self.phase
    }

    pub fn set_phase(&mut self, phase: u32) {
        self.phase = phase % self.duration;
        self.last_drawn = None;
    }

    pub fn is_animated(&self) -> bool {
        self.frames.len() > 1
    }

    pub fn frame_index_at(&self, now_ms: u64) -> usize {
        if !self.is_animated() {
            return 0;
        }
        let mut t = ((now_ms + self.phase as u64) % self.duration as u64) as u32;
        for (i, frame) in self.frames.iter().enumerate() {
            if t < frame.duration {
                return i;
            }
            t -= frame.duration;
        }
        self.frames.len() - 1
    }

    /// True when the frame shown at `now_ms` differs from the one last drawn.
    pub fn needs_update(&self, now_ms: u64) -> bool {
        self.is_animated() && self.last_drawn != Some(self.frame_index_at(now_ms))
    }

    pub fn mark_drawn(&mut self, now_ms: u64) {
        self.last_drawn = Some(self.frame_index_at(now_ms));
    }
}

/// One frame of a variant's image string before it is checked against the catalog.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameSpec {
    pub file: String,
    pub modifications: String,
    pub duration: u32,
}

/// Parse the compact image syntax `file[~MODS][:ms], file2[~MODS][:ms], ...`.
///
/// Commas and colons inside parentheses belong to modification arguments
/// (`~BLIT(a.png,1,2)`) and do not split. A duration that is not a number
/// falls back to [`DEFAULT_FRAME_DURATION`].
pub fn parse_frames(spec: &str) -> Vec<FrameSpec> {
    split_outside_parens(spec, ',')
        .into_iter()
        .map(|frame| {
            let items = split_outside_parens(&frame, ':');
            let head = items.first().cloned().unwrap_or_default();
            let duration = if items.len() > 1 {
                items
                    .last()
                    .and_then(|d| d.parse().ok())
                    .unwrap_or(DEFAULT_FRAME_DURATION)
            } else {
                DEFAULT_FRAME_DURATION
            };
            let (file, modifications) = match head.split_once('~') {
                Some((file, mods)) => (file.to_string(), mods.to_string()),
                None => (head, String::new()),
            };
            FrameSpec {
                file,
                modifications,
                duration,
            }
        })
        .collect()
}

fn split_outside_parens(s: &str, sep: char) -> Vec<String> {
    let mut parts = Vec::new();
    let mut depth = 0usize;
    let mut current = String::new();
    for c in s.chars() {
        match c {
            '(' => depth += 1,
            ')' => depth = depth.saturating_sub(1),
            _ => {}
        }
        if c == sep && depth == 0 {
            parts.push(std::mem::take(&mut current));
        } else {
            current.push(c);
        }
    }
    parts.push(current);
    parts
        .into_iter()
        .map(|p| p.trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
