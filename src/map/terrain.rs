use serde::{Deserialize, Serialize};
use std::fmt;

/// Terrain reported for cells outside the playable map.
pub const OFF_MAP_USER: &str = "_off^_usr";

/// An opaque terrain code such as `Gg` or `Ww^Bsb|`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TerrainCode(String);

impl TerrainCode {
    pub fn new(code: impl Into<String>) -> Self {
        Self(code.into())
    }

    pub fn off_map() -> Self {
        Self::new(OFF_MAP_USER)
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TerrainCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TerrainCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
enum MatchTerm {
    /// Flips the result returned by every following term.
    Not,
    Exact(String),
    Pattern(String),
}

/// A predicate over terrain codes, parsed from a comma-separated list.
///
/// Terms are tried in order and the first one that matches decides. A `!`
/// term inverts the answer of the terms after it, so `"!,Ww*"` accepts
/// everything except water and `"Gg,!,G*"` accepts `Gg` but no other grass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TerrainMatch {
    terms: Vec<MatchTerm>,
    matches_all: bool,
}

impl TerrainMatch {
    pub fn any() -> Self {
        Self {
            terms: vec![MatchTerm::Pattern("*".to_string())],
            matches_all: true,
        }
    }

    pub fn parse(list: &str) -> Self {
        let terms: Vec<MatchTerm> = list
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(|t| {
                if t == "!" {
                    MatchTerm::Not
                } else if t.contains('*') {
                    MatchTerm::Pattern(t.to_string())
                } else {
                    MatchTerm::Exact(t.to_string())
                }
            })
            .collect();
        let matches_all = matches!(terms.as_slice(), [MatchTerm::Pattern(p)] if p == "*");
        Self { terms, matches_all }
    }

    pub fn is_any(&self) -> bool {
        self.matches_all
    }

    pub fn matches(&self, code: &TerrainCode) -> bool {
        if self.matches_all {
            return true;
        }
        let mut result = true;
        for term in &self.terms {
            match term {
                MatchTerm::Not => result = !result,
                MatchTerm::Exact(e) if e == code.as_str() => return result,
                MatchTerm::Pattern(p) if wildcard_match(p, code.as_str()) => return result,
                _ => {}
            }
        }
        !result
    }
}

/// Glob match where `*` stands for any run of characters.
fn wildcard_match(pattern: &str, text: &str) -> bool {
    let p = pattern.as_bytes();
    let t = text.as_bytes();
    let (mut pi, mut ti) = (0, 0);
    let mut star: Option<(usize, usize)> = None;

    while ti < t.len() {
        if pi < p.len() && p[pi] == b'*' {
            star = Some((pi, ti));
            pi += 1;
        } else if pi < p.len() && p[pi] == t[ti] {
            pi += 1;
            ti += 1;
        } else if let Some((sp, st)) = star {
            pi = sp + 1;
            ti = st + 1;
            star = Some((sp, st + 1));
        } else {
            return false;
        }
    }
    p[pi..].iter().all(|&c| c == b'*')
}
