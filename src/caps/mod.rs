//! Capability descriptors
//!
//! A [`Caps`] value describes the set of stream schemas an endpoint accepts.
//! It is either `ANY` (accepts everything), `EMPTY` (accepts nothing), or a
//! list of [`Structure`]s, any one of which is acceptable.
//!
//! Negotiation between one node and many listeners is plain intersection:
//!
//! ```text
//!   listener A: video/x-raw,width=[320,1920]
//!   listener B: video/x-raw,width=[640,3840]
//!   ---------------------------------------
//!   negotiated: video/x-raw,width=[640,1920]
//! ```
//!
//! Caps parse from and print to a compact text form via `FromStr` and
//! `Display`, e.g. `"video/x-raw,format={I420,NV12},framerate=30/1".parse()`.

mod parse;
pub mod structure;
pub mod value;

use std::fmt;

pub use parse::CapsParseError;
pub use structure::Structure;
pub use value::{Fraction, Value};

/// A capability descriptor
#[derive(Debug, Clone)]
pub struct Caps {
    any: bool,
    structures: Vec<Structure>,
}

impl Caps {
    /// Caps accepting any schema
    pub fn any() -> Self {
        Self {
            any: true,
            structures: Vec::new(),
        }
    }

    /// Caps accepting nothing
    pub fn empty() -> Self {
        Self {
            any: false,
            structures: Vec::new(),
        }
    }

    /// Caps with a single structure
    pub fn new(structure: Structure) -> Self {
        Self {
            any: false,
            structures: vec![structure],
        }
    }

    /// Caps accepting any of the given structures
    pub fn from_structures(structures: impl IntoIterator<Item = Structure>) -> Self {
        let mut caps = Self::empty();
        for s in structures {
            caps.append(s);
        }
        caps
    }

    /// Add an alternative structure (no-op on `ANY` or duplicates)
    pub fn append(&mut self, structure: Structure) {
        if !self.any && !self.structures.contains(&structure) {
            self.structures.push(structure);
        }
    }

    /// Whether these caps accept anything
    pub fn is_any(&self) -> bool {
        self.any
    }

    /// Whether these caps accept nothing
    pub fn is_empty(&self) -> bool {
        !self.any && self.structures.is_empty()
    }

    /// Whether these caps describe exactly one configuration
    pub fn is_fixed(&self) -> bool {
        !self.any && self.structures.len() == 1 && self.structures[0].is_fixed()
    }

    /// The alternatives, empty for `ANY` and `EMPTY`
    pub fn structures(&self) -> &[Structure] {
        &self.structures
    }

    /// Compute the caps accepted by both `self` and `other`
    pub fn intersect(&self, other: &Caps) -> Caps {
        if self.any {
            return other.clone();
        }
        if other.any {
            return self.clone();
        }

        let mut out = Caps::empty();
        for ours in &self.structures {
            for theirs in &other.structures {
                if let Some(s) = ours.intersect(theirs) {
                    out.append(s);
                }
            }
        }
        out
    }

    /// Whether `self` and `other` share at least one configuration
    pub fn can_intersect(&self, other: &Caps) -> bool {
        if self.is_empty() || other.is_empty() {
            return false;
        }
        if self.any || other.any {
            return true;
        }
        self.structures
            .iter()
            .any(|ours| other.structures.iter().any(|theirs| ours.can_intersect(theirs)))
    }
}

/// Structure order does not matter for equality
impl PartialEq for Caps {
    fn eq(&self, other: &Self) -> bool {
        self.any == other.any
            && self.structures.len() == other.structures.len()
            && self
                .structures
                .iter()
                .all(|s| other.structures.contains(s))
    }
}

impl Default for Caps {
    fn default() -> Self {
        Self::any()
    }
}

impl From<Structure> for Caps {
    fn from(s: Structure) -> Self {
        Caps::new(s)
    }
}

impl fmt::Display for Caps {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.any {
            return write!(f, "ANY");
        }
        if self.structures.is_empty() {
            return write!(f, "EMPTY");
        }
        for (i, s) in self.structures.iter().enumerate() {
            if i > 0 {
                write!(f, "; ")?;
            }
            write!(f, "{}", s)?;
        }
        Ok(())
    }
}
