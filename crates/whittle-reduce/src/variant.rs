//! Named strategy variants: pure configuration over the reduction engine.
//!
//! Each variant fixes which reducer algorithm runs, at which granularity,
//! and how the progress estimate scales. The set is closed -- a variant
//! enum rather than an open registry -- so an engine can be constructed
//! from a name with no runtime type checks.

use std::fmt;
use std::str::FromStr;

use whittle_core::{CheckOnly, CollapseEmptyBraces, Granularity, LoadedFile, Minimize, Reducer};

/// A named reduction strategy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Variant {
    /// No reduction: yield the test case once to confirm it still
    /// reproduces. A pipeline gate, limited to a single file.
    Check,
    /// Line minimization that collapses emptied brace pairs between
    /// removals.
    CollapseBraces,
    /// Byte-level minimization.
    Chars,
    /// Minimization of bytes inside quoted string literals.
    JsChars,
    /// Line-level minimization.
    Lines,
}

impl Variant {
    /// All variants, in pipeline order.
    pub const ALL: &'static [Variant] = &[
        Variant::Check,
        Variant::Lines,
        Variant::CollapseBraces,
        Variant::JsChars,
        Variant::Chars,
    ];

    pub fn name(self) -> &'static str {
        match self {
            Variant::Check => "check",
            Variant::CollapseBraces => "collapsebraces",
            Variant::Chars => "chars",
            Variant::JsChars => "jschars",
            Variant::Lines => "lines",
        }
    }

    /// The granularity files are loaded at.
    pub fn granularity(self) -> Granularity {
        match self {
            Variant::Chars => Granularity::Bytes,
            Variant::JsChars => Granularity::JsStrings,
            Variant::Check | Variant::CollapseBraces | Variant::Lines => Granularity::Lines,
        }
    }

    /// Fixed factor applied to the fresh progress estimate. The
    /// brace-collapsing schedule proposes extra candidates between
    /// removals, so its bound doubles.
    pub fn estimate_scale(self) -> u64 {
        match self {
            Variant::CollapseBraces => 2,
            _ => 1,
        }
    }

    /// True for the degenerate no-reduction variant.
    pub fn is_check(self) -> bool {
        self == Variant::Check
    }

    pub(crate) fn build_reducer(self, file: LoadedFile) -> Box<dyn Reducer> {
        match self {
            Variant::Check => Box::new(CheckOnly::new(file)),
            Variant::CollapseBraces => Box::new(CollapseEmptyBraces::new(file)),
            Variant::Chars | Variant::JsChars | Variant::Lines => Box::new(Minimize::new(file)),
        }
    }
}

impl fmt::Display for Variant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for Variant {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Variant::ALL
            .iter()
            .copied()
            .find(|v| v.name() == s)
            .ok_or_else(|| format!("unknown strategy variant: {s:?}"))
    }
}
