//! Table Names
//!
//! TigerStyle: Closed set of tables, one canonical spelling each.

use serde::{Deserialize, Serialize};

// =============================================================================
// Table
// =============================================================================

/// Tables the club ledger knows about.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Table {
    Members,
    Sessions,
    Drinks,
    DrinkTypes,
    Feedback,
    Quotes,
}

impl Table {
    /// Canonical name used internally and at the provider boundary.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Members => "Members",
            Self::Sessions => "Sessions",
            Self::Drinks => "Drinks",
            Self::DrinkTypes => "DrinkTypes",
            Self::Feedback => "Feedback",
            Self::Quotes => "Quotes",
        }
    }

    /// All tables in declaration order.
    #[must_use]
    pub fn all() -> &'static [Table] {
        &[
            Self::Members,
            Self::Sessions,
            Self::Drinks,
            Self::DrinkTypes,
            Self::Feedback,
            Self::Quotes,
        ]
    }

    /// Look up a canonical name (case-insensitive).
    #[must_use]
    pub fn from_canonical(name: &str) -> Option<Self> {
        Self::all()
            .iter()
            .copied()
            .find(|t| t.as_str().eq_ignore_ascii_case(name))
    }

    /// Resolve any singular/plural/case spelling to a table.
    #[must_use]
    pub fn parse(name: &str) -> Option<Self> {
        Self::from_canonical(&resolve_name(name))
    }
}

impl std::fmt::Display for Table {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

// =============================================================================
// Name Resolution
// =============================================================================

/// Normalize a table reference to its canonical spelling.
///
/// Capitalizes the first character, lowercases the rest with one trailing
/// `s` removed, then pluralizes again unless the singular form is itself
/// canonical (`Feedback`). The output is only canonical for names this rule
/// can produce; use [`Table::parse`] to validate membership.
#[must_use]
pub fn resolve_name(name: &str) -> String {
    let mut chars = name.chars();
    let Some(first) = chars.next() else {
        return String::new();
    };
    let rest = chars.as_str();
    let rest = rest.strip_suffix('s').unwrap_or(rest);

    let mut resolved: String = first.to_uppercase().collect();
    resolved.push_str(&rest.to_lowercase());

    if !Table::all().iter().any(|t| t.as_str() == resolved) {
        resolved.push('s');
    }
    resolved
}

// =============================================================================
// Tests
// =============================================================================
