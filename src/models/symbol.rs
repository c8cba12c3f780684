use crate::errors::{Result, StockWatchError};
use std::fmt;

/// Name of the child node that holds a symbol's trade record.
pub const TRADE_NODE: &str = "trade";

/// Canonical ticker symbol: exactly four upper-case ASCII letters.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Symbol(String);

/// What the observer should do with a node name found under the watched path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SymbolCandidate {
    /// Already canonical.
    Canonical(Symbol),
    /// Valid letters but not upper-case; carries the canonical form.
    NeedsNormalization(Symbol),
    Rejected(String),
}

impl Symbol {
    /// Parse a name of any case, upper-casing it.
    pub fn normalize(name: &str) -> Result<Self> {
        match Self::classify(name) {
            SymbolCandidate::Canonical(symbol) | SymbolCandidate::NeedsNormalization(symbol) => {
                Ok(symbol)
            }
            SymbolCandidate::Rejected(reason) => Err(StockWatchError::ValidationError(reason)),
        }
    }

    pub fn classify(name: &str) -> SymbolCandidate {
        if name == TRADE_NODE {
            return SymbolCandidate::Rejected(format!("'{}' is the reserved trade node", name));
        }
        if name.chars().count() != 4 || !name.chars().all(|c| c.is_ascii_alphabetic()) {
            return SymbolCandidate::Rejected(format!(
                "'{}' is not a four letter alphabetic symbol",
                name
            ));
        }

        let upper = name.to_ascii_uppercase();
        if upper == name {
            SymbolCandidate::Canonical(Symbol(upper))
        } else {
            SymbolCandidate::NeedsNormalization(Symbol(upper))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Symbol {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for Symbol {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
