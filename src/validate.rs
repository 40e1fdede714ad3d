//! Post-edit validation.
//!
//! There is no parser for the host language, so the check is structural: an
//! edit may not turn a delimiter pair that was balanced before into one that
//! is unbalanced after. Pre-existing imbalance is tolerated.

use crate::scope::{Balance, Delimiter, ScopeScanner};
use thiserror::Error;

/// Delimiter pairs checked after a task's ops run.
pub const CHECKED_DELIMITERS: [Delimiter; 3] =
    [Delimiter::Brace, Delimiter::Paren, Delimiter::Bracket];

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum BalanceError {
    #[error("edit unbalanced '{open}'/'{close}': net depth {depth}, lowest depth {min_depth}")]
    Introduced {
        open: char,
        close: char,
        depth: isize,
        min_depth: isize,
    },
}

/// Check one delimiter pair.
pub fn check_balance(before: &str, after: &str, delimiter: Delimiter) -> Result<(), BalanceError> {
    let scanner = ScopeScanner::new(delimiter);
    if !scanner.balance(before).is_balanced() {
        return Ok(());
    }

    let balance: Balance = scanner.balance(after);
    if balance.is_balanced() {
        return Ok(());
    }

    Err(BalanceError::Introduced {
        open: delimiter.open(),
        close: delimiter.close(),
        depth: balance.depth,
        min_depth: balance.min_depth,
    })
}

/// Check every pair in [`CHECKED_DELIMITERS`].
pub fn check_all(before: &str, after: &str) -> Result<(), BalanceError> {
    CHECKED_DELIMITERS
        .iter()
        .try_for_each(|&delimiter| check_balance(before, after, delimiter))
}
