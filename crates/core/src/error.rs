// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Shared error kinds (§7). Crate-specific operations layer their own
//! `thiserror` enums on top of these (see `nnc-engine::UpdateError`,
//! `nnc-engine::ChainError`, `nnc-storage::JournalError`); this module only
//! holds the kinds common enough to be referenced directly from `nnc-core`.

use thiserror::Error;

/// Bad input rejected before any side effect runs (§7 ValidationError).
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("chain must have between 2 and 5 hops, got {0}")]
    HopCountOutOfRange(usize),

    #[error("duplicate interface {0} in chain hops")]
    DuplicateInterface(String),

    #[error("interface {0} does not exist")]
    UnknownInterface(String),

    #[error("invalid MAC address: {0}")]
    InvalidMac(String),

    #[error("missing required field: {0}")]
    MissingField(&'static str),
}

/// Catch-all for cross-cutting core errors (id parsing, etc).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("invariant violation: {0}")]
    InvariantViolation(String),
}
