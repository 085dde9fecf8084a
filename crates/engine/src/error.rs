// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Error taxonomy (§7): kinds, not ad-hoc strings. Every phase method
//! wraps its cause as `"<PHASE> phase failed: <cause>"`; a failed
//! rollback joins both errors rather than discarding the original.

use nnc_core::ValidationError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("STAGING phase failed: {0}")]
    Staging(String),
    #[error("BACKUP phase failed: {0}")]
    Backup(String),
    #[error("SWAP phase failed: {0}")]
    Swap(String),
    #[error("MIGRATION phase failed: {0}")]
    Migration(String),
    #[error("VALIDATION phase failed: {0}")]
    Validation(String),
    #[error("COMMIT phase failed: {0}")]
    Commit(String),

    /// The rollback path itself failed after a phase failure — operator
    /// intervention required (§7 RollbackFailure).
    #[error("rollback failed ({rollback}) after original failure ({original})")]
    RollbackFailure { rollback: Box<UpdateError>, original: Box<UpdateError> },

    #[error("journal error: {0}")]
    Journal(#[from] nnc_storage::JournalError),

    #[error("a pending update already exists for this instance/version/phase")]
    AlreadyInProgress,

    #[error("update cancelled before the next phase began")]
    Cancelled,

    #[error("filesystem error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum ChainError {
    #[error(transparent)]
    Validation(#[from] ValidationError),

    #[error("router port error: {0}")]
    RouterPort(#[from] nnc_adapters::RouterPortError),

    #[error("routing chain {0} not found")]
    ChainNotFound(nnc_core::RoutingChainId),

    #[error("storage error: {0}")]
    Storage(#[from] nnc_storage::RoutingStateError),

    #[error("kill-switch lift rejected: hop {hop_order} interface is not healthy")]
    NotHealthy { hop_order: u8 },

    #[error("confirmation query after {0} returned no rows")]
    Confirmation(&'static str),

    #[error("vif directory error: {0}")]
    VifDirectory(#[from] nnc_adapters::VifDirectoryError),

    #[error("rollback store error: {0}")]
    Rollback(#[from] nnc_storage::RollbackStoreError),

    #[error("no unexpired rollback snapshot for this device")]
    NoRollbackAvailable,
}

#[derive(Debug, Error)]
pub enum PbrError {
    #[error("router port error: {0}")]
    RouterPort(#[from] nnc_adapters::RouterPortError),

    #[error("storage error: {0}")]
    Storage(#[from] nnc_storage::RoutingStateError),

    #[error("rollback store error: {0}")]
    Rollback(#[from] nnc_storage::RollbackStoreError),

    #[error("no unexpired rollback snapshot for this device")]
    NoRollbackAvailable,
}
