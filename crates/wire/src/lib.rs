// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Router Port wire vocabulary (§4.7, §6): the narrow `Execute`/`Query`
//! command surface the core speaks against the MikroTik-style RPC
//! transport. This crate only defines the wire types; `nnc-adapters` owns
//! the transport and `nnc-engine` is the only consumer that builds
//! `Command`/`StateQuery` values.

mod checksum;
mod command;
mod query;

pub use checksum::{parse_checksum_line, select_checksum, ChecksumError};
pub use command::{Action, Command, CommandResult};
pub use query::{Resources, StateQuery};
