// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Execute(Command) -> CommandResult` (§4.7).

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A router operation against one command path (e.g. `/ip/firewall/mangle`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Action {
    Add,
    Remove,
    Set,
    Print,
}

impl Action {
    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Add => "add",
            Action::Remove => "remove",
            Action::Set => "set",
            Action::Print => "print",
        }
    }
}

impl std::fmt::Display for Action {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single router RPC: `path` is a MikroTik-style command path
/// (`/ip/firewall/mangle`, `/ip/route`, ...); `args` carries the
/// command-specific key/value parameters; `id` is the router-assigned
/// `.id` for `remove`/`set`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Command {
    pub path: String,
    pub action: Action,
    pub args: HashMap<String, String>,
    pub id: Option<String>,
}

impl Command {
    pub fn add(path: impl Into<String>, args: HashMap<String, String>) -> Self {
        Self { path: path.into(), action: Action::Add, args, id: None }
    }

    pub fn remove(path: impl Into<String>, id: impl Into<String>) -> Self {
        Self { path: path.into(), action: Action::Remove, args: HashMap::new(), id: Some(id.into()) }
    }

    pub fn set(path: impl Into<String>, id: impl Into<String>, args: HashMap<String, String>) -> Self {
        Self { path: path.into(), action: Action::Set, args, id: Some(id.into()) }
    }

    pub fn print(path: impl Into<String>, filter: HashMap<String, String>) -> Self {
        Self { path: path.into(), action: Action::Print, args: filter, id: None }
    }

    /// Convenience for the common `print?comment=<exact>` confirmation
    /// pattern used after every `add` (§9 Apply-Confirm-Merge).
    pub fn print_by_comment(path: impl Into<String>, comment: impl Into<String>) -> Self {
        let mut filter = HashMap::new();
        filter.insert("comment".to_string(), comment.into());
        Self::print(path, filter)
    }
}

/// The router's response to one [`Command`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    pub id: Option<String>,
    pub data: Vec<HashMap<String, String>>,
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok(id: Option<String>, data: Vec<HashMap<String, String>>) -> Self {
        Self { success: true, id, data, error: None }
    }

    pub fn err(message: impl Into<String>) -> Self {
        Self { success: false, id: None, data: Vec::new(), error: Some(message.into()) }
    }

    /// The `.id` of the first row returned, if any — used to confirm a
    /// chain rule or route after creation (§4.4 steps 1/3).
    pub fn first_id(&self) -> Option<&str> {
        self.data.first().and_then(|row| row.get(".id")).map(String::as_str)
    }
}
