// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! `Query(StateQuery) -> Resources` (§4.7): read-only reconciliation
//! queries against router state, used by the PBR Engine and Chain Router
//! to compare desired state against what the router actually holds.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// A read against one command path, optionally narrowed to specific
/// fields and/or filtered by exact key/value match (e.g. listing every
/// mangle rule owned by a chain via `comment=nnc-chain-<id>-hop1`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StateQuery {
    pub path: String,
    pub fields: Option<Vec<String>>,
    pub filter: Option<HashMap<String, String>>,
}

impl StateQuery {
    pub fn new(path: impl Into<String>) -> Self {
        Self { path: path.into(), fields: None, filter: None }
    }

    pub fn with_fields(mut self, fields: Vec<String>) -> Self {
        self.fields = Some(fields);
        self
    }

    pub fn with_filter(mut self, filter: HashMap<String, String>) -> Self {
        self.filter = Some(filter);
        self
    }

    /// Narrow to rows carrying an exact `comment`, the mechanism the
    /// Chain Router and PBR Engine use to find rules they own (§4.4/§4.5).
    pub fn by_comment(path: impl Into<String>, comment: impl Into<String>) -> Self {
        let mut filter = HashMap::new();
        filter.insert("comment".to_string(), comment.into());
        Self::new(path).with_filter(filter)
    }
}

/// The rows returned by a [`StateQuery`].
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Resources {
    pub resources: Vec<HashMap<String, String>>,
}

impl Resources {
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.resources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.resources.is_empty()
    }

    /// Distinct `comment` values carried by the returned rows, used to
    /// detect rules the reconciler no longer has a desired-state
    /// counterpart for (§4.5 orphan cleanup).
    pub fn comments(&self) -> Vec<&str> {
        self.resources.iter().filter_map(|row| row.get("comment").map(String::as_str)).collect()
    }
}
