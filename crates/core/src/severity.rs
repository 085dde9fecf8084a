// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! Update severity classification (§4.2).

use serde::{Deserialize, Serialize};

/// Severity of an available update, driving the scheduler's auto-apply
/// decision (§4.2): only CRITICAL updates are applied automatically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Severity {
    Patch,
    Minor,
    Major,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "CRITICAL",
            Severity::Major => "MAJOR",
            Severity::Minor => "MINOR",
            Severity::Patch => "PATCH",
        }
    }

    pub fn auto_applies(&self) -> bool {
        matches!(self, Severity::Critical)
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

const CRITICAL_KEYWORDS: &[&str] =
    &["security", "vulnerability", "cve-", "exploit", "patch", "critical", "urgent", "hotfix"];

/// Semver-ish version split into (major, minor, patch). Tolerant of a
/// leading `v` and of missing components (treated as `0`).
fn parse_version(v: &str) -> (u64, u64, u64) {
    let v = v.trim().trim_start_matches('v');
    let core = v.split(['-', '+']).next().unwrap_or(v);
    let mut parts = core.split('.');
    let major = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let minor = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    let patch = parts.next().and_then(|p| p.parse().ok()).unwrap_or(0);
    (major, minor, patch)
}

/// Classify an available update per §4.2's rules.
///
/// Release-notes keyword match takes priority over semver comparison;
/// ties (identical or non-parsing versions) fall back to PATCH.
pub fn classify(current_version: &str, new_version: &str, release_notes: &str) -> Severity {
    let notes_lower = release_notes.to_lowercase();
    if CRITICAL_KEYWORDS.iter().any(|kw| notes_lower.contains(kw)) {
        return Severity::Critical;
    }

    let (cmaj, cmin, _) = parse_version(current_version);
    let (nmaj, nmin, _) = parse_version(new_version);

    if nmaj > cmaj {
        Severity::Major
    } else if nmaj == cmaj && nmin > cmin {
        Severity::Minor
    } else {
        Severity::Patch
    }
}
