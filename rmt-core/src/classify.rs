//! Change classification for a single relative path.
//!
//! Classification happens in two steps so the caller only pays for the
//! diffs that matter:
//!
//! 1. Build a [`Presence`] from three existence checks (local tree, fetched
//!    remote snapshot, base cache).
//! 2. Ask it which base-relative diffs are needed
//!    ([`Presence::needs_local_diff`], [`Presence::needs_remote_diff`]), run
//!    only those, and turn the answers into [`ClassificationFacts`].
//!
//! [`classify`] then maps the facts to an [`Action`]. A direct
//! local-vs-remote comparison is never part of classification.

use std::fmt;

/// What a sync run does with one path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Action {
    /// Nothing changed since the last sync.
    Skip,
    /// New local file, never synced: upload it.
    PushNew,
    /// New remote file, never synced: download it.
    PullNew,
    /// Only the local copy changed since base.
    Push,
    /// Only the remote copy changed since base.
    Pull,
    /// Both copies changed since base (or there is no base): three-way merge.
    Merge,
    /// Deleted locally, unchanged remotely: delete the remote copy.
    DeleteRemote,
    /// Deleted locally but edited remotely: the remote edit wins.
    ConflictKeepRemote,
    /// Gone on both sides while a base entry lingers: drop the base entry.
    ForgetBase,
}

impl Action {
    /// Short label used in progress output.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Skip => "skip",
            Self::PushNew => "push (new)",
            Self::PullNew => "pull (new)",
            Self::Push => "push",
            Self::Pull => "pull",
            Self::Merge => "merge",
            Self::DeleteRemote => "delete remote",
            Self::ConflictKeepRemote => "conflict",
            Self::ForgetBase => "forget",
        }
    }
}

impl fmt::Display for Action {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

/// Which of the three locations hold a copy of a path.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct Presence {
    /// File exists in the local tree.
    pub has_local: bool,
    /// File exists in the fetched remote snapshot.
    pub has_remote: bool,
    /// A base snapshot exists for the path.
    pub has_base: bool,
}

impl Presence {
    /// Build from three existence checks.
    pub fn new(has_local: bool, has_remote: bool, has_base: bool) -> Self {
        Self {
            has_local,
            has_remote,
            has_base,
        }
    }

    /// Local-vs-base diff is only meaningful when both sides exist and a
    /// base exists to compare against.
    pub fn needs_local_diff(&self) -> bool {
        self.has_local && self.has_remote && self.has_base
    }

    /// Remote-vs-base diff decides both the both-present case and the
    /// locally-deleted case.
    pub fn needs_remote_diff(&self) -> bool {
        self.has_remote && self.has_base
    }

    /// Combine presence with the diff results the caller computed.
    ///
    /// Diffs that were not needed are ignored. When both sides exist but no
    /// base does, both sides count as changed so an unestablished pairing is
    /// never skipped.
    pub fn with_diffs(
        self,
        local_changed: Option<bool>,
        remote_changed: Option<bool>,
    ) -> ClassificationFacts {
        let no_base_pair = self.has_local && self.has_remote && !self.has_base;
        let local_changed = if no_base_pair {
            true
        } else if self.needs_local_diff() {
            local_changed.unwrap_or(true)
        } else {
            false
        };
        let remote_changed = if no_base_pair {
            true
        } else if self.needs_remote_diff() {
            remote_changed.unwrap_or(true)
        } else {
            false
        };

        ClassificationFacts {
            has_local: self.has_local,
            has_remote: self.has_remote,
            has_base: self.has_base,
            local_changed,
            remote_changed,
        }
    }
}

/// Everything classification knows about one path in one run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ClassificationFacts {
    /// File exists in the local tree.
    pub has_local: bool,
    /// File exists in the fetched remote snapshot.
    pub has_remote: bool,
    /// A base snapshot exists.
    pub has_base: bool,
    /// Local copy differs from base.
    pub local_changed: bool,
    /// Remote copy differs from base.
    pub remote_changed: bool,
}

impl ClassificationFacts {
    /// Presence part of the facts.
    pub fn presence(&self) -> Presence {
        Presence::new(self.has_local, self.has_remote, self.has_base)
    }
}

/// Decide the action for one path.
pub fn classify(facts: &ClassificationFacts) -> Action {
    match (facts.has_local, facts.has_remote, facts.has_base) {
        // Cannot come from a tree walk; nothing to do.
        (false, false, false) => Action::Skip,
        (false, true, false) => Action::PullNew,
        (false, false, true) => Action::ForgetBase,
        (false, true, true) => {
            if facts.remote_changed {
                Action::ConflictKeepRemote
            } else {
                Action::DeleteRemote
            }
        }
        // Remote deletions are not propagated; the local copy is republished.
        (true, false, _) => Action::PushNew,
        (true, true, false) => Action::Merge,
        (true, true, true) => match (facts.local_changed, facts.remote_changed) {
            (false, false) => Action::Skip,
            (true, false) => Action::Push,
            (false, true) => Action::Pull,
            (true, true) => Action::Merge,
        },
    }
}
