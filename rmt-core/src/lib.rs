//! # rmt-core
//!
//! Pure logic for rmt (no I/O, instant tests).
//!
//! This crate decides *what* a sync should do with each file and formats
//! what the user is told about it. It never touches the filesystem or spawns
//! a process; `rmt-sync` gathers the facts and carries out the decisions.
//!
//! ## Design Philosophy
//!
//! The classifier is a total function from presence and diff facts to an
//! [`Action`]. Because it is pure, every branch of the decision table is
//! covered by plain unit tests.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod classify;
pub mod report;

pub use classify::{classify, Action, ClassificationFacts, Presence};
pub use report::{action_line, conflict_notice, summary, ReportEntry, SyncReport};
