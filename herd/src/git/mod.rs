//! Version-control collaborator
//!
//! [`GitClient`] is the seam between the reconciliation engine and git.
//! [`GitCli`] drives the real `git` binary; tests use the in-memory fake in
//! `mock`.

mod client;
mod command;
mod error;
#[cfg(test)]
pub mod mock;

pub use client::{AheadBehind, GitClient, MergeOutcome, local_ref, remote_ref};
pub use command::GitCli;
pub use error::GitError;
