//! Project import pipeline.
//!
//! Clones a project's repository, discovers its rulebooks and mirrors them
//! into the database. See [`ProjectImportService`].

mod archive;
mod git;
mod imports;
mod rulebooks;
mod scanner;

#[cfg(test)]
pub mod testing;

pub use archive::ArchiveStore;
pub use git::{ArchiveFormat, CloneOptions, GitCli, GitClient, GitError, GitRepo};
pub use imports::{ImportError, ImportMode, ProjectImportService};
pub use scanner::{RulebookInfo, RulebookScanner};
