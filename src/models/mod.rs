//! Data models for the EDA backend.
//!
//! Field names follow the snake_case wire format used by the controller API.

mod credential;
mod project;
mod rulebook;

pub use credential::*;
pub use project::*;
pub use rulebook::*;

use serde::{Deserialize, Deserializer};

/// Deserialize a present-but-possibly-null field into `Some(value)`.
///
/// Combined with `#[serde(default)]` this distinguishes an omitted field
/// (`None`) from an explicit `null` (`Some(None)`) in partial updates.
pub(crate) fn deserialize_some<'de, T, D>(deserializer: D) -> Result<Option<T>, D::Error>
where
    T: Deserialize<'de>,
    D: Deserializer<'de>,
{
    T::deserialize(deserializer).map(Some)
}
