//! Output writers for one-shot runs.
//!
//! # Submodules
//!
//! - [`json`]: writes the [`crate::models::FetchResult`] envelope to `{dir}/{source_id}.json`

pub mod json;
