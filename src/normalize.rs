//! Assembles the [`FetchResult`] envelope.
//!
//! This is the only place that turns pipeline outcomes into the public
//! status vocabulary.

use crate::error::FetchError;
use crate::models::{FetchResult, NewsItem, Status};
use crate::utils::now_millis;
use itertools::Itertools;
use tracing::debug;

/// Public status for a failed invocation, from the last underlying error.
pub fn classify(error: &FetchError) -> Status {
    match error.root() {
        FetchError::Timeout { .. } => Status::Timeout,
        FetchError::Render(_) => Status::Error,
        FetchError::NotFound(_) | FetchError::Parse(_) => Status::Failure,
        FetchError::Exhausted { .. } => Status::Error,
    }
}

/// Build the envelope for one invocation.
///
/// On success duplicate ids are collapsed, keeping the first occurrence so
/// presentation order is preserved. On failure `items` is empty and
/// `message` carries the error text.
pub fn assemble(source_id: &str, outcome: Result<Vec<NewsItem>, FetchError>) -> FetchResult {
    match outcome {
        Ok(items) => {
            let total = items.len();
            let items: Vec<NewsItem> = items
                .into_iter()
                .unique_by(|item| item.id.clone())
                .collect();
            if items.len() != total {
                debug!(
                    dropped = total - items.len(),
                    "Collapsed duplicate news items"
                );
            }
            FetchResult {
                status: Status::Success,
                source_id: source_id.to_string(),
                updated_time: now_millis(),
                items,
                message: None,
            }
        }
        Err(e) => FetchResult {
            status: classify(&e),
            source_id: source_id.to_string(),
            updated_time: now_millis(),
            items: Vec::new(),
            message: Some(e.to_string()),
        },
    }
}
