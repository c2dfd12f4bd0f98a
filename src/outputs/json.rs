//! JSON file output for the `fetch` command.
//!
//! # Output Structure
//!
//! ```text
//! output_dir/
//! └── chwang.json
//! ```
//!
//! The file is overwritten on every run; it always holds the latest envelope,
//! including failed ones.

use crate::models::FetchResult;
use std::error::Error;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{info, instrument};

/// Path the envelope for `source_id` is written to inside `output_dir`.
pub fn result_path(output_dir: &str, source_id: &str) -> PathBuf {
    Path::new(output_dir).join(format!("{source_id}.json"))
}

/// Write a [`FetchResult`] envelope to a JSON file.
///
/// Creates `output_dir` if needed and overwrites any previous file for the
/// same source.
///
/// # Arguments
///
/// * `result` - The envelope to serialize, whatever its status
/// * `output_dir` - Directory the file is written into
///
/// # Returns
///
/// The path written on success, or an error if serialization, directory
/// creation or the write fails.
///
/// # Output Path
///
/// The file is written to: `{output_dir}/{source_id}.json`
#[instrument(level = "info", skip_all, fields(output_dir = %output_dir))]
pub async fn write_result(result: &FetchResult, output_dir: &str) -> Result<PathBuf, Box<dyn Error>> {
    let json = serde_json::to_string_pretty(result)?;
    fs::create_dir_all(output_dir).await?;

    let path = result_path(output_dir, &result.source_id);
    info!(path = %path.display(), "Writing JSON");
    fs::write(&path, json).await?;
    info!(path = %path.display(), count = result.items.len(), "Wrote news JSON file");
    Ok(path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::{NewsItem, Status};

    #[test]
    fn test_result_path() {
        assert_eq!(
            result_path("/tmp/out", "chwang"),
            PathBuf::from("/tmp/out/chwang.json")
        );
    }

    #[tokio::test]
    async fn test_write_result_round_trips() {
        let dir = std::env::temp_dir().join(format!("chwang_news_test_{}", std::process::id()));
        let dir = dir.to_string_lossy().to_string();
        let result = FetchResult {
            status: Status::Success,
            source_id: "chwang".to_string(),
            updated_time: 42,
            items: vec![NewsItem::new("https://www.chwang.com/a".to_string(), "T1", "")],
            message: None,
        };

        let path = write_result(&result, &dir).await.unwrap();
        let written = fs::read_to_string(&path).await.unwrap();
        let parsed: FetchResult = serde_json::from_str(&written).unwrap();
        assert_eq!(parsed, result);

        let _ = fs::remove_dir_all(&dir).await;
    }
}
