//! Export file checks

use std::path::Path;

use tracing::info;

use crate::error::{E2eError, E2eResult};

/// Check that an exported file is non-empty and mentions at least one of
/// `expected_any` (typically column headers). An empty `expected_any` only
/// checks the size.
pub fn verify_download(path: &Path, expected_any: &[String]) -> E2eResult<u64> {
    let size = std::fs::metadata(path)?.len();
    if size == 0 {
        return Err(E2eError::AssertionFailed(format!(
            "Downloaded file {} is empty",
            path.display()
        )));
    }

    if !expected_any.is_empty() {
        let bytes = std::fs::read(path)?;
        let content = String::from_utf8_lossy(&bytes);
        if !expected_any.iter().any(|h| content.contains(h.as_str())) {
            return Err(E2eError::AssertionFailed(format!(
                "Downloaded file {} contains none of {:?}",
                path.display(),
                expected_any
            )));
        }
    }

    info!("Verified download {} ({} bytes)", path.display(), size);
    Ok(size)
}
