//! Output-directory scan for tasks the engine no longer reports.

use std::io;
use std::path::Path;

/// Shorter ids would match unrelated files (`png`, `_`, `.`).
pub const MIN_TASK_ID_LEN: usize = 8;

/// Names of files in `dir` whose name contains `task_id`, sorted.
///
/// Matching is by substring, so an id that is a prefix of another task's
/// id also matches that task's files. Ids shorter than [`MIN_TASK_ID_LEN`]
/// match nothing.
pub async fn find_task_files(dir: &Path, task_id: &str) -> io::Result<Vec<String>> {
    if task_id.len() < MIN_TASK_ID_LEN {
        return Ok(Vec::new());
    }

    let mut entries = tokio::fs::read_dir(dir).await?;
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if !entry.file_type().await?.is_file() {
            continue;
        }
        if let Some(name) = entry.file_name().to_str() {
            if name.contains(task_id) {
                names.push(name.to_string());
            }
        }
    }
    names.sort();
    Ok(names)
}
