use std::path::{Path, PathBuf};

use crate::error::TftpError;

/// Maps a client-supplied name to a path under the server root.
///
/// Only the final path segment of the request is kept, so `a/b/c` serves
/// `<root>/c` and `../../etc/passwd` serves `<root>/passwd`. Dropping the
/// directory part outright means no `..` filtering is needed at all; the
/// trade-off is that files in subdirectories of the root cannot be requested.
pub fn resolve(filename: &str, root: &Path) -> Result<PathBuf, TftpError> {
    let name = Path::new(filename)
        .file_name()
        .ok_or_else(|| TftpError::PathError(filename.to_string()))?;
    Ok(root.join(name))
}
