//! Output naming and the streaming-layout finalize step

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use tracing::{debug, info, warn};

use crate::ports::StreamFinalizer;

/// Container extension appended to names that lack one
pub const CONTAINER_EXTENSION: &str = "mp4";

/// Marker for the intermediate file of a streaming pass
pub const TEMP_MARKER: &str = "_temp";

/// Output file name for `name`.
///
/// Streamable requests get the temporary marker, and the container extension
/// is appended when the name does not mention it.
pub fn validated_file_name(name: &str, streamable: bool) -> String {
    let name = if streamable {
        format!("{}{}", name, TEMP_MARKER)
    } else {
        name.to_string()
    };

    if name.contains(CONTAINER_EXTENSION) {
        name
    } else {
        format!("{}.{}", name, CONTAINER_EXTENSION)
    }
}

/// Rewrite `working` into `target` with the index ahead of the media data.
///
/// On success the working file is removed and `target` is returned. Any
/// failure falls back to the untouched working file.
pub fn finalize_streamable(finalizer: &dyn StreamFinalizer, working: &Path, target: &Path) -> PathBuf {
    match finalizer.rewrite(working, target) {
        Ok(true) => {
            info!(output = %target.display(), "Rewrote output for streaming");
            remove_quietly(working);
            target.to_path_buf()
        }
        Ok(false) => {
            warn!(working = %working.display(), "Streaming rewrite not applicable, keeping working file");
            remove_quietly(target);
            working.to_path_buf()
        }
        Err(err) => {
            warn!(error = %err, working = %working.display(), "Streaming rewrite failed, keeping working file");
            remove_quietly(target);
            working.to_path_buf()
        }
    }
}

/// Remove `path`, ignoring a file that is already gone
pub fn remove_quietly(path: &Path) {
    match fs::remove_file(path) {
        Ok(()) => debug!(path = %path.display(), "Removed file"),
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => warn!(error = %err, path = %path.display(), "Could not remove file"),
    }
}
