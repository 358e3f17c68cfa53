//! An upload extracted from a request and spooled to disk.

use std::io;
use std::path::{Path, PathBuf};

use serde::Serialize;
use tokio::fs::{self, File};

/// A file pulled out of a multipart request body.
///
/// The handle is open read-write and rewound to position zero; for an
/// honest request the first `size` bytes are exactly the uploaded
/// content. When the client declared more than it sent, the spool file
/// is shorter than `size` and reads simply end early.
///
/// The spool file belongs to the caller: persist it by renaming `path`
/// into place, or drop it with [`Upload::discard`].
#[derive(Debug)]
pub struct Upload {
    /// Spooled content, positioned at the start.
    pub file: File,
    /// Declared byte length of the uploaded content.
    pub size: u64,
    /// Client-supplied filename, reduced to a safe base name.
    pub filename: String,
    /// Location of the spool file.
    pub path: PathBuf,
}

impl Upload {
    /// The `(content, size, filename)` triple, giving up the spool path.
    pub fn into_parts(self) -> (File, u64, String) {
        (self.file, self.size, self.filename)
    }

    /// Where the spool file lives.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// A serializable summary of this upload.
    pub fn info(&self) -> UploadInfo {
        UploadInfo {
            filename: self.filename.clone(),
            size: self.size,
        }
    }

    /// Close the handle and remove the spool file.
    pub async fn discard(self) -> io::Result<()> {
        drop(self.file);
        fs::remove_file(&self.path).await
    }
}

/// Summary of an accepted upload, for the hosting application to render.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadInfo {
    pub filename: String,
    pub size: u64,
}
