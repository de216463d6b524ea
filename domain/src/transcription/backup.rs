use crate::error::Error;
use log::*;
use sha2::{Digest, Sha256};
use std::path::{Path, PathBuf};
use tokio::fs::{self, File, OpenOptions};
use tokio::io::AsyncWriteExt;

/// Append-only raw audio file for one session.
///
/// Chunks are written exactly as received; the format is whatever the capture
/// client produces. The file outlives the session so audio can be recovered by
/// hand when transcription failed.
pub(crate) struct AudioBackup {
    path: PathBuf,
    file: File,
}

impl AudioBackup {
    /// Opens (creating if needed) the backup for `session_id` under `dir`.
    /// Restarting a session id appends to the existing file.
    pub(crate) async fn open(dir: &Path, session_id: &str) -> Result<Self, Error> {
        fs::create_dir_all(dir).await?;
        let path = dir.join(format!("{}.audio", file_stem(session_id)));
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        debug!("Audio backup for session {session_id} at {}", path.display());

        Ok(Self { path, file })
    }

    pub(crate) async fn append(&mut self, bytes: &[u8]) -> Result<(), Error> {
        self.file.write_all(bytes).await?;
        // tokio buffers writes on a blocking thread; flush hands them to the OS.
        self.file.flush().await?;
        Ok(())
    }

    pub(crate) fn path(&self) -> &Path {
        &self.path
    }
}

/// Session ids come from clients. The readable part keeps only
/// filesystem-safe characters; the digest of the raw id keeps distinct ids
/// (`a/b`, `a:b`, `a_b`) in distinct files.
fn file_stem(session_id: &str) -> String {
    let readable: String = session_id
        .chars()
        .take(64)
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect();
    let digest = Sha256::digest(session_id.as_bytes());
    let suffix = hex::encode(&digest[..8]);
    if readable.is_empty() {
        format!("session-{suffix}")
    } else {
        format!("{readable}-{suffix}")
    }
}
