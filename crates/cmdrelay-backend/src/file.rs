//! Sandboxed, bounded file chunk reads.

use std::io::SeekFrom;
use std::path::{Component, Path, PathBuf};

use base64::Engine;
use base64::engine::general_purpose::STANDARD;
use cmdrelay_core::{Request, Response};
use thiserror::Error;
use tokio::io::{AsyncReadExt, AsyncSeekExt};
use tracing::debug;

/// Why a path was refused before any file system access.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum PathRejection {
    #[error("path required")]
    Empty,

    #[error("invalid path")]
    Escapes,
}

/// Root directory that all file reads are confined to.
#[derive(Debug, Clone)]
pub struct Sandbox {
    root: PathBuf,
}

impl Sandbox {
    /// Create a sandbox rooted at `root` (normalized lexically).
    pub fn new(root: impl AsRef<Path>) -> Self {
        let mut normalized = PathBuf::new();
        for component in root.as_ref().components() {
            match component {
                Component::CurDir => {}
                Component::ParentDir => {
                    normalized.pop();
                }
                other => normalized.push(other),
            }
        }
        Self { root: normalized }
    }

    /// Map a request path onto an absolute path inside the sandbox.
    ///
    /// Purely lexical: `.` is dropped, `..` pops a component, and root or
    /// prefix components are ignored so absolute-looking paths are re-rooted
    /// under the sandbox. The result must stay under the root component-wise.
    pub fn resolve(&self, path: &str) -> Result<PathBuf, PathRejection> {
        let path = path.trim();
        if path.is_empty() {
            return Err(PathRejection::Empty);
        }

        let mut resolved = self.root.clone();
        for component in Path::new(path).components() {
            match component {
                Component::Prefix(_) | Component::RootDir | Component::CurDir => {}
                Component::ParentDir => {
                    if !resolved.pop() {
                        return Err(PathRejection::Escapes);
                    }
                }
                Component::Normal(segment) => resolved.push(segment),
            }
        }

        if resolved.starts_with(&self.root) {
            Ok(resolved)
        } else {
            Err(PathRejection::Escapes)
        }
    }
}

/// Reads a bounded slice of a file under a [`Sandbox`].
#[derive(Debug, Clone)]
pub struct FileChunkReader {
    sandbox: Sandbox,
}

impl FileChunkReader {
    pub const fn new(sandbox: Sandbox) -> Self {
        Self { sandbox }
    }

    /// Read up to `limit` bytes at `offset` and fill `base` with the chunk.
    pub async fn read_chunk(&self, request: &Request, base: Response) -> Response {
        let offset = request.clamped_offset();
        let limit = request.clamped_limit();

        let path = match self.sandbox.resolve(&request.path) {
            Ok(path) => path,
            Err(rejection) => {
                debug!(
                    request_id = %request.request_id,
                    path = %request.path,
                    reason = %rejection,
                    "File request rejected"
                );
                return base.fail(rejection.to_string());
            }
        };

        let mut file = match tokio::fs::File::open(&path).await {
            Ok(file) => file,
            Err(e) => return base.fail(e.to_string()),
        };

        // Both values are clamped to be non-negative and limit to 1 MiB.
        let start = offset.unsigned_abs();
        let want = usize::try_from(limit).unwrap_or(0);

        if let Err(e) = file.seek(SeekFrom::Start(start)).await {
            return base.fail(e.to_string());
        }

        let mut buf = vec![0u8; want];
        let mut filled = 0;
        while filled < want {
            match file.read(&mut buf[filled..]).await {
                Ok(0) => break,
                Ok(n) => filled += n,
                Err(e) if filled == 0 => return base.fail(e.to_string()),
                Err(_) => break,
            }
        }
        buf.truncate(filled);

        debug!(
            request_id = %request.request_id,
            path = %path.display(),
            offset,
            limit,
            bytes = filled,
            "Read file chunk"
        );

        let mut base = base;
        base.file_b64 = STANDARD.encode(&buf);
        base.next_offset = offset + i64::try_from(filled).unwrap_or(0);
        base.eof = filled < want;
        base.output = "file chunk read".to_string();
        base.succeed()
    }
}
