//! Ownership of Unix socket files on disk.
//!
//! A node that dies without cleaning up leaves its socket file behind, and a
//! fresh bind on that path fails with `AddrInUse`. Before binding, the path is
//! reclaimed only when it is a socket nobody answers on.

use std::fs;
use std::io;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::net::UnixStream;
use std::path::Path;

use tracing::{debug, warn};

use super::{ListenerError, TRANSPORT_TARGET};

/// Clears `path` for a new bind.
///
/// A missing path is left alone. A socket that refuses connections is
/// removed. A socket that still accepts, or anything that is not a socket,
/// is reported and left in place.
pub(crate) fn reclaim(path: &Path) -> Result<(), ListenerError> {
    let display = || path.display().to_string();
    let metadata = match fs::symlink_metadata(path) {
        Ok(metadata) => metadata,
        Err(error) if error.kind() == io::ErrorKind::NotFound => return Ok(()),
        Err(source) => {
            return Err(ListenerError::UnixMetadata {
                path: display(),
                source,
            });
        }
    };
    if !metadata.file_type().is_socket() {
        return Err(ListenerError::UnixNotSocket { path: display() });
    }

    match UnixStream::connect(path) {
        Ok(_live) => Err(ListenerError::UnixInUse { path: display() }),
        Err(error)
            if matches!(
                error.kind(),
                io::ErrorKind::ConnectionRefused | io::ErrorKind::NotFound
            ) =>
        {
            debug!(
                target: TRANSPORT_TARGET,
                path = %path.display(),
                "removing stale socket file"
            );
            fs::remove_file(path).map_err(|source| ListenerError::UnixCleanup {
                path: display(),
                source,
            })
        }
        Err(source) => Err(ListenerError::UnixConnect {
            path: display(),
            source,
        }),
    }
}

/// Deletes the socket file once its listener has stopped.
pub(crate) fn release(path: &Path) {
    if let Err(error) = fs::remove_file(path)
        && error.kind() != io::ErrorKind::NotFound
    {
        warn!(
            target: TRANSPORT_TARGET,
            path = %path.display(),
            error = %error,
            "failed to remove socket file"
        );
    }
}
