use std::io;

/// Failures raised while building, rotating or appending to a device's file set.
///
/// None of these are fatal to the process. The registration path turns them into
/// "volume rejected", the flush path into "device invalid".
#[derive(Debug, thiserror::Error)]
pub enum LogError {
    #[error("volume {volume} unavailable: {source}")]
    VolumeUnavailable {
        volume: String,
        #[source]
        source: io::Error,
    },
    #[error("{name} is {actual} bytes, layout requires {expected}")]
    LayoutMismatch {
        name: String,
        actual: u64,
        expected: u64,
    },
    #[error("i/o failure on {name}: {source}")]
    Io {
        name: String,
        #[source]
        source: io::Error,
    },
    #[error("short write on {name}: requested {requested} bytes")]
    ShortWrite { name: String, requested: usize },
    #[error(transparent)]
    Source(#[from] SourceError),
    #[error("device disabled")]
    DeviceDisabled,
}

impl LogError {
    pub(crate) fn io(name: &str, source: io::Error) -> Self {
        LogError::Io {
            name: name.to_string(),
            source,
        }
    }

    /// Maps a failed write, folding `WriteZero` into [`LogError::ShortWrite`].
    pub(crate) fn write(name: &str, requested: usize, source: io::Error) -> Self {
        if source.kind() == io::ErrorKind::WriteZero {
            LogError::ShortWrite {
                name: name.to_string(),
                requested,
            }
        } else {
            LogError::io(name, source)
        }
    }
}

/// Fatal read errors reported by a [`crate::source::LogSource`].
///
/// "No more lines" is not one of them; sources report it as `Ok(None)`.
#[derive(Debug, thiserror::Error)]
pub enum SourceError {
    #[error("cursor {0} does not point at a line boundary")]
    BadCursor(u64),
    #[error("log source unavailable: {0}")]
    Unavailable(String),
}

#[derive(Debug, thiserror::Error, PartialEq, Eq)]
pub enum LayoutError {
    #[error("chunk size {0} is not a non-zero multiple of the {block} byte block size", block = crate::layout::BLOCK_SIZE)]
    ChunkSize(u64),
    #[error("data file size {size} is not a non-zero multiple of chunk size {chunk}")]
    DataFileSize { size: u64, chunk: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_write_zero_becomes_short_write() {
        let err = LogError::write("log_1.txt", 12, io::Error::from(io::ErrorKind::WriteZero));
        assert!(matches!(
            err,
            LogError::ShortWrite { ref name, requested: 12 } if name == "log_1.txt"
        ));

        let err = LogError::write("log_1.txt", 12, io::Error::other("disk gone"));
        assert!(matches!(err, LogError::Io { .. }));
        assert_eq!(err.to_string(), "i/o failure on log_1.txt: disk gone");
    }
}
