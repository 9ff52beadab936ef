use std::{fmt, result};

/// Error variants returned by this crate, each carries a message along with
/// the file/line where it was raised so that error logs can be traced back
/// to a call-site without a backtrace.
#[derive(Debug)]
pub enum Error {
    /// A structural event was processed out of order (key-after-key, value
    /// outside a container, mismatched End{Object,Array}, negative depth).
    InvariantViolation(String, String, u32),
    /// Token stream ended in the middle of a key or value.
    AmbiguousStream(String, String, u32),
    /// A serialized entry would not fit the 32-bit length prefix.
    TooLarge(String, String, u32),
    /// Any `std::io` failure: short read/write, fsync, open, metadata.
    IOError(String, String, u32),
    /// Compaction's rename dance could not complete or be reversed.
    RenameFail(String, String, u32),
    /// `NewSnapshotWriter` found `snapMu` already held.
    SnapshotBusy(String, String, u32),
    /// A dlog file's advisory lock is already held by another process.
    Locked(String, String, u32),
    /// An index segment's `LogFileGeneration` no longer matches the file.
    StaleGeneration(String, String, u32),
    /// Inter-thread request/response channel broke.
    IPCFail(String, String, u32),
    /// A spawned background thread panicked or could not be joined.
    ThreadFail(String, String, u32),
    /// cbordata encode/decode failure.
    FailCbor(String, String, u32),
    /// A numeric conversion (usize/u64/u32) failed to fit.
    FailConvert(String, String, u32),
    /// A path, file name, or on-disk layout did not match the expected shape.
    InvalidFile(String, String, u32),
    /// Caller-supplied argument was invalid (bad kpath syntax, bad scope).
    InvalidInput(String, String, u32),
    /// Requested segment/entry/chunk does not exist.
    NotFound(String, String, u32),
    /// Catch-all for conditions that should be structurally impossible.
    Fatal(String, String, u32),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter) -> result::Result<(), fmt::Error> {
        use Error::*;

        match self {
            InvariantViolation(m, file, line) => {
                write!(f, "InvariantViolation {}:{} {}", file, line, m)
            }
            AmbiguousStream(m, file, line) => {
                write!(f, "AmbiguousStream {}:{} {}", file, line, m)
            }
            TooLarge(m, file, line) => write!(f, "TooLarge {}:{} {}", file, line, m),
            IOError(m, file, line) => write!(f, "IOError {}:{} {}", file, line, m),
            RenameFail(m, file, line) => write!(f, "RenameFail {}:{} {}", file, line, m),
            SnapshotBusy(m, file, line) => {
                write!(f, "SnapshotBusy {}:{} {}", file, line, m)
            }
            Locked(m, file, line) => write!(f, "Locked {}:{} {}", file, line, m),
            StaleGeneration(m, file, line) => {
                write!(f, "StaleGeneration {}:{} {}", file, line, m)
            }
            IPCFail(m, file, line) => write!(f, "IPCFail {}:{} {}", file, line, m),
            ThreadFail(m, file, line) => write!(f, "ThreadFail {}:{} {}", file, line, m),
            FailCbor(m, file, line) => write!(f, "FailCbor {}:{} {}", file, line, m),
            FailConvert(m, file, line) => write!(f, "FailConvert {}:{} {}", file, line, m),
            InvalidFile(m, file, line) => write!(f, "InvalidFile {}:{} {}", file, line, m),
            InvalidInput(m, file, line) => write!(f, "InvalidInput {}:{} {}", file, line, m),
            NotFound(m, file, line) => write!(f, "NotFound {}:{} {}", file, line, m),
            Fatal(m, file, line) => write!(f, "Fatal {}:{} {}", file, line, m),
        }
    }
}

impl std::error::Error for Error {}

pub type Result<T> = result::Result<T, Error>;

/// Wrap a fallible expression or construct an error directly, tagging it
/// with the variant name, call-site file and line.
///
/// ```ignore
/// err_at!(IOError, fs::read(path))?;
/// err_at!(Fatal, msg: "unexpected state {}", state)?;
/// ```
#[macro_export]
macro_rules! err_at {
    ($v:ident, msg: $($arg:expr),+) => {{
        let msg = format!($($arg),+);
        Err($crate::Error::$v(msg, file!().to_string(), line!()))
    }};
    ($v:ident, $e:expr) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let msg = format!("{}", err);
                Err($crate::Error::$v(msg, file!().to_string(), line!()))
            }
        }
    }};
    ($v:ident, $e:expr, $($arg:expr),+) => {{
        match $e {
            Ok(val) => Ok(val),
            Err(err) => {
                let msg = format!($($arg),+);
                let msg = format!("{} ({})", msg, err);
                Err($crate::Error::$v(msg, file!().to_string(), line!()))
            }
        }
    }};
}
