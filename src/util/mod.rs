//! Common helpers shared by the dlog, index and snapshot modules.

use cbordata::{Cbor, FromCbor, IntoCbor};

use std::{ffi, fs, path};

use crate::{Error, Result};

/// Serialize `val` to a self-delimited cbor byte-string.
pub fn into_cbor_bytes<T>(val: T) -> Result<Vec<u8>>
where
    T: IntoCbor,
{
    let mut data: Vec<u8> = vec![];
    let n = err_at!(FailCbor, err_at!(FailCbor, val.into_cbor())?.encode(&mut data))?;
    if n != data.len() {
        err_at!(Fatal, msg: "cbor encoding len mismatch {} {}", n, data.len())
    } else {
        Ok(data)
    }
}

/// Deserialize `T` from the head of `data`, returning the value and the
/// number of bytes consumed.
pub fn from_cbor_bytes<T>(mut data: &[u8]) -> Result<(T, usize)>
where
    T: FromCbor,
{
    let (val, n) = err_at!(FailCbor, Cbor::decode(&mut data))?;
    Ok((err_at!(FailCbor, T::from_cbor(val))?, n))
}

/// Create a file for append-only writes, truncating any pre-existing file
/// at the same location and creating parent directories as needed.
pub fn create_file_a(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    fs::remove_file(os_file).ok();

    if let Some(parent) = os_file.parent() {
        err_at!(IOError, fs::create_dir_all(parent))?;
    }

    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.append(true).create_new(true).open(os_file))
}

/// Open an existing file for append-only writes.
pub fn open_file_a(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.append(true).open(os_file))
}

/// Open an existing file for reading, and writing at arbitrary offsets
/// (used for positional re-reads during compaction and path lookup).
pub fn open_file_rw(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    let mut opts = fs::OpenOptions::new();
    err_at!(IOError, opts.read(true).write(true).open(os_file))
}

/// Open an existing file for reading.
pub fn open_file_r(file: &ffi::OsStr) -> Result<fs::File> {
    let os_file = path::Path::new(file);
    err_at!(IOError, fs::OpenOptions::new().read(true).open(os_file))
}

/// Seek to `$seek` and read exactly `$n` bytes, for positional reads that
/// race with a concurrent appender.
#[macro_export]
macro_rules! read_file {
    ($fd:expr, $seek:expr, $n:expr, $msg:expr) => {{
        use std::{convert::TryFrom, io::Read};

        match $fd.seek($seek) {
            Ok(_) => {
                let mut buf = vec![0; usize::try_from($n).unwrap()];
                match $fd.read(&mut buf) {
                    Ok(n) if buf.len() == n => Ok(buf),
                    Ok(n) => {
                        let m = buf.len();
                        err_at!(Fatal, msg: concat!($msg, " {}/{} at {:?}"), m, n, $seek)
                    }
                    Err(err) => err_at!(IOError, Err(err)),
                }
            }
            Err(err) => err_at!(IOError, Err(err)),
        }
    }};
}

pub fn sync_write(file: &mut fs::File, data: &[u8], fsync: bool) -> Result<usize> {
    use std::io::Write;

    let n = err_at!(IOError, file.write(data))?;
    if n != data.len() {
        err_at!(IOError, msg: "partial write {}/{}", n, data.len())?
    }
    if fsync {
        err_at!(IOError, file.sync_all())?;
    }
    Ok(n)
}

/// `SNAP_DEBUG=1` enables one-line diagnostics from the snapshot builder,
/// reader and the compactor. There is no logging crate in this stack; this
/// is a bare `eprintln!` debug texture.
pub fn snap_debug(msg: std::fmt::Arguments) {
    if std::env::var_os("SNAP_DEBUG").map(|v| !v.is_empty()).unwrap_or(false) {
        eprintln!("[snap] {}", msg);
    }
}

#[macro_export]
macro_rules! snap_debug {
    ($($arg:tt)*) => {
        $crate::util::snap_debug(format_args!($($arg)*))
    };
}
