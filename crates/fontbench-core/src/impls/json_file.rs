//! Atomic file I/O shared by the file-backed stores.
//!
//! 書き込みは必ず「一時ファイルに書く → fsync → rename」で行う。
//! 書き込み途中でプロセスが落ちても、元のファイルか新しいファイルの
//! どちらかが完全な形で残る。

use std::fs;
use std::io::{ErrorKind as IoErrorKind, Write};
use std::path::{Path, PathBuf};

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::StoreError;

fn location(path: &Path) -> String {
    path.display().to_string()
}

fn io_error(path: &Path, source: std::io::Error) -> StoreError {
    StoreError::Io {
        location: location(path),
        source,
    }
}

fn temp_path(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}

/// Read a whole file as UTF-8; `None` if it does not exist.
pub(crate) fn read_text(path: &Path) -> Result<Option<String>, StoreError> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == IoErrorKind::NotFound => Ok(None),
        Err(e) if e.kind() == IoErrorKind::InvalidData => Err(StoreError::corrupt(
            location(path),
            format!("not valid utf-8: {e}"),
        )),
        Err(e) => Err(io_error(path, e)),
    }
}

/// Read a JSON array of records; `None` if the file does not exist.
pub(crate) fn read_records<T: DeserializeOwned>(
    path: &Path,
) -> Result<Option<Vec<T>>, StoreError> {
    let Some(text) = read_text(path)? else {
        return Ok(None);
    };
    if text.trim().is_empty() {
        return Ok(Some(Vec::new()));
    }
    serde_json::from_str(&text)
        .map(Some)
        .map_err(|e| StoreError::corrupt(location(path), e.to_string()))
}

/// Replace `path` with `contents` atomically.
pub(crate) fn write_atomic(path: &Path, contents: &[u8]) -> Result<(), StoreError> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
    }

    let tmp = temp_path(path);
    {
        let mut file = fs::File::create(&tmp).map_err(|e| io_error(&tmp, e))?;
        file.write_all(contents).map_err(|e| io_error(&tmp, e))?;
        file.sync_all().map_err(|e| io_error(&tmp, e))?;
    }
    fs::rename(&tmp, path).map_err(|e| io_error(path, e))
}

/// Serialize records as a pretty JSON array and replace `path` atomically.
pub(crate) fn write_records<T: Serialize>(path: &Path, records: &[T]) -> Result<(), StoreError> {
    let bytes = serde_json::to_vec_pretty(records).map_err(|source| StoreError::Encode {
        location: location(path),
        source,
    })?;
    write_atomic(path, &bytes)
}
