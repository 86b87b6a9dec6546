// src/fetch/zips.rs

use std::{
    fs::{self, File},
    io::{self, Cursor},
    path::{Path, PathBuf},
};
use tracing::{debug, warn};
use zip::ZipArchive;

use super::Download;
use crate::error::{Error, Result};

const ZIP_MAGIC: &[u8] = b"PK\x03\x04";

pub fn is_zip(bytes: &[u8]) -> bool {
    bytes.starts_with(ZIP_MAGIC)
}

/// Write `download` under `dest_dir`, unpacking it first when it is a ZIP archive.
/// Returns the stored paths relative to `dest_dir`.
pub fn store(download: &Download, dest_dir: &Path) -> Result<Vec<String>> {
    if is_zip(&download.bytes) {
        return extract_archive(&download.bytes, dest_dir);
    }

    let name = Path::new(&download.file_name)
        .file_name()
        .map(|n| n.to_string_lossy().to_string())
        .filter(|n| !n.is_empty())
        .unwrap_or_else(|| "download.bin".to_string());
    let dest_path = dest_dir.join(&name);
    fs::write(&dest_path, &download.bytes)
        .map_err(|e| Error::Fetch(format!("writing {}: {e}", dest_path.display())))?;
    Ok(vec![name])
}

/// Unpack every entry of an in-memory ZIP into `dest_dir`, overwriting existing files.
/// Entries whose path would escape `dest_dir` are skipped.
pub fn extract_archive(bytes: &[u8], dest_dir: &Path) -> Result<Vec<String>> {
    let mut archive = ZipArchive::new(Cursor::new(bytes))
        .map_err(|e| Error::Fetch(format!("reading ZIP archive: {e}")))?;

    let mut written = Vec::with_capacity(archive.len());
    for i in 0..archive.len() {
        let mut entry = archive
            .by_index(i)
            .map_err(|e| Error::Fetch(format!("accessing ZIP entry #{i}: {e}")))?;

        let Some(rel) = entry.enclosed_name() else {
            warn!(entry = %entry.name(), "skipping ZIP entry with unsafe path");
            continue;
        };
        let out_path: PathBuf = dest_dir.join(&rel);

        if entry.is_dir() {
            fs::create_dir_all(&out_path).map_err(|e| io_error(&out_path, e))?;
            continue;
        }

        if let Some(parent) = out_path.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(parent, e))?;
        }
        let mut out = File::create(&out_path).map_err(|e| io_error(&out_path, e))?;
        io::copy(&mut entry, &mut out).map_err(|e| io_error(&out_path, e))?;
        debug!(file = %out_path.display(), "extracted");

        written.push(rel.to_string_lossy().replace('\\', "/"));
    }

    Ok(written)
}

fn io_error(path: &Path, err: io::Error) -> Error {
    Error::Fetch(format!("writing {}: {err}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::tempdir;
    use zip::write::SimpleFileOptions;
    use zip::CompressionMethod;

    fn build_zip(entries: &[(&str, &str)]) -> Vec<u8> {
        let mut buf = Vec::new();
        {
            let mut zip = zip::ZipWriter::new(Cursor::new(&mut buf));
            let options =
                SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
            for (name, content) in entries {
                zip.start_file(*name, options).unwrap();
                zip.write_all(content.as_bytes()).unwrap();
            }
            zip.finish().unwrap();
        }
        buf
    }

    #[test]
    fn test_zip_payload_is_unpacked() {
        let tmp = tempdir().unwrap();
        let bytes = build_zip(&[
            ("Iris.csv", "a,b\n1,2\n"),
            ("extra/database.sqlite", "not really sqlite"),
        ]);
        assert!(is_zip(&bytes));

        let download = Download {
            file_name: "iris.zip".into(),
            bytes,
        };
        let mut files = store(&download, tmp.path()).unwrap();
        files.sort();

        assert_eq!(files, vec!["Iris.csv", "extra/database.sqlite"]);
        assert_eq!(
            fs::read_to_string(tmp.path().join("Iris.csv")).unwrap(),
            "a,b\n1,2\n"
        );
        assert!(tmp.path().join("extra").join("database.sqlite").is_file());
        assert!(!tmp.path().join("iris.zip").exists());
    }

    #[test]
    fn test_plain_payload_is_written_under_its_basename() {
        let tmp = tempdir().unwrap();
        let download = Download {
            file_name: "../../etc/flowers.csv".into(),
            bytes: b"a\n1\n".to_vec(),
        };
        let files = store(&download, tmp.path()).unwrap();
        assert_eq!(files, vec!["flowers.csv"]);
        assert!(tmp.path().join("flowers.csv").is_file());
    }

    #[test]
    fn test_corrupt_archive_is_fetch_error() {
        let tmp = tempdir().unwrap();
        let mut bytes = ZIP_MAGIC.to_vec();
        bytes.extend_from_slice(b"garbage");
        assert!(matches!(
            extract_archive(&bytes, tmp.path()),
            Err(Error::Fetch(_))
        ));
    }
}
