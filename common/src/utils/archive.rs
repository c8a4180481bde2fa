//! Folder payloads travel as ZIP archives: zip on the sending side, extract
//! on the receiving side, entry names relative to the archived folder root.

use std::fs::File;
use std::io::{self, Read, Write};
use std::path::Path;

use walkdir::WalkDir;
use zip::write::FileOptions;
use zip::{CompressionMethod, ZipArchive, ZipWriter};

fn to_io(e: zip::result::ZipError) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, e)
}

/// Zip `folder` into `archive_path` using deflate. Entry names are relative
/// to `folder` so extraction recreates the tree under any destination.
pub fn zip_folder(folder: &Path, archive_path: &Path) -> io::Result<()> {
    let out = File::create(archive_path)?;
    let mut zip = ZipWriter::new(out);
    let options = FileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut buf = Vec::new();
    for entry in WalkDir::new(folder) {
        let entry = entry.map_err(io::Error::from)?;
        let path = entry.path();
        if path == folder {
            continue;
        }
        let rel = path
            .strip_prefix(folder)
            .map_err(|e| io::Error::new(io::ErrorKind::InvalidInput, e))?;
        let name = rel.to_string_lossy().replace('\\', "/");

        if entry.file_type().is_dir() {
            zip.add_directory(name, options).map_err(to_io)?;
        } else {
            zip.start_file(name, options).map_err(to_io)?;
            buf.clear();
            File::open(path)?.read_to_end(&mut buf)?;
            zip.write_all(&buf)?;
        }
    }
    zip.finish().map_err(to_io)?;
    Ok(())
}

/// Extract `archive_path` into `dest`, refusing entries whose names would
/// escape the destination directory.
pub fn extract_zip(archive_path: &Path, dest: &Path) -> io::Result<()> {
    let mut archive = ZipArchive::new(File::open(archive_path)?).map_err(to_io)?;
    for i in 0..archive.len() {
        let mut entry = archive.by_index(i).map_err(to_io)?;
        let Some(rel) = entry.enclosed_name().map(|p| p.to_path_buf()) else {
            return Err(io::Error::new(
                io::ErrorKind::InvalidData,
                format!("unsafe entry name in archive: {}", entry.name()),
            ));
        };
        let target = dest.join(rel);

        if entry.is_dir() {
            std::fs::create_dir_all(&target)?;
            continue;
        }
        if let Some(parent) = target.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let mut out = File::create(&target)?;
        io::copy(&mut entry, &mut out)?;
    }
    Ok(())
}

/// Total size in bytes of the regular files under `folder`.
pub fn folder_size(folder: &Path) -> io::Result<u64> {
    let mut size = 0u64;
    for entry in WalkDir::new(folder) {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            size += entry.metadata().map_err(io::Error::from)?.len();
        }
    }
    Ok(size)
}
