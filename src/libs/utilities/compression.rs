// Decompressors for the stream formats release archives come in.
use bzip2::read::BzDecoder;
use flate2::read::GzDecoder;
use xz2::read::XzDecoder;
// Our custom utility tools from assets
use crate::libs::utilities::assets::detect_file_type;
use crate::libs::errors::{Error, Result};
// Our custom logging macros to give us nicely formatted (and colored!) output
// for debugging, general information, and errors.
use crate::{log_debug, log_error};
// The 'colored' crate helps us make our console output look pretty and readable
use colored::Colorize;
// For file system operations: creating directories, reading files, etc.
use std::fs::{self, File};
// For working with file paths, specifically to construct extraction paths.
use std::path::{Path, PathBuf};
// `std::io` contains core input/output functionalities and error types.
use std::io::{self, Read};
// For extracting tar archives.
use tar::Archive;
// For extracting zip archives.
use zip::ZipArchive;

/// Extracts the contents of a downloaded artifact into a new `extracted` subdirectory of `dest`.
///
/// Plain binaries are copied, single-file compressed streams (`.gz`, `.xz`, `.bz2`) are
/// decompressed under their name without the suffix.
///
/// # Arguments
/// * `src`: The downloaded file.
/// * `dest`: The parent directory (`&Path`) where the `extracted` directory is created.
/// * `known_file_type`: The archive type when the caller already knows it; detected from
///   the file name and magic bytes otherwise.
///
/// # Returns
/// * `Result<PathBuf>`: the `extracted` directory, or `Error::Extraction` for corrupt or
///   unsupported archives.
pub fn extract_archive(src: &Path, dest: &Path, known_file_type: Option<&str>) -> Result<PathBuf> {
    log_debug!("[Utils] Extracting archive {:?} into {:?}", src.to_string_lossy().blue(), dest.to_string_lossy().cyan());

    let file_type = match known_file_type {
        Some(ft) => ft.to_string(),
        None => detect_file_type(src),
    };

    let extracted_path = dest.join("extracted");
    fs::create_dir_all(&extracted_path).map_err(|e| Error::io_at("create", &extracted_path, e))?;

    let open = || File::open(src).map_err(|e| Error::io_at("open", src, e));
    let corrupt = |e: &dyn std::fmt::Display| {
        Error::Extraction(format!("cannot unpack {} as {}: {}", src.display(), file_type, e))
    };

    match file_type.as_str() {
        "zip" => {
            let mut archive = ZipArchive::new(open()?).map_err(|e| corrupt(&e))?;
            archive.extract(&extracted_path).map_err(|e| corrupt(&e))?;
        }
        "tar.gz" => unpack_tar(GzDecoder::new(open()?), &extracted_path).map_err(|e| corrupt(&e))?,
        "tar.xz" => unpack_tar(XzDecoder::new(open()?), &extracted_path).map_err(|e| corrupt(&e))?,
        "tar.bz2" => unpack_tar(BzDecoder::new(open()?), &extracted_path).map_err(|e| corrupt(&e))?,
        "tar" => unpack_tar(open()?, &extracted_path).map_err(|e| corrupt(&e))?,
        "gz" => decompress_single(GzDecoder::new(open()?), src, &extracted_path).map_err(|e| corrupt(&e))?,
        "xz" => decompress_single(XzDecoder::new(open()?), src, &extracted_path).map_err(|e| corrupt(&e))?,
        "bz2" => decompress_single(BzDecoder::new(open()?), src, &extracted_path).map_err(|e| corrupt(&e))?,
        "binary" => {
            let file_name = src
                .file_name()
                .ok_or_else(|| Error::Extraction(format!("{} has no file name", src.display())))?;
            let target = extracted_path.join(file_name);
            fs::copy(src, &target).map_err(|e| Error::io_at("copy", &target, e))?;
        }
        other => {
            log_error!("[Utils] Unsupported archive type '{}' for extraction: {:?}", other.red(), src);
            return Err(Error::Extraction(format!("unsupported archive type: {other}")));
        }
    }

    log_debug!("[Utils] Archive contents available at: {:?}", extracted_path.to_string_lossy().green());
    Ok(extracted_path)
}

// `tar::Archive::unpack` refuses entries that escape the destination.
fn unpack_tar<R: Read>(reader: R, dest: &Path) -> io::Result<()> {
    let mut archive = Archive::new(reader);
    archive.set_preserve_permissions(true);
    archive.unpack(dest)
}

fn decompress_single<R: Read>(mut reader: R, src: &Path, dest: &Path) -> io::Result<()> {
    let stem = src
        .file_stem()
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "source path has no file name"))?;
    let output = dest.join(stem);
    let mut file = File::create(&output)?;
    io::copy(&mut reader, &mut file)?;
    log_debug!("[Utils] Decompressed single file to {:?}", output.display());
    Ok(())
}
