//! Zip packaging of a job's output directory.

use std::fs::File;
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("archive I/O failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("zip write failed: {0}")]
    Zip(#[from] zip::result::ZipError),
}

/// Package every file in `src_dir` into a zip at `zip_path`, each entry
/// stored under its leaf name.
pub fn write_archive(src_dir: &Path, zip_path: &Path) -> Result<(), ArchiveError> {
    let file = File::create(zip_path)?;
    let mut writer = ZipWriter::new(file);
    let options = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);

    let mut entries: Vec<_> = std::fs::read_dir(src_dir)?.collect::<Result<_, _>>()?;
    entries.sort_by_key(|e| e.file_name());

    for entry in entries {
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        writer.start_file(entry.file_name().to_string_lossy().into_owned(), options)?;
        let mut source = File::open(&path)?;
        std::io::copy(&mut source, &mut writer)?;
    }

    writer.finish()?;
    Ok(())
}
