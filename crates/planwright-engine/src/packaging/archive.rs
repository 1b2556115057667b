use std::fs::File;
use std::io::{self, BufWriter};
use std::path::Path;

use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, ZipWriter};

use crate::error::EngineError;

/// Zip `files` (relative to `root`, in the given order) into `dest`.
/// Returns the archive size. Blocking; run on the blocking pool.
pub(crate) fn write_zip(root: &Path, files: &[String], dest: &Path) -> Result<u64, EngineError> {
    let out = BufWriter::new(File::create(dest)?);
    let mut zip = ZipWriter::new(out);
    let options = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .unix_permissions(0o644);

    for rel in files {
        zip.start_file(rel.as_str(), options)?;
        let mut src = File::open(root.join(rel))?;
        let _ = io::copy(&mut src, &mut zip)?;
    }

    let out = zip.finish()?;
    let file = out.into_inner().map_err(|e| EngineError::Io(e.into_error()))?;
    file.sync_all()?;
    Ok(file.metadata()?.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn archive_contains_files_in_order() {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().join("tree");
        std::fs::create_dir_all(root.join("docs")).unwrap();
        std::fs::write(root.join("docs/prd.md"), "# PRD").unwrap();
        std::fs::write(root.join("README.md"), "readme").unwrap();

        let dest = dir.path().join("out.zip");
        let files = vec!["docs/prd.md".to_owned(), "README.md".to_owned()];
        let size = write_zip(&root, &files, &dest).unwrap();
        assert_eq!(size, std::fs::metadata(&dest).unwrap().len());

        let mut archive = zip::ZipArchive::new(File::open(&dest).unwrap()).unwrap();
        let names: Vec<String> = (0..archive.len())
            .map(|i| archive.by_index(i).unwrap().name().to_owned())
            .collect();
        assert_eq!(names, files);
    }

    #[test]
    fn missing_source_fails() {
        let dir = tempfile::tempdir().unwrap();
        let err = write_zip(dir.path(), &["nope.md".to_owned()], &dir.path().join("x.zip")).unwrap_err();
        assert!(matches!(err, EngineError::Io(_)));
    }
}
