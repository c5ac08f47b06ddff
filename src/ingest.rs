//! CSV ingestion and staging of uploaded files

use std::fs;
use std::io::{self, Read, Write};
use std::path::{Path, PathBuf};

use log::debug;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use tempfile::NamedTempFile;

use crate::error::DataError;

/// Where uploads are staged before analysis
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UploadConfig {
    pub upload_dir: PathBuf,
}

impl Default for UploadConfig {
    fn default() -> Self {
        Self {
            upload_dir: PathBuf::from("uploads"),
        }
    }
}

/// Uploaded bytes copied into a temporary CSV file.
///
/// The file is removed when this value is dropped, whether the analysis
/// succeeded or not.
#[derive(Debug)]
pub struct StagedUpload {
    file: NamedTempFile,
}

impl StagedUpload {
    pub fn from_reader<R: Read>(mut reader: R, config: &UploadConfig) -> crate::Result<Self> {
        fs::create_dir_all(&config.upload_dir)?;
        let mut file = tempfile::Builder::new()
            .prefix("upload-")
            .suffix(".csv")
            .tempfile_in(&config.upload_dir)?;
        let bytes = io::copy(&mut reader, &mut file)?;
        file.flush()?;
        debug!("staged {} bytes at {}", bytes, file.path().display());
        Ok(Self { file })
    }

    pub fn path(&self) -> &Path {
        self.file.path()
    }
}

/// Reject anything that is not a `.csv` file (case-insensitive)
pub fn validate_extension(path: &Path) -> crate::Result<()> {
    match path.extension().and_then(|ext| ext.to_str()) {
        Some(ext) if ext.eq_ignore_ascii_case("csv") => Ok(()),
        _ => Err(DataError::UnsupportedFileType(path.display().to_string())),
    }
}

/// Read a CSV file with a header row into a DataFrame
pub fn load_csv(path: &Path) -> crate::Result<DataFrame> {
    validate_extension(path)?;
    let df = CsvReadOptions::default()
        .with_has_header(true)
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;
    debug!("read {} rows from {}", df.height(), path.display());
    Ok(df)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const HEADER: &str = "id,Gender,Age,Flight Distance,Seat comfort,Cleanliness";

    #[test]
    fn test_validate_extension() {
        assert!(validate_extension(Path::new("survey.csv")).is_ok());
        assert!(validate_extension(Path::new("survey.CSV")).is_ok());
        assert!(matches!(
            validate_extension(Path::new("survey.xlsx")),
            Err(DataError::UnsupportedFileType(_))
        ));
        assert!(validate_extension(Path::new("survey")).is_err());
    }

    #[test]
    fn test_load_csv() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("survey.csv");
        fs::write(
            &path,
            format!("{HEADER}\n1,Male,25,460,5,5\n2,Female,40,235,1,1\n"),
        )
        .unwrap();

        let df = load_csv(&path).unwrap();
        assert_eq!(df.height(), 2);
        assert!(df.column("Flight Distance").is_ok());
    }

    #[test]
    fn test_load_csv_rejects_other_extensions() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("survey.txt");
        fs::write(&path, format!("{HEADER}\n1,Male,25,460,5,5\n")).unwrap();
        assert!(matches!(
            load_csv(&path),
            Err(DataError::UnsupportedFileType(_))
        ));
    }

    #[test]
    fn test_staged_upload_is_removed_on_drop() {
        let dir = tempdir().unwrap();
        let config = UploadConfig {
            upload_dir: dir.path().join("uploads"),
        };
        let body = format!("{HEADER}\n1,Male,25,460,5,5\n");

        let staged = StagedUpload::from_reader(body.as_bytes(), &config).unwrap();
        let path = staged.path().to_path_buf();
        assert!(path.exists());
        assert_eq!(fs::read_to_string(&path).unwrap(), body);
        assert!(validate_extension(&path).is_ok());

        drop(staged);
        assert!(!path.exists());
    }
}
