//! Scenario file discovery, format detection and deserialization.
//!
//! A data file is identified by its base name; the extension picks the
//! format. Exactly one of `{base}.ron`, `{base}.toml`, `{base}.json` may
//! exist in a directory.

use outbreak_core::config::ConfigError;
use serde::de::DeserializeOwned;
use std::path::{Path, PathBuf};

// ===========================================================================
// Errors
// ===========================================================================

/// Errors that can occur while loading a scenario.
#[derive(Debug, thiserror::Error)]
pub enum DataLoadError {
    /// A required data file was not found in the given directory.
    #[error("required file '{file}' not found in {dir}")]
    MissingRequired { file: String, dir: PathBuf },

    /// The file has an extension we don't support.
    #[error("unsupported format for file: {file}")]
    UnsupportedFormat { file: PathBuf },

    /// Two files with the same base name but different formats exist.
    #[error("conflicting formats: {a} and {b}")]
    ConflictingFormats { a: PathBuf, b: PathBuf },

    /// A deserialization error occurred.
    #[error("parse error in {file}: {detail}")]
    Parse { file: PathBuf, detail: String },

    /// The files parsed but describe an invalid simulation.
    #[error("invalid scenario: {0}")]
    Config(#[from] ConfigError),

    /// An I/O error occurred.
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

// ===========================================================================
// Format detection
// ===========================================================================

/// Supported data file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Format {
    Ron,
    Toml,
    Json,
}

impl Format {
    pub const ALL: [Format; 3] = [Format::Ron, Format::Toml, Format::Json];

    pub fn extension(self) -> &'static str {
        match self {
            Format::Ron => "ron",
            Format::Toml => "toml",
            Format::Json => "json",
        }
    }
}

/// Detect the format of a file based on its extension.
pub fn detect_format(path: &Path) -> Result<Format, DataLoadError> {
    let ext = path.extension().and_then(|e| e.to_str());
    Format::ALL
        .into_iter()
        .find(|f| Some(f.extension()) == ext)
        .ok_or_else(|| DataLoadError::UnsupportedFormat {
            file: path.to_path_buf(),
        })
}

// ===========================================================================
// File discovery
// ===========================================================================

/// Find the data file called `base_name` in `dir`, in any supported format.
///
/// Returns `Ok(None)` if there is none, or `Err(ConflictingFormats)` if more
/// than one format is present.
pub fn find_data_file(dir: &Path, base_name: &str) -> Result<Option<PathBuf>, DataLoadError> {
    let mut found: Option<PathBuf> = None;

    for format in Format::ALL {
        let candidate = dir.join(format!("{base_name}.{}", format.extension()));
        if !candidate.is_file() {
            continue;
        }
        if let Some(existing) = found {
            return Err(DataLoadError::ConflictingFormats {
                a: existing,
                b: candidate,
            });
        }
        found = Some(candidate);
    }

    Ok(found)
}

/// Like [`find_data_file`], but a missing file is an error.
pub fn require_data_file(dir: &Path, base_name: &str) -> Result<PathBuf, DataLoadError> {
    find_data_file(dir, base_name)?.ok_or_else(|| DataLoadError::MissingRequired {
        file: base_name.to_string(),
        dir: dir.to_path_buf(),
    })
}

// ===========================================================================
// Deserialization
// ===========================================================================

fn parse_error(path: &Path, detail: impl ToString) -> DataLoadError {
    DataLoadError::Parse {
        file: path.to_path_buf(),
        detail: detail.to_string(),
    }
}

fn read(path: &Path) -> Result<(Format, String), DataLoadError> {
    let format = detect_format(path)?;
    let content = std::fs::read_to_string(path)?;
    log::debug!("reading {} as {format:?}", path.display());
    Ok((format, content))
}

/// Read a file and deserialize it according to its format.
pub fn deserialize_file<T: DeserializeOwned>(path: &Path) -> Result<T, DataLoadError> {
    let (format, content) = read(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => toml::from_str(&content).map_err(|e| parse_error(path, e)),
    }
}

/// Deserialize a list of rows. TOML has no top-level arrays, so there the
/// rows live under `toml_key`; RON and JSON hold a bare list.
pub fn deserialize_list<T: DeserializeOwned>(
    path: &Path,
    toml_key: &str,
) -> Result<Vec<T>, DataLoadError> {
    let (format, content) = read(path)?;
    match format {
        Format::Ron => ron::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Json => serde_json::from_str(&content).map_err(|e| parse_error(path, e)),
        Format::Toml => {
            let mut table: toml::Table =
                toml::from_str(&content).map_err(|e| parse_error(path, e))?;
            let rows = table
                .remove(toml_key)
                .ok_or_else(|| parse_error(path, format!("missing key '{toml_key}'")))?;
            rows.try_into()
                .map_err(|e: toml::de::Error| parse_error(path, e))
        }
    }
}

// ===========================================================================
// Tests
// ===========================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::DensityEffectRow;
    use std::fs;

    /// Create a temporary directory with a unique name for test isolation.
    fn make_test_dir(suffix: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!(
            "outbreak_data_test_{suffix}_{}",
            std::process::id()
        ));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn cleanup(dir: &Path) {
        let _ = fs::remove_dir_all(dir);
    }

    // -----------------------------------------------------------------------
    // detect_format
    // -----------------------------------------------------------------------

    #[test]
    fn detect_format_by_extension() {
        assert_eq!(detect_format(Path::new("a/scenario.ron")).unwrap(), Format::Ron);
        assert_eq!(detect_format(Path::new("scenario.toml")).unwrap(), Format::Toml);
        assert_eq!(detect_format(Path::new("scenario.json")).unwrap(), Format::Json);
    }

    #[test]
    fn detect_format_unsupported() {
        assert!(matches!(
            detect_format(Path::new("scenario.yaml")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
        assert!(matches!(
            detect_format(Path::new("scenario")),
            Err(DataLoadError::UnsupportedFormat { .. })
        ));
    }

    // -----------------------------------------------------------------------
    // find_data_file / require_data_file
    // -----------------------------------------------------------------------

    #[test]
    fn find_data_file_any_format() {
        let dir = make_test_dir("find_any");
        fs::write(dir.join("scenario.toml"), "").unwrap();
        let found = find_data_file(&dir, "scenario").unwrap();
        assert_eq!(found, Some(dir.join("scenario.toml")));
        assert_eq!(find_data_file(&dir, "density_effect").unwrap(), None);
        cleanup(&dir);
    }

    #[test]
    fn find_data_file_conflict() {
        let dir = make_test_dir("find_conflict");
        fs::write(dir.join("scenario.ron"), "()").unwrap();
        fs::write(dir.join("scenario.json"), "{}").unwrap();
        let result = find_data_file(&dir, "scenario");
        assert!(matches!(
            result,
            Err(DataLoadError::ConflictingFormats { .. })
        ));
        cleanup(&dir);
    }

    #[test]
    fn require_data_file_missing() {
        let dir = make_test_dir("require_missing");
        let err = require_data_file(&dir, "scenario").unwrap_err();
        assert!(matches!(err, DataLoadError::MissingRequired { ref file, .. } if file == "scenario"));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // deserialize_list
    // -----------------------------------------------------------------------

    #[test]
    fn deserialize_list_toml_uses_key() {
        let dir = make_test_dir("list_toml");
        let path = dir.join("density_effect.toml");
        fs::write(
            &path,
            r#"
[[rows]]
population_density = 0.0
effect = 0.0

[[rows]]
population_density = 1.0
effect = 1.0
"#,
        )
        .unwrap();

        let rows: Vec<DensityEffectRow> = deserialize_list(&path, "rows").unwrap();
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[1].effect, 1.0);
        cleanup(&dir);
    }

    #[test]
    fn deserialize_list_toml_missing_key() {
        let dir = make_test_dir("list_toml_missing");
        let path = dir.join("density_effect.toml");
        fs::write(&path, r#"points = []"#).unwrap();

        let result: Result<Vec<DensityEffectRow>, _> = deserialize_list(&path, "rows");
        let err = result.unwrap_err();
        assert!(format!("{err}").contains("rows"), "got: {err}");
        cleanup(&dir);
    }

    #[test]
    fn deserialize_list_parse_error() {
        let dir = make_test_dir("list_parse_err");
        let path = dir.join("density_effect.ron");
        fs::write(&path, "[(population_density: 1.0,").unwrap();

        let result: Result<Vec<DensityEffectRow>, _> = deserialize_list(&path, "rows");
        assert!(matches!(result, Err(DataLoadError::Parse { .. })));
        cleanup(&dir);
    }

    // -----------------------------------------------------------------------
    // Errors
    // -----------------------------------------------------------------------

    #[test]
    fn error_display_messages() {
        let e = DataLoadError::MissingRequired {
            file: "scenario".to_string(),
            dir: PathBuf::from("/data"),
        };
        assert!(format!("{e}").contains("scenario"));
        assert!(format!("{e}").contains("/data"));

        let e = DataLoadError::Config(ConfigError::NonPositiveStepInterval);
        assert!(format!("{e}").contains("step_interval_seconds"));
    }

    #[test]
    fn io_error_converts() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let data_err: DataLoadError = io_err.into();
        assert!(matches!(data_err, DataLoadError::Io(_)));
        assert!(format!("{data_err}").contains("file not found"));
    }
}
