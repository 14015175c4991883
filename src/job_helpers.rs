use std::path::{Path, PathBuf};

use crate::Settings;

/// Suffix and extension of converted files.
pub const OUTPUT_SUFFIX: &str = "_aces.tif";

#[derive(Debug, thiserror::Error)]
pub enum OutputPathError {
    #[error("Output file already exists: {}", .0.display())]
    FileExists(PathBuf),

    #[error("Output directory does not exist: {}", .0.display())]
    MissingDirectory(PathBuf),

    #[error("Invalid input path: {}", .0.display())]
    InvalidPath(PathBuf),

    #[error("Failed to create output directory '{}': {}", .0.display(), .1)]
    Io(PathBuf, std::io::Error),
}

/// Where the converted version of `input` goes: `<stem>_aces.tif`, in
/// `settings.output_dir` if set or else next to the input.
///
/// Creates the output directory if it is missing and `create_dirs` is
/// set, and refuses to return an existing file unless `overwrite` is set.
pub fn make_output_path(input: &Path, settings: &Settings) -> Result<PathBuf, OutputPathError> {
    let stem = input
        .file_stem()
        .filter(|s| !s.is_empty())
        .ok_or_else(|| OutputPathError::InvalidPath(input.into()))?;

    let dir = if settings.output_dir.is_empty() {
        input
            .parent()
            .map(|p| p.to_path_buf())
            .unwrap_or_else(PathBuf::new)
    } else {
        PathBuf::from(&settings.output_dir)
    };

    if !dir.as_os_str().is_empty() && !dir.is_dir() {
        if settings.create_dirs {
            ensure_dir_exists(&dir).map_err(|e| OutputPathError::Io(dir.clone(), e))?;
        } else {
            return Err(OutputPathError::MissingDirectory(dir));
        }
    }

    let mut name = stem.to_os_string();
    name.push(OUTPUT_SUFFIX);
    let path = dir.join(name);

    if path.exists() && !settings.overwrite {
        return Err(OutputPathError::FileExists(path));
    }
    Ok(path)
}

pub fn ensure_dir_exists<P: AsRef<Path>>(path: P) -> std::io::Result<()> {
    let path: &Path = path.as_ref();

    if !path.exists() {
        std::fs::create_dir_all(path)?;
    } else {
        let metadata = std::fs::metadata(path)?;
        if !metadata.is_dir() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::Other,
                "Specified path is not a directory",
            ));
        }
        if metadata.permissions().readonly() {
            return Err(std::io::Error::new(
                std::io::ErrorKind::PermissionDenied,
                "Specified path is read only",
            ));
        }
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    #[test]
    fn next_to_input() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shot.DNG");
        let out = make_output_path(&input, &Settings::default()).unwrap();
        assert_eq!(out, dir.path().join("shot_aces.tif"));
    }

    #[test]
    fn bare_file_name() {
        let out = make_output_path(Path::new("shot.nef"), &Settings::default()).unwrap();
        assert_eq!(out, PathBuf::from("shot_aces.tif"));
    }

    #[test]
    fn existing_output() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shot.cr2");
        fs::write(dir.path().join("shot_aces.tif"), b"").unwrap();

        let mut settings = Settings::default();
        let err = make_output_path(&input, &settings).unwrap_err();
        assert!(matches!(err, OutputPathError::FileExists(_)));
        assert!(err.to_string().starts_with("Output file already exists: "));

        settings.overwrite = true;
        assert!(make_output_path(&input, &settings).is_ok());
    }

    #[test]
    fn output_directory() {
        let dir = tempfile::tempdir().unwrap();
        let input = dir.path().join("shot.cr2");
        let out_dir = dir.path().join("out").join("aces");

        let mut settings = Settings::default();
        settings.output_dir = out_dir.to_string_lossy().into();
        let err = make_output_path(&input, &settings).unwrap_err();
        assert!(matches!(err, OutputPathError::MissingDirectory(_)));
        assert!(!out_dir.exists());

        settings.create_dirs = true;
        let out = make_output_path(&input, &settings).unwrap();
        assert_eq!(out, out_dir.join("shot_aces.tif"));
        assert!(out_dir.is_dir());
    }

    #[test]
    fn invalid_input() {
        let err = make_output_path(Path::new(""), &Settings::default()).unwrap_err();
        assert!(matches!(err, OutputPathError::InvalidPath(_)));
    }

    #[test]
    fn ensure_dir_rejects_files() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("file");
        fs::write(&file, b"x").unwrap();
        assert!(ensure_dir_exists(&file).is_err());
        assert!(ensure_dir_exists(dir.path().join("a/b")).is_ok());
    }
}
