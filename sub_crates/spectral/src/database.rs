use std::{
    env,
    ffi::OsString,
    path::{Path, PathBuf},
};

use tracing::{debug, warn};

use crate::{Error, SpectralData};

/// Environment variable holding the database search paths.
pub const DATA_PATH_ENV: &str = "RAWTOACES_DATA_PATH";

/// Older name for `DATA_PATH_ENV`, still honored.
pub const LEGACY_DATA_PATH_ENV: &str = "AMPAS_DATA_PATH";

const CAMERA_DIR: &str = "camera";
const ILLUMINANT_DIR: &str = "illuminant";
const OBSERVER_FILE: &str = "cmf/cmf_1931.json";
const TRAINING_FILE: &str = "training/training_spectral.json";

/// Resolves the database search paths from the given override list and the
/// process environment.
pub fn database_paths(overrides: &[String]) -> Vec<PathBuf> {
    database_paths_from(
        overrides,
        env::var_os(DATA_PATH_ENV),
        env::var_os(LEGACY_DATA_PATH_ENV),
    )
}

/// Same as `database_paths()`, but with the environment values passed in.
pub fn database_paths_from(
    overrides: &[String],
    data_path: Option<OsString>,
    legacy_data_path: Option<OsString>,
) -> Vec<PathBuf> {
    if !overrides.is_empty() {
        return overrides.iter().map(PathBuf::from).collect();
    }

    let data_path = data_path.filter(|p| !p.is_empty());
    let legacy_data_path = legacy_data_path.filter(|p| !p.is_empty());

    if let Some(list) = data_path {
        return env::split_paths(&list).collect();
    }
    if let Some(list) = legacy_data_path {
        warn!(
            "The environment variable {} is deprecated, please use {} instead.",
            LEGACY_DATA_PATH_ENV, DATA_PATH_ENV
        );
        return env::split_paths(&list).collect();
    }

    if cfg!(windows) {
        vec![PathBuf::from(".")]
    } else {
        vec![
            PathBuf::from("/usr/local/share/rawtoaces/data"),
            PathBuf::from("/usr/local/include/rawtoaces/data"),
        ]
    }
}

/// A read-only view of the spectral database spread across one or more
/// search directories.
///
/// Files are read on demand.  Lookups that fail to find a match return
/// `None`, and files that fail to parse are skipped with a warning.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Database {
    paths: Vec<PathBuf>,
}

impl Database {
    pub fn new(paths: Vec<PathBuf>) -> Database {
        Database { paths }
    }

    pub fn paths(&self) -> &[PathBuf] {
        &self.paths
    }

    /// All `.json` files in `subdir` across the search paths, in search
    /// order and sorted by name within each path.
    fn files_in(&self, subdir: &str) -> Vec<PathBuf> {
        let mut files = Vec::new();
        for root in self.paths.iter() {
            let dir = root.join(subdir);
            let entries = match std::fs::read_dir(&dir) {
                Ok(entries) => entries,
                Err(_) => continue,
            };

            let mut dir_files: Vec<PathBuf> = entries
                .filter_map(|e| e.ok())
                .map(|e| e.path())
                .filter(|p| {
                    p.is_file()
                        && p.extension()
                            .map(|ext| ext.eq_ignore_ascii_case("json"))
                            .unwrap_or(false)
                })
                .collect();
            dir_files.sort();
            files.extend(dir_files);
        }
        files
    }

    fn find_file(&self, relative: &str) -> Option<PathBuf> {
        self.paths
            .iter()
            .map(|root| root.join(relative))
            .find(|p| p.is_file())
    }

    fn load_checked(path: &Path, channels: usize, what: &str) -> Option<SpectralData> {
        match SpectralData::load(path).and_then(|d| d.expect_channels(channels, what).map(|_| d)) {
            Ok(data) => Some(data),
            Err(e) => {
                warn!("Skipping {} file '{}': {}", what, path.display(), e);
                None
            }
        }
    }

    /// Spectral sensitivities for the given camera, matched case-insensitively.
    pub fn find_camera(&self, make: &str, model: &str) -> Option<SpectralData> {
        self.cameras().into_iter().find(|c| {
            c.header.manufacturer.eq_ignore_ascii_case(make)
                && c.header.model.eq_ignore_ascii_case(model)
        })
    }

    pub fn cameras(&self) -> Vec<SpectralData> {
        self.files_in(CAMERA_DIR)
            .iter()
            .filter_map(|p| Self::load_checked(p, 3, "Camera"))
            .collect()
    }

    /// Cameras with spectral data, as "Make / Model" strings.
    pub fn camera_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .cameras()
            .iter()
            .map(|c| format!("{} / {}", c.header.manufacturer, c.header.model))
            .collect();
        names.sort();
        names.dedup();
        names
    }

    pub fn illuminants(&self) -> Vec<SpectralData> {
        self.files_in(ILLUMINANT_DIR)
            .iter()
            .filter_map(|p| Self::load_checked(p, 1, "Illuminant"))
            .collect()
    }

    /// The database illuminant with the given type, matched case-insensitively.
    pub fn find_illuminant(&self, kind: &str) -> Option<SpectralData> {
        self.illuminants()
            .into_iter()
            .find(|i| i.header.kind.eq_ignore_ascii_case(kind))
    }

    pub fn illuminant_types(&self) -> Vec<String> {
        let mut types = Vec::new();
        for illum in self.illuminants() {
            if !illum.header.kind.is_empty() && !types.contains(&illum.header.kind) {
                types.push(illum.header.kind);
            }
        }
        types
    }

    /// The CIE 1931 standard observer colour matching functions.
    pub fn load_observer(&self) -> Result<SpectralData, Error> {
        let path = self.find_file(OBSERVER_FILE).ok_or_else(|| {
            Error::NotFound(format!(
                "Failed to find observer '{}'. Please check the database search path in {}",
                OBSERVER_FILE, DATA_PATH_ENV
            ))
        })?;
        debug!("Loading observer from '{}'", path.display());
        let data = SpectralData::load(&path)?;
        data.expect_channels(3, "Observer")?;
        Ok(data)
    }

    /// Reflectances of the training patches used to fit spectral transforms.
    pub fn load_training(&self) -> Result<SpectralData, Error> {
        let path = self.find_file(TRAINING_FILE).ok_or_else(|| {
            Error::NotFound(format!(
                "Failed to find training data '{}'. Please check the database search path in {}",
                TRAINING_FILE, DATA_PATH_ENV
            ))
        })?;
        debug!("Loading training data from '{}'", path.display());
        let data = SpectralData::load(&path)?;
        if data.channels.is_empty() {
            return Err(Error::Format("Training data has no patches".into()));
        }
        Ok(data)
    }
}
