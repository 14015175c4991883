//! The conversion orchestrator.
//!
//! `ImageConverter::configure()` works out the white balance and the colour
//! transform for one image, and `ImageConverter::process_image()` also
//! converts its pixels and writes them out.  Neither panics or returns an
//! error on bad input: they return `false`, and `status()` and
//! `last_error_message()` say what went wrong.

use std::{
    path::{Path, PathBuf},
    sync::Arc,
    time::Instant,
};

use spectral::{illuminant, Database};
use tracing::{error, info, warn};

use crate::{
    cache::Caches,
    job_helpers::{make_output_path, OutputPathError},
    metadata::{self, CameraMetadata},
    pipeline::{self, RawFrame},
    settings::WbMethod,
    transform::{self, Transform},
    white_balance, Matrix3, Settings, Status,
};

type Outcome<T> = Result<T, (Status, String)>;

/// Logs the time since the previous lap, when enabled.
struct Timer {
    enabled: bool,
    last: Instant,
}

impl Timer {
    fn new(enabled: bool) -> Timer {
        Timer {
            enabled,
            last: Instant::now(),
        }
    }

    fn lap(&mut self, stage: &str) {
        if self.enabled {
            let now = Instant::now();
            info!("{}: {:.3}s", stage, (now - self.last).as_secs_f64());
            self.last = now;
        }
    }
}

pub struct ImageConverter {
    pub settings: Settings,

    database: Arc<Database>,
    /// Set when the database was given explicitly, rather than found
    /// through `settings.database_directories`.
    pinned_database: bool,
    caches: Caches,

    // Results of the last configure.
    metadata: Option<CameraMetadata>,
    wb_multipliers: Option<[f64; 4]>,
    transform: Option<Transform>,

    status: Status,
    last_error_message: String,
}

impl ImageConverter {
    /// A converter that looks up the spectral database through
    /// `settings.database_directories`, the environment or the default
    /// locations.
    pub fn new(settings: Settings) -> ImageConverter {
        let database = Database::new(spectral::database_paths(&settings.database_directories));
        ImageConverter {
            pinned_database: false,
            ..ImageConverter::with_database(settings, Arc::new(database))
        }
    }

    /// A converter using the given database, e.g. one shared between the
    /// converters of a batch.
    pub fn with_database(settings: Settings, database: Arc<Database>) -> ImageConverter {
        ImageConverter {
            settings,
            database,
            pinned_database: true,
            caches: Caches::new(),
            metadata: None,
            wb_multipliers: None,
            transform: None,
            status: Status::Success,
            last_error_message: String::new(),
        }
    }

    pub fn database(&self) -> &Arc<Database> {
        &self.database
    }

    //------------------------------------------------------------
    // Operations.

    /// Reads the metadata of `path`, and computes its white balance and
    /// colour transform.
    ///
    /// Returns `false` if the file can't be read.  Missing data for the
    /// selected methods isn't a failure: the affected results are just
    /// left empty.
    pub fn configure<P: AsRef<Path>>(&mut self, path: P) -> bool {
        self.reset();
        let result = self.try_configure(path.as_ref());
        self.finish(result)
    }

    /// Like `configure()`, but with already extracted metadata.
    pub fn configure_from_metadata(&mut self, metadata: CameraMetadata) -> bool {
        self.reset();
        let mut metadata = metadata;
        metadata.apply_overrides(
            &self.settings.custom_camera_make,
            &self.settings.custom_camera_model,
        );
        let result = self.compute(metadata, None);
        self.finish(result)
    }

    /// Configures for `path`, then converts it to ACES2065-1 and writes the
    /// result to `<stem>_aces.tif`.
    pub fn process_image<P: AsRef<Path>>(&mut self, path: P) -> bool {
        self.reset();
        let result = self.try_process(path.as_ref());
        self.finish(result)
    }

    //------------------------------------------------------------
    // Accessors.

    /// The last computed white balance multipliers.
    pub fn wb_multipliers(&self) -> Option<[f64; 4]> {
        self.wb_multipliers
    }

    /// The last computed IDT.  `None` if a CAT was computed instead.
    pub fn idt_matrix(&self) -> Option<Matrix3> {
        self.transform.filter(Transform::is_idt).map(|t| *t.matrix())
    }

    /// The last computed CAT.  `None` if an IDT was computed instead.
    pub fn cat_matrix(&self) -> Option<Matrix3> {
        match self.transform {
            Some(Transform::Cat(m)) => Some(m),
            _ => None,
        }
    }

    pub fn transform(&self) -> Option<Transform> {
        self.transform
    }

    pub fn camera_metadata(&self) -> Option<&CameraMetadata> {
        self.metadata.as_ref()
    }

    pub fn status(&self) -> Status {
        self.status
    }

    pub fn last_error_message(&self) -> &str {
        &self.last_error_message
    }

    /// The built-in illuminant families, followed by the illuminant types in
    /// the database.
    pub fn supported_illuminants(&mut self) -> Vec<String> {
        self.refresh_database();
        let mut names: Vec<String> = illuminant::BUILT_IN.iter().map(|s| s.to_string()).collect();
        names.extend(self.database.illuminant_types());
        names
    }

    /// Cameras with spectral data in the database, as "Make / Model".
    pub fn supported_cameras(&mut self) -> Vec<String> {
        self.refresh_database();
        self.database.camera_names()
    }

    //------------------------------------------------------------
    // Internals.

    fn reset(&mut self) {
        self.metadata = None;
        self.wb_multipliers = None;
        self.transform = None;
        self.status = Status::Success;
        self.last_error_message.clear();
    }

    fn finish(&mut self, result: Outcome<()>) -> bool {
        match result {
            Ok(()) => {
                self.status = Status::Success;
                true
            }
            Err((status, message)) => {
                error!("{}", message);
                self.status = status;
                self.last_error_message = message;
                false
            }
        }
    }

    /// Follows changes to `settings.database_directories`.
    fn refresh_database(&mut self) {
        if self.pinned_database {
            return;
        }
        let paths = spectral::database_paths(&self.settings.database_directories);
        if paths != self.database.paths() {
            self.database = Arc::new(Database::new(paths));
            self.caches = Caches::new();
        }
    }

    fn check_input(path: &Path) -> Outcome<()> {
        if path.as_os_str().is_empty() {
            return Err((
                Status::EmptyInputFilename,
                "Empty input filename provided".into(),
            ));
        }
        if !path.exists() {
            return Err((
                Status::InputFileNotFound,
                format!("Input file does not exist: {}", path.display()),
            ));
        }
        Ok(())
    }

    fn decode(path: &Path) -> Outcome<rawloader::RawImage> {
        metadata::decode(path).map_err(|e| {
            warn!("{}", e);
            (
                Status::ReadError,
                format!("Failed to read image file: {}", path.display()),
            )
        })
    }

    fn read_metadata(&self, path: &Path, raw: &rawloader::RawImage) -> CameraMetadata {
        let mut metadata = CameraMetadata::from_raw(path, raw);
        metadata.apply_overrides(
            &self.settings.custom_camera_make,
            &self.settings.custom_camera_model,
        );
        metadata
    }

    fn normalized_frame(&self, raw: &rawloader::RawImage) -> RawFrame {
        let mut frame = RawFrame::from_raw_image(raw);
        frame.normalize(
            self.settings.black_level,
            self.settings.saturation_level,
            self.settings.adjust_maximum_threshold,
        );
        frame
    }

    fn try_configure(&mut self, path: &Path) -> Outcome<()> {
        Self::check_input(path)?;
        let mut timer = Timer::new(self.settings.use_timing);

        let raw = Self::decode(path)?;
        let metadata = self.read_metadata(path, &raw);
        timer.lap("Reading metadata");

        let frame = if self.settings.wb_method == WbMethod::Box {
            let frame = self.normalized_frame(&raw);
            timer.lap("Decoding");
            Some(frame)
        } else {
            None
        };

        self.compute(metadata, frame.as_ref())?;
        timer.lap("Computing transforms");
        Ok(())
    }

    /// Computes and stores the white balance and the transform.
    fn compute(&mut self, metadata: CameraMetadata, frame: Option<&RawFrame>) -> Outcome<()> {
        self.refresh_database();
        self.caches.set_disabled(self.settings.disable_cache);

        let wb = white_balance::calculate(
            &self.settings,
            &metadata,
            &self.database,
            frame,
            &mut self.caches,
        );
        let transform = transform::calculate(
            &self.settings,
            &metadata,
            &self.database,
            wb,
            &mut self.caches,
        );

        if self.settings.verbosity > 0 {
            info!("Camera: {} {}", metadata.make, metadata.model);
            match wb {
                Some(wb) => info!("White balance multipliers: {:?}", wb),
                None => info!("White balance multipliers: none"),
            }
            match transform {
                Some(Transform::Cat(m)) => info!("CAT matrix: {:?}", m),
                Some(t) => info!("IDT matrix: {:?}", t.matrix()),
                None => info!("No colour transform"),
            }
        }

        self.metadata = Some(metadata);
        let transform = transform.ok_or_else(|| {
            (
                Status::ConfigurationError,
                "The colour space transform has not been configured properly.".to_string(),
            )
        })?;
        self.wb_multipliers = wb;
        self.transform = Some(transform);
        Ok(())
    }

    fn output_path(&self, input: &Path) -> Outcome<PathBuf> {
        make_output_path(input, &self.settings).map_err(|e| {
            let status = match e {
                OutputPathError::FileExists(_) => Status::FileExists,
                OutputPathError::MissingDirectory(_) => Status::OutputDirectoryError,
                OutputPathError::InvalidPath(_) => Status::InvalidPath,
                OutputPathError::Io(..) => Status::FilesystemError,
            };
            (status, e.to_string())
        })
    }

    fn try_process(&mut self, path: &Path) -> Outcome<()> {
        Self::check_input(path)?;
        let output = self.output_path(path)?;
        let mut timer = Timer::new(self.settings.use_timing);

        let raw = Self::decode(path)?;
        let metadata = self.read_metadata(path, &raw);
        let mut frame = self.normalized_frame(&raw);
        drop(raw);
        timer.lap("Decoding");

        self.compute(metadata, Some(&frame))?;
        timer.lap("Computing transforms");

        let wb = self.wb_multipliers.ok_or_else(|| {
            (
                Status::ConfigurationError,
                "Failed to calculate the white balance multipliers.".to_string(),
            )
        })?;
        let matrix = match self.transform {
            Some(t) => t.pixel_matrix(),
            None => {
                return Err((
                    Status::ConfigurationError,
                    "Failed to calculate the colour transform matrix.".into(),
                ))
            }
        };

        let settings = &self.settings;
        if settings.denoise_threshold > 0.0 {
            warn!("Denoising is not supported, ignoring the denoise threshold.");
        }
        if !settings.demosaic_algorithm.eq_ignore_ascii_case("linear") {
            warn!(
                "Demosaic algorithm '{}' is not supported, using 'linear'.",
                settings.demosaic_algorithm
            );
        }

        frame.apply_white_balance(wb, settings.highlight_mode == 0);
        let mut image = frame.demosaic(settings.half_size);
        pipeline::correct_aberration(&mut image, settings.chromatic_aberration());
        if settings.auto_bright {
            pipeline::auto_brighten(&mut image);
        }
        timer.lap("Demosaicing");

        pipeline::apply_matrix(&mut image, &matrix)
            .map_err(|e| (Status::MatrixApplicationError, e.to_string()))?;
        pipeline::apply_scale(&mut image, settings.headroom * settings.scale)
            .map_err(|e| (Status::ScaleApplicationError, e.to_string()))?;

        let window = pipeline::crop_window(settings.crop_box(), &frame)
            .map_err(|e| (Status::CropApplicationError, e.to_string()))?
            .map(|w| {
                if settings.half_size {
                    w.map(|n| n / 2)
                } else {
                    w
                }
            });
        pipeline::apply_crop(&mut image, settings.crop_mode, window)
            .map_err(|e| (Status::CropApplicationError, e.to_string()))?;
        pipeline::apply_flip(&mut image, settings.flip);
        timer.lap("Applying transforms");

        image_fmt::save(&output, &image).map_err(|e| {
            (
                Status::WriteError,
                format!("Failed to write '{}': {}", output.display(), e),
            )
        })?;
        timer.lap("Writing");

        info!("Wrote '{}'", output.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::fs;

    use spectral::illuminant::{BLACKBODY_DESCRIPTION, DAYLIGHT_DESCRIPTION};

    use crate::{
        metadata::tests::{blackmagic_dng, write_dng},
        settings::MatrixMethod,
    };

    fn converter() -> ImageConverter {
        ImageConverter::with_database(Settings::default(), Arc::new(Database::default()))
    }

    #[test]
    fn empty_before_configure() {
        let mut c = converter();
        assert_eq!(c.wb_multipliers(), None);
        assert_eq!(c.idt_matrix(), None);
        assert_eq!(c.cat_matrix(), None);
        assert!(c.camera_metadata().is_none());
        assert!(c.supported_cameras().is_empty());
        assert_eq!(
            c.supported_illuminants(),
            vec![DAYLIGHT_DESCRIPTION.to_string(), BLACKBODY_DESCRIPTION.to_string()]
        );
    }

    #[test]
    fn lists_database_contents() {
        let dir = tempfile::tempdir().unwrap();
        crate::transform::tests::write_database(dir.path());

        let mut settings = Settings::default();
        settings.database_directories = vec![dir.path().to_string_lossy().into()];
        let mut c = ImageConverter::new(settings);
        assert_eq!(c.supported_cameras(), vec!["Acme / Spectro".to_string()]);
        let illuminants = c.supported_illuminants();
        assert_eq!(illuminants.len(), 3);
        assert_eq!(illuminants[2], "flat");

        // Changing the search path takes effect.
        c.settings.database_directories = vec![dir.path().join("nowhere").to_string_lossy().into()];
        assert!(c.supported_cameras().is_empty());
    }

    #[test]
    fn configure_dng_metadata() {
        let mut c = converter();
        assert!(c.configure_from_metadata(blackmagic_dng()));
        assert_eq!(c.status(), Status::Success);

        let wb = c.wb_multipliers().unwrap();
        let expected = [1.58982515335083, 1.0, 1.2651821374893188, 0.0];
        for i in 0..4 {
            assert!((wb[i] - expected[i]).abs() < 1e-4);
        }

        let idt = c.idt_matrix().unwrap();
        let expected = [
            [1.0536466, 0.0039044, 0.0049085],
            [-0.4899562, 1.3614788, 0.1020845],
            [-0.0024498, 0.0060497, 1.0139160],
        ];
        for i in 0..3 {
            for j in 0..3 {
                assert!((idt[i][j] - expected[i][j]).abs() < 1e-5);
            }
        }
        assert!(c.cat_matrix().is_none());
        assert_eq!(c.camera_metadata().unwrap().make, "Blackmagic");
    }

    #[test]
    fn auto_without_camera_data() {
        let mut c = converter();
        assert!(c.configure_from_metadata(CameraMetadata::default()));
        assert_eq!(c.wb_multipliers(), None);
        assert!(c.idt_matrix().is_none());
        assert!(c.cat_matrix().is_some());
    }

    #[test]
    fn idempotent() {
        let mut c = converter();
        c.configure_from_metadata(blackmagic_dng());
        let first = (c.wb_multipliers(), c.transform());
        c.configure_from_metadata(blackmagic_dng());
        assert_eq!((c.wb_multipliers(), c.transform()), first);

        c.settings.disable_cache = true;
        c.configure_from_metadata(blackmagic_dng());
        assert_eq!((c.wb_multipliers(), c.transform()), first);
    }

    #[test]
    fn custom_methods() {
        let mut c = converter();
        c.settings.wb_method = WbMethod::Custom;
        c.settings.set_custom_wb(&[2.0, 1.0, 1.5, 1.0]).unwrap();
        c.settings.matrix_method = MatrixMethod::Custom;
        c.settings
            .set_custom_matrix(&[[0.5, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
            .unwrap();

        assert!(c.configure_from_metadata(CameraMetadata::default()));
        assert_eq!(c.wb_multipliers(), Some([2.0, 1.0, 1.5, 1.0]));
        assert_eq!(
            c.idt_matrix(),
            Some([[0.5, 0.5, 0.0], [0.0, 1.0, 0.0], [0.0, 0.0, 1.0]])
        );
        assert_eq!(c.cat_matrix(), None);
    }

    #[test]
    fn concrete_method_without_data() {
        let mut c = converter();
        for method in [MatrixMethod::Spectral, MatrixMethod::Metadata, MatrixMethod::Adobe] {
            c.settings.matrix_method = method;
            assert!(!c.configure_from_metadata(CameraMetadata::default()));
            assert_eq!(c.status(), Status::ConfigurationError);
            assert!(c.idt_matrix().is_none());
            assert!(c.cat_matrix().is_none());
        }
    }

    #[test]
    fn camera_overrides() {
        let mut c = converter();
        c.settings.custom_camera_make = "Acme".into();
        c.configure_from_metadata(blackmagic_dng());
        let metadata = c.camera_metadata().unwrap();
        assert_eq!(metadata.make, "Acme");
        assert_eq!(metadata.model, "Cinema Camera");
    }

    #[test]
    fn invalid_paths() {
        let mut c = converter();

        assert!(!c.configure(""));
        assert_eq!(c.status(), Status::EmptyInputFilename);
        assert_eq!(c.last_error_message(), "Empty input filename provided");

        assert!(!c.process_image(""));
        assert_eq!(c.status(), Status::EmptyInputFilename);

        let missing = Path::new("/nonexistent/dir/shot.dng");
        assert!(!c.process_image(missing));
        assert_eq!(c.status(), Status::InputFileNotFound);
        assert_eq!(
            c.last_error_message(),
            "Input file does not exist: /nonexistent/dir/shot.dng"
        );
        assert!(c.wb_multipliers().is_none());
    }

    #[test]
    fn unreadable_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("garbage.dng");
        fs::write(&path, b"this is not a raw file").unwrap();

        let mut c = converter();
        assert!(!c.configure(&path));
        assert_eq!(c.status(), Status::ReadError);
        assert!(c.last_error_message().starts_with("Failed to read image file: "));

        c.settings.overwrite = true;
        assert!(!c.process_image(&path));
        assert_eq!(c.status(), Status::ReadError);
        assert!(!dir.path().join("garbage_aces.tif").exists());
    }

    #[test]
    fn dng_without_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tags_only.dng");
        write_dng(&path);

        // The colour tags are readable, but the decoder needs image data.
        let mut c = converter();
        assert!(!c.configure(&path));
        assert_eq!(c.status(), Status::ReadError);
        assert!(c.camera_metadata().is_none());
        assert!(c.idt_matrix().is_none());
    }

    #[test]
    fn output_checked_before_decoding() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shot.dng");
        fs::write(&path, b"not decoded").unwrap();
        fs::write(dir.path().join("shot_aces.tif"), b"").unwrap();

        let mut c = converter();
        assert!(!c.process_image(&path));
        assert_eq!(c.status(), Status::FileExists);

        c.settings.output_dir = dir.path().join("missing").to_string_lossy().into();
        assert!(!c.process_image(&path));
        assert_eq!(c.status(), Status::OutputDirectoryError);
    }

    #[test]
    fn recovers_after_failure() {
        let mut c = converter();
        assert!(!c.configure("/nonexistent.dng"));
        assert!(c.configure_from_metadata(blackmagic_dng()));
        assert_eq!(c.status(), Status::Success);
        assert!(c.last_error_message().is_empty());
        assert!(c.wb_multipliers().is_some());
    }
}
