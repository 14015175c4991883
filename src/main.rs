use std::{path::PathBuf, process::exit, str::FromStr, sync::Arc};

use clap::{App, Arg, ArgMatches};
use rayon::prelude::*;

use lib::{
    files, CropMode, Error, ImageConverter, MatrixMethod, Settings, Status, WbMethod,
};
use spectral::Database;

const LIST_FLAGS: &[&str] = &["list-cameras", "list-illuminants", "list-formats"];

fn main() {
    let matches = App::new("raw2aces")
        .version("0.1")
        .about("Converts camera raw files to ACES2065-1")
        .arg(
            Arg::with_name("INPUT")
                .help("input raw files, or directories containing them")
                .required_unless_one(LIST_FLAGS)
                .multiple(true)
                .index(1),
        )
        .arg(
            Arg::with_name("wb-method")
                .long("wb-method")
                .value_name("METHOD")
                .possible_values(&["metadata", "illuminant", "box", "custom"])
                .help("How to determine the white balance")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("mat-method")
                .long("mat-method")
                .value_name("METHOD")
                .possible_values(&["auto", "spectral", "metadata", "adobe", "custom"])
                .help("How to determine the colour transform")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("illuminant")
                .long("illuminant")
                .value_name("NAME")
                .help("Illuminant for the illuminant white balance and the spectral transform, e.g. D55 or 3200K")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("wb-box")
                .long("wb-box")
                .value_name("X,Y,W,H")
                .help("Region to average for the box white balance")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("custom-wb")
                .long("custom-wb")
                .value_name("R,G,B,G2")
                .help("White balance multipliers for the custom white balance")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("custom-mat")
                .long("custom-mat")
                .value_name("M00,M01,...,M22")
                .help("Row-major 3x3 matrix for the custom colour transform")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("custom-camera-make")
                .long("custom-camera-make")
                .value_name("MAKE")
                .help("Overrides the camera make from the file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("custom-camera-model")
                .long("custom-camera-model")
                .value_name("MODEL")
                .help("Overrides the camera model from the file")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("headroom")
                .long("headroom")
                .value_name("FACTOR")
                .help("Highlight headroom factor [default: 6]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("scale")
                .long("scale")
                .value_name("FACTOR")
                .help("Additional scale factor [default: 1]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("crop-box")
                .long("crop-box")
                .value_name("X,Y,W,H")
                .help("Crop window, in sensor pixels")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("crop-mode")
                .long("crop-mode")
                .value_name("MODE")
                .possible_values(&["off", "soft", "hard"])
                .help("How to apply the crop window")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("auto-bright")
                .long("auto-bright")
                .help("Brighten the image so that 1% of it is at or above 1.0"),
        )
        .arg(
            Arg::with_name("adjust-maximum-threshold")
                .long("adjust-maximum-threshold")
                .value_name("FRACTION")
                .help("Lower the white level to the data maximum when it is above this fraction of it [default: 0.75]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("black-level")
                .long("black-level")
                .value_name("LEVEL")
                .help("Overrides the black level")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("saturation-level")
                .long("saturation-level")
                .value_name("LEVEL")
                .help("Overrides the white level")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("half-size")
                .long("half-size")
                .help("Output at half resolution"),
        )
        .arg(
            Arg::with_name("highlight-mode")
                .long("highlight-mode")
                .value_name("MODE")
                .help("0 clips highlights, anything else leaves them unclipped")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("flip")
                .long("flip")
                .value_name("CODE")
                .help("3 rotates 180 degrees, 5 90 degrees counter-clockwise, 6 90 degrees clockwise")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("denoise-threshold")
                .long("denoise-threshold")
                .value_name("THRESHOLD")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("demosaic")
                .long("demosaic")
                .value_name("ALGORITHM")
                .help("Demosaicing algorithm [default: linear]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("chromatic-aberration")
                .long("chromatic-aberration")
                .value_name("RED,BLUE")
                .help("Red and blue magnification factors")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("data-dir")
                .long("data-dir")
                .value_name("DIR")
                .help("Spectral database directory; may be given more than once")
                .multiple(true)
                .number_of_values(1)
                .takes_value(true),
        )
        .arg(
            Arg::with_name("output-dir")
                .long("output-dir")
                .value_name("DIR")
                .help("Where to write the converted files [default: next to the input]")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("overwrite")
                .long("overwrite")
                .help("Overwrite existing output files"),
        )
        .arg(
            Arg::with_name("create-dirs")
                .long("create-dirs")
                .help("Create missing output directories"),
        )
        .arg(
            Arg::with_name("use-timing")
                .long("use-timing")
                .help("Log the time taken by each stage"),
        )
        .arg(
            Arg::with_name("disable-cache")
                .long("disable-cache")
                .help("Don't cache computed transforms"),
        )
        .arg(
            Arg::with_name("list-cameras")
                .long("list-cameras")
                .help("List the cameras with spectral data"),
        )
        .arg(
            Arg::with_name("list-illuminants")
                .long("list-illuminants")
                .help("List the supported illuminants"),
        )
        .arg(
            Arg::with_name("list-formats")
                .long("list-formats")
                .help("List the supported raw file extensions"),
        )
        .arg(
            Arg::with_name("v")
                .short("v")
                .multiple(true)
                .help("Sets the level of verbosity"),
        )
        .get_matches();

    let settings = match settings_from_args(&matches) {
        Ok(settings) => settings,
        Err(e) => {
            eprintln!("Error: {}", e);
            exit(1);
        }
    };

    tracing_subscriber::fmt()
        .with_max_level(match settings.verbosity {
            0 => tracing::Level::WARN,
            1 => tracing::Level::INFO,
            _ => tracing::Level::DEBUG,
        })
        .with_writer(std::io::stderr)
        .init();

    let database = Arc::new(Database::new(spectral::database_paths(
        &settings.database_directories,
    )));

    // Listings.
    if LIST_FLAGS.iter().any(|f| matches.is_present(f)) {
        let mut converter = ImageConverter::with_database(settings.clone(), database.clone());
        if matches.is_present("list-cameras") {
            let cameras = converter.supported_cameras();
            println!("Spectral data is available for {} camera(s):", cameras.len());
            for camera in cameras {
                println!("    {}", camera);
            }
        }
        if matches.is_present("list-illuminants") {
            println!("Supported illuminants:");
            for illuminant in converter.supported_illuminants() {
                println!("    {}", illuminant);
            }
        }
        if matches.is_present("list-formats") {
            println!("Supported raw formats:");
            println!("    {}", files::supported_raw_formats().join(" "));
        }
        return;
    }

    // Conversion.
    let inputs: Vec<PathBuf> = matches
        .values_of("INPUT")
        .map(|v| v.map(PathBuf::from).collect())
        .unwrap_or_default();
    let (skipped, candidates) = files::collect_image_files(&inputs);
    for path in skipped.iter() {
        if path.exists() {
            if settings.verbosity > 0 {
                println!("Skipping '{}': not a supported raw file.", path.display());
            }
        } else {
            eprintln!("Skipping '{}': no such file or directory.", path.display());
        }
    }
    if candidates.is_empty() {
        eprintln!("No raw files to convert.");
        exit(1);
    }

    let total = candidates.len();
    let failures = candidates
        .par_iter()
        .enumerate()
        .filter(|(i, path)| {
            println!("[{}/{}] Processing file: {}", i + 1, total, path.display());

            let mut converter = ImageConverter::with_database(settings.clone(), database.clone());
            if converter.process_image(path) {
                if settings.verbosity > 0 {
                    print_results(&converter);
                }
                return false;
            }

            eprintln!(
                "Failed to convert '{}': {}",
                path.display(),
                converter.last_error_message()
            );
            match converter.status() {
                Status::FileExists => {
                    eprintln!("    Use --overwrite to allow overwriting existing files.")
                }
                Status::OutputDirectoryError => {
                    eprintln!("    Use --create-dirs to create missing output directories.")
                }
                _ => {}
            }
            true
        })
        .count();

    if failures > 0 {
        eprintln!("{} of {} file(s) failed to convert.", failures, total);
        exit(1);
    }
}

fn print_results(converter: &ImageConverter) {
    if let Some(wb) = converter.wb_multipliers() {
        println!(
            "    White balance multipliers: {:.6} {:.6} {:.6} {:.6}",
            wb[0], wb[1], wb[2], wb[3]
        );
    }
    let (label, matrix) = match (converter.idt_matrix(), converter.cat_matrix()) {
        (Some(m), _) => ("IDT", m),
        (None, Some(m)) => ("CAT", m),
        (None, None) => return,
    };
    println!("    {} matrix:", label);
    for row in matrix.iter() {
        println!("        {:>10.6} {:>10.6} {:>10.6}", row[0], row[1], row[2]);
    }
}

//-------------------------------------------------------------
// Argument parsing.

fn parse_value<T: FromStr>(text: &str, name: &str) -> Result<T, Error> {
    text.trim()
        .parse()
        .map_err(|_| Error::InvalidArgument(format!("Invalid value '{}' for --{}", text, name)))
}

fn parse_list<T: FromStr>(text: &str, name: &str) -> Result<Vec<T>, Error> {
    text.split(',').map(|v| parse_value(v, name)).collect()
}

fn settings_from_args(matches: &ArgMatches) -> Result<Settings, Error> {
    let mut settings = Settings::default();

    if let Some(v) = matches.value_of("wb-method") {
        settings.wb_method = v.parse::<WbMethod>()?;
    }
    if let Some(v) = matches.value_of("mat-method") {
        settings.matrix_method = v.parse::<MatrixMethod>()?;
    }
    if let Some(v) = matches.value_of("crop-mode") {
        settings.crop_mode = v.parse::<CropMode>()?;
    }

    if let Some(v) = matches.value_of("illuminant") {
        settings.illuminant = v.into();
    }
    if let Some(v) = matches.value_of("custom-camera-make") {
        settings.custom_camera_make = v.into();
    }
    if let Some(v) = matches.value_of("custom-camera-model") {
        settings.custom_camera_model = v.into();
    }
    if let Some(v) = matches.value_of("wb-box") {
        settings.set_wb_box(&parse_list::<i32>(v, "wb-box")?)?;
    }
    if let Some(v) = matches.value_of("custom-wb") {
        settings.set_custom_wb(&parse_list::<f32>(v, "custom-wb")?)?;
    }
    if let Some(v) = matches.value_of("custom-mat") {
        let values = parse_list::<f32>(v, "custom-mat")?;
        if values.len() != 9 {
            return Err(Error::InvalidArgument(
                "The matrix must contain 9 values.".into(),
            ));
        }
        let rows: Vec<&[f32]> = values.chunks(3).collect();
        settings.set_custom_matrix(&rows)?;
    }
    if let Some(v) = matches.value_of("crop-box") {
        settings.set_crop_box(&parse_list::<i32>(v, "crop-box")?)?;
    }
    if let Some(v) = matches.value_of("chromatic-aberration") {
        settings.set_chromatic_aberration(&parse_list::<f32>(v, "chromatic-aberration")?)?;
    }

    if let Some(v) = matches.value_of("headroom") {
        settings.headroom = parse_value(v, "headroom")?;
    }
    if let Some(v) = matches.value_of("scale") {
        settings.scale = parse_value(v, "scale")?;
    }
    if let Some(v) = matches.value_of("adjust-maximum-threshold") {
        settings.adjust_maximum_threshold = parse_value(v, "adjust-maximum-threshold")?;
    }
    if let Some(v) = matches.value_of("black-level") {
        settings.black_level = parse_value(v, "black-level")?;
    }
    if let Some(v) = matches.value_of("saturation-level") {
        settings.saturation_level = parse_value(v, "saturation-level")?;
    }
    if let Some(v) = matches.value_of("highlight-mode") {
        settings.highlight_mode = parse_value(v, "highlight-mode")?;
    }
    if let Some(v) = matches.value_of("flip") {
        settings.flip = parse_value(v, "flip")?;
    }
    if let Some(v) = matches.value_of("denoise-threshold") {
        settings.denoise_threshold = parse_value(v, "denoise-threshold")?;
    }
    if let Some(v) = matches.value_of("demosaic") {
        settings.demosaic_algorithm = v.into();
    }
    settings.auto_bright = matches.is_present("auto-bright");
    settings.half_size = matches.is_present("half-size");

    if let Some(dirs) = matches.values_of("data-dir") {
        settings.database_directories = dirs.map(String::from).collect();
    }
    if let Some(v) = matches.value_of("output-dir") {
        settings.output_dir = v.into();
    }
    settings.overwrite = matches.is_present("overwrite");
    settings.create_dirs = matches.is_present("create-dirs");
    settings.use_timing = matches.is_present("use-timing");
    settings.disable_cache = matches.is_present("disable-cache");
    settings.verbosity = matches.occurrences_of("v") as i32;

    Ok(settings)
}
