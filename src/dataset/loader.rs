//! Face image loader
//!
//! Reads grayscale face crops from disk and pairs them with the annotated
//! attribute score. Two entry points mirror the two ways datasets are shipped:
//! a directory whose file names are keys of the annotation table, or a list
//! file naming the images to load.

use std::path::{Path, PathBuf};

use image::imageops::FilterType;
use image::{GrayImage, ImageReader};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};
use walkdir::WalkDir;

use super::annotations::AnnotationTable;
use super::{Dataset, Example};
use crate::utils::error::{FaceAttributeError, Result};
use crate::utils::logging::loading_bar;
use crate::{IMAGE_HEIGHT, IMAGE_WIDTH};

/// Decode an image as 8-bit grayscale at the canonical 150x130 size
pub fn load_grayscale(path: &Path) -> Result<GrayImage> {
    let image = ImageReader::open(path)
        .map_err(|e| FaceAttributeError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .with_guessed_format()
        .map_err(|e| FaceAttributeError::ImageLoad(path.to_path_buf(), e.to_string()))?
        .decode()
        .map_err(|e| FaceAttributeError::ImageLoad(path.to_path_buf(), e.to_string()))?;

    let gray = image.to_luma8();
    if gray.dimensions() == (IMAGE_WIDTH as u32, IMAGE_HEIGHT as u32) {
        Ok(gray)
    } else {
        debug!(
            "Resizing {:?} from {:?} to {}x{}",
            path,
            gray.dimensions(),
            IMAGE_WIDTH,
            IMAGE_HEIGHT
        );
        Ok(image::imageops::resize(
            &gray,
            IMAGE_WIDTH as u32,
            IMAGE_HEIGHT as u32,
            FilterType::Triangle,
        ))
    }
}

/// Load every image in `dir` whose file name is a key of `table`
///
/// Files without an annotation row are ignored; unreadable images are
/// logged and skipped. Targets are left unnormalised.
pub fn load_data_into_memory(
    dir: &Path,
    table: &AnnotationTable,
    attribute: &str,
) -> Result<Dataset> {
    if !dir.is_dir() {
        return Err(FaceAttributeError::PathNotFound(dir.to_path_buf()));
    }
    let column = table.column_index(attribute)?;

    let mut files: Vec<(String, PathBuf)> = WalkDir::new(dir)
        .follow_links(true)
        .min_depth(1)
        .max_depth(1)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .filter_map(|e| {
            let name = e.file_name().to_str()?.to_string();
            table.contains(&name).then(|| (name, e.into_path()))
        })
        .collect();
    files.sort();

    info!("Loading {} annotated images from {:?}", files.len(), dir);
    let bar = loading_bar(files.len(), "Loading images");

    let mut examples = Vec::with_capacity(files.len());
    for (name, path) in files {
        bar.inc(1);
        if let Some(example) = load_example(&path, &name, table, column) {
            examples.push(example);
        }
    }
    bar.finish_and_clear();

    info!("Loaded {} images into memory", examples.len());
    Ok(Dataset::new(examples))
}

/// Load the images named in the first column of `list_csv`
///
/// Listed images that are missing on disk or absent from the annotation
/// table are logged and skipped.
pub fn load_listed_images(
    dir: &Path,
    list_csv: &Path,
    table: &AnnotationTable,
    attribute: &str,
) -> Result<Dataset> {
    if !list_csv.exists() {
        return Err(FaceAttributeError::PathNotFound(list_csv.to_path_buf()));
    }
    let column = table.column_index(attribute)?;

    let mut reader = csv::ReaderBuilder::new()
        .has_headers(false)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_path(list_csv)?;

    let mut names = Vec::new();
    for record in reader.records() {
        let record = record?;
        if let Some(name) = record.get(0).filter(|n| !n.is_empty()) {
            names.push(name.to_string());
        }
    }

    info!("Loading {} listed images from {:?}", names.len(), dir);
    let bar = loading_bar(names.len(), "Loading images");

    let mut examples = Vec::with_capacity(names.len());
    let mut missing = 0usize;
    for name in names {
        bar.inc(1);
        let path = dir.join(&name);
        if !path.is_file() {
            missing += 1;
            warn!("Listed image {:?} is missing, skipping", path);
            continue;
        }
        if let Some(example) = load_example(&path, &name, table, column) {
            examples.push(example);
        }
    }
    bar.finish_and_clear();

    if missing > 0 {
        warn!("{} listed images were missing", missing);
    }
    info!("Loaded {} images into memory", examples.len());
    Ok(Dataset::new(examples))
}

fn load_example(
    path: &Path,
    name: &str,
    table: &AnnotationTable,
    column: usize,
) -> Option<Example> {
    let target = match table.value(name, column) {
        Ok(Some(target)) => target,
        Ok(None) => {
            warn!("No annotation for {}, skipping", name);
            return None;
        }
        Err(e) => {
            warn!("{}, skipping", e);
            return None;
        }
    };

    match load_grayscale(path) {
        Ok(image) => Some(Example::new(name, image, target)),
        Err(e) => {
            warn!("{}", e);
            None
        }
    }
}

/// Min/range normalisation fitted on the training targets
///
/// `apply` maps `y` to `(y - min) / range`, so the fitted targets span [0, 1].
/// Held-out splits reuse the training fit and may fall outside that interval.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TargetNormalizer {
    pub min: f32,
    pub range: f32,
}

impl TargetNormalizer {
    pub fn fit(targets: &[f32]) -> Result<Self> {
        if targets.is_empty() {
            return Err(FaceAttributeError::Dataset(
                "cannot fit a target normaliser on an empty split".to_string(),
            ));
        }
        if targets.iter().any(|t| !t.is_finite()) {
            return Err(FaceAttributeError::Dataset(
                "targets must be finite".to_string(),
            ));
        }
        let min = targets.iter().copied().fold(f32::INFINITY, f32::min);
        let range = targets
            .iter()
            .map(|&t| t - min)
            .fold(0.0f32, f32::max);
        Ok(Self { min, range })
    }

    /// Normalise one target; all targets map to 0 when the range is empty
    pub fn apply(&self, target: f32) -> f32 {
        if self.range == 0.0 {
            0.0
        } else {
            (target - self.min) / self.range
        }
    }

    /// Map a normalised value back to the attribute scale
    pub fn invert(&self, value: f32) -> f32 {
        value * self.range + self.min
    }
}
