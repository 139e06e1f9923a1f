pub mod actuator;
pub mod catalog;
pub mod detector;
pub mod domain;
pub mod error;
pub mod exif;
pub mod hasher;
pub mod logging;
pub mod walker;

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use catalog::{Catalog, NewImage};
use error::Result;

/// Progress events emitted during [`Orchestrator::detect`]. Callbacks are
/// invoked from the calling thread only — extraction happens on a background
/// pool, but results are drained and reported sequentially, mirroring the
/// reference scanner's single-consumer progress channel.
pub enum DetectProgress {
    WalkComplete { candidate_count: usize },
    FileProcessed { path: PathBuf },
    ClusteringComplete,
}

pub struct DetectOutcome {
    pub images_processed: usize,
    pub summary: detector::DetectionSummary,
}

/// Drives the three user-visible modes — detect, remove, protect — against
/// one catalog. Owns the catalog connection for the process lifetime.
pub struct Orchestrator {
    catalog: Catalog,
}

impl Orchestrator {
    pub fn open(catalog_path: &Path) -> Result<Self> {
        let catalog = Catalog::open(catalog_path)?;
        Ok(Self { catalog })
    }

    pub fn open_in_memory() -> Result<Self> {
        Ok(Self {
            catalog: Catalog::open_in_memory()?,
        })
    }

    /// Walk `input_dir`, extract and catalog every candidate image, then
    /// cluster the catalog's contents and persist duplicate groups.
    ///
    /// Extraction (content hash, EXIF metadata, four perceptual hashes) fans
    /// out across a bounded worker pool sized by `max_workers`; results are
    /// drained from a channel and written to the catalog on the calling
    /// thread, so catalog writes stay serialized without blocking extraction.
    pub fn detect(
        &mut self,
        input_dir: &Path,
        similarity_threshold: u32,
        max_workers: usize,
        mut progress_cb: Option<&mut dyn FnMut(DetectProgress)>,
    ) -> Result<DetectOutcome> {
        if similarity_threshold > 64 {
            return Err(error::Error::InvalidThreshold(similarity_threshold));
        }
        if max_workers == 0 {
            return Err(error::Error::InvalidWorkerCount(max_workers));
        }

        let candidates = walker::walk(input_dir, max_workers)?;
        if let Some(ref mut cb) = progress_cb {
            cb(DetectProgress::WalkComplete {
                candidate_count: candidates.len(),
            });
        }

        let (tx, rx) = std::sync::mpsc::channel::<(PathBuf, NewImage)>();
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .build()
            .map_err(|e| error::Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;

        std::thread::scope(|scope| {
            scope.spawn(move || {
                pool.install(move || {
                    candidates.into_par_iter().for_each_with(tx, |tx, path| {
                        let record = extract_one(&path);
                        let _ = tx.send((path, record));
                    });
                });
            });

            let mut images_processed = 0usize;
            for (path, record) in rx {
                if let Err(e) = self.catalog.store_image_metadata(&record) {
                    tracing::warn!(path = %path.display(), error = %e, "failed to catalog image");
                } else {
                    images_processed += 1;
                }
                if let Some(ref mut cb) = progress_cb {
                    cb(DetectProgress::FileProcessed { path });
                }
            }

            let now = chrono::Utc::now()
                .naive_utc()
                .format("%Y-%m-%dT%H:%M:%S")
                .to_string();
            let summary = detector::run(&self.catalog, similarity_threshold, &now)?;

            if let Some(ref mut cb) = progress_cb {
                cb(DetectProgress::ClusteringComplete);
            }

            Ok(DetectOutcome {
                images_processed,
                summary,
            })
        })
    }

    /// Read the removal set and apply `config` to each file, reconciling the
    /// catalog as each item completes.
    pub fn remove(&self, config: &actuator::ActuatorConfig) -> Result<actuator::ActuationSummary> {
        actuator::run(&self.catalog, config)
    }

    /// Canonicalize `path` and mark the matching catalog row protected.
    /// Returns `false` if the path is not cataloged.
    pub fn protect(&self, path: &Path) -> Result<bool> {
        let canonical = path.canonicalize().unwrap_or_else(|_| path.to_path_buf());
        self.catalog.mark_protected(&canonical)
    }

    pub fn images_for_removal(&self) -> Result<Vec<domain::ImageRecord>> {
        self.catalog.images_for_removal()
    }

    pub fn count_images(&self) -> Result<i64> {
        self.catalog.count_images()
    }

    pub fn list_groups(&self) -> Result<Vec<domain::DuplicateGroup>> {
        self.catalog.list_groups()
    }
}

/// Extract everything known about one image: content hash, EXIF/filesystem
/// metadata, and all four perceptual hashes. Never fails outright — a
/// per-field failure leaves that field at its degraded default and is
/// reported via the returned record's empty/null fields.
fn extract_one(path: &Path) -> NewImage {
    let content_hash = hasher::compute_sha256(path).unwrap_or_else(|e| {
        tracing::warn!(path = %path.display(), error = %e, "failed to compute content hash");
        String::new()
    });
    let meta = exif::extract(path);
    let hashes = hasher::perceptual::compute_perceptual_hashes(path);

    let now = chrono::Utc::now()
        .naive_utc()
        .format("%Y-%m-%dT%H:%M:%S")
        .to_string();

    NewImage {
        file_path: path.to_path_buf(),
        file_size: std::fs::metadata(path).map(|m| m.len()).unwrap_or(0),
        content_hash,
        width: meta.width,
        height: meta.height,
        format: meta.format,
        timestamp: meta.timestamp,
        camera_make: meta.camera_make,
        camera_model: meta.camera_model,
        gps_latitude: meta.gps_latitude,
        gps_longitude: meta.gps_longitude,
        perceptual_hash: hashes.perceptual_hash.map(hasher::hash_to_hex),
        average_hash: hashes.average_hash.map(hasher::hash_to_hex),
        difference_hash: hashes.difference_hash.map(hasher::hash_to_hex),
        wavelet_hash: hashes.wavelet_hash.map(hasher::hash_to_hex),
        creation_time: meta.creation_time,
        modification_time: meta.modification_time,
        processed_at: now,
    }
}
