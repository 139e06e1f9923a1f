//! Safe delete-or-move of files the detector marked for removal, with
//! permission checks, move-name conflict resolution, cross-device fallback,
//! and catalog reconciliation.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::catalog::Catalog;
use crate::error::Result;

const MAX_CONFLICT_ATTEMPTS: u32 = 1000;

/// Where removed files go.
#[derive(Debug, Clone)]
pub enum Disposition {
    Delete,
    Move(PathBuf),
}

#[derive(Debug, Clone)]
pub struct ActuatorConfig {
    pub disposition: Disposition,
    pub dry_run: bool,
}

/// What happened to one marked image.
#[derive(Debug, Clone)]
pub enum Outcome {
    Deleted,
    Moved(PathBuf),
    /// The path was already gone; treated as success.
    AlreadyGone,
    /// Dry-run: no mutation was performed.
    WouldProcess,
    Failed(String),
}

#[derive(Debug, Clone)]
pub struct ActuationResult {
    pub image_id: i64,
    pub path: PathBuf,
    pub outcome: Outcome,
}

#[derive(Debug, Clone, Default)]
pub struct ActuationSummary {
    pub succeeded: usize,
    pub failed: usize,
    pub results: Vec<ActuationResult>,
}

/// Process every image currently marked for removal (and not protected)
/// according to `config`. Each item's failure is isolated; one failing item
/// never aborts the batch.
pub fn run(catalog: &Catalog, config: &ActuatorConfig) -> Result<ActuationSummary> {
    let pending = catalog.images_for_removal()?;
    let mut summary = ActuationSummary::default();

    if let Disposition::Move(dest) = &config.disposition {
        if !config.dry_run {
            std::fs::create_dir_all(dest)?;
        }
    }

    for image in pending {
        let outcome = process_one(&image.file_path, config);

        if !config.dry_run {
            if matches!(outcome, Outcome::Deleted | Outcome::Moved(_) | Outcome::AlreadyGone) {
                if let Err(e) = catalog.unmark_for_removal(image.id) {
                    tracing::warn!(
                        image_id = image.id,
                        path = %image.file_path.display(),
                        error = %e,
                        "file operation succeeded but catalog reconciliation failed"
                    );
                }
            }
        }

        match &outcome {
            Outcome::Failed(reason) => {
                summary.failed += 1;
                tracing::warn!(
                    image_id = image.id,
                    path = %image.file_path.display(),
                    reason = %reason,
                    "file operation failed"
                );
            }
            _ => summary.succeeded += 1,
        }

        summary.results.push(ActuationResult {
            image_id: image.id,
            path: image.file_path,
            outcome,
        });
    }

    Ok(summary)
}

fn process_one(path: &Path, config: &ActuatorConfig) -> Outcome {
    if !path.exists() {
        return Outcome::AlreadyGone;
    }

    match std::fs::symlink_metadata(path) {
        Ok(meta) if !meta.is_file() => {
            return Outcome::Failed(format!("{} is not a regular file", path.display()));
        }
        Err(e) => return Outcome::Failed(format!("cannot stat {}: {e}", path.display())),
        _ => {}
    }

    if config.dry_run {
        return Outcome::WouldProcess;
    }

    match &config.disposition {
        Disposition::Delete => match std::fs::remove_file(path) {
            Ok(()) => Outcome::Deleted,
            Err(e) => Outcome::Failed(format!("delete failed: {e}")),
        },
        Disposition::Move(dest_dir) => match move_with_conflict_resolution(path, dest_dir) {
            Ok(dest) => Outcome::Moved(dest),
            Err(e) => Outcome::Failed(format!("move failed: {e}")),
        },
    }
}

/// Move `path` into `dest_dir`, never overwriting an existing file. On name
/// collision, append a millisecond timestamp, then an incrementing counter
/// if the timestamped name still collides.
fn move_with_conflict_resolution(path: &Path, dest_dir: &Path) -> std::io::Result<PathBuf> {
    let file_name = path
        .file_name()
        .ok_or_else(|| std::io::Error::new(ErrorKind::InvalidInput, "source path has no file name"))?;

    let mut dest = dest_dir.join(file_name);
    if dest.exists() {
        dest = dest_dir.join(disambiguated_name(file_name, None));
        if dest.exists() {
            let mut counter = 0u32;
            loop {
                if counter >= MAX_CONFLICT_ATTEMPTS {
                    return Err(std::io::Error::new(
                        ErrorKind::AlreadyExists,
                        format!(
                            "could not find a free destination name for {} after {MAX_CONFLICT_ATTEMPTS} attempts",
                            path.display()
                        ),
                    ));
                }
                let candidate = dest_dir.join(disambiguated_name(file_name, Some(counter)));
                if !candidate.exists() {
                    dest = candidate;
                    break;
                }
                counter += 1;
            }
        }
    }

    move_file(path, &dest)?;
    Ok(dest)
}

fn disambiguated_name(file_name: &std::ffi::OsStr, counter: Option<u32>) -> String {
    let name = file_name.to_string_lossy();
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) => (stem, format!(".{ext}")),
        None => (name.as_ref(), String::new()),
    };
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis())
        .unwrap_or(0);
    match counter {
        Some(n) => format!("{stem}_{millis}_{n}{ext}"),
        None => format!("{stem}_{millis}{ext}"),
    }
}

fn move_file(origin: &Path, target: &Path) -> std::io::Result<()> {
    match std::fs::rename(origin, target) {
        Ok(()) => Ok(()),
        Err(err) if is_cross_device(&err) => {
            std::fs::copy(origin, target)?;
            std::fs::remove_file(origin)?;
            Ok(())
        }
        Err(err) => Err(err),
    }
}

#[cfg(unix)]
fn is_cross_device(err: &std::io::Error) -> bool {
    err.kind() == ErrorKind::CrossDeviceLink
}

#[cfg(not(unix))]
fn is_cross_device(_err: &std::io::Error) -> bool {
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::NewImage;
    use std::fs;

    fn sample(path: &Path) -> NewImage {
        NewImage {
            file_path: path.to_path_buf(),
            file_size: 4,
            content_hash: "h".to_string(),
            width: 10,
            height: 10,
            format: "JPEG".to_string(),
            timestamp: None,
            camera_make: String::new(),
            camera_model: String::new(),
            gps_latitude: None,
            gps_longitude: None,
            perceptual_hash: None,
            average_hash: None,
            difference_hash: None,
            wavelet_hash: None,
            creation_time: "2024-01-01T00:00:00".to_string(),
            modification_time: "2024-01-01T00:00:00".to_string(),
            processed_at: "2024-01-01T00:00:00".to_string(),
        }
    }

    #[test]
    fn dry_run_makes_no_changes() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"data").unwrap();

        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.store_image_metadata(&sample(&file)).unwrap();
        cat.mark_for_removal(id, "hash_duplicate").unwrap();

        let config = ActuatorConfig {
            disposition: Disposition::Delete,
            dry_run: true,
        };
        let summary = run(&cat, &config).unwrap();

        assert!(file.exists());
        assert_eq!(summary.succeeded, 1);
        let record = cat.get_image(id).unwrap().unwrap();
        assert!(record.marked_for_removal);
    }

    #[test]
    fn delete_removes_file_and_clears_mark() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"data").unwrap();

        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.store_image_metadata(&sample(&file)).unwrap();
        cat.mark_for_removal(id, "hash_duplicate").unwrap();

        let config = ActuatorConfig {
            disposition: Disposition::Delete,
            dry_run: false,
        };
        run(&cat, &config).unwrap();

        assert!(!file.exists());
        let record = cat.get_image(id).unwrap().unwrap();
        assert!(!record.marked_for_removal);
    }

    #[test]
    fn missing_file_treated_as_success() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("gone.jpg");

        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.store_image_metadata(&sample(&file)).unwrap();
        cat.mark_for_removal(id, "hash_duplicate").unwrap();

        let config = ActuatorConfig {
            disposition: Disposition::Delete,
            dry_run: false,
        };
        let summary = run(&cat, &config).unwrap();

        assert_eq!(summary.succeeded, 1);
        let record = cat.get_image(id).unwrap().unwrap();
        assert!(!record.marked_for_removal);
    }

    #[test]
    fn move_never_overwrites_existing_destination() {
        let tmp = tempfile::tempdir().unwrap();
        let dest = tmp.path().join("dest");
        fs::create_dir_all(&dest).unwrap();
        fs::write(dest.join("x.jpg"), b"existing").unwrap();

        let src_dir = tmp.path().join("src");
        fs::create_dir_all(&src_dir).unwrap();
        let file = src_dir.join("x.jpg");
        fs::write(&file, b"new data").unwrap();

        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.store_image_metadata(&sample(&file)).unwrap();
        cat.mark_for_removal(id, "hash_duplicate").unwrap();

        let config = ActuatorConfig {
            disposition: Disposition::Move(dest.clone()),
            dry_run: false,
        };
        let summary = run(&cat, &config).unwrap();

        assert_eq!(summary.succeeded, 1);
        assert!(!file.exists());
        assert_eq!(fs::read(dest.join("x.jpg")).unwrap(), b"existing");

        let entries: Vec<_> = fs::read_dir(&dest).unwrap().collect();
        assert_eq!(entries.len(), 2);
    }

    #[test]
    fn protected_images_are_never_processed() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"data").unwrap();

        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.store_image_metadata(&sample(&file)).unwrap();
        cat.mark_for_removal(id, "hash_duplicate").unwrap();
        cat.mark_protected(&file).unwrap();

        let config = ActuatorConfig {
            disposition: Disposition::Delete,
            dry_run: false,
        };
        let summary = run(&cat, &config).unwrap();

        assert_eq!(summary.results.len(), 0);
        assert!(file.exists());
    }

    #[test]
    fn not_a_regular_file_fails_the_item_not_the_batch() {
        let tmp = tempfile::tempdir().unwrap();
        let dir_path = tmp.path().join("a_directory.jpg");
        fs::create_dir_all(&dir_path).unwrap();

        let cat = Catalog::open_in_memory().unwrap();
        let id = cat.store_image_metadata(&sample(&dir_path)).unwrap();
        cat.mark_for_removal(id, "hash_duplicate").unwrap();

        let config = ActuatorConfig {
            disposition: Disposition::Delete,
            dry_run: false,
        };
        let summary = run(&cat, &config).unwrap();

        assert_eq!(summary.failed, 1);
        assert!(matches!(summary.results[0].outcome, Outcome::Failed(_)));
    }
}
