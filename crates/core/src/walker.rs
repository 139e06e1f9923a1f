//! Recursive, symlink-skipping, system-directory-pruning traversal that
//! yields a stable, deduplicated, sorted sequence of candidate image paths.

use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::error::{Error, Result};

const SUPPORTED_EXTENSIONS: &[&str] = &[
    "jpg", "jpeg", "png", "gif", "tif", "tiff", "bmp", "webp", "ico", "jfif", "pjpeg", "pjp",
];

const SKIP_DIRECTORIES: &[&str] = &["@eaDir"];

/// Recursively walk `root`, returning canonical absolute paths to every
/// candidate image file, lexicographically sorted and deduplicated.
///
/// Directory listing fans out across a bounded worker pool sized by
/// `max_workers`; a count of 1 walks sequentially instead of handing a
/// single task to the pool.
pub fn walk(root: &Path, max_workers: usize) -> Result<Vec<PathBuf>> {
    if !root.exists() {
        return Err(Error::PathNotFound(root.to_path_buf()));
    }
    if !root.is_dir() {
        return Err(Error::NotADirectory(root.to_path_buf()));
    }

    let directories = discover_directories(root);

    let mut files: Vec<PathBuf> = if max_workers <= 1 || directories.len() <= 1 {
        directories.iter().flat_map(|d| list_images_in(d)).collect()
    } else {
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(max_workers)
            .build()
            .map_err(|e| Error::Io(std::io::Error::new(std::io::ErrorKind::Other, e)))?;
        pool.install(|| {
            directories
                .par_iter()
                .flat_map(|d| list_images_in(d))
                .collect()
        })
    };

    files.sort();
    files.dedup();
    Ok(files)
}

/// Breadth-first collection of every directory under `root`, skipping
/// symlinked directories and configured skip-names before descent.
fn discover_directories(root: &Path) -> Vec<PathBuf> {
    let mut pending = vec![root.to_path_buf()];
    let mut all = Vec::new();

    while let Some(dir) = pending.pop() {
        all.push(dir.clone());

        let entries = match std::fs::read_dir(&dir) {
            Ok(e) => e,
            Err(e) => {
                tracing::warn!(path = %dir.display(), error = %e, "cannot list directory");
                continue;
            }
        };

        for entry in entries.flatten() {
            let path = entry.path();
            let is_symlink = entry
                .path()
                .symlink_metadata()
                .map(|m| m.file_type().is_symlink())
                .unwrap_or(false);
            if is_symlink {
                continue;
            }
            if path.is_dir() {
                if should_skip_directory(&path) {
                    tracing::debug!(path = %path.display(), "skipping directory");
                    continue;
                }
                pending.push(path);
            }
        }
    }

    all
}

fn should_skip_directory(path: &Path) -> bool {
    let Some(name) = path.file_name().and_then(|n| n.to_str()) else {
        return false;
    };
    SKIP_DIRECTORIES
        .iter()
        .any(|skip| name.eq_ignore_ascii_case(skip))
}

/// List (non-recursive) the image files directly inside `dir`, canonicalized.
fn list_images_in(dir: &Path) -> Vec<PathBuf> {
    let mut found = Vec::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            tracing::warn!(path = %dir.display(), error = %e, "cannot access directory");
            return found;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_symlink = path
            .symlink_metadata()
            .map(|m| m.file_type().is_symlink())
            .unwrap_or(false);
        if is_symlink {
            continue;
        }
        if path.is_file() && is_image_file(&path) {
            match path.canonicalize() {
                Ok(canonical) => found.push(canonical),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "cannot canonicalize path");
                }
            }
        }
    }

    found
}

/// Recognition by extension first, falling back to MIME-by-extension inference.
fn is_image_file(path: &Path) -> bool {
    if let Some(ext) = path.extension().and_then(|e| e.to_str()) {
        if SUPPORTED_EXTENSIONS
            .iter()
            .any(|candidate| ext.eq_ignore_ascii_case(candidate))
        {
            return true;
        }
    }

    mime_guess::from_path(path)
        .first()
        .map(|m| m.type_() == mime_guess::mime::IMAGE)
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    #[test]
    fn walk_missing_root_errors() {
        let err = walk(Path::new("/does/not/exist"), 4).unwrap_err();
        assert!(matches!(err, Error::PathNotFound(_)));
    }

    #[test]
    fn walk_file_instead_of_dir_errors() {
        let tmp = tempfile::tempdir().unwrap();
        let file = tmp.path().join("a.jpg");
        fs::write(&file, b"x").unwrap();
        let err = walk(&file, 4).unwrap_err();
        assert!(matches!(err, Error::NotADirectory(_)));
    }

    #[test]
    fn walk_finds_images_sorted_and_deduped() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("sub")).unwrap();
        fs::write(tmp.path().join("b.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("a.png"), b"x").unwrap();
        fs::write(tmp.path().join("sub/c.JPEG"), b"x").unwrap();
        fs::write(tmp.path().join("note.txt"), b"x").unwrap();

        let found = walk(tmp.path(), 4).unwrap();
        assert_eq!(found.len(), 3);
        let mut sorted = found.clone();
        sorted.sort();
        assert_eq!(found, sorted);
    }

    #[test]
    fn walk_skips_ea_dir_case_insensitive() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("@EADIR")).unwrap();
        fs::write(tmp.path().join("@EADIR/hidden.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("visible.jpg"), b"x").unwrap();

        let found = walk(tmp.path(), 1).unwrap();
        assert_eq!(found.len(), 1);
        assert!(found[0].ends_with("visible.jpg"));
    }

    #[test]
    fn walk_skips_symlinked_directories() {
        let tmp = tempfile::tempdir().unwrap();
        let target = tmp.path().join("real");
        fs::create_dir_all(&target).unwrap();
        fs::write(target.join("img.jpg"), b"x").unwrap();

        #[cfg(unix)]
        {
            std::os::unix::fs::symlink(&target, tmp.path().join("link")).unwrap();
            let found = walk(tmp.path(), 1).unwrap();
            // Only the file under the real directory is found, not a second
            // copy reached through the symlink.
            assert_eq!(found.len(), 1);
        }
    }

    #[test]
    fn walk_empty_directory_returns_empty() {
        let tmp = tempfile::tempdir().unwrap();
        let found = walk(tmp.path(), 4).unwrap();
        assert!(found.is_empty());
    }

    #[test]
    fn walk_single_threaded_matches_parallel() {
        let tmp = tempfile::tempdir().unwrap();
        fs::create_dir_all(tmp.path().join("a")).unwrap();
        fs::create_dir_all(tmp.path().join("b")).unwrap();
        fs::write(tmp.path().join("a/1.jpg"), b"x").unwrap();
        fs::write(tmp.path().join("b/2.jpg"), b"x").unwrap();

        let sequential = walk(tmp.path(), 1).unwrap();
        let parallel = walk(tmp.path(), 4).unwrap();
        assert_eq!(sequential, parallel);
    }
}
