use std::path::PathBuf;

#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("image processing error: {0}")]
    Image(#[from] image::ImageError),

    #[error("EXIF parsing error: {0}")]
    Exif(#[from] exif::Error),

    #[error("input directory does not exist: {}", .0.display())]
    PathNotFound(PathBuf),

    #[error("path is not a directory: {}", .0.display())]
    NotADirectory(PathBuf),

    #[error("similarity threshold must be between 0 and 64, got {0}")]
    InvalidThreshold(u32),

    #[error("max-workers must be at least 1, got {0}")]
    InvalidWorkerCount(usize),

    #[error("group not found: {0}")]
    GroupNotFound(i64),

    #[error("image not in catalog: {}", .0.display())]
    ImageNotCataloged(PathBuf),

    #[error("could not find a free destination name for {} after 1000 attempts", .0.display())]
    TooManyMoveConflicts(PathBuf),

    #[error("schema version {db} is newer than the version this binary understands ({code})")]
    SchemaTooNew { db: i64, code: i64 },

    #[error("operation cancelled")]
    Cancelled,
}

pub type Result<T> = std::result::Result<T, Error>;
