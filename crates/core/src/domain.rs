//! Plain data types shared across the catalog, detector, and actuator.

use std::path::PathBuf;

/// A single catalog row: everything known about one image on disk.
#[derive(Debug, Clone, PartialEq)]
pub struct ImageRecord {
    pub id: i64,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub content_hash: String,
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub timestamp: Option<String>,
    pub camera_make: String,
    pub camera_model: String,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub perceptual_hash: Option<String>,
    pub average_hash: Option<String>,
    pub difference_hash: Option<String>,
    pub wavelet_hash: Option<String>,
    pub creation_time: String,
    pub modification_time: String,
    pub processed_at: String,
    pub marked_for_removal: bool,
    pub is_protected: bool,
    pub removal_reason: Option<String>,
}

impl ImageRecord {
    pub fn basename_len(&self) -> usize {
        self.file_path
            .file_name()
            .map(|n| n.to_string_lossy().chars().count())
            .unwrap_or(0)
    }
}

/// The equivalence relation that produced a [`DuplicateGroup`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GroupKind {
    Timestamp,
    Hash,
    Perceptual,
}

impl GroupKind {
    pub fn as_str(self) -> &'static str {
        match self {
            GroupKind::Timestamp => "timestamp",
            GroupKind::Hash => "hash",
            GroupKind::Perceptual => "perceptual",
        }
    }

    pub fn removal_reason(self) -> &'static str {
        match self {
            GroupKind::Timestamp => "timestamp_duplicate",
            GroupKind::Hash => "hash_duplicate",
            GroupKind::Perceptual => "perceptual_duplicate",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "timestamp" => Some(GroupKind::Timestamp),
            "hash" => Some(GroupKind::Hash),
            "perceptual" => Some(GroupKind::Perceptual),
            _ => None,
        }
    }
}

/// A finalized cluster of images, in memory before (or after) persistence.
#[derive(Debug, Clone)]
pub struct DuplicateGroup {
    pub id: i64,
    pub kind: GroupKind,
    pub similarity_score: Option<f64>,
    pub members: Vec<GroupMember>,
}

impl DuplicateGroup {
    /// The member flagged as the keeper, if one has been selected.
    pub fn keeper(&self) -> Option<&GroupMember> {
        self.members.iter().find(|m| m.is_keeper)
    }

    pub fn duplicates(&self) -> impl Iterator<Item = &GroupMember> {
        self.members.iter().filter(|m| !m.is_keeper)
    }
}

/// A lightweight member descriptor: just enough to report and reconcile,
/// never a back-reference into the catalog.
#[derive(Debug, Clone)]
pub struct GroupMember {
    pub image_id: i64,
    pub file_path: PathBuf,
    pub file_size: u64,
    pub is_keeper: bool,
}
