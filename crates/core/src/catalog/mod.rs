pub mod schema;

use std::path::{Path, PathBuf};

use rusqlite::{params, Connection, OptionalExtension};

use crate::domain::{DuplicateGroup, GroupKind, GroupMember, ImageRecord};
use crate::error::Result;

/// SQLite-backed catalog of image metadata and duplicate groups.
pub struct Catalog {
    conn: Connection,
}

impl Catalog {
    /// Open or create a catalog at the given path with WAL mode.
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    /// Open an in-memory catalog (for testing).
    pub fn open_in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        conn.pragma_update(None, "foreign_keys", "ON")?;
        schema::initialize(&conn)?;
        schema::migrate(&conn)?;
        Ok(Self { conn })
    }

    // ── Images ───────────────────────────────────────────────────────

    /// Insert or update an image's metadata row, keyed on `file_path`.
    ///
    /// Protection and removal-mark state are sticky: a re-detected image
    /// that was previously protected or marked keeps that state rather than
    /// having it silently erased by the new metadata. Only `store_image_metadata`
    /// ever writes the content/hash/EXIF columns; only [`mark_for_removal`],
    /// [`unmark_for_removal`], and [`mark_protected`] touch the state columns.
    pub fn store_image_metadata(&self, record: &NewImage) -> Result<i64> {
        let path_str = record.file_path.to_string_lossy();
        let tx = self.conn.unchecked_transaction()?;

        let existing: Option<(bool, bool, Option<String>)> = tx
            .query_row(
                "SELECT marked_for_removal, is_protected, removal_reason FROM images WHERE file_path = ?1",
                params![path_str.as_ref()],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)? != 0,
                        row.get::<_, i64>(1)? != 0,
                        row.get(2)?,
                    ))
                },
            )
            .optional()?;

        let (marked, protected, reason) = existing.unwrap_or((false, false, None));

        tx.execute(
            "INSERT INTO images (
                file_path, file_size, content_hash, width, height, format, timestamp,
                camera_make, camera_model, gps_latitude, gps_longitude,
                perceptual_hash, average_hash, difference_hash, wavelet_hash,
                creation_time, modification_time, processed_at,
                marked_for_removal, is_protected, removal_reason
             ) VALUES (
                ?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20, ?21
             )
             ON CONFLICT(file_path) DO UPDATE SET
                file_size = excluded.file_size,
                content_hash = excluded.content_hash,
                width = excluded.width,
                height = excluded.height,
                format = excluded.format,
                timestamp = excluded.timestamp,
                camera_make = excluded.camera_make,
                camera_model = excluded.camera_model,
                gps_latitude = excluded.gps_latitude,
                gps_longitude = excluded.gps_longitude,
                perceptual_hash = excluded.perceptual_hash,
                average_hash = excluded.average_hash,
                difference_hash = excluded.difference_hash,
                wavelet_hash = excluded.wavelet_hash,
                creation_time = excluded.creation_time,
                modification_time = excluded.modification_time,
                processed_at = excluded.processed_at",
            params![
                path_str.as_ref(),
                record.file_size as i64,
                record.content_hash,
                record.width,
                record.height,
                record.format,
                record.timestamp,
                record.camera_make,
                record.camera_model,
                record.gps_latitude,
                record.gps_longitude,
                record.perceptual_hash,
                record.average_hash,
                record.difference_hash,
                record.wavelet_hash,
                record.creation_time,
                record.modification_time,
                record.processed_at,
                marked as i64,
                protected as i64,
                reason,
            ],
        )?;

        let id: i64 = tx.query_row(
            "SELECT id FROM images WHERE file_path = ?1",
            params![path_str.as_ref()],
            |row| row.get(0),
        )?;
        tx.commit()?;
        Ok(id)
    }

    pub fn get_image(&self, id: i64) -> Result<Option<ImageRecord>> {
        self.conn
            .query_row(
                &format!("{SELECT_IMAGE} WHERE id = ?1"),
                params![id],
                row_to_image,
            )
            .optional()
            .map_err(Into::into)
    }

    pub fn get_image_by_path(&self, path: &Path) -> Result<Option<ImageRecord>> {
        self.conn
            .query_row(
                &format!("{SELECT_IMAGE} WHERE file_path = ?1"),
                params![path.to_string_lossy().as_ref()],
                row_to_image,
            )
            .optional()
            .map_err(Into::into)
    }

    /// All images, grouped by non-null timestamp, groups of 2+ only.
    pub fn images_by_timestamp(&self) -> Result<Vec<(String, Vec<ImageRecord>)>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_IMAGE} WHERE timestamp IS NOT NULL ORDER BY timestamp"
        ))?;
        let rows = stmt
            .query_map([], row_to_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(group_by(rows, |r| r.timestamp.clone().unwrap()))
    }

    /// All images, grouped by non-empty content hash, groups of 2+ only.
    pub fn images_by_content_hash(&self) -> Result<Vec<(String, Vec<ImageRecord>)>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_IMAGE} WHERE content_hash != '' ORDER BY content_hash"
        ))?;
        let rows = stmt
            .query_map([], row_to_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(group_by(rows, |r| r.content_hash.clone()))
    }

    /// Every image carrying at least one perceptual hash, for stage-3 clustering.
    pub fn images_with_perceptual_hashes(&self) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_IMAGE} WHERE average_hash IS NOT NULL OR difference_hash IS NOT NULL \
             OR perceptual_hash IS NOT NULL OR wavelet_hash IS NOT NULL"
        ))?;
        let rows = stmt
            .query_map([], row_to_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    /// Images marked for removal and not protected, ready for the actuator.
    pub fn images_for_removal(&self) -> Result<Vec<ImageRecord>> {
        let mut stmt = self.conn.prepare(&format!(
            "{SELECT_IMAGE} WHERE marked_for_removal = 1 AND is_protected = 0 ORDER BY file_path"
        ))?;
        let rows = stmt
            .query_map([], row_to_image)?
            .collect::<std::result::Result<Vec<_>, _>>()?;
        Ok(rows)
    }

    pub fn count_images(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM images", [], |row| row.get(0))?)
    }

    /// Mark an image for removal with a reason. A no-op on protected images —
    /// protection always wins over a removal mark, logged rather than erroring
    /// so a detector sweep can run unattended.
    pub fn mark_for_removal(&self, image_id: i64, reason: &str) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        let protected: Option<bool> = tx
            .query_row(
                "SELECT is_protected FROM images WHERE id = ?1",
                params![image_id],
                |row| row.get::<_, i64>(0).map(|v| v != 0),
            )
            .optional()?;

        match protected {
            Some(true) => {
                tracing::debug!(image_id, "skipping removal mark: image is protected");
            }
            Some(false) => {
                tx.execute(
                    "UPDATE images SET marked_for_removal = 1, removal_reason = ?1 WHERE id = ?2",
                    params![reason, image_id],
                )?;
            }
            None => {}
        }
        tx.commit()?;
        Ok(())
    }

    pub fn unmark_for_removal(&self, image_id: i64) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "UPDATE images SET marked_for_removal = 0, removal_reason = NULL WHERE id = ?1",
            params![image_id],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Protect an image by path: sets `is_protected` and clears any removal
    /// mark, since protection and a pending removal mark are mutually
    /// exclusive. Returns `false` if no image with this path is cataloged.
    pub fn mark_protected(&self, path: &Path) -> Result<bool> {
        let tx = self.conn.unchecked_transaction()?;
        let changed = tx.execute(
            "UPDATE images SET is_protected = 1, marked_for_removal = 0, removal_reason = NULL \
             WHERE file_path = ?1",
            params![path.to_string_lossy().as_ref()],
        )?;
        tx.commit()?;
        Ok(changed > 0)
    }

    // ── Duplicate groups ─────────────────────────────────────────────

    pub fn create_group(&self, kind: GroupKind, similarity_score: Option<f64>, created_at: &str) -> Result<i64> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO duplicate_groups (kind, similarity_score, created_at) VALUES (?1, ?2, ?3)",
            params![kind.as_str(), similarity_score, created_at],
        )?;
        let id = tx.last_insert_rowid();
        tx.commit()?;
        Ok(id)
    }

    pub fn add_to_group(&self, group_id: i64, image_id: i64, is_keeper: bool) -> Result<()> {
        let tx = self.conn.unchecked_transaction()?;
        tx.execute(
            "INSERT INTO group_images (group_id, image_id, is_keeper) VALUES (?1, ?2, ?3)
             ON CONFLICT(group_id, image_id) DO UPDATE SET is_keeper = excluded.is_keeper",
            params![group_id, image_id, is_keeper as i64],
        )?;
        tx.commit()?;
        Ok(())
    }

    pub fn count_groups(&self) -> Result<i64> {
        Ok(self
            .conn
            .query_row("SELECT count(*) FROM duplicate_groups", [], |row| {
                row.get(0)
            })?)
    }

    pub fn get_group(&self, group_id: i64) -> Result<Option<DuplicateGroup>> {
        let header: Option<(String, Option<f64>)> = self
            .conn
            .query_row(
                "SELECT kind, similarity_score FROM duplicate_groups WHERE id = ?1",
                params![group_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()?;

        let Some((kind_str, similarity_score)) = header else {
            return Ok(None);
        };
        let Some(kind) = GroupKind::parse(&kind_str) else {
            return Ok(None);
        };

        let mut stmt = self.conn.prepare(
            "SELECT i.id, i.file_path, i.file_size, g.is_keeper
             FROM group_images g JOIN images i ON i.id = g.image_id
             WHERE g.group_id = ?1 ORDER BY g.is_keeper DESC, i.file_path",
        )?;
        let members = stmt
            .query_map(params![group_id], |row| {
                Ok(GroupMember {
                    image_id: row.get(0)?,
                    file_path: PathBuf::from(row.get::<_, String>(1)?),
                    file_size: row.get::<_, i64>(2)? as u64,
                    is_keeper: row.get::<_, i64>(3)? != 0,
                })
            })?
            .collect::<std::result::Result<Vec<_>, _>>()?;

        Ok(Some(DuplicateGroup {
            id: group_id,
            kind,
            similarity_score,
            members,
        }))
    }

    pub fn list_groups(&self) -> Result<Vec<DuplicateGroup>> {
        let ids: Vec<i64> = {
            let mut stmt = self.conn.prepare("SELECT id FROM duplicate_groups ORDER BY id")?;
            stmt.query_map([], |row| row.get(0))?
                .collect::<std::result::Result<Vec<_>, _>>()?
        };
        ids.into_iter()
            .filter_map(|id| self.get_group(id).transpose())
            .collect()
    }
}

/// Fields `store_image_metadata` writes; omits the state columns it never touches.
#[derive(Debug, Clone)]
pub struct NewImage {
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
}

const SELECT_IMAGE: &str = "SELECT id, file_path, file_size, content_hash, width, height, format, \
     timestamp, camera_make, camera_model, gps_latitude, gps_longitude, \
     perceptual_hash, average_hash, difference_hash, wavelet_hash, \
     creation_time, modification_time, processed_at, \
     marked_for_removal, is_protected, removal_reason \
     FROM images";

fn row_to_image(row: &rusqlite::Row) -> rusqlite::Result<ImageRecord> {
    Ok(ImageRecord {
        id: row.get(0)?,
        file_path: PathBuf::from(row.get::<_, String>(1)?),
        file_size: row.get::<_, i64>(2)? as u64,
        content_hash: row.get(3)?,
        width: row.get(4)?,
        height: row.get(5)?,
        format: row.get(6)?,
        timestamp: row.get(7)?,
        camera_make: row.get(8)?,
        camera_model: row.get(9)?,
        gps_latitude: row.get(10)?,
        gps_longitude: row.get(11)?,
        perceptual_hash: row.get(12)?,
        average_hash: row.get(13)?,
        difference_hash: row.get(14)?,
        wavelet_hash: row.get(15)?,
        creation_time: row.get(16)?,
        modification_time: row.get(17)?,
        processed_at: row.get(18)?,
        marked_for_removal: row.get::<_, i64>(19)? != 0,
        is_protected: row.get::<_, i64>(20)? != 0,
        removal_reason: row.get(21)?,
    })
}

/// Group consecutive-after-sort rows by `key`, keeping only groups of 2+.
fn group_by<F>(mut rows: Vec<ImageRecord>, key: F) -> Vec<(String, Vec<ImageRecord>)>
where
    F: Fn(&ImageRecord) -> String,
{
    rows.sort_by_key(&key);
    let mut groups: Vec<(String, Vec<ImageRecord>)> = Vec::new();
    for row in rows {
        let k = key(&row);
        match groups.last_mut() {
            Some((last_key, members)) if *last_key == k => members.push(row),
            _ => groups.push((k, vec![row])),
        }
    }
    groups.into_iter().filter(|(_, members)| members.len() >= 2).collect()
}
