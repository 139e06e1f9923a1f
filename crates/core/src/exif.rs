//! Metadata extraction: EXIF timestamp/camera/GPS, dimensions, format, and
//! filesystem timestamps for a single image path.

use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use chrono::{DateTime, Local};

/// Everything the EXIF/filesystem pass can recover about one file, ahead of
/// content hashing and perceptual hashing (handled separately in [`crate::hasher`]).
#[derive(Debug, Clone, Default)]
pub struct ExtractedMetadata {
    pub width: u32,
    pub height: u32,
    pub format: String,
    pub timestamp: Option<String>,
    pub camera_make: String,
    pub camera_model: String,
    pub gps_latitude: Option<f64>,
    pub gps_longitude: Option<f64>,
    pub creation_time: String,
    pub modification_time: String,
}

/// Read dimensions/format via the `image` crate header inspection, then EXIF
/// tags via `kamadak-exif`, with a secondary pass for timestamp/camera fields
/// that the primary reader left empty. Any failure leaves the corresponding
/// fields at their zero value rather than aborting extraction.
pub fn extract(path: &Path) -> ExtractedMetadata {
    let mut meta = ExtractedMetadata::default();

    match image::ImageReader::open(path).and_then(|r| r.with_guessed_format()) {
        Ok(reader) => {
            if let Some(format) = reader.format() {
                meta.format = format_tag(format);
            }
            match reader.into_dimensions() {
                Ok((w, h)) => {
                    meta.width = w;
                    meta.height = h;
                }
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "failed to read image dimensions");
                }
            }
        }
        Err(e) => {
            tracing::warn!(path = %path.display(), error = %e, "failed to open image for header inspection");
        }
    }

    if let Some(times) = filesystem_times(path) {
        meta.creation_time = times.0;
        meta.modification_time = times.1;
    } else {
        tracing::warn!(path = %path.display(), "failed to read filesystem timestamps");
    }

    if let Some(exif) = read_exif(path) {
        apply_exif(&exif, &mut meta);
    }

    // Secondary pass: some files carry EXIF in a container the primary
    // reader's container sniffing misses (e.g. a bare TIFF). Retry directly
    // only for the fields still missing.
    if meta.timestamp.is_none() || (meta.camera_make.is_empty() && meta.camera_model.is_empty()) {
        if let Some(exif) = read_exif_raw(path) {
            apply_exif(&exif, &mut meta);
        } else {
            tracing::debug!(path = %path.display(), "no EXIF data recovered on secondary pass");
        }
    }

    meta
}

fn format_tag(fmt: image::ImageFormat) -> String {
    use image::ImageFormat::*;
    match fmt {
        Jpeg => "JPEG",
        Png => "PNG",
        Gif => "GIF",
        Tiff => "TIFF",
        Bmp => "BMP",
        WebP => "WEBP",
        Ico => "ICO",
        other => return format!("{other:?}").to_uppercase(),
    }
    .to_string()
}

fn filesystem_times(path: &Path) -> Option<(String, String)> {
    let meta = std::fs::metadata(path).ok()?;
    let created = meta
        .created()
        .ok()
        .map(system_time_to_iso)
        .unwrap_or_default();
    let modified = meta
        .modified()
        .ok()
        .map(system_time_to_iso)
        .unwrap_or_default();
    Some((created, modified))
}

fn system_time_to_iso(t: std::time::SystemTime) -> String {
    let dt: DateTime<Local> = t.into();
    dt.naive_local().format("%Y-%m-%dT%H:%M:%S").to_string()
}

fn read_exif(path: &Path) -> Option<exif::Exif> {
    let file = File::open(path).ok()?;
    let mut reader = BufReader::new(file);
    exif::Reader::new().read_from_container(&mut reader).ok()
}

/// Identical to [`read_exif`] today; kept as a distinct call site so the
/// fallback pass in [`extract`] can evolve independently (e.g. to a raw TIFF
/// IFD walk) without touching the primary path.
fn read_exif_raw(path: &Path) -> Option<exif::Exif> {
    read_exif(path)
}

fn apply_exif(exif: &exif::Exif, meta: &mut ExtractedMetadata) {
    if meta.timestamp.is_none() {
        meta.timestamp = read_timestamp(exif, exif::Tag::DateTimeOriginal)
            .or_else(|| read_timestamp(exif, exif::Tag::DateTime));
    }

    if meta.camera_make.is_empty() {
        if let Some(make) = read_ascii(exif, exif::Tag::Make) {
            meta.camera_make = make.trim().to_string();
        }
    }
    if meta.camera_model.is_empty() {
        if let Some(model) = read_ascii(exif, exif::Tag::Model) {
            meta.camera_model = model.trim().to_string();
        }
    }

    if meta.gps_latitude.is_none() || meta.gps_longitude.is_none() {
        if let Some((lat, lon)) = read_gps(exif) {
            meta.gps_latitude = Some(lat);
            meta.gps_longitude = Some(lon);
        }
    }
}

/// Parse `YYYY:MM:DD HH:MM:SS`, the strict EXIF datetime format. Any other
/// shape (including partial strings) is treated as unparseable, not as an error.
fn read_timestamp(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    let raw = field.display_value().to_string();
    let parsed = chrono::NaiveDateTime::parse_from_str(raw.trim(), "%Y:%m:%d %H:%M:%S").ok()?;
    Some(parsed.format("%Y-%m-%dT%H:%M:%S").to_string())
}

fn read_ascii(exif: &exif::Exif, tag: exif::Tag) -> Option<String> {
    let field = exif.get_field(tag, exif::In::PRIMARY)?;
    match &field.value {
        exif::Value::Ascii(vals) => {
            let bytes = vals.first()?;
            Some(String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string())
        }
        _ => Some(field.display_value().to_string()),
    }
}

/// GPS requires all four sub-tags (lat, lat-ref, lon, lon-ref) to be present.
/// Presence is checked by EXIF tag existence, not by truthiness of the
/// decoded value — a legitimate `0.0` component is not treated as absent.
fn read_gps(exif: &exif::Exif) -> Option<(f64, f64)> {
    let lat = exif.get_field(exif::Tag::GPSLatitude, exif::In::PRIMARY)?;
    let lat_ref = exif.get_field(exif::Tag::GPSLatitudeRef, exif::In::PRIMARY)?;
    let lon = exif.get_field(exif::Tag::GPSLongitude, exif::In::PRIMARY)?;
    let lon_ref = exif.get_field(exif::Tag::GPSLongitudeRef, exif::In::PRIMARY)?;

    let lat_dms = dms_from_field(lat)?;
    let lon_dms = dms_from_field(lon)?;
    let lat_ref = ascii_ref(lat_ref)?;
    let lon_ref = ascii_ref(lon_ref)?;

    let lat_decimal = dms_to_decimal(lat_dms, &lat_ref);
    let lon_decimal = dms_to_decimal(lon_dms, &lon_ref);
    Some((lat_decimal, lon_decimal))
}

fn dms_from_field(field: &exif::Field) -> Option<[f64; 3]> {
    match &field.value {
        exif::Value::Rational(rats) if rats.len() == 3 => {
            Some([rats[0].to_f64(), rats[1].to_f64(), rats[2].to_f64()])
        }
        _ => None,
    }
}

fn ascii_ref(field: &exif::Field) -> Option<String> {
    match &field.value {
        exif::Value::Ascii(vals) => {
            let bytes = vals.first()?;
            Some(String::from_utf8_lossy(bytes).trim_end_matches('\0').to_string())
        }
        _ => None,
    }
}

fn dms_to_decimal(dms: [f64; 3], reference: &str) -> f64 {
    let decimal = dms[0] + dms[1] / 60.0 + dms[2] / 3600.0;
    match reference.to_uppercase().as_str() {
        "S" | "W" => -decimal,
        _ => decimal,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn dms_to_decimal_north_positive() {
        let d = dms_to_decimal([48.0, 51.0, 29.0], "N");
        assert!((d - 48.8581).abs() < 0.001);
    }

    #[test]
    fn dms_to_decimal_south_negative() {
        let d = dms_to_decimal([33.0, 51.0, 0.0], "S");
        assert!(d < 0.0);
    }

    #[test]
    fn dms_to_decimal_west_negative() {
        let d = dms_to_decimal([122.0, 25.0, 0.0], "W");
        assert!(d < 0.0);
    }

    #[test]
    fn extract_missing_file_returns_defaults() {
        let meta = extract(Path::new("/nonexistent/does-not-exist.jpg"));
        assert_eq!(meta.width, 0);
        assert_eq!(meta.height, 0);
        assert!(meta.format.is_empty());
        assert!(meta.timestamp.is_none());
    }

    #[test]
    fn extract_reads_dimensions_and_format() {
        let tmp = tempfile::tempdir().unwrap();
        let path = tmp.path().join("test.png");
        image::RgbImage::from_fn(16, 12, |_, _| image::Rgb([10, 20, 30]))
            .save(&path)
            .unwrap();

        let meta = extract(&path);
        assert_eq!(meta.width, 16);
        assert_eq!(meta.height, 12);
        assert_eq!(meta.format, "PNG");
        assert!(!meta.creation_time.is_empty());
        assert!(!meta.modification_time.is_empty());
    }
}
