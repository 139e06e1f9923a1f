//! Human-readable and machine-readable duplicate reports written alongside
//! the catalog after `detect`. The report renderer is a CLI-level concern —
//! the core crate only hands back typed [`DuplicateGroup`] values.

use std::fmt::Write as _;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use omnidupe_core::domain::DuplicateGroup;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    Text,
    Csv,
    Json,
}

impl ReportFormat {
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "text" => Some(ReportFormat::Text),
            "csv" => Some(ReportFormat::Csv),
            "json" => Some(ReportFormat::Json),
            _ => None,
        }
    }

    fn extension(self) -> &'static str {
        match self {
            ReportFormat::Text => "txt",
            ReportFormat::Csv => "csv",
            ReportFormat::Json => "json",
        }
    }
}

/// Render `groups` to `<output_dir>/duplicate_report_<timestamp>.<ext>` and
/// return the path written.
pub fn write_report(
    output_dir: &Path,
    format: ReportFormat,
    groups: &[DuplicateGroup],
    timestamp: &str,
) -> Result<PathBuf> {
    let path = output_dir.join(format!("duplicate_report_{timestamp}.{}", format.extension()));
    let body = match format {
        ReportFormat::Text => render_text(groups),
        ReportFormat::Csv => render_csv(groups),
        ReportFormat::Json => render_json(groups)?,
    };
    std::fs::write(&path, body).with_context(|| format!("writing report to {}", path.display()))?;
    Ok(path)
}

fn render_text(groups: &[DuplicateGroup]) -> String {
    let mut out = String::new();
    if groups.is_empty() {
        out.push_str("No duplicate groups found.\n");
        return out;
    }

    for group in groups {
        let keeper = group.keeper();
        let _ = writeln!(
            out,
            "Group {} ({}){}",
            group.id,
            group.kind.as_str(),
            group
                .similarity_score
                .map(|s| format!(" similarity={s:.1}"))
                .unwrap_or_default()
        );
        if let Some(k) = keeper {
            let _ = writeln!(out, "  keep:   {}", k.file_path.display());
        }
        for dup in group.duplicates() {
            let _ = writeln!(out, "  remove: {}", dup.file_path.display());
        }
        out.push('\n');
    }
    out
}

fn render_csv(groups: &[DuplicateGroup]) -> String {
    let mut out = String::from("group_id,kind,similarity_score,role,file_path,file_size\n");
    for group in groups {
        for member in &group.members {
            let _ = writeln!(
                out,
                "{},{},{},{},{},{}",
                group.id,
                group.kind.as_str(),
                group
                    .similarity_score
                    .map(|s| s.to_string())
                    .unwrap_or_default(),
                if member.is_keeper { "keeper" } else { "duplicate" },
                csv_escape(&member.file_path.to_string_lossy()),
                member.file_size,
            );
        }
    }
    out
}

fn csv_escape(field: &str) -> String {
    if field.contains(',') || field.contains('"') {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

#[derive(Serialize)]
struct JsonGroup {
    group_id: i64,
    detection_method: &'static str,
    similarity_score: Option<f64>,
    keeper: Option<String>,
    duplicates: Vec<String>,
}

fn render_json(groups: &[DuplicateGroup]) -> Result<String> {
    let rendered: Vec<JsonGroup> = groups
        .iter()
        .map(|g| JsonGroup {
            group_id: g.id,
            detection_method: g.kind.as_str(),
            similarity_score: g.similarity_score,
            keeper: g.keeper().map(|k| k.file_path.to_string_lossy().to_string()),
            duplicates: g
                .duplicates()
                .map(|d| d.file_path.to_string_lossy().to_string())
                .collect(),
        })
        .collect();

    Ok(serde_json::to_string_pretty(&rendered)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use omnidupe_core::domain::{GroupKind, GroupMember};
    use std::path::PathBuf;

    fn sample_group() -> DuplicateGroup {
        DuplicateGroup {
            id: 1,
            kind: GroupKind::Hash,
            similarity_score: None,
            members: vec![
                GroupMember {
                    image_id: 1,
                    file_path: PathBuf::from("/a.jpg"),
                    file_size: 100,
                    is_keeper: true,
                },
                GroupMember {
                    image_id: 2,
                    file_path: PathBuf::from("/b/a.jpg"),
                    file_size: 100,
                    is_keeper: false,
                },
            ],
        }
    }

    #[test]
    fn text_report_lists_keeper_and_duplicates() {
        let text = render_text(&[sample_group()]);
        assert!(text.contains("keep:   /a.jpg"));
        assert!(text.contains("remove: /b/a.jpg"));
    }

    #[test]
    fn empty_groups_reports_none_found() {
        let text = render_text(&[]);
        assert!(text.contains("No duplicate groups found"));
    }

    #[test]
    fn csv_report_has_header_and_one_row_per_member() {
        let csv = render_csv(&[sample_group()]);
        let lines: Vec<&str> = csv.lines().collect();
        assert_eq!(lines.len(), 3);
        assert!(lines[0].starts_with("group_id,"));
    }

    #[test]
    fn json_report_round_trips_keeper_and_duplicates() {
        let json = render_json(&[sample_group()]).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed[0]["keeper"], "/a.jpg");
        assert_eq!(parsed[0]["duplicates"][0], "/b/a.jpg");
    }

    #[test]
    fn write_report_names_file_with_timestamp_and_extension() {
        let tmp = tempfile::tempdir().unwrap();
        let path = write_report(tmp.path(), ReportFormat::Json, &[sample_group()], "20240101_000000").unwrap();
        assert_eq!(
            path.file_name().unwrap().to_str().unwrap(),
            "duplicate_report_20240101_000000.json"
        );
        assert!(path.exists());
    }
}
