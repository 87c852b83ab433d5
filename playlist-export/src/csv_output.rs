//! Per-playlist CSV files and the combined export built from them.

use crate::model::VideoRecord;
use eyre::Context;
use serde::Serialize;
use std::path::{Path, PathBuf};

pub const PLAYLIST_HEADER: [&str; 3] = ["Title", "Video ID", "Video URL"];
pub const AGGREGATE_HEADER: [&str; 4] = ["Title", "Video ID", "Video URL", "playlist"];
pub const DEFAULT_AGGREGATE_FILE_NAME: &str = "_all_videos.csv";

/// Characters that are unsafe in file names on at least one common filesystem.
const UNSAFE_TITLE_CHARS: [char; 11] = ['/', '\\', ':', '*', '?', '"', '<', '>', '|', ';', ' '];

/// Replaces each unsafe character (and space) in a playlist title with `__`.
pub fn sanitize_title(title: &str) -> String {
    let mut sanitized = String::with_capacity(title.len());
    for c in title.chars() {
        if UNSAFE_TITLE_CHARS.contains(&c) {
            sanitized.push_str("__");
        } else {
            sanitized.push(c);
        }
    }
    sanitized
}

pub fn playlist_file_name(title: &str) -> String {
    format!("{}__playlist.csv", sanitize_title(title))
}

/// Writes `videos` to `<dir>/<sanitized title>__playlist.csv`, creating `dir` if needed.
///
/// The file always starts with the header row, even for an empty playlist.
pub fn write_playlist_csv(dir: &Path, title: &str, videos: &[VideoRecord]) -> eyre::Result<PathBuf> {
    std::fs::create_dir_all(dir)
        .with_context(|| format!("create output directory {}", dir.display()))?;
    let path = dir.join(playlist_file_name(title));

    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(PLAYLIST_HEADER)
        .context("write CSV header")?;
    for video in videos {
        writer
            .serialize(video)
            .with_context(|| format!("write row for video {}", video.video_id))?;
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;

    Ok(path)
}

/// Like [`write_playlist_csv`], but a failure is logged instead of ending the run.
pub fn save_playlist_csv(dir: &Path, title: &str, videos: &[VideoRecord]) -> Option<PathBuf> {
    match write_playlist_csv(dir, title, videos) {
        Ok(path) => {
            tracing::debug!(path = %path.display(), videos = videos.len(), "saved playlist CSV");
            Some(path)
        }
        Err(e) => {
            tracing::error!(playlist = title, error = ?e, "Error saving CSV");
            None
        }
    }
}

pub fn read_playlist_csv(path: &Path) -> eyre::Result<Vec<VideoRecord>> {
    let mut reader =
        csv::Reader::from_path(path).with_context(|| format!("open {}", path.display()))?;
    reader
        .deserialize()
        .collect::<Result<Vec<VideoRecord>, _>>()
        .with_context(|| format!("parse {}", path.display()))
}

#[derive(Debug, Serialize)]
struct AggregateRow<'a> {
    #[serde(rename = "Title")]
    title: &'a str,
    #[serde(rename = "Video ID")]
    video_id: &'a str,
    #[serde(rename = "Video URL")]
    video_url: &'a str,
    playlist: &'a str,
}

/// Outcome of [`aggregate_playlists`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AggregateSummary {
    /// Where the combined CSV was written.
    pub path: PathBuf,
    pub rows: usize,
    /// Rows whose title contains "Deleted video" (any case).
    pub deleted: usize,
    /// Rows whose title contains "Private video" (any case).
    pub private: usize,
}

/// Concatenates every `*.csv` in `dir` into `<dir>/../<output_file_name>`.
///
/// Files are read in name order and each row gains a `playlist` column holding
/// the name of the file it came from. Without an `output_file_name` the result
/// goes to [`DEFAULT_AGGREGATE_FILE_NAME`].
pub fn aggregate_playlists(
    dir: &Path,
    output_file_name: Option<&str>,
) -> eyre::Result<AggregateSummary> {
    let output_file_name = output_file_name.unwrap_or(DEFAULT_AGGREGATE_FILE_NAME);
    let mut sources = Vec::new();
    for entry in
        std::fs::read_dir(dir).with_context(|| format!("list playlist CSVs in {}", dir.display()))?
    {
        let entry = entry.with_context(|| format!("read entry of {}", dir.display()))?;
        let file_name = entry.file_name().to_string_lossy().into_owned();
        if file_name.ends_with(".csv") && entry.path().is_file() {
            sources.push((file_name, entry.path()));
        }
    }
    sources.sort();

    let path = match dir.parent() {
        Some(parent) => parent.join(output_file_name),
        None => dir.join("..").join(output_file_name),
    };
    let mut writer = csv::WriterBuilder::new()
        .has_headers(false)
        .from_path(&path)
        .with_context(|| format!("create {}", path.display()))?;
    writer
        .write_record(AGGREGATE_HEADER)
        .context("write CSV header")?;

    let mut summary = AggregateSummary {
        path: path.clone(),
        rows: 0,
        deleted: 0,
        private: 0,
    };
    for (file_name, source) in &sources {
        for video in read_playlist_csv(source)? {
            writer
                .serialize(AggregateRow {
                    title: &video.title,
                    video_id: &video.video_id,
                    video_url: &video.video_url,
                    playlist: file_name,
                })
                .with_context(|| format!("write row from {file_name}"))?;

            let title = video.title.to_lowercase();
            summary.rows += 1;
            summary.deleted += usize::from(title.contains("deleted video"));
            summary.private += usize::from(title.contains("private video"));
        }
    }
    writer
        .flush()
        .with_context(|| format!("flush {}", path.display()))?;

    tracing::info!(
        files = sources.len(),
        rows = summary.rows,
        path = %path.display(),
        "wrote combined CSV"
    );
    Ok(summary)
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn videos(n: usize) -> Vec<VideoRecord> {
        (0..n)
            .map(|i| VideoRecord::new(format!("Video {i}"), format!("id{i}")))
            .collect()
    }

    #[test]
    fn sanitize_replaces_each_unsafe_character() {
        assert_eq!(sanitize_title("My Mix"), "My__Mix");
        assert_eq!(sanitize_title("Fav:Clips"), "Fav__Clips");
        assert_eq!(
            sanitize_title(r#"a/b\c:d*e?f"g<h>i|j;k l"#),
            "a__b__c__d__e__f__g__h__i__j__k__l"
        );
        assert_eq!(sanitize_title("::"), "____");
    }

    #[test]
    fn sanitize_passes_other_characters_through() {
        let title = "Lo-fi_beats.2024 (remix) #1 ünïcødé 🎵 tab\there";
        assert_eq!(sanitize_title(title), title.replace(' ', "__"));
        assert_eq!(sanitize_title(""), "");
    }

    #[test]
    fn playlist_file_names() {
        assert_eq!(playlist_file_name("My Mix"), "My__Mix__playlist.csv");
        assert_eq!(playlist_file_name("Fav:Clips"), "Fav__Clips__playlist.csv");
    }

    #[test]
    fn written_file_has_header_plus_one_line_per_video() {
        let dir = tempfile::tempdir().unwrap();
        let records = vec![
            VideoRecord::new("Plain", "a1"),
            VideoRecord::new("Comma, \"quoted\" title", "b2"),
            VideoRecord::new("Private video", "c3"),
        ];

        let path = write_playlist_csv(dir.path(), "Mixed", &records).unwrap();
        assert_eq!(path, dir.path().join("Mixed__playlist.csv"));

        let contents = std::fs::read_to_string(&path).unwrap();
        assert_eq!(contents.lines().count(), records.len() + 1);
        assert_eq!(contents.lines().next(), Some("Title,Video ID,Video URL"));
        assert_eq!(read_playlist_csv(&path).unwrap(), records);
    }

    #[test]
    fn empty_playlist_is_header_only() {
        let dir = tempfile::tempdir().unwrap();
        let path = write_playlist_csv(dir.path(), "Empty", &[]).unwrap();
        assert_eq!(
            std::fs::read_to_string(&path).unwrap(),
            "Title,Video ID,Video URL\n"
        );
        assert!(read_playlist_csv(&path).unwrap().is_empty());
    }

    #[test]
    fn creates_missing_directories() {
        let dir = tempfile::tempdir().unwrap();
        let nested = dir.path().join("output").join("user_playlists");
        let path = write_playlist_csv(&nested, "x", &videos(1)).unwrap();
        assert!(path.starts_with(&nested));
        assert!(path.is_file());
    }

    #[test]
    fn save_logs_and_continues_on_error() {
        let dir = tempfile::tempdir().unwrap();
        // A file where the output directory should be makes create_dir_all fail.
        let blocker = dir.path().join("not_a_dir");
        std::fs::write(&blocker, "").unwrap();
        assert_eq!(save_playlist_csv(&blocker, "x", &videos(2)), None);
        assert!(save_playlist_csv(dir.path(), "x", &videos(2)).is_some());
    }

    #[test]
    fn aggregate_concatenates_and_tags_rows() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("user_playlists");
        write_playlist_csv(&dir, "B list", &videos(2)).unwrap();
        write_playlist_csv(
            &dir,
            "A list",
            &[
                VideoRecord::new("Deleted video", "d1"),
                VideoRecord::new("PRIVATE VIDEO", "p1"),
                VideoRecord::new("[Private video]", "p2"),
            ],
        )
        .unwrap();
        write_playlist_csv(&dir, "Empty", &[]).unwrap();
        std::fs::write(dir.join("notes.txt"), "ignored").unwrap();

        let summary = aggregate_playlists(&dir, Some("combined.csv")).unwrap();
        assert_eq!(
            summary,
            AggregateSummary {
                path: root.path().join("combined.csv"),
                rows: 5,
                deleted: 1,
                private: 2,
            }
        );

        let mut reader = csv::Reader::from_path(&summary.path).unwrap();
        assert_eq!(
            reader.headers().unwrap().iter().collect::<Vec<_>>(),
            AGGREGATE_HEADER.to_vec()
        );
        let rows: Vec<Vec<String>> = reader
            .records()
            .map(|r| r.unwrap().iter().map(String::from).collect())
            .collect();
        let tags: Vec<&str> = rows.iter().map(|r| r[3].as_str()).collect();
        assert_eq!(
            tags,
            vec![
                "A__list__playlist.csv",
                "A__list__playlist.csv",
                "A__list__playlist.csv",
                "B__list__playlist.csv",
                "B__list__playlist.csv",
            ]
        );
        assert_eq!(rows[0][..3], ["Deleted video", "d1", "https://www.youtube.com/watch?v=d1"]);
    }

    #[test]
    fn aggregate_of_empty_directory_is_header_only() {
        let root = tempfile::tempdir().unwrap();
        let dir = root.path().join("public_playlists");
        std::fs::create_dir(&dir).unwrap();

        let summary = aggregate_playlists(&dir, None).unwrap();
        assert_eq!(summary.rows, 0);
        assert_eq!(
            std::fs::read_to_string(root.path().join("_all_videos.csv")).unwrap(),
            "Title,Video ID,Video URL,playlist\n"
        );
    }

    #[test]
    fn aggregate_of_missing_directory_fails() {
        let root = tempfile::tempdir().unwrap();
        assert!(aggregate_playlists(&root.path().join("nope"), Some("out.csv")).is_err());
    }
}
