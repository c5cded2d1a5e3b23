use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Most files a batch upload request may carry.
pub const MAX_BATCH_FILES: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FileKind {
    Document,
    Image,
    Video,
    Audio,
    Archive,
    Spreadsheet,
    Presentation,
    Other,
}

impl FileKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            FileKind::Document => "document",
            FileKind::Image => "image",
            FileKind::Video => "video",
            FileKind::Audio => "audio",
            FileKind::Archive => "archive",
            FileKind::Spreadsheet => "spreadsheet",
            FileKind::Presentation => "presentation",
            FileKind::Other => "other",
        }
    }

    pub fn parse_str(s: &str) -> Option<Self> {
        match s {
            "document" => Some(FileKind::Document),
            "image" => Some(FileKind::Image),
            "video" => Some(FileKind::Video),
            "audio" => Some(FileKind::Audio),
            "archive" => Some(FileKind::Archive),
            "spreadsheet" => Some(FileKind::Spreadsheet),
            "presentation" => Some(FileKind::Presentation),
            "other" => Some(FileKind::Other),
        _ => None,
        }
    }

    /// Classify a lowercase extension (no dot).
    pub fn from_extension(ext: &str) -> Self {
        match ext {
            "doc" | "docx" | "pdf" | "txt" | "md" | "rtf" => FileKind::Document,
            "jpg" | "jpeg" | "png" | "gif" | "bmp" | "webp" | "svg" => FileKind::Image,
            "mp4" | "avi" | "mov" | "mkv" | "wmv" | "flv" => FileKind::Video,
            "mp3" | "wav" | "flac" | "aac" | "ogg" => FileKind::Audio,
            "zip" | "rar" | "7z" | "tar" | "gz" => FileKind::Archive,
            "xls" | "xlsx" | "csv" => FileKind::Spreadsheet,
            "ppt" | "pptx" => FileKind::Presentation,
            _ => FileKind::Other,
        }
    }
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lowercase extension of a file name, without the dot. Empty if none.
pub fn extension_of(file_name: &str) -> String {
    file_name
        .rsplit_once('.')
        .map(|(_, ext)| ext.to_ascii_lowercase())
        .unwrap_or_default()
}

/// Content type served on download, keyed by extension.
pub fn mime_type(ext: &str) -> &'static str {
    match ext {
        "pdf" => "application/pdf",
        "txt" | "md" => "text/plain; charset=utf-8",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xls" => "application/vnd.ms-excel",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "ppt" => "application/vnd.ms-powerpoint",
        "pptx" => "application/vnd.openxmlformats-officedocument.presentationml.presentation",
        "jpg" | "jpeg" => "image/jpeg",
        "png" => "image/png",
        "gif" => "image/gif",
        "bmp" => "image/bmp",
        "webp" => "image/webp",
        "svg" => "image/svg+xml",
        "mp4" => "video/mp4",
        "mov" => "video/quicktime",
        "mp3" => "audio/mpeg",
        "wav" => "audio/wav",
        "ogg" => "audio/ogg",
        "zip" => "application/zip",
        "csv" => "text/csv",
        _ => "application/octet-stream",
    }
}

/// Whether the browser can render this extension inline.
pub fn is_previewable(ext: &str) -> bool {
    matches!(
        ext,
        "pdf" | "txt"
            | "md"
            | "jpg"
            | "jpeg"
            | "png"
            | "gif"
            | "webp"
            | "svg"
            | "mp4"
            | "mov"
            | "mp3"
            | "wav"
    )
}

/// Size ceiling and extension allow-list applied to an upload.
/// Single uploads and batch uploads carry different limits.
#[derive(Debug, Clone)]
pub struct UploadLimits {
    pub max_size: u64,
    pub allowed_extensions: &'static [&'static str],
}

impl UploadLimits {
    pub fn single() -> Self {
        Self {
            max_size: 20 * 1024 * 1024,
            allowed_extensions: &[
                "doc", "docx", "pdf", "txt", "md", "rtf", "jpg", "jpeg", "png", "gif", "bmp",
                "webp", "svg", "mp4", "avi", "mov", "mkv", "mp3", "wav", "flac", "zip", "rar",
                "7z", "tar", "gz", "xls", "xlsx", "csv", "ppt", "pptx",
            ],
        }
    }

    /// Batch uploads are capped tighter and exclude audio/video.
    pub fn batch() -> Self {
        Self {
            max_size: 10 * 1024 * 1024,
            allowed_extensions: &[
                "doc", "docx", "pdf", "txt", "md", "jpg", "jpeg", "png", "gif", "webp", "zip",
                "rar", "7z", "xls", "xlsx", "csv", "ppt", "pptx",
            ],
        }
    }

    pub fn permits_extension(&self, ext: &str) -> bool {
        self.allowed_extensions.contains(&ext)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub activity_id: String,
    /// Stored blob name: content digest plus original extension.
    pub file_name: String,
    pub original_name: String,
    pub file_size: i64,
    /// Lowercase extension, no dot.
    pub file_type: String,
    pub file_kind: FileKind,
    pub description: String,
    /// Hex sha256 of the content. Shared by identical files.
    pub digest: String,
    pub uploaded_by: String,
    pub uploaded_at: DateTime<Utc>,
    pub download_count: i64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
pub struct AttachmentFilter {
    pub kind: Option<FileKind>,
    pub file_type: Option<String>,
    pub uploaded_by: Option<String>,
}

/// Aggregates computed over an activity's live attachments.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentStats {
    pub count: i64,
    pub total_size: i64,
    pub by_kind: BTreeMap<String, i64>,
    pub by_type: BTreeMap<String, i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AttachmentListing {
    pub attachments: Vec<Attachment>,
    pub stats: AttachmentStats,
}

/// One file of a batch upload request.
#[derive(Debug, Clone)]
pub struct UploadFile {
    pub original_name: String,
    pub description: String,
    pub data: Vec<u8>,
}

/// Per-file outcome of a batch upload. Failures carry a message and do not
/// affect the other files in the batch.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadOutcome {
    pub original_name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub attachment: Option<Attachment>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl UploadOutcome {
    pub fn ok(attachment: Attachment) -> Self {
        Self {
            original_name: attachment.original_name.clone(),
            attachment: Some(attachment),
            error: None,
        }
    }

    pub fn failed(original_name: impl Into<String>, error: impl Into<String>) -> Self {
        Self {
            original_name: original_name.into(),
            attachment: None,
            error: Some(error.into()),
        }
    }

    pub fn succeeded(&self) -> bool {
        self.attachment.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extension_extraction() {
        assert_eq!(extension_of("report.PDF"), "pdf");
        assert_eq!(extension_of("archive.tar.gz"), "gz");
        assert_eq!(extension_of("README"), "");
    }

    #[test]
    fn kind_classification() {
        assert_eq!(FileKind::from_extension("docx"), FileKind::Document);
        assert_eq!(FileKind::from_extension("png"), FileKind::Image);
        assert_eq!(FileKind::from_extension("xlsx"), FileKind::Spreadsheet);
        assert_eq!(FileKind::from_extension("exe"), FileKind::Other);
    }

    #[test]
    fn batch_limits_are_stricter() {
        let single = UploadLimits::single();
        let batch = UploadLimits::batch();
        assert!(batch.max_size < single.max_size);
        assert!(single.permits_extension("mp4"));
        assert!(!batch.permits_extension("mp4"));
        assert!(batch.permits_extension("pdf"));
    }

    #[test]
    fn preview_allow_list() {
        assert!(is_previewable("pdf"));
        assert!(is_previewable("png"));
        assert!(!is_previewable("zip"));
        assert!(!is_previewable("docx"));
    }
}
