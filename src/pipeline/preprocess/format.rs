use serde::{Deserialize, Serialize};

use super::PreprocessError;

/// Broad categories of document input we accept.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub enum FileCategory {
    Pdf,
    Image,
    Unsupported,
}

impl FileCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Pdf => "pdf",
            Self::Image => "image",
            Self::Unsupported => "unsupported",
        }
    }

    pub fn is_supported(&self) -> bool {
        !matches!(self, Self::Unsupported)
    }
}

/// Result of format detection on raw document bytes.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FormatDetection {
    pub mime_type: String,
    pub category: FileCategory,
    pub file_size_bytes: u64,
}

const MAX_FILE_SIZE: usize = 100 * 1024 * 1024; // 100MB

/// Mime types the pipeline accepts from callers.
const SUPPORTED_MIME_TYPES: &[&str] = &[
    "application/pdf",
    "image/png",
    "image/jpeg",
    "image/tiff",
    "image/bmp",
];

/// Detect the real format of raw document bytes.
///
/// The declared mime type is advisory only: magic bytes win, because upload
/// paths routinely mislabel files. A declared type outside the supported set
/// is rejected before any byte sniffing so callers get a stable error for
/// things like `.docx`.
pub fn detect_format(bytes: &[u8], declared_mime: &str) -> Result<FormatDetection, PreprocessError> {
    let declared = declared_mime.trim().to_ascii_lowercase();
    if !SUPPORTED_MIME_TYPES.contains(&declared.as_str()) {
        return Err(PreprocessError::UnsupportedFormat(declared));
    }

    if bytes.len() > MAX_FILE_SIZE {
        return Err(PreprocessError::CorruptDocument(format!(
            "file exceeds {}MB limit",
            MAX_FILE_SIZE / (1024 * 1024)
        )));
    }

    let (mime_type, category) = match sniff_magic(bytes) {
        Some(found) => found,
        None => {
            return Err(PreprocessError::CorruptDocument(
                "content does not match any supported format".into(),
            ))
        }
    };

    if mime_type != declared {
        tracing::debug!(
            declared = %declared,
            detected = %mime_type,
            "Declared mime type overridden by magic bytes"
        );
    }

    Ok(FormatDetection {
        mime_type: mime_type.to_string(),
        category,
        file_size_bytes: bytes.len() as u64,
    })
}

/// Identify the container from magic bytes alone.
fn sniff_magic(bytes: &[u8]) -> Option<(&'static str, FileCategory)> {
    if bytes.len() < 4 {
        return None;
    }

    match &bytes[..4] {
        // PDF: %PDF
        [0x25, 0x50, 0x44, 0x46] => Some(("application/pdf", FileCategory::Pdf)),
        // JPEG: FF D8 FF
        [0xFF, 0xD8, 0xFF, ..] => Some(("image/jpeg", FileCategory::Image)),
        // PNG: 89 50 4E 47
        [0x89, 0x50, 0x4E, 0x47] => Some(("image/png", FileCategory::Image)),
        // TIFF: little-endian (49 49 2A 00) or big-endian (4D 4D 00 2A)
        [0x49, 0x49, 0x2A, 0x00] | [0x4D, 0x4D, 0x00, 0x2A] => {
            Some(("image/tiff", FileCategory::Image))
        }
        // BMP: "BM"
        [0x42, 0x4D, ..] => Some(("image/bmp", FileCategory::Image)),
        _ => None,
    }
}

/// Sanitize a caller-supplied filename — strip path components, limit length.
pub fn sanitize_filename(original: &str) -> String {
    let name = std::path::Path::new(original)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("document");

    let clean: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'))
        .take(255)
        .collect();

    if clean.is_empty() {
        "document".to_string()
    } else {
        clean
    }
}
