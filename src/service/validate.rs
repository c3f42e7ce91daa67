//! Upload validation rules applied before anything is persisted.

use super::types::{IngestError, Upload};

/// The only media type accepted for uploads.
pub const PDF_MEDIA_TYPE: &str = "application/pdf";

/// Check an upload before anything is persisted.
///
/// Media type is checked first, then the extension, then the size.
pub fn validate_upload(upload: &Upload, max_bytes: usize) -> Result<(), IngestError> {
    if upload.content_type.as_deref() != Some(PDF_MEDIA_TYPE) {
        return Err(IngestError::InvalidFileType);
    }
    if !upload.filename.ends_with(".pdf") {
        return Err(IngestError::InvalidFileExtension);
    }
    if upload.bytes.len() > max_bytes {
        return Err(IngestError::FileTooLarge);
    }
    Ok(())
}
