use crate::models::{ExportSpec, FileMetadata};

/// MIME prefix marking provider-native documents that have no byte content
/// until exported.
pub const PROPRIETARY_PREFIX: &str = "application/vnd.google-apps.";

const EXPORT_TABLE: &[(&str, ExportSpec)] = &[
    (
        "document",
        ExportSpec {
            mime_type: "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
            extension: ".docx",
        },
    ),
    (
        "presentation",
        ExportSpec {
            mime_type: "application/vnd.openxmlformats-officedocument.presentationml.presentation",
            extension: ".pptx",
        },
    ),
    (
        "spreadsheet",
        ExportSpec {
            mime_type: "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
            extension: ".xlsx",
        },
    ),
];

pub fn is_export_required(metadata: &FileMetadata) -> bool {
    metadata.mime_type.contains(PROPRIETARY_PREFIX)
}

/// Looks up the export format for a provider-native MIME type.
/// `None` means the document kind cannot be exported.
pub fn resolve_export(mime_type: &str) -> Option<ExportSpec> {
    let kind = mime_type.replacen(PROPRIETARY_PREFIX, "", 1);
    EXPORT_TABLE
        .iter()
        .find(|(name, _)| *name == kind)
        .map(|(_, spec)| *spec)
}
