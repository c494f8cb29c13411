use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
pub const DOCUMENT_MIME_TYPE: &str = "application/vnd.google-apps.document";

// ============================================================================
// DRIVE RESOURCES
// ============================================================================

/// A Drive v3 file resource. Every field is optional because each call asks
/// the API for a different `fields` projection.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveFile {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub mime_type: Option<String>,
    #[serde(default)]
    pub created_time: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    pub size: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub web_view_link: Option<String>,
    #[serde(default)]
    pub icon_link: Option<String>,
    #[serde(default)]
    pub thumbnail_link: Option<String>,
    #[serde(default)]
    pub parents: Vec<String>,
    #[serde(default)]
    pub shared: Option<bool>,
    #[serde(default)]
    pub owners: Vec<DriveUser>,
    #[serde(default)]
    pub last_modifying_user: Option<DriveUser>,
}

impl DriveFile {
    pub fn id_str(&self) -> &str {
        self.id.as_deref().unwrap_or_default()
    }

    pub fn name_str(&self) -> &str {
        self.name.as_deref().unwrap_or_default()
    }

    pub fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }

    pub fn kind(&self) -> ItemKind {
        ItemKind::from_mime(self.mime_type.as_deref())
    }

    pub fn is_google_doc(&self) -> bool {
        self.mime_type.as_deref() == Some(DOCUMENT_MIME_TYPE)
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DriveUser {
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Permission {
    #[serde(default)]
    pub id: Option<String>,
    #[serde(default, rename = "type")]
    pub kind: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
    #[serde(default)]
    pub email_address: Option<String>,
    #[serde(default)]
    pub display_name: Option<String>,
    #[serde(default)]
    pub domain: Option<String>,
}

/// Metadata body for `files.create`.
#[derive(Debug, Clone, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewFile {
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// Bytes uploaded alongside a [`NewFile`].
#[derive(Debug, Clone)]
pub struct MediaUpload {
    pub mime_type: String,
    pub data: Vec<u8>,
}

/// Body for `permissions.create`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewPermission {
    #[serde(rename = "type")]
    pub kind: String,
    pub role: String,
    pub email_address: String,
}

/// Whether a Drive item is a folder or a regular file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ItemKind {
    Folder,
    File,
}

impl ItemKind {
    pub fn from_mime(mime_type: Option<&str>) -> Self {
        if mime_type == Some(FOLDER_MIME_TYPE) {
            ItemKind::Folder
        } else {
            ItemKind::File
        }
    }
}

impl fmt::Display for ItemKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ItemKind::Folder => write!(f, "Folder"),
            ItemKind::File => write!(f, "File"),
        }
    }
}

// ============================================================================
// ENUMERATED INPUTS
// ============================================================================

/// Formats a Google Doc can be exported to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    Pdf,
    Docx,
    Txt,
    Html,
    Odt,
    Rtf,
    Epub,
}

impl ExportFormat {
    pub const ALL: [ExportFormat; 7] = [
        ExportFormat::Pdf,
        ExportFormat::Docx,
        ExportFormat::Txt,
        ExportFormat::Html,
        ExportFormat::Odt,
        ExportFormat::Rtf,
        ExportFormat::Epub,
    ];

    pub fn extension(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "pdf",
            ExportFormat::Docx => "docx",
            ExportFormat::Txt => "txt",
            ExportFormat::Html => "html",
            ExportFormat::Odt => "odt",
            ExportFormat::Rtf => "rtf",
            ExportFormat::Epub => "epub",
        }
    }

    pub fn mime_type(&self) -> &'static str {
        match self {
            ExportFormat::Pdf => "application/pdf",
            ExportFormat::Docx => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            ExportFormat::Txt => "text/plain",
            ExportFormat::Html => "text/html",
            ExportFormat::Odt => "application/vnd.oasis.opendocument.text",
            ExportFormat::Rtf => "application/rtf",
            ExportFormat::Epub => "application/epub+zip",
        }
    }
}

impl FromStr for ExportFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ExportFormat::ALL
            .into_iter()
            .find(|f| f.extension() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("Unsupported export format: {}", s))
    }
}

/// Roles that can be granted on a Drive item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShareRole {
    Reader,
    Commenter,
    Writer,
    Owner,
}

impl ShareRole {
    pub const ALL: [ShareRole; 4] = [
        ShareRole::Reader,
        ShareRole::Commenter,
        ShareRole::Writer,
        ShareRole::Owner,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ShareRole::Reader => "reader",
            ShareRole::Commenter => "commenter",
            ShareRole::Writer => "writer",
            ShareRole::Owner => "owner",
        }
    }
}

impl FromStr for ShareRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        ShareRole::ALL
            .into_iter()
            .find(|r| r.as_str() == s.trim().to_ascii_lowercase())
            .ok_or_else(|| format!("Unsupported role: {}", s))
    }
}

impl fmt::Display for ShareRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ============================================================================
// GOOGLE DOCS STRUCTURES
// ============================================================================

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Document {
    #[serde(default)]
    pub document_id: String,
    #[serde(default)]
    pub title: String,
    #[serde(default)]
    pub body: Option<Body>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Body {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StructuralElement {
    #[serde(default)]
    pub end_index: Option<i64>,
    #[serde(default)]
    pub paragraph: Option<Paragraph>,
    #[serde(default)]
    pub table: Option<Table>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Paragraph {
    #[serde(default)]
    pub elements: Vec<ParagraphElement>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ParagraphElement {
    #[serde(default)]
    pub text_run: Option<TextRun>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TextRun {
    #[serde(default)]
    pub content: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Table {
    #[serde(default)]
    pub table_rows: Vec<TableRow>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableRow {
    #[serde(default)]
    pub table_cells: Vec<TableCell>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TableCell {
    #[serde(default)]
    pub content: Vec<StructuralElement>,
}

impl Document {
    /// Plain text of the body, including text inside table cells.
    pub fn text(&self) -> String {
        let mut out = String::new();
        if let Some(body) = &self.body {
            collect_text(&body.content, &mut out);
        }
        out
    }

    /// Index one past the last character of the body, in UTF-16 code units.
    ///
    /// Prefers the `endIndex` reported by the API; falls back to counting
    /// text when the response omits indexes.
    pub fn end_index(&self) -> i64 {
        let reported = self
            .body
            .as_ref()
            .and_then(|b| b.content.last())
            .and_then(|e| e.end_index);

        reported.unwrap_or_else(|| 1 + self.text().encode_utf16().count() as i64)
    }
}

fn collect_text(elements: &[StructuralElement], out: &mut String) {
    for element in elements {
        if let Some(paragraph) = &element.paragraph {
            for part in &paragraph.elements {
                if let Some(content) = part.text_run.as_ref().and_then(|t| t.content.as_deref()) {
                    out.push_str(content);
                }
            }
        }

        if let Some(table) = &element.table {
            for row in &table.table_rows {
                for cell in &row.table_cells {
                    collect_text(&cell.content, out);
                }
            }
        }
    }
}

/// One entry of a Docs `batchUpdate` request list.
///
/// Serializes to the API's externally tagged shape, e.g.
/// `{"insertText": {"location": {"index": 1}, "text": "..."}}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum DocsRequest {
    InsertText(InsertText),
    DeleteContentRange(DeleteContentRange),
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct InsertText {
    pub text: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub location: Option<Location>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub end_of_segment_location: Option<EndOfSegmentLocation>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Location {
    pub index: i64,
}

/// An empty segment id addresses the document body.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EndOfSegmentLocation {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub segment_id: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct DeleteContentRange {
    pub range: Range,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Range {
    pub start_index: i64,
    pub end_index: i64,
}

impl DocsRequest {
    pub fn insert_at(index: i64, text: impl Into<String>) -> Self {
        DocsRequest::InsertText(InsertText {
            text: text.into(),
            location: Some(Location { index }),
            end_of_segment_location: None,
        })
    }

    pub fn append(text: impl Into<String>) -> Self {
        DocsRequest::InsertText(InsertText {
            text: text.into(),
            location: None,
            end_of_segment_location: Some(EndOfSegmentLocation::default()),
        })
    }

    pub fn delete_range(start_index: i64, end_index: i64) -> Self {
        DocsRequest::DeleteContentRange(DeleteContentRange {
            range: Range {
                start_index,
                end_index,
            },
        })
    }
}

// ============================================================================
// OPERATION RESULTS
// ============================================================================

#[derive(Debug, Clone)]
pub struct DocText {
    pub title: String,
    pub text: String,
}

#[derive(Debug, Clone)]
pub struct CreatedDoc {
    pub document_id: String,
    pub title: String,
}

#[derive(Debug, Clone)]
pub struct DownloadedFile {
    pub name: String,
    pub mime_type: String,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct ExportedDoc {
    pub original_name: String,
    pub export_name: String,
    pub format: ExportFormat,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct SharedItem {
    pub kind: ItemKind,
    pub name: String,
    pub email_address: String,
    pub role: ShareRole,
    pub permission: Permission,
}

#[derive(Debug, Clone)]
pub struct PermissionListing {
    pub kind: ItemKind,
    pub name: String,
    pub file_id: String,
    pub permissions: Vec<Permission>,
}

/// One file of an `upload-batch` request.
#[derive(Debug, Clone, Deserialize)]
pub struct BatchFile {
    pub name: String,
    pub mime_type: String,
    pub base64_content: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadSuccess {
    pub name: String,
    pub id: String,
    pub link: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadFailure {
    pub name: String,
    pub error: String,
}

/// Outcome of a batch upload. Every input file lands in exactly one list.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchUploadReport {
    pub successful: Vec<UploadSuccess>,
    pub failed: Vec<UploadFailure>,
}

impl BatchUploadReport {
    pub fn total(&self) -> usize {
        self.successful.len() + self.failed.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_export_format_parsing_and_mime() {
        assert_eq!("PDF".parse::<ExportFormat>().unwrap(), ExportFormat::Pdf);
        assert_eq!(ExportFormat::Epub.mime_type(), "application/epub+zip");
        assert_eq!(
            ExportFormat::Docx.mime_type(),
            "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
        );
        assert!("xlsx".parse::<ExportFormat>().is_err());
    }

    #[test]
    fn test_share_role_parsing() {
        assert_eq!("writer".parse::<ShareRole>().unwrap(), ShareRole::Writer);
        assert!("admin".parse::<ShareRole>().is_err());
    }

    #[test]
    fn test_item_kind_from_mime() {
        assert_eq!(ItemKind::from_mime(Some(FOLDER_MIME_TYPE)), ItemKind::Folder);
        assert_eq!(ItemKind::from_mime(Some("text/plain")), ItemKind::File);
        assert_eq!(ItemKind::from_mime(None).to_string(), "File");
    }

    #[test]
    fn test_document_text_and_end_index() {
        let doc: Document = serde_json::from_value(json!({
            "documentId": "d1",
            "title": "Notes",
            "body": {
                "content": [
                    { "endIndex": 1 },
                    { "endIndex": 7, "paragraph": { "elements": [ { "textRun": { "content": "Hello\n" } } ] } },
                    { "endIndex": 20, "table": { "tableRows": [ { "tableCells": [
                        { "content": [ { "paragraph": { "elements": [ { "textRun": { "content": "cell\n" } } ] } } ] }
                    ] } ] } }
                ]
            }
        }))
        .unwrap();

        assert_eq!(doc.text(), "Hello\ncell\n");
        assert_eq!(doc.end_index(), 20);
    }

    #[test]
    fn test_end_index_counts_utf16_without_reported_indexes() {
        let doc: Document = serde_json::from_value(json!({
            "documentId": "d1",
            "title": "Emoji",
            "body": { "content": [
                { "paragraph": { "elements": [ { "textRun": { "content": "a😀\n" } } ] } }
            ] }
        }))
        .unwrap();

        // 'a' = 1, emoji = 2 surrogate units, newline = 1
        assert_eq!(doc.end_index(), 5);
    }

    #[test]
    fn test_docs_request_wire_shape() {
        let value = serde_json::to_value(vec![
            DocsRequest::delete_range(1, 10),
            DocsRequest::insert_at(1, "new"),
            DocsRequest::append("tail"),
        ])
        .unwrap();

        assert_eq!(
            value,
            json!([
                { "deleteContentRange": { "range": { "startIndex": 1, "endIndex": 10 } } },
                { "insertText": { "text": "new", "location": { "index": 1 } } },
                { "insertText": { "text": "tail", "endOfSegmentLocation": {} } }
            ])
        );
    }

    #[test]
    fn test_new_file_skips_empty_fields() {
        let value = serde_json::to_value(NewFile {
            name: "a.txt".to_string(),
            ..Default::default()
        })
        .unwrap();

        assert_eq!(value, json!({ "name": "a.txt" }));
    }
}
