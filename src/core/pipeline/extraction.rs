// Pulls artifacts out of free-form agent text.
//
// The modeling agent answers in prose. Two things may be embedded in it:
// a PNG preview written as a data URI, and a JSON object carrying the
// exported model file. The preview is located with a regular expression.
// Export objects are found by handing every `{` to a streaming serde_json
// deserializer, so objects with nested values parse as a whole.

use super::pipeline_models::ExportPayload;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine};
use regex::Regex;
use serde_json::Value;
use std::sync::OnceLock;

pub const PNG_DATA_URI_PREFIX: &str = "data:image/png;base64,";

fn image_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"data:image/png;base64,[A-Za-z0-9+/=]+").expect("image pattern is valid")
    })
}

/// Returns the first PNG data URI in `text`.
pub fn find_image_data_uri(text: &str) -> Option<String> {
    image_pattern()
        .find(text)
        .map(|m| m.as_str().to_string())
        .filter(|uri| uri.len() > PNG_DATA_URI_PREFIX.len())
}

/// Decodes the bytes behind a PNG data URI.
pub fn decode_data_uri(uri: &str) -> Option<Vec<u8>> {
    let encoded = uri.strip_prefix(PNG_DATA_URI_PREFIX)?;
    BASE64.decode(encoded).ok()
}

/// Returns the first JSON object in `text` that carries decodable file bytes.
pub fn find_export_payload(text: &str) -> Option<ExportPayload> {
    text.match_indices('{').find_map(|(start, _)| {
        let mut values = serde_json::Deserializer::from_str(&text[start..]).into_iter::<Value>();
        let object = match values.next()? {
            Ok(Value::Object(object)) => object,
            Ok(_) => return None,
            Err(e) => {
                tracing::trace!("No JSON object at byte {}: {}", start, e);
                return None;
            }
        };
        let payload = ExportPayload::from_object(&object)?;
        if payload.content.is_empty() || BASE64.decode(&payload.content).is_err() {
            tracing::debug!(
                "Ignoring export object at byte {}: content is not base64",
                start
            );
            return None;
        }
        Some(payload)
    })
}

/// Everything that could be pulled out of one piece of text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Extraction {
    pub image_data: Option<String>,
    pub export: Option<ExportPayload>,
}

impl Extraction {
    pub fn scan(text: &str) -> Self {
        Self {
            image_data: find_image_data_uri(text),
            export: find_export_payload(text),
        }
    }

    /// Fills whatever is still missing by scanning `texts` in order.
    pub fn fill_from<'a>(&mut self, texts: impl IntoIterator<Item = &'a str>) {
        for text in texts {
            if self.image_data.is_some() && self.export.is_some() {
                break;
            }
            if self.image_data.is_none() {
                self.image_data = find_image_data_uri(text);
            }
            if self.export.is_none() {
                self.export = find_export_payload(text);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const PNG_B64: &str = "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

    #[test]
    fn test_finds_image_literal_in_prose() {
        let text = format!(
            "Here is your bracket.\n![preview](data:image/png;base64,{}) Let me know!",
            PNG_B64
        );

        let uri = find_image_data_uri(&text).unwrap();

        assert_eq!(uri, format!("{}{}", PNG_DATA_URI_PREFIX, PNG_B64));
        let bytes = decode_data_uri(&uri).unwrap();
        assert_eq!(&bytes[1..4], b"PNG");
    }

    #[test]
    fn test_finds_export_json_with_alternate_keys() {
        let text = r#"Export finished: {"file_name": "bracket.step", "format": "STEP", "data": "SVNPLTEwMzAz"} done."#;

        let payload = find_export_payload(text).unwrap();

        assert_eq!(payload.filename.as_deref(), Some("bracket.step"));
        assert_eq!(payload.format.as_deref(), Some("STEP"));
        assert_eq!(BASE64.decode(&payload.content).unwrap(), b"ISO-10303");
    }

    #[test]
    fn test_skips_json_without_valid_content() {
        let text = r#"{"status": "ok"} then {"filename": "a.stl", "content": "***"} then {"filename": "b.stl", "base64_content": "c29saWQ="}"#;

        let payload = find_export_payload(text).unwrap();

        assert_eq!(payload.filename.as_deref(), Some("b.stl"));
    }

    #[test]
    fn test_several_key_spellings_in_one_object() {
        let text = r#"Saved {"name": "Bracket", "filename": "bracket.step", "base64_content": "SVNPLTEwMzAz"}"#;

        let payload = find_export_payload(text).unwrap();

        assert_eq!(payload.filename.as_deref(), Some("bracket.step"));
        assert_eq!(BASE64.decode(&payload.content).unwrap(), b"ISO-10303");

        // base64_content outranks content, content outranks data
        let text = r#"{"file_name": "gear.stl", "content": "c29saWQ=", "data": "not base64!"}"#;
        let payload = find_export_payload(text).unwrap();
        assert_eq!(payload.filename.as_deref(), Some("gear.stl"));
        assert_eq!(payload.content, "c29saWQ=");
    }

    #[test]
    fn test_export_object_with_nested_values() {
        let text = r#"Result: {"filename": "plate.stl", "meta": {"units": "mm", "faces": [1, 2]}, "content": "c29saWQ="} (exported)"#;

        let payload = find_export_payload(text).unwrap();

        assert_eq!(payload.filename.as_deref(), Some("plate.stl"));
        assert_eq!(BASE64.decode(&payload.content).unwrap(), b"solid");
    }

    #[test]
    fn test_ignores_stray_braces_and_non_string_content() {
        let text = r#"use {braces} freely, {"content": 42} and {"data": "eA==", "format": "STL"}"#;

        let payload = find_export_payload(text).unwrap();

        assert_eq!(payload.content, "eA==");
        assert_eq!(payload.format.as_deref(), Some("STL"));
        assert_eq!(payload.filename, None);
    }

    #[test]
    fn test_leaves_fields_unset_when_absent() {
        let extraction = Extraction::scan("I could not create the model, the sketch failed.");

        assert_eq!(extraction, Extraction::default());
        assert!(find_image_data_uri("data:image/png;base64,").is_none());
    }

    #[test]
    fn test_fill_from_only_fills_missing_parts() {
        let mut extraction = Extraction::scan(r#"{"filename": "x.stl", "content": "eA=="}"#);
        let image_text = format!("data:image/png;base64,{}", PNG_B64);

        extraction.fill_from([
            "nothing here",
            image_text.as_str(),
            r#"{"filename": "later.stl", "content": "eQ=="}"#,
        ]);

        assert!(extraction.image_data.is_some());
        assert_eq!(extraction.export.unwrap().filename.as_deref(), Some("x.stl"));
    }
}
