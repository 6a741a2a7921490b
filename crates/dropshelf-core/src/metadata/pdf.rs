use lopdf::{Dictionary, Document, Object};
use std::ffi::OsStr;
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::{BookMetadata, CoverMarker, CoverSource};
use crate::convert::process::run_tool;
use crate::error::MetadataError;

pub const PDFTOPPM: &str = "pdftoppm";
const RENDER_TIMEOUT: Duration = Duration::from_secs(60);
const RENDER_OUTPUT_CAP: u64 = 64 * 1024;

pub fn read_metadata(path: &Path, default_author: &str) -> Result<BookMetadata, MetadataError> {
    let doc = Document::load(path)?;

    let (title, author, subject) = match info_dictionary(&doc) {
        Some(info) => (
            info_string(&doc, info, b"Title"),
            info_string(&doc, info, b"Author"),
            info_string(&doc, info, b"Subject"),
        ),
        None => (None, None, None),
    };

    Ok(BookMetadata {
        title: title.unwrap_or_else(|| super::title_from_path(path)),
        author: author.unwrap_or_else(|| default_author.to_string()),
        description: subject,
        cover: Some(CoverSource::Marker(CoverMarker::PdfFirstPage)),
    })
}

/// Render page 1 to `{dest_dir}/cover.png` with `pdftoppm`.
pub async fn render_first_page(
    path: &Path,
    dest_dir: &Path,
    tool_override: Option<&Path>,
) -> Result<PathBuf, MetadataError> {
    let tool = crate::platform::resolve_tool(PDFTOPPM, tool_override)
        .ok_or_else(|| MetadataError::Missing(format!("{} not found", PDFTOPPM)))?;

    let prefix = dest_dir.join("cover");
    let args = [
        OsStr::new("-png"),
        OsStr::new("-f"),
        OsStr::new("1"),
        OsStr::new("-l"),
        OsStr::new("1"),
        OsStr::new("-singlefile"),
        OsStr::new("-scale-to"),
        OsStr::new("800"),
        path.as_os_str(),
        prefix.as_os_str(),
    ];
    let output = run_tool(&tool, &args, RENDER_TIMEOUT, RENDER_OUTPUT_CAP)
        .await
        .map_err(|e| MetadataError::Missing(e.to_string()))?;

    let cover = dest_dir.join("cover.png");
    if !output.status.success() || !cover.is_file() {
        return Err(MetadataError::Missing(format!(
            "{} could not render a cover: {}",
            PDFTOPPM,
            output.stderr_lossy()
        )));
    }
    Ok(cover)
}

fn info_dictionary(doc: &Document) -> Option<&Dictionary> {
    match doc.trailer.get(b"Info").ok()? {
        Object::Reference(id) => doc.get_dictionary(*id).ok(),
        Object::Dictionary(dict) => Some(dict),
        _ => None,
    }
}

fn info_string(doc: &Document, info: &Dictionary, key: &[u8]) -> Option<String> {
    let value = match info.get(key).ok()? {
        Object::Reference(id) => doc.get_object(*id).ok()?,
        other => other,
    };
    match value {
        Object::String(bytes, _) => {
            let text = decode_pdf_string(bytes);
            let text = text.trim_matches(|c: char| c.is_whitespace() || c == '\0');
            (!text.is_empty()).then(|| text.to_string())
        }
        _ => None,
    }
}

/// PDF text strings are UTF-16 with a byte-order mark or PDFDocEncoding.
fn decode_pdf_string(bytes: &[u8]) -> String {
    if let Some(rest) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_be_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    if let Some(rest) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        let units: Vec<u16> = rest
            .chunks_exact(2)
            .map(|pair| u16::from_le_bytes([pair[0], pair[1]]))
            .collect();
        return String::from_utf16_lossy(&units);
    }
    match std::str::from_utf8(bytes) {
        Ok(text) => text.to_string(),
        // PDFDocEncoding matches Latin-1 for printable characters
        Err(_) => bytes.iter().map(|&b| b as char).collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lopdf::{dictionary, StringFormat};
    use tempfile::tempdir;

    fn write_pdf(path: &Path, info: Dictionary) {
        let mut doc = Document::with_version("1.5");
        let pages_id = doc.new_object_id();
        let page_id = doc.add_object(dictionary! {
            "Type" => "Page",
            "Parent" => pages_id,
            "MediaBox" => vec![0.into(), 0.into(), 200.into(), 200.into()],
        });
        doc.objects.insert(
            pages_id,
            Object::Dictionary(dictionary! {
                "Type" => "Pages",
                "Kids" => vec![page_id.into()],
                "Count" => 1,
            }),
        );
        let catalog_id = doc.add_object(dictionary! {
            "Type" => "Catalog",
            "Pages" => pages_id,
        });
        let info_id = doc.add_object(info);
        doc.trailer.set("Root", catalog_id);
        doc.trailer.set("Info", info_id);
        doc.save(path).unwrap();
    }

    #[test]
    fn test_info_dictionary_is_read() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("paper.pdf");
        let mut utf16 = vec![0xFE, 0xFF];
        for unit in "数学原理".encode_utf16() {
            utf16.extend_from_slice(&unit.to_be_bytes());
        }
        write_pdf(
            &path,
            dictionary! {
                "Title" => Object::String(utf16, StringFormat::Hexadecimal),
                "Author" => Object::string_literal("A. Whitehead"),
            },
        );

        let meta = read_metadata(&path, "Unknown").unwrap();
        assert_eq!(meta.title, "数学原理");
        assert_eq!(meta.author, "A. Whitehead");
        assert_eq!(meta.cover, Some(CoverSource::Marker(CoverMarker::PdfFirstPage)));
    }

    #[test]
    fn test_missing_info_falls_back_to_file_name() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("untitled scan.pdf");
        write_pdf(&path, Dictionary::new());
        let meta = read_metadata(&path, "Nobody").unwrap();
        assert_eq!(meta.title, "untitled scan");
        assert_eq!(meta.author, "Nobody");
    }

    #[test]
    fn test_garbage_is_an_error() {
        let tmp = tempdir().unwrap();
        let path = tmp.path().join("bad.pdf");
        std::fs::write(&path, b"definitely not a pdf").unwrap();
        assert!(read_metadata(&path, "Unknown").is_err());
    }

    #[test]
    fn test_decode_latin1_fallback() {
        assert_eq!(decode_pdf_string(&[0x43, 0x61, 0x66, 0xE9]), "Café");
    }
}
