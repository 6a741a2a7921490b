use chardetng::EncodingDetector;
use encoding_rs::Encoding;
use std::fs::File;
use std::io::Read;
use std::path::Path;

use super::BookMetadata;
use crate::error::MetadataError;

/// Lines inspected for an author or title line.
const HEADER_LINES: usize = 30;
/// Bytes read when only metadata is wanted.
const HEADER_BYTES: u64 = 64 * 1024;

const AUTHOR_PREFIXES: &[&str] = &["作者：", "作者:", "著者：", "Author:", "author:", "AUTHOR:", "By:"];
const TITLE_PREFIXES: &[&str] = &["书名：", "书名:", "Title:", "title:", "TITLE:"];

/// Decode raw bytes to text: BOM first, then strict UTF-8, then a statistical guess.
pub fn decode_text(bytes: &[u8]) -> String {
    if let Some((encoding, bom_len)) = Encoding::for_bom(bytes) {
        let (text, _) = encoding.decode_without_bom_handling(&bytes[bom_len..]);
        return text.into_owned();
    }
    if let Ok(text) = std::str::from_utf8(bytes) {
        return text.to_string();
    }

    let mut detector = EncodingDetector::new();
    detector.feed(bytes, true);
    let encoding = detector.guess(None, true);
    let (text, _, _) = encoding.decode(bytes);
    text.into_owned()
}

pub fn metadata_from_text(text: &str, path: &Path, default_author: &str) -> BookMetadata {
    let mut title = None;
    let mut author = None;

    for line in text.lines().take(HEADER_LINES) {
        let line = line.trim().trim_start_matches('\u{feff}');
        if author.is_none() {
            author = strip_any_prefix(line, AUTHOR_PREFIXES);
        }
        if title.is_none() {
            title = strip_any_prefix(line, TITLE_PREFIXES);
        }
    }

    BookMetadata {
        title: title
            .map(|t| trim_title_marks(&t))
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| super::title_from_path(path)),
        author: author.unwrap_or_else(|| default_author.to_string()),
        description: None,
        cover: None,
    }
}

pub fn read_metadata(path: &Path, default_author: &str) -> Result<BookMetadata, MetadataError> {
    let mut bytes = Vec::new();
    File::open(path)?.take(HEADER_BYTES).read_to_end(&mut bytes)?;
    let text = decode_text(&bytes);
    Ok(metadata_from_text(&text, path, default_author))
}

fn strip_any_prefix(line: &str, prefixes: &[&str]) -> Option<String> {
    prefixes.iter().find_map(|prefix| {
        line.strip_prefix(prefix)
            .map(str::trim)
            .filter(|rest| !rest.is_empty())
            .map(str::to_string)
    })
}

fn trim_title_marks(title: &str) -> String {
    title
        .trim()
        .trim_start_matches('《')
        .trim_end_matches('》')
        .trim()
        .to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_decode_utf8_and_bom() {
        assert_eq!(decode_text("plain".as_bytes()), "plain");
        let mut with_bom = vec![0xEF, 0xBB, 0xBF];
        with_bom.extend_from_slice("书".as_bytes());
        assert_eq!(decode_text(&with_bom), "书");
    }

    #[test]
    fn test_decode_gbk() {
        let source = "第一章 宴桃园豪杰三结义\n\n话说天下大势，分久必合，合久必分。周末七国分争，并入于秦。\
                      及秦灭之后，楚、汉分争，又并入于汉。汉朝自高祖斩白蛇而起义，一统天下，\
                      后来光武中兴，传至献帝，遂分为三国。推其致乱之由，殆始于桓、灵二帝。";
        let (encoded, _, _) = encoding_rs::GBK.encode(source);
        assert!(std::str::from_utf8(&encoded).is_err());
        let decoded = decode_text(&encoded);
        assert!(decoded.contains("天下大势"), "{}", decoded);
    }

    #[test]
    fn test_author_line_and_stem_title() {
        let path = PathBuf::from("/drop/《三国演义》.txt");
        let meta = metadata_from_text("三国演义\n作者：罗贯中\n\n第一回", &path, "Unknown");
        assert_eq!(meta.author, "罗贯中");
        assert_eq!(meta.title, "三国演义");
    }

    #[test]
    fn test_explicit_title_and_default_author() {
        let path = PathBuf::from("/drop/file_123.txt");
        let meta = metadata_from_text("Title: The Long Walk\n\nIt began.", &path, "Unknown");
        assert_eq!(meta.title, "The Long Walk");
        assert_eq!(meta.author, "Unknown");
    }

    #[test]
    fn test_author_beyond_header_is_ignored() {
        let mut text = "line\n".repeat(HEADER_LINES);
        text.push_str("Author: Late");
        let meta = metadata_from_text(&text, Path::new("x.txt"), "Unknown");
        assert_eq!(meta.author, "Unknown");
    }
}
