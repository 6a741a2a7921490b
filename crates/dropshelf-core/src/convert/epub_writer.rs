use quick_xml::escape::escape;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use zip::write::SimpleFileOptions;
use zip::{CompressionMethod, DateTime, ZipWriter};

use super::chapters::{chapter_title, Chapter};
use crate::error::ConversionError;

/// `dcterms:modified` for books whose output must depend on their text only.
pub const FIXED_MODIFIED: &str = "2000-01-01T00:00:00Z";

/// Everything needed to assemble a minimal EPUB 3 container.
///
/// The same book always produces byte-identical output: entry timestamps are
/// pinned and nothing time-dependent is written beyond `modified`.
#[derive(Debug)]
pub struct EpubBook<'a> {
    /// UUID written as `urn:uuid:{identifier}`.
    pub identifier: &'a str,
    pub title: &'a str,
    pub author: &'a str,
    pub language: &'a str,
    pub chapters: &'a [Chapter],
    /// `dcterms:modified` value, `YYYY-MM-DDThh:mm:ssZ`.
    pub modified: &'a str,
}

const CONTAINER_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<container version="1.0" xmlns="urn:oasis:names:tc:opendocument:xmlns:container">
  <rootfiles>
    <rootfile full-path="OEBPS/content.opf" media-type="application/oebps-package+xml"/>
  </rootfiles>
</container>
"#;

/// Pick a language tag from the text: CJK content is tagged `zh`, anything else `en`.
pub fn guess_language(chapters: &[Chapter]) -> &'static str {
    let cjk = chapters
        .iter()
        .flat_map(|c| c.paragraphs.iter())
        .take(50)
        .flat_map(|p| p.chars())
        .any(|ch| ('\u{4e00}'..='\u{9fff}').contains(&ch));
    if cjk {
        "zh"
    } else {
        "en"
    }
}

pub fn write_epub(dest: &Path, book: &EpubBook<'_>) -> Result<(), ConversionError> {
    let file = File::create(dest)?;
    let mut zip = ZipWriter::new(BufWriter::new(file));

    // mimetype must be the first entry and stored uncompressed
    let stored = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Stored)
        .last_modified_time(DateTime::default());
    let deflated = SimpleFileOptions::default()
        .compression_method(CompressionMethod::Deflated)
        .last_modified_time(DateTime::default());

    zip.start_file("mimetype", stored).map_err(epub_error)?;
    zip.write_all(b"application/epub+zip")?;

    zip.start_file("META-INF/container.xml", deflated)
        .map_err(epub_error)?;
    zip.write_all(CONTAINER_XML.as_bytes())?;

    zip.start_file("OEBPS/content.opf", deflated)
        .map_err(epub_error)?;
    zip.write_all(render_opf(book).as_bytes())?;

    zip.start_file("OEBPS/toc.ncx", deflated).map_err(epub_error)?;
    zip.write_all(render_ncx(book).as_bytes())?;

    zip.start_file("OEBPS/nav.xhtml", deflated)
        .map_err(epub_error)?;
    zip.write_all(render_nav(book).as_bytes())?;

    for (index, chapter) in book.chapters.iter().enumerate() {
        zip.start_file(format!("OEBPS/{}", chapter_file(index)), deflated)
            .map_err(epub_error)?;
        zip.write_all(render_chapter(book, chapter, index).as_bytes())?;
    }

    let mut writer = zip.finish().map_err(epub_error)?;
    writer.flush()?;
    Ok(())
}

fn epub_error(err: zip::result::ZipError) -> ConversionError {
    ConversionError::Epub(err.to_string())
}

fn chapter_file(index: usize) -> String {
    format!("chapter_{:03}.xhtml", index + 1)
}

fn render_opf(book: &EpubBook<'_>) -> String {
    let mut manifest = String::new();
    let mut spine = String::new();
    for index in 0..book.chapters.len() {
        manifest.push_str(&format!(
            "    <item id=\"ch{n}\" href=\"{file}\" media-type=\"application/xhtml+xml\"/>\n",
            n = index + 1,
            file = chapter_file(index)
        ));
        spine.push_str(&format!("    <itemref idref=\"ch{}\"/>\n", index + 1));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<package xmlns="http://www.idpf.org/2007/opf" version="3.0" unique-identifier="book-id">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:identifier id="book-id">urn:uuid:{id}</dc:identifier>
    <dc:title>{title}</dc:title>
    <dc:creator>{author}</dc:creator>
    <dc:language>{lang}</dc:language>
    <meta property="dcterms:modified">{modified}</meta>
  </metadata>
  <manifest>
    <item id="nav" href="nav.xhtml" media-type="application/xhtml+xml" properties="nav"/>
    <item id="ncx" href="toc.ncx" media-type="application/x-dtbncx+xml"/>
{manifest}  </manifest>
  <spine toc="ncx">
{spine}  </spine>
</package>
"#,
        id = escape(book.identifier),
        title = escape(book.title),
        author = escape(book.author),
        lang = book.language,
        modified = escape(book.modified),
        manifest = manifest,
        spine = spine,
    )
}

fn render_ncx(book: &EpubBook<'_>) -> String {
    let mut points = String::new();
    for (index, chapter) in book.chapters.iter().enumerate() {
        points.push_str(&format!(
            r#"    <navPoint id="np{n}" playOrder="{n}">
      <navLabel><text>{label}</text></navLabel>
      <content src="{file}"/>
    </navPoint>
"#,
            n = index + 1,
            label = escape(chapter_title(chapter, index).as_str()),
            file = chapter_file(index)
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<ncx xmlns="http://www.daisy.org/z3986/2005/ncx/" version="2005-1">
  <head>
    <meta name="dtb:uid" content="urn:uuid:{id}"/>
  </head>
  <docTitle><text>{title}</text></docTitle>
  <navMap>
{points}  </navMap>
</ncx>
"#,
        id = escape(book.identifier),
        title = escape(book.title),
        points = points,
    )
}

fn render_nav(book: &EpubBook<'_>) -> String {
    let mut items = String::new();
    for (index, chapter) in book.chapters.iter().enumerate() {
        items.push_str(&format!(
            "      <li><a href=\"{}\">{}</a></li>\n",
            chapter_file(index),
            escape(chapter_title(chapter, index).as_str())
        ));
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" xmlns:epub="http://www.idpf.org/2007/ops" lang="{lang}">
<head><title>{title}</title></head>
<body>
  <nav epub:type="toc" id="toc">
    <ol>
{items}    </ol>
  </nav>
</body>
</html>
"#,
        lang = book.language,
        title = escape(book.title),
        items = items,
    )
}

fn render_chapter(book: &EpubBook<'_>, chapter: &Chapter, index: usize) -> String {
    let title = chapter_title(chapter, index);
    let mut body = String::new();
    for paragraph in &chapter.paragraphs {
        body.push_str("  <p>");
        body.push_str(&escape(paragraph.as_str()));
        body.push_str("</p>\n");
    }

    format!(
        r#"<?xml version="1.0" encoding="UTF-8"?>
<!DOCTYPE html>
<html xmlns="http://www.w3.org/1999/xhtml" lang="{lang}">
<head><title>{title}</title></head>
<body>
  <h2>{title}</h2>
{body}</body>
</html>
"#,
        lang = book.language,
        title = escape(title.as_str()),
        body = body,
    )
}
