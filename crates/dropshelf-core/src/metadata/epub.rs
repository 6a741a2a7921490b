use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use regex::Regex;
use std::fs::File;
use std::io::{BufReader, Read};
use std::path::Path;
use std::sync::OnceLock;
use zip::ZipArchive;

use super::{BookMetadata, CoverMarker, CoverSource};
use crate::error::MetadataError;

#[derive(Debug, Default)]
struct ManifestItem {
    id: String,
    href: String,
    media_type: String,
    properties: String,
}

#[derive(Debug, Default)]
struct Package {
    title: Option<String>,
    creators: Vec<String>,
    description: Option<String>,
    cover_id: Option<String>,
    manifest: Vec<ManifestItem>,
}

#[derive(Clone, Copy)]
enum Field {
    Title,
    Creator,
    Description,
}

pub fn read_metadata(path: &Path, default_author: &str) -> Result<BookMetadata, MetadataError> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;

    let container = read_entry(&mut archive, "META-INF/container.xml")?;
    let opf_path = find_rootfile(&container)?
        .ok_or_else(|| MetadataError::Missing("container.xml has no rootfile".to_string()))?;
    let opf = read_entry(&mut archive, &opf_path)?;
    let package = parse_package(&opf)?;

    let cover = find_cover(&package).map(|item| {
        let entry = resolve_href(&opf_path, &item.href);
        let extension = image_extension(&item.href, &item.media_type);
        CoverSource::Marker(CoverMarker::EpubEntry { entry, extension })
    });

    let author = if package.creators.is_empty() {
        default_author.to_string()
    } else {
        package.creators.join(", ")
    };

    Ok(BookMetadata {
        title: package
            .title
            .unwrap_or_else(|| super::title_from_path(path)),
        author,
        description: package.description,
        cover,
    })
}

/// Copy the archive entry `entry` to `dest`.
pub fn extract_cover(path: &Path, entry: &str, dest: &Path) -> Result<(), MetadataError> {
    let mut archive = ZipArchive::new(BufReader::new(File::open(path)?))?;
    let mut source = archive.by_name(entry)?;
    let mut out = File::create(dest)?;
    std::io::copy(&mut source, &mut out)?;
    Ok(())
}

fn read_entry<R: Read + std::io::Seek>(
    archive: &mut ZipArchive<R>,
    name: &str,
) -> Result<String, MetadataError> {
    let mut entry = archive.by_name(name)?;
    let mut content = String::new();
    entry.read_to_string(&mut content)?;
    Ok(content)
}

fn find_rootfile(container: &str) -> Result<Option<String>, MetadataError> {
    let mut reader = Reader::from_str(container);
    reader.config_mut().trim_text(true);

    loop {
        match reader.read_event()? {
            Event::Start(e) | Event::Empty(e) if e.local_name().as_ref() == b"rootfile" => {
                if let Some(full_path) = attribute(&e, b"full-path") {
                    return Ok(Some(full_path));
                }
            }
            Event::Eof => return Ok(None),
            _ => {}
        }
    }
}

fn parse_package(opf: &str) -> Result<Package, MetadataError> {
    let mut reader = Reader::from_str(opf);
    reader.config_mut().trim_text(true);

    let mut package = Package::default();
    let mut current: Option<Field> = None;
    let mut buffer = String::new();

    loop {
        match reader.read_event()? {
            Event::Start(e) => match e.local_name().as_ref() {
                b"title" => current = Some(Field::Title),
                b"creator" => current = Some(Field::Creator),
                b"description" => current = Some(Field::Description),
                b"meta" => read_cover_meta(&e, &mut package),
                b"item" => package.manifest.push(manifest_item(&e)),
                _ => {}
            },
            Event::Empty(e) => match e.local_name().as_ref() {
                b"meta" => read_cover_meta(&e, &mut package),
                b"item" => package.manifest.push(manifest_item(&e)),
                _ => {}
            },
            Event::Text(t) if current.is_some() => buffer.push_str(&t.unescape()?),
            Event::CData(c) if current.is_some() => {
                buffer.push_str(&String::from_utf8_lossy(&c.into_inner()))
            }
            Event::End(_) => {
                if let Some(field) = current.take() {
                    let value = buffer.trim().to_string();
                    buffer.clear();
                    if !value.is_empty() {
                        store_field(&mut package, field, value);
                    }
                }
            }
            Event::Eof => break,
            _ => {}
        }
    }
    Ok(package)
}

fn store_field(package: &mut Package, field: Field, value: String) {
    match field {
        Field::Title => {
            if package.title.is_none() {
                package.title = Some(value);
            }
        }
        Field::Creator => package.creators.push(value),
        Field::Description => {
            if package.description.is_none() {
                let plain = strip_tags(&value);
                if !plain.is_empty() {
                    package.description = Some(plain);
                }
            }
        }
    }
}

fn read_cover_meta(e: &BytesStart<'_>, package: &mut Package) {
    if attribute(e, b"name").as_deref() == Some("cover") {
        package.cover_id = attribute(e, b"content");
    }
}

fn manifest_item(e: &BytesStart<'_>) -> ManifestItem {
    ManifestItem {
        id: attribute(e, b"id").unwrap_or_default(),
        href: attribute(e, b"href").unwrap_or_default(),
        media_type: attribute(e, b"media-type").unwrap_or_default(),
        properties: attribute(e, b"properties").unwrap_or_default(),
    }
}

fn attribute(e: &BytesStart<'_>, name: &[u8]) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.local_name().as_ref() == name)
        .and_then(|a| a.unescape_value().ok().map(|v| v.into_owned()))
}

fn find_cover(package: &Package) -> Option<&ManifestItem> {
    let is_image = |item: &&ManifestItem| item.media_type.starts_with("image/");

    if let Some(id) = &package.cover_id {
        if let Some(item) = package.manifest.iter().filter(is_image).find(|i| &i.id == id) {
            return Some(item);
        }
    }
    if let Some(item) = package
        .manifest
        .iter()
        .find(|i| i.properties.split_whitespace().any(|p| p == "cover-image"))
    {
        return Some(item);
    }
    package.manifest.iter().filter(is_image).find(|i| {
        i.id.to_lowercase().contains("cover") || i.href.to_lowercase().contains("cover")
    })
}

/// Resolve a manifest href against the OPF location inside the archive.
fn resolve_href(opf_path: &str, href: &str) -> String {
    let base = opf_path.rsplit_once('/').map(|(dir, _)| dir).unwrap_or("");
    let mut parts: Vec<&str> = base.split('/').filter(|p| !p.is_empty()).collect();
    for segment in href.split('/') {
        match segment {
            "" | "." => {}
            ".." => {
                parts.pop();
            }
            other => parts.push(other),
        }
    }
    parts.join("/")
}

fn image_extension(href: &str, media_type: &str) -> String {
    let from_name = Path::new(href)
        .extension()
        .and_then(|e| e.to_str())
        .map(|e| e.to_ascii_lowercase());
    match from_name.as_deref() {
        Some(ext @ ("jpg" | "jpeg" | "png" | "gif" | "webp" | "svg")) => format!(".{}", ext),
        _ => match media_type {
            "image/png" => ".png",
            "image/gif" => ".gif",
            "image/webp" => ".webp",
            "image/svg+xml" => ".svg",
            _ => ".jpg",
        }
        .to_string(),
    }
}

fn strip_tags(html: &str) -> String {
    static TAGS: OnceLock<Option<Regex>> = OnceLock::new();
    let stripped = match TAGS.get_or_init(|| Regex::new(r"<[^>]*>").ok()) {
        Some(re) => re.replace_all(html, " ").into_owned(),
        None => html.to_string(),
    };
    stripped.split_whitespace().collect::<Vec<_>>().join(" ")
}

#[cfg(test)]
mod tests {
    use super::*;

    const OPF: &str = r#"<?xml version="1.0"?>
<package xmlns="http://www.idpf.org/2007/opf" version="2.0">
  <metadata xmlns:dc="http://purl.org/dc/elements/1.1/">
    <dc:title>Dune &amp; Sand</dc:title>
    <dc:creator opf:role="aut">Frank Herbert</dc:creator>
    <dc:description>&lt;p&gt;Spice   must flow&lt;/p&gt;</dc:description>
    <meta name="cover" content="cover-img"/>
  </metadata>
  <manifest>
    <item id="ch1" href="text/ch1.xhtml" media-type="application/xhtml+xml"/>
    <item id="cover-img" href="../images/Front.JPEG" media-type="image/jpeg"/>
  </manifest>
</package>"#;

    #[test]
    fn test_parse_package_fields() {
        let package = parse_package(OPF).unwrap();
        assert_eq!(package.title.as_deref(), Some("Dune & Sand"));
        assert_eq!(package.creators, vec!["Frank Herbert"]);
        assert_eq!(package.description.as_deref(), Some("Spice must flow"));
        let cover = find_cover(&package).unwrap();
        assert_eq!(cover.id, "cover-img");
        assert_eq!(resolve_href("OEBPS/content.opf", &cover.href), "images/Front.JPEG");
        assert_eq!(image_extension(&cover.href, &cover.media_type), ".jpeg");
    }

    #[test]
    fn test_cover_image_property_and_name_fallback() {
        let mut package = Package::default();
        package.manifest.push(ManifestItem {
            id: "img1".into(),
            href: "art.png".into(),
            media_type: "image/png".into(),
            properties: "cover-image".into(),
        });
        assert_eq!(find_cover(&package).unwrap().href, "art.png");

        let mut package = Package::default();
        package.manifest.push(ManifestItem {
            id: "x".into(),
            href: "images/my_cover".into(),
            media_type: "image/webp".into(),
            properties: String::new(),
        });
        let item = find_cover(&package).unwrap();
        assert_eq!(image_extension(&item.href, &item.media_type), ".webp");
    }

    #[test]
    fn test_rootfile_lookup() {
        let container = r#"<container><rootfiles><rootfile full-path="OPS/book.opf" media-type="application/oebps-package+xml"/></rootfiles></container>"#;
        assert_eq!(find_rootfile(container).unwrap().as_deref(), Some("OPS/book.opf"));
        assert_eq!(resolve_href("book.opf", "cover.jpg"), "cover.jpg");
    }
}
