//! PowerPoint archive handling.
//!
//! A pptx is a ZIP with media under `ppt/media/` and XML parts referencing
//! media files by name. The original archive is never modified: it is
//! extracted to a temp dir, media & references are rewritten there, and a new
//! archive is written next to the input.
use anyhow::Context;
use log::warn;
use std::{
    fs::File,
    io,
    path::{Path, PathBuf},
};
use walkdir::WalkDir;
use zip::{CompressionMethod, ZipArchive, ZipWriter, write::SimpleFileOptions};

const MEDIA_DIR: &str = "ppt/media";
const CONTENT_TYPES: &str = "[Content_Types].xml";

/// Video extensions worth re-encoding inside a deck.
const VIDEO_EXTENSIONS: &[&str] = &["asf", "avi", "m4v", "mov", "mp4", "mpeg", "mpg", "wmv"];

pub fn is_pptx(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("pptx"))
}

pub fn is_video(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| VIDEO_EXTENSIONS.iter().any(|v| e.eq_ignore_ascii_case(v)))
}

/// Extract the archive into `dest`.
pub fn extract(archive: &Path, dest: &Path) -> anyhow::Result<()> {
    let file = File::open(archive).with_context(|| format!("open {}", archive.display()))?;
    let mut zip = ZipArchive::new(file).context("read pptx archive")?;
    zip.extract(dest).context("extract pptx archive")?;
    Ok(())
}

/// Embedded videos under `ppt/media`, sorted by name.
pub fn media_videos(extracted_root: &Path) -> Vec<PathBuf> {
    let media = extracted_root.join(MEDIA_DIR);
    let mut videos: Vec<_> = std::fs::read_dir(media)
        .into_iter()
        .flatten()
        .flatten()
        .map(|entry| entry.path())
        .filter(|p| p.is_file() && is_video(p))
        .collect();
    videos.sort();
    videos
}

/// Rewrite `old_name` -> `new_name` across all extracted xml & rels parts.
/// Returns the number of parts changed. Per-part read/write failures are
/// warnings, not errors.
pub fn rewrite_references(extracted_root: &Path, old_name: &str, new_name: &str) -> usize {
    let mut changed = 0;
    for entry in WalkDir::new(extracted_root)
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        if !is_markup(path) {
            continue;
        }
        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(err) => {
                warn!("could not read {}: {err}", path.display());
                continue;
            }
        };
        if !content.contains(old_name) {
            continue;
        }
        let rewritten = content.replace(old_name, new_name);
        match std::fs::write(path, rewritten) {
            Ok(_) => changed += 1,
            Err(err) => warn!("could not rewrite {}: {err}", path.display()),
        }
    }
    changed
}

/// Make sure `[Content_Types].xml` declares the given extension. Needed when
/// a media file changes container, e.g. wmv -> mp4.
pub fn ensure_content_type(extracted_root: &Path, extension: &str, mime: &str) -> anyhow::Result<()> {
    let path = extracted_root.join(CONTENT_TYPES);
    let content = std::fs::read_to_string(&path).context("read [Content_Types].xml")?;
    if let Some(updated) = insert_default_content_type(&content, extension, mime) {
        std::fs::write(&path, updated).context("write [Content_Types].xml")?;
    }
    Ok(())
}

/// `None` when the extension is already declared.
fn insert_default_content_type(content: &str, extension: &str, mime: &str) -> Option<String> {
    if content.contains(&format!("Extension=\"{extension}\"")) {
        return None;
    }
    let close = content.rfind("</Types>")?;
    let mut updated = String::with_capacity(content.len() + 64);
    updated.push_str(&content[..close]);
    updated.push_str(&format!(
        "<Default Extension=\"{extension}\" ContentType=\"{mime}\"/>"
    ));
    updated.push_str(&content[close..]);
    Some(updated)
}

fn is_markup(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("xml") || e.eq_ignore_ascii_case("rels"))
}

/// Zip the extracted tree back up into `output`.
pub fn repack(extracted_root: &Path, output: &Path) -> anyhow::Result<()> {
    let out = File::create(output).with_context(|| format!("create {}", output.display()))?;
    let mut zip = ZipWriter::new(out);
    // media is already compressed, deflating it again wastes time
    let deflated = SimpleFileOptions::default().compression_method(CompressionMethod::Deflated);
    let stored = SimpleFileOptions::default().compression_method(CompressionMethod::Stored);

    for entry in WalkDir::new(extracted_root)
        .sort_by_file_name()
        .into_iter()
        .filter_map(Result::ok)
        .filter(|e| e.file_type().is_file())
    {
        let path = entry.path();
        let rel = path
            .strip_prefix(extracted_root)
            .context("entry outside extraction root")?;
        let name = entry_name(rel);
        let options = match is_video(path) {
            true => stored,
            false => deflated,
        };
        zip.start_file(name, options)
            .with_context(|| format!("zip entry {}", rel.display()))?;
        let mut src = File::open(path).with_context(|| format!("open {}", path.display()))?;
        io::copy(&mut src, &mut zip).context("write zip entry")?;
    }
    zip.finish().context("finish pptx archive")?;
    Ok(())
}

/// ZIP entry names always use forward slashes.
fn entry_name(rel: &Path) -> String {
    rel.components()
        .map(|c| c.as_os_str().to_string_lossy())
        .collect::<Vec<_>>()
        .join("/")
}

/// * input: deck.pptx -> output: deck_compressed.pptx
pub fn default_output_from(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy())
        .unwrap_or_default();
    let ext = input
        .extension()
        .map(|e| e.to_string_lossy())
        .unwrap_or_else(|| "pptx".into());
    input.with_file_name(format!("{stem}_compressed.{ext}"))
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn pptx_extension() {
        assert!(is_pptx(Path::new("deck.pptx")));
        assert!(is_pptx(Path::new("deck.PPTX")));
        assert!(!is_pptx(Path::new("deck.ppt")));
        assert!(!is_pptx(Path::new("video.mp4")));
    }

    #[test]
    fn video_extensions() {
        assert!(is_video(Path::new("ppt/media/media1.wmv")));
        assert!(is_video(Path::new("media2.MP4")));
        assert!(!is_video(Path::new("image1.png")));
        assert!(!is_video(Path::new("noext")));
    }

    #[test]
    fn compressed_output_name() {
        assert_eq!(
            default_output_from(Path::new("/talks/deck.pptx")),
            Path::new("/talks/deck_compressed.pptx")
        );
    }

    #[test]
    fn entry_names_use_forward_slashes() {
        let rel: PathBuf = ["ppt", "media", "media1.mp4"].iter().collect();
        assert_eq!(entry_name(&rel), "ppt/media/media1.mp4");
    }

    #[test]
    fn content_type_inserted_once() {
        let xml = r#"<?xml version="1.0"?><Types xmlns="ct"><Default Extension="wmv" ContentType="video/x-ms-wmv"/></Types>"#;
        let updated = insert_default_content_type(xml, "mp4", "video/mp4").unwrap();
        assert!(updated.contains(r#"<Default Extension="mp4" ContentType="video/mp4"/>"#));
        assert!(updated.ends_with("</Types>"));
        // already present -> untouched
        assert_eq!(insert_default_content_type(&updated, "mp4", "video/mp4"), None);
    }

    #[test]
    fn rewrite_walks_markup_only() {
        let root = std::env::temp_dir().join(format!("vidsqueeze-test-{}", std::process::id()));
        let slides = root.join("ppt/slides/_rels");
        std::fs::create_dir_all(&slides).unwrap();
        let rels = slides.join("slide1.xml.rels");
        std::fs::write(&rels, r#"<Relationship Target="../media/media1.wmv"/>"#).unwrap();
        let txt = root.join("notes.txt");
        std::fs::write(&txt, "media1.wmv").unwrap();

        let changed = rewrite_references(&root, "media1.wmv", "media1.mp4");
        assert_eq!(changed, 1);
        assert!(
            std::fs::read_to_string(&rels)
                .unwrap()
                .contains("media1.mp4")
        );
        // non-markup untouched
        assert_eq!(std::fs::read_to_string(&txt).unwrap(), "media1.wmv");

        std::fs::remove_dir_all(&root).unwrap();
    }
}
