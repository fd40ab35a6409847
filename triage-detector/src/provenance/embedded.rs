//! Embedded-metadata strategy: authoring tags stored inside the file.
//!
//! Image generators leave signatures in PNG text chunks (`Software: NovelAI`,
//! a `parameters` block, …). A [`TagReader`] exposes those chunks as a
//! key/value map and an [`EmbeddedInspector`] turns matching
//! [`ToolSignature`]s into tool names.

use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use triage_core::{ToolName, ToolSignature};

use crate::error::{io_err, ProvenanceError};

/// Authoring tags by key. The first occurrence of a key wins.
pub type Tags = BTreeMap<String, String>;

/// A collaborator that opens a file and exposes its authoring tags.
///
/// A missing key is normal; `read_tags` only fails when the file cannot be
/// opened or decoded.
pub trait TagReader: Send + Sync {
    /// Cheap, I/O-free check whether this reader understands `path`.
    fn supports(&self, path: &Path) -> bool;

    fn read_tags(&self, path: &Path) -> Result<Tags, ProvenanceError>;
}

/// Reads tEXt / zTXt / iTXt chunks of a PNG, before and after the image data.
#[derive(Debug, Clone, Copy, Default)]
pub struct PngTagReader;

impl TagReader for PngTagReader {
    fn supports(&self, path: &Path) -> bool {
        path.extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("png"))
            .unwrap_or(false)
    }

    fn read_tags(&self, path: &Path) -> Result<Tags, ProvenanceError> {
        let file = File::open(path).map_err(|e| io_err(path, e))?;
        let decoder = png::Decoder::new(BufReader::new(file));
        let mut reader = decoder.read_info().map_err(|e| ProvenanceError::Png {
            path: path.to_path_buf(),
            source: e,
        })?;

        // Text chunks after IDAT only show up once the image is consumed.
        let mut pixels = vec![0; reader.output_buffer_size()];
        let trailing = match reader.next_frame(&mut pixels) {
            Ok(_) => reader.finish(),
            Err(err) => Err(err),
        };
        if let Err(err) = trailing {
            tracing::debug!(
                "keeping leading text chunks of {}: {err}",
                path.display()
            );
        }
        let info = reader.info();

        let mut tags = Tags::new();
        for chunk in &info.uncompressed_latin1_text {
            tags.entry(chunk.keyword.clone())
                .or_insert_with(|| chunk.text.clone());
        }
        for chunk in &info.compressed_latin1_text {
            if let Ok(text) = chunk.get_text() {
                tags.entry(chunk.keyword.clone()).or_insert(text);
            }
        }
        for chunk in &info.utf8_text {
            if let Ok(text) = chunk.get_text() {
                tags.entry(chunk.keyword.clone()).or_insert(text);
            }
        }
        Ok(tags)
    }
}

/// Matches a file's tags against configured tool signatures.
pub struct EmbeddedInspector {
    reader: Box<dyn TagReader>,
    signatures: Vec<ToolSignature>,
}

impl EmbeddedInspector {
    pub fn new(reader: impl TagReader + 'static, signatures: Vec<ToolSignature>) -> Self {
        Self {
            reader: Box::new(reader),
            signatures,
        }
    }

    pub fn signatures(&self) -> &[ToolSignature] {
        &self.signatures
    }

    /// Tools whose signature matches, in signature order, without repeats.
    ///
    /// Files the reader does not support yield an empty list without I/O.
    pub fn tools(&self, path: &Path) -> Result<Vec<ToolName>, ProvenanceError> {
        if self.signatures.is_empty() || !self.reader.supports(path) {
            return Ok(Vec::new());
        }
        let tags = self.reader.read_tags(path)?;
        Ok(match_signatures(&self.signatures, &tags))
    }
}

impl std::fmt::Debug for EmbeddedInspector {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddedInspector")
            .field("signatures", &self.signatures)
            .finish_non_exhaustive()
    }
}

/// Pure signature matching over an already-read tag map.
pub fn match_signatures(signatures: &[ToolSignature], tags: &Tags) -> Vec<ToolName> {
    let mut tools: Vec<ToolName> = Vec::new();
    for signature in signatures {
        let found = tags.get(&signature.key).map(String::as_str);
        if signature.matches(found) && !tools.contains(&signature.tool) {
            tools.push(signature.tool.clone());
        }
    }
    tools
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use std::io::BufWriter;
    use tempfile::TempDir;

    fn signatures() -> Vec<ToolSignature> {
        vec![
            ToolSignature {
                key: "Software".into(),
                value: Some("NovelAI".into()),
                tool: ToolName::from("NovelAI"),
            },
            ToolSignature {
                key: "parameters".into(),
                value: None,
                tool: ToolName::from("StableDiffusion"),
            },
        ]
    }

    fn write_png(path: &Path, text: &[(&str, &str)]) {
        let file = fs::File::create(path).unwrap();
        let mut encoder = png::Encoder::new(BufWriter::new(file), 1, 1);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        for (key, value) in text {
            encoder
                .add_text_chunk(key.to_string(), value.to_string())
                .unwrap();
        }
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0]).unwrap();
        writer.finish().unwrap();
    }

    #[test]
    fn reads_text_chunks_from_png() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("gen.png");
        write_png(&path, &[("Software", "NovelAI"), ("Comment", "{}")]);

        let tags = PngTagReader.read_tags(&path).unwrap();
        assert_eq!(tags.get("Software").map(String::as_str), Some("NovelAI"));
        assert_eq!(tags.get("Comment").map(String::as_str), Some("{}"));
    }

    #[test]
    fn reads_text_chunks_after_image_data() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("late.png");
        let file = fs::File::create(&path).unwrap();
        let mut encoder = png::Encoder::new(BufWriter::new(file), 1, 1);
        encoder.set_color(png::ColorType::Grayscale);
        encoder.set_depth(png::BitDepth::Eight);
        encoder
            .add_text_chunk("Title".to_string(), "early".to_string())
            .unwrap();
        let mut writer = encoder.write_header().unwrap();
        writer.write_image_data(&[0]).unwrap();
        writer
            .write_chunk(png::chunk::tEXt, b"Software\0NovelAI")
            .unwrap();
        writer.finish().unwrap();

        let tags = PngTagReader.read_tags(&path).unwrap();
        assert_eq!(tags.get("Title").map(String::as_str), Some("early"));
        assert_eq!(tags.get("Software").map(String::as_str), Some("NovelAI"));
    }

    #[test]
    fn inspector_maps_signatures_to_tools() {
        let dir = TempDir::new().unwrap();
        let nai = dir.path().join("nai.png");
        let sd = dir.path().join("sd.png");
        let plain = dir.path().join("plain.png");
        write_png(&nai, &[("Software", "NovelAI")]);
        write_png(&sd, &[("parameters", "a cat, steps: 20")]);
        write_png(&plain, &[("Software", "GIMP")]);

        let inspector = EmbeddedInspector::new(PngTagReader, signatures());
        assert_eq!(inspector.tools(&nai).unwrap(), vec![ToolName::from("NovelAI")]);
        assert_eq!(
            inspector.tools(&sd).unwrap(),
            vec![ToolName::from("StableDiffusion")]
        );
        assert!(inspector.tools(&plain).unwrap().is_empty());
    }

    #[test]
    fn unsupported_extension_is_not_opened() {
        let inspector = EmbeddedInspector::new(PngTagReader, signatures());
        // Does not exist; would error if the reader tried to open it.
        let tools = inspector.tools(Path::new("/nonexistent/clip.mp4")).unwrap();
        assert!(tools.is_empty());
    }

    #[test]
    fn truncated_png_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.png");
        fs::write(&path, b"\x89PNG\r\n\x1a\n\0\0").unwrap();
        assert!(PngTagReader.read_tags(&path).is_err());
    }

    #[test]
    fn signature_matching_deduplicates_tools() {
        let mut tags = Tags::new();
        tags.insert("Software".into(), "NovelAI".into());
        tags.insert("Source".into(), "NovelAI Diffusion".into());
        let sigs = vec![
            signatures()[0].clone(),
            ToolSignature {
                key: "Source".into(),
                value: None,
                tool: ToolName::from("NovelAI"),
            },
        ];
        assert_eq!(match_signatures(&sigs, &tags), vec![ToolName::from("NovelAI")]);
    }
}
