//! PNG export of preview frames with embedded metadata (tEXt chunks).

use std::io::BufWriter;
use std::path::Path;

use tracing::debug;
use vidpeek_core::PreviewImage;

use crate::error::RenderError;

/// Metadata to embed in an exported preview frame.
#[derive(Debug, Clone)]
pub struct FrameMetadata {
    pub source: String,
    pub title: u32,
    pub preview_index: usize,
    pub preview_count: usize,
    pub display_width: u32,
    pub display_height: u32,
}

/// Write `image` as a PNG file at `path` with `metadata` as tEXt chunks.
pub fn export_png(image: &PreviewImage, path: &Path, metadata: &FrameMetadata) -> crate::Result<()> {
    let file = std::fs::File::create(path)
        .map_err(|e| RenderError::Export(format!("failed to create file: {e}")))?;
    let writer = BufWriter::new(file);

    let mut encoder = png::Encoder::new(writer, image.width, image.height);
    encoder.set_color(png::ColorType::Rgba);
    encoder.set_depth(png::BitDepth::Eight);
    encoder.set_compression(png::Compression::Default);

    encoder
        .add_text_chunk("Software".to_string(), "VidPeek".to_string())
        .map_err(|e| RenderError::Export(format!("failed to add text chunk: {e}")))?;

    encoder
        .add_text_chunk("Description".to_string(), build_description(metadata))
        .map_err(|e| RenderError::Export(format!("failed to add text chunk: {e}")))?;

    for (key, value) in build_metadata_pairs(metadata) {
        encoder
            .add_text_chunk(key.clone(), value)
            .map_err(|e| RenderError::Export(format!("failed to add text chunk '{key}': {e}")))?;
    }

    let mut png_writer = encoder
        .write_header()
        .map_err(|e| RenderError::Export(format!("failed to write PNG header: {e}")))?;

    png_writer
        .write_image_data(&image.pixels)
        .map_err(|e| RenderError::Export(format!("failed to write PNG image data: {e}")))?;

    debug!(
        "Exported preview {} ({}x{}) to {}",
        metadata.preview_index,
        image.width,
        image.height,
        path.display()
    );
    Ok(())
}

fn build_description(meta: &FrameMetadata) -> String {
    format!(
        "{} - Title {}, Preview {} of {}, Display {}x{}",
        meta.source,
        meta.title,
        meta.preview_index + 1,
        meta.preview_count,
        meta.display_width,
        meta.display_height,
    )
}

fn build_metadata_pairs(meta: &FrameMetadata) -> Vec<(String, String)> {
    vec![
        ("Source".to_string(), meta.source.clone()),
        ("Title".to_string(), meta.title.to_string()),
        ("PreviewIndex".to_string(), meta.preview_index.to_string()),
        ("PreviewCount".to_string(), meta.preview_count.to_string()),
        (
            "DisplaySize".to_string(),
            format!("{}x{}", meta.display_width, meta.display_height),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_metadata() -> FrameMetadata {
        FrameMetadata {
            source: "holiday.mkv".to_string(),
            title: 1,
            preview_index: 4,
            preview_count: 10,
            display_width: 853,
            display_height: 480,
        }
    }

    #[test]
    fn description_is_one_based() {
        let desc = build_description(&sample_metadata());
        assert_eq!(
            desc,
            "holiday.mkv - Title 1, Preview 5 of 10, Display 853x480"
        );
    }

    #[test]
    fn exported_png_carries_metadata() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.png");
        let image = PreviewImage::filled(6, 4, [200, 100, 50, 255]);

        export_png(&image, &path, &sample_metadata()).unwrap();

        let decoder = png::Decoder::new(std::fs::File::open(&path).unwrap());
        let reader = decoder.read_info().unwrap();
        let info = reader.info();
        assert_eq!(info.width, 6);
        assert_eq!(info.height, 4);

        let chunks: Vec<(&str, &str)> = info
            .uncompressed_latin1_text
            .iter()
            .map(|c| (c.keyword.as_str(), c.text.as_str()))
            .collect();
        assert!(chunks.contains(&("Software", "VidPeek")));
        assert!(chunks.contains(&("PreviewIndex", "4")));
        assert!(chunks.contains(&("DisplaySize", "853x480")));
    }
}
