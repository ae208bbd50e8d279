//! Terminal rendering of execution responses.

use std::{fs, path::Path};

use anyhow::{Context, Result};
use base64::{engine::general_purpose::STANDARD, Engine as _};
use owo_colors::OwoColorize;

use crate::execution::{CanonicalResponse, ImageOutput};

pub struct ResponsePrinter {
    pub color: bool,
}

impl ResponsePrinter {
    pub fn render(&self, response: &CanonicalResponse) -> String {
        let mut out = String::new();
        if !response.text_output.is_empty() {
            out.push_str(&response.text_output);
            if !response.text_output.ends_with('\n') {
                out.push('\n');
            }
        }
        if !response.html_output.is_empty() {
            out.push_str(&self.paint_header("[html]"));
            out.push('\n');
            out.push_str(response.html_output.trim_end());
            out.push('\n');
        }
        for (i, image) in response.images.iter().enumerate() {
            let line = format!("[image {}: {}, {} bytes]", i + 1, image.kind, decoded_len(image));
            out.push_str(&self.paint_header(&line));
            out.push('\n');
        }
        if let Some(err) = &response.error {
            if self.color {
                out.push_str(&format!("{}", err.red()));
            } else {
                out.push_str(err);
            }
            out.push('\n');
        }
        out
    }

    pub fn print(&self, response: &CanonicalResponse) {
        print!("{}", self.render(response));
    }

    fn paint_header(&self, text: &str) -> String {
        if self.color {
            format!("{}", text.cyan())
        } else {
            text.to_string()
        }
    }
}

fn decoded_len(image: &ImageOutput) -> usize {
    STANDARD.decode(&image.data).map(|b| b.len()).unwrap_or(0)
}

/// Write every image to `dir` as `image-<n>.<ext>`; returns the paths written.
pub fn save_images(images: &[ImageOutput], dir: &Path) -> Result<Vec<std::path::PathBuf>> {
    fs::create_dir_all(dir).with_context(|| format!("creating {}", dir.display()))?;
    let mut written = Vec::with_capacity(images.len());
    for (i, image) in images.iter().enumerate() {
        let ext = match image.kind.as_str() {
            "svg+xml" => "svg",
            "jpeg" => "jpg",
            other => other,
        };
        let bytes = STANDARD
            .decode(&image.data)
            .with_context(|| format!("image {} is not valid base64", i + 1))?;
        let path = dir.join(format!("image-{}.{ext}", i + 1));
        fs::write(&path, bytes).with_context(|| format!("writing {}", path.display()))?;
        written.push(path);
    }
    Ok(written)
}
