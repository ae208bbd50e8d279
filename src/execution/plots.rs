//! Plot capture bridge: read the figures captured by the last unit back out
//! of the introspection unit's typed display record.

use base64::{engine::general_purpose::STANDARD, Engine as _};
use serde::Deserialize;
use tracing::{debug, warn};

use super::{
    python::{FIGURES_MIME, FIGURES_VERSION},
    ImageOutput,
};
use crate::notebook::{Cell, Output};

#[derive(Debug, Deserialize)]
struct FigureBatch {
    version: u32,
    #[serde(default)]
    images: Vec<String>,
}

/// Images carried by the figure record(s) of `cell`. Unknown versions,
/// malformed records and empty or non-base64 entries are skipped, so a cell
/// without figures yields an empty list rather than an error.
pub fn captured_images(cell: &Cell) -> Vec<ImageOutput> {
    let mut images = Vec::new();
    for output in &cell.outputs {
        let data = match output {
            Output::DisplayData { data, .. } | Output::ExecuteResult { data, .. } => data,
            _ => continue,
        };
        let Some(raw) = data.get(FIGURES_MIME) else {
            continue;
        };
        let batch = match FigureBatch::deserialize(raw) {
            Ok(batch) => batch,
            Err(e) => {
                warn!(error = %e, "ignoring malformed figure record");
                continue;
            }
        };
        if batch.version != FIGURES_VERSION {
            warn!(version = batch.version, "ignoring figure record with unknown version");
            continue;
        }
        for encoded in batch.images {
            let encoded = encoded.trim();
            if encoded.is_empty() {
                continue;
            }
            if STANDARD.decode(encoded).is_err() {
                debug!("skipping figure that is not valid base64");
                continue;
            }
            images.push(ImageOutput::png(encoded));
        }
    }
    images
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::notebook::{MimeBundle, MultilineText};
    use serde_json::json;

    fn figure_cell(record: serde_json::Value) -> Cell {
        let mut data = MimeBundle::new();
        data.insert(FIGURES_MIME.to_string(), record);
        let mut cell = Cell::code("introspect");
        cell.outputs.push(Output::DisplayData { data, metadata: Default::default() });
        cell
    }

    #[test]
    fn reads_images_from_typed_record() {
        let cell = figure_cell(json!({"version": 1, "images": ["AAAA", "BBBB"]}));
        let images = captured_images(&cell);
        assert_eq!(images, vec![ImageOutput::png("AAAA"), ImageOutput::png("BBBB")]);
    }

    #[test]
    fn skips_empty_and_invalid_entries() {
        let cell = figure_cell(json!({"version": 1, "images": ["", "  ", "not base64!", "AAAA"]}));
        assert_eq!(captured_images(&cell), vec![ImageOutput::png("AAAA")]);
    }

    #[test]
    fn no_record_means_no_images() {
        let mut cell = Cell::code("introspect");
        cell.outputs.push(Output::Stream {
            name: "stdout".into(),
            text: MultilineText::from("[]"),
        });
        assert!(captured_images(&cell).is_empty());
        assert!(captured_images(&Cell::code("empty")).is_empty());
    }

    #[test]
    fn unknown_version_and_garbage_are_ignored() {
        assert!(captured_images(&figure_cell(json!({"version": 2, "images": ["AAAA"]}))).is_empty());
        assert!(captured_images(&figure_cell(json!("['AAAA']"))).is_empty());
    }
}
