//! Output normalizer: fold kernel output records into a `CanonicalResponse`.

use base64::{engine::general_purpose::STANDARD, Engine as _};

use super::{python::FIGURES_MIME, CanonicalResponse, ImageOutput};
use crate::{
    notebook::{text_payload, MimeBundle, Output},
    utils::{strip_ansi, strip_markup},
};

pub fn normalize(outputs: &[Output]) -> CanonicalResponse {
    let mut response = CanonicalResponse::default();
    for output in outputs {
        match output {
            Output::Stream { text, .. } => response.text_output.push_str(text.as_str()),
            Output::ExecuteResult { data, .. } | Output::DisplayData { data, .. } => {
                apply_bundle(&mut response, data);
            }
            Output::Error { ename, evalue, traceback } => {
                response.error = Some(error_message(ename, evalue, traceback));
            }
        }
    }
    response.text_output = strip_markup(&response.text_output);
    response
}

fn apply_bundle(response: &mut CanonicalResponse, data: &MimeBundle) {
    for (mime, value) in data {
        match mime.as_str() {
            "text/plain" => {
                if let Some(text) = text_payload(value) {
                    response.text_output.push_str(&text);
                    response.text_output.push('\n');
                }
            }
            "text/html" => {
                if let Some(html) = text_payload(value) {
                    response.html_output.push_str(&html);
                }
            }
            FIGURES_MIME => {}
            _ => {
                if let Some(image) = image_from(mime, value) {
                    response.images.push(image);
                }
            }
        }
    }
}

fn image_from(mime: &str, value: &serde_json::Value) -> Option<ImageOutput> {
    let kind = mime.strip_prefix("image/")?;
    let payload = text_payload(value)?;
    let data = if kind == "svg+xml" {
        // nbformat keeps SVG as raw XML
        STANDARD.encode(payload.as_bytes())
    } else {
        // base64 payloads may be wrapped across lines
        payload.split_whitespace().collect()
    };
    if data.is_empty() {
        return None;
    }
    Some(ImageOutput { kind: kind.to_string(), data })
}

fn error_message(ename: &str, evalue: &str, traceback: &[String]) -> String {
    if traceback.is_empty() {
        return format!("{ename}: {evalue}");
    }
    strip_ansi(&traceback.join("\n"))
}
