//! C3 — multimodal rewriter.
//!
//! Grounded on `services/src/completions/mod.rs`'s per-request worker fan-out shape (one
//! `tokio::spawn` per independent unit of work, joined before the handler continues) and on
//! `inference_providers/src/external/gemini/converter.rs`'s content-part Value-walking style
//! (tag dispatch over `serde_json::Value` rather than a derive-macro internally-tagged enum,
//! since inbound parts mix recognized and pass-through-unknown shapes).

use std::path::PathBuf;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use rand::Rng;
use serde_json::{json, Value};

use crate::media::{self, FetchError, MediaKind};

/// Visits every message's `content` array and replaces each `image_url` / `file_url` / `audio_url`
/// part pointing at a public HTTP(S) URL with its inlined (or gracefully-failed) form. Non-array
/// `content` (the plain-string case) and unrecognized part tags pass through untouched.
pub async fn rewrite(client: &reqwest::Client, mut body: Value) -> Value {
    let Some(messages) = body.get_mut("messages").and_then(Value::as_array_mut) else {
        return body;
    };

    for message in messages.iter_mut() {
        let needs_rewrite = matches!(message.get("content"), Some(Value::Array(_)));
        if !needs_rewrite {
            continue;
        }
        let parts = message["content"].as_array().unwrap().clone();
        let total = parts.len();
        let mut handles = Vec::with_capacity(total);
        for (index, part) in parts.into_iter().enumerate() {
            let client = client.clone();
            handles.push(tokio::spawn(async move {
                (index, process_part(&client, part, index, total).await)
            }));
        }

        let mut rewritten = vec![Value::Null; total];
        for handle in handles {
            if let Ok((index, value)) = handle.await {
                rewritten[index] = value;
            }
        }
        message["content"] = Value::Array(rewritten);
    }

    body
}

async fn process_part(client: &reqwest::Client, part: Value, index: usize, total: usize) -> Value {
    match part.get("type").and_then(Value::as_str) {
        Some("image_url") => process_image_part(client, part, index, total).await,
        Some("file_url") => process_file_part(client, part, index, total).await,
        Some("audio_url") => process_audio_part(client, part, index, total).await,
        _ => part,
    }
}

fn url_spec(part: &Value, key: &str) -> Option<(String, std::collections::HashMap<String, String>)> {
    let spec = part.get(key)?;
    let url = spec.get("url")?.as_str()?.to_string();
    let headers = spec
        .get("headers")
        .and_then(Value::as_object)
        .map(|obj| {
            obj.iter()
                .filter_map(|(k, v)| v.as_str().map(|v| (k.clone(), v.to_string())))
                .collect()
        })
        .unwrap_or_default();
    Some((url, headers))
}

fn is_public_http(url: &str) -> bool {
    url.starts_with("http://") || url.starts_with("https://")
}

async fn process_image_part(client: &reqwest::Client, part: Value, index: usize, total: usize) -> Value {
    let Some((url, headers)) = url_spec(&part, "image_url") else {
        return part;
    };
    if !is_public_http(&url) {
        return part;
    }

    match media::fetch(client, &url, &headers, MediaKind::Image).await {
        Ok(fetched) => match resolve_image_mime(fetched.content_type.as_deref(), &fetched.bytes) {
            Ok(mime) => {
                let data_url = format!("data:{mime};base64,{}", BASE64.encode(&fetched.bytes));
                json!({ "type": "image_url", "image_url": { "url": data_url } })
            }
            Err(cause) => failure_part("Image", index, total, cause),
        },
        Err(err) => failure_part("Image", index, total, classify_cause(&err.to_string(), false)),
    }
}

async fn process_file_part(client: &reqwest::Client, part: Value, index: usize, total: usize) -> Value {
    let Some((url, headers)) = url_spec(&part, "file_url") else {
        return part;
    };
    if !is_public_http(&url) {
        return part;
    }

    match media::fetch(client, &url, &headers, MediaKind::File).await {
        Ok(fetched) => match extract_file_text(&fetched.bytes).await {
            Ok(extracted) => {
                let text = format!(
                    "File content from {url} ({} characters):\n\n{extracted}",
                    extracted.chars().count()
                );
                json!({ "type": "text", "text": text })
            }
            Err(cause) => failure_part("File", index, total, cause),
        },
        Err(err) => failure_part("File", index, total, classify_cause(&err.to_string(), true)),
    }
}

async fn process_audio_part(client: &reqwest::Client, part: Value, index: usize, total: usize) -> Value {
    let Some((url, headers)) = url_spec(&part, "audio_url") else {
        return part;
    };
    if !is_public_http(&url) {
        return part;
    }

    match media::fetch(client, &url, &headers, MediaKind::Audio).await {
        Ok(fetched) => match transcode_audio(&fetched).await {
            Ok((data, format)) => {
                json!({ "type": "input_audio", "input_audio": { "data": data, "format": format } })
            }
            Err(cause) => failure_part("Audio", index, total, cause),
        },
        Err(err) => failure_part("Audio", index, total, classify_cause(&err.to_string(), false)),
    }
}

fn failure_part(kind: &str, index: usize, total: usize, cause: &str) -> Value {
    let text = format!(
        "{kind} {} of {total} could not be processed. Cause: {cause}. Please respond naturally \
         about this and continue with any other successfully processed media.",
        index + 1
    );
    json!({ "type": "text", "text": text })
}

fn classify_cause(error_text: &str, is_file: bool) -> &'static str {
    let lower = error_text.to_ascii_lowercase();
    if lower.contains("no such host") || lower.contains("dial tcp") || lower.contains("dns") {
        "network unreachable"
    } else if lower.contains("status 401") || lower.contains("status 403") {
        "auth required"
    } else if lower.contains("status 404") {
        "not found"
    } else if lower.contains("invalid content type") {
        "not a valid media format"
    } else if lower.contains("size exceeds limit") {
        "too large"
    } else if lower.contains("timeout") || lower.contains("deadline exceeded") {
        "slow server"
    } else if is_file && lower.contains("markitdown failed") {
        "unsupported format"
    } else {
        "generic technical issue"
    }
}

fn recognized_image_content_type(ct: &str) -> bool {
    ct.to_ascii_lowercase().starts_with("image/")
}

fn generic_binary_content_type(ct: &str) -> bool {
    matches!(
        ct.to_ascii_lowercase().as_str(),
        "application/octet-stream" | "binary/octet-stream" | "application/binary"
    )
}

fn sniff_image_mime(bytes: &[u8]) -> Option<&'static str> {
    if bytes.len() < 12 {
        return None;
    }
    if bytes.starts_with(b"\x89PNG\r\n\x1a\n") {
        Some("image/png")
    } else if bytes.starts_with(&[0xFF, 0xD8, 0xFF]) {
        Some("image/jpeg")
    } else if bytes.starts_with(b"GIF87a") || bytes.starts_with(b"GIF89a") {
        Some("image/gif")
    } else if &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WEBP" {
        Some("image/webp")
    } else if bytes.starts_with(b"BM") {
        Some("image/bmp")
    } else if bytes.starts_with(&[0x49, 0x49, 0x2A, 0x00]) || bytes.starts_with(&[0x4D, 0x4D, 0x00, 0x2A]) {
        Some("image/tiff")
    } else {
        None
    }
}

fn resolve_image_mime(content_type: Option<&str>, bytes: &[u8]) -> Result<String, &'static str> {
    match content_type {
        Some(ct) if recognized_image_content_type(ct) => {
            Ok(ct.split(';').next().unwrap_or(ct).trim().to_ascii_lowercase())
        }
        Some(ct) if generic_binary_content_type(ct) => {
            sniff_image_mime(bytes).map(str::to_string).ok_or("not a valid image format")
        }
        Some(_) => Err("invalid content type"),
        None => sniff_image_mime(bytes).map(str::to_string).ok_or("not a valid image format"),
    }
}

enum FileKind {
    PlainText,
    Other,
}

fn contains_subslice(haystack: &[u8], needle: &[u8]) -> bool {
    needle.len() <= haystack.len() && haystack.windows(needle.len()).any(|w| w == needle)
}

fn is_probably_plain_text(bytes: &[u8]) -> bool {
    let sample = &bytes[..bytes.len().min(512)];
    if sample.is_empty() {
        return true;
    }
    let printable = sample
        .iter()
        .filter(|b| b.is_ascii_graphic() || b.is_ascii_whitespace())
        .count();
    (printable as f64 / sample.len() as f64) >= 0.95
}

/// Detects whether `bytes` look like plain text for the fast path; every other recognized shape
/// (PDF, DOCX/XLSX/PPTX, OLE2, RTF, XML, HTML, JSON, or unknown binary) is routed to the external
/// extractor, which handles the actual format-specific parsing.
fn detect_file_kind(bytes: &[u8]) -> FileKind {
    if bytes.starts_with(b"%PDF") {
        return FileKind::Other;
    }
    if bytes.starts_with(b"PK") {
        return FileKind::Other;
    }
    if bytes.starts_with(&[0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1]) {
        return FileKind::Other;
    }
    if bytes.starts_with(b"{\\rtf") {
        return FileKind::Other;
    }
    if bytes.starts_with(b"<?xml") {
        return FileKind::Other;
    }
    let head = String::from_utf8_lossy(&bytes[..bytes.len().min(512)]).to_ascii_lowercase();
    if head.contains("<!doctype html") || contains_subslice(head.as_bytes(), b"<html") {
        return FileKind::Other;
    }
    if matches!(bytes.first(), Some(b'{') | Some(b'[')) {
        return FileKind::Other;
    }
    if is_probably_plain_text(bytes) {
        return FileKind::PlainText;
    }
    FileKind::Other
}

async fn extract_file_text(bytes: &[u8]) -> Result<String, &'static str> {
    match detect_file_kind(bytes) {
        FileKind::PlainText => Ok(String::from_utf8_lossy(bytes).into_owned()),
        FileKind::Other => run_markitdown(bytes).await,
    }
}

struct ScratchFile(PathBuf);

impl ScratchFile {
    fn new(extension: &str) -> Self {
        let suffix: u64 = rand::rng().random();
        let name = format!("router-{suffix:016x}.{extension}");
        Self(std::env::temp_dir().join(name))
    }
}

impl Drop for ScratchFile {
    fn drop(&mut self) {
        let _ = std::fs::remove_file(&self.0);
    }
}

async fn run_markitdown(bytes: &[u8]) -> Result<String, &'static str> {
    let scratch = ScratchFile::new("bin");
    if tokio::fs::write(&scratch.0, bytes).await.is_err() {
        return Err("generic technical issue");
    }

    let output = tokio::process::Command::new("markitdown")
        .arg(&scratch.0)
        .output()
        .await;

    match output {
        Ok(output) if output.status.success() => {
            Ok(String::from_utf8_lossy(&output.stdout).into_owned())
        }
        _ => Err("unsupported format"),
    }
}

fn is_mp3(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if let Some(ct) = content_type {
        if ct.to_ascii_lowercase().contains("mpeg") {
            return true;
        }
    }
    bytes.starts_with(&[0xFF, 0xFB]) || bytes.starts_with(b"ID3")
}

fn is_wav(content_type: Option<&str>, bytes: &[u8]) -> bool {
    if let Some(ct) = content_type {
        if ct.to_ascii_lowercase().contains("wav") {
            return true;
        }
    }
    bytes.len() >= 12 && &bytes[0..4] == b"RIFF" && &bytes[8..12] == b"WAVE"
}

async fn transcode_audio(fetched: &media::FetchedMedia) -> Result<(String, &'static str), &'static str> {
    let content_type = fetched.content_type.as_deref();
    if is_mp3(content_type, &fetched.bytes) {
        return Ok((BASE64.encode(&fetched.bytes), "mp3"));
    }
    if is_wav(content_type, &fetched.bytes) {
        return Ok((BASE64.encode(&fetched.bytes), "wav"));
    }

    let input = ScratchFile::new("src");
    let output = ScratchFile::new("mp3");
    if tokio::fs::write(&input.0, &fetched.bytes).await.is_err() {
        return Err("generic technical issue");
    }

    let status = tokio::process::Command::new("ffmpeg")
        .args([
            "-i",
            input.0.to_string_lossy().as_ref(),
            "-y",
            "-codec:a",
            "libmp3lame",
            "-b:a",
            "128k",
            "-ar",
            "44100",
            output.0.to_string_lossy().as_ref(),
        ])
        .output()
        .await;

    match status {
        Ok(result) if result.status.success() => {
            match tokio::fs::read(&output.0).await {
                Ok(transcoded) => Ok((BASE64.encode(&transcoded), "mp3")),
                Err(_) => Err("generic technical issue"),
            }
        }
        _ => Err("generic technical issue"),
    }
}
