//! File uploads into the static-site download area.

use {
    base64::Engine,
    base64::engine::general_purpose::STANDARD as B64,
    serde::Deserialize,
    serde_json::{Value, json},
};

use comcore_protocol::MAX_UPLOAD_BYTES;

use crate::{RequestError, Result, dispatch::params, handlers::Ctx};

#[derive(Deserialize)]
struct UploadFileParams {
    name: String,
    /// Base64-encoded file body.
    contents: String,
}

pub async fn upload_file(ctx: &Ctx<'_>, data: Value) -> Result<Value> {
    let p: UploadFileParams = params(data)?;
    let bytes = B64
        .decode(p.contents.as_bytes())
        .map_err(|_| RequestError::invalid("contents must be base64"))?;
    if bytes.len() > MAX_UPLOAD_BYTES {
        return Err(RequestError::invalid("file exceeds the 10 MB limit"));
    }

    let name = sanitize_name(&p.name);
    tokio::fs::create_dir_all(&ctx.state.upload_dir)
        .await
        .map_err(RequestError::internal)?;
    let name = unique_name(&ctx.state.upload_dir, &name).await;
    tokio::fs::write(ctx.state.upload_dir.join(&name), &bytes)
        .await
        .map_err(RequestError::internal)?;
    Ok(json!({ "link": format!("uploads/{name}") }))
}

/// Reduce a client-supplied name to a safe flat filename: path separators
/// and control characters dropped, no leading dots.
fn sanitize_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '\0'..='\x1f'))
        .collect();
    let cleaned = cleaned.trim_start_matches('.').trim();
    if cleaned.is_empty() {
        "file".to_string()
    } else {
        cleaned.to_string()
    }
}

/// Avoid clobbering existing uploads by suffixing a counter before the
/// extension.
async fn unique_name(dir: &std::path::Path, name: &str) -> String {
    if !dir.join(name).exists() {
        return name.to_string();
    }
    let (stem, ext) = match name.rsplit_once('.') {
        Some((stem, ext)) if !stem.is_empty() => (stem.to_string(), format!(".{ext}")),
        _ => (name.to_string(), String::new()),
    };
    for n in 1.. {
        let candidate = format!("{stem}-{n}{ext}");
        if !dir.join(&candidate).exists() {
            return candidate;
        }
    }
    unreachable!()
}
