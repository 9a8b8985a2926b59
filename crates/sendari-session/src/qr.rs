// SPDX-FileCopyrightText: 2026 Sendari Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! QR challenge rendering.
//!
//! Challenge payloads are rendered to an SVG artifact inside the session's
//! credential folder. Successive challenges within the debounce window are
//! dropped so the displayed code stays stable long enough to scan.

use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use qrcode::render::svg;
use qrcode::QrCode;
use sendari_core::SendariError;

/// Whether a new challenge should be rendered, given the last render time.
pub fn debounce_elapsed(last: Option<Instant>, window: Duration) -> bool {
    match last {
        None => true,
        Some(at) => at.elapsed() >= window,
    }
}

/// Render a challenge payload as an SVG document.
pub fn render_svg(payload: &str) -> Result<String, SendariError> {
    let code = QrCode::new(payload.as_bytes())
        .map_err(|e| SendariError::Internal(format!("qr encode failed: {e}")))?;
    Ok(code
        .render::<svg::Color>()
        .min_dimensions(256, 256)
        .build())
}

/// Render the payload and write it as `qr.svg` under `dir`.
///
/// Returns the artifact path published to observers.
pub async fn write_artifact(dir: &Path, payload: &str) -> Result<PathBuf, SendariError> {
    let svg = render_svg(payload)?;
    let path = dir.join("qr.svg");
    tokio::fs::write(&path, svg)
        .await
        .map_err(|e| SendariError::Internal(format!("qr artifact write failed: {e}")))?;
    Ok(path)
}
