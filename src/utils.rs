//! Utility functions for payload digests and human-readable progress formatting.

use sha2::{Digest, Sha256};
use std::path::Path;
use tokio::io::AsyncReadExt;

/// Read buffer size for streaming file digests
const DIGEST_CHUNK_BYTES: usize = 64 * 1024;

/// Computes the SHA-256 digest of a file without loading it into memory.
///
/// Returns the lowercase hex digest together with the file size in bytes,
/// both of which accompany the multipart upload so the backend can verify
/// integrity.
///
/// # Errors
///
/// Returns an `io::Error` if the file cannot be opened or read.
pub async fn sha256_file(path: &Path) -> std::io::Result<(String, u64)> {
    let mut file = tokio::fs::File::open(path).await?;
    let mut hasher = Sha256::new();
    let mut buf = vec![0u8; DIGEST_CHUNK_BYTES];
    let mut total: u64 = 0;

    loop {
        let n = file.read(&mut buf).await?;
        if n == 0 {
            break;
        }
        hasher.update(&buf[..n]);
        total += n as u64;
    }

    let digest = hasher.finalize();
    let mut hex = String::with_capacity(64);
    for byte in digest {
        use std::fmt::Write;
        // Writing to a String cannot fail
        let _ = write!(hex, "{byte:02x}");
    }
    Ok((hex, total))
}

/// Formats a byte count for display, e.g. `1.5 MiB`.
///
/// # Examples
///
/// ```
/// use lectern::utils::format_bytes;
/// assert_eq!(format_bytes(512), "512 B");
/// assert_eq!(format_bytes(1536), "1.5 KiB");
/// ```
#[must_use]
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KiB", "MiB", "GiB", "TiB"];

    if bytes < 1024 {
        return format!("{bytes} B");
    }

    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    format!("{value:.1} {}", UNITS[unit])
}

/// Formats an estimated-time-remaining value in seconds, e.g. `2m 05s`.
///
/// Sub-second estimates round up to one second so the display never shows
/// a zero while the upload is still in flight.
#[must_use]
pub fn format_eta(seconds: f64) -> String {
    if !seconds.is_finite() || seconds < 0.0 {
        return "unknown".to_string();
    }
    let total = seconds.ceil().max(1.0) as u64;
    let minutes = total / 60;
    let secs = total % 60;
    if minutes == 0 {
        format!("{secs}s")
    } else {
        format!("{minutes}m {secs:02}s")
    }
}
