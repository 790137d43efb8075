use anyhow::{Context, Result};
use encoding_rs::{Encoding, UTF_8, WINDOWS_1252};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;
use tracing::debug;

const MMAP_THRESHOLD: u64 = 1024 * 1024; // 1 MiB

/// How far into a file we look for NUL bytes before calling it binary.
const BINARY_SNIFF_BYTES: usize = 8 * 1024;

/// Outcome of reading a candidate source file.
#[derive(Debug)]
pub enum TextRead {
    Text(String),
    /// Readable, but not something we can embed as text.
    NotText(NotTextReason),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotTextReason {
    Binary,
}

impl std::fmt::Display for NotTextReason {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NotTextReason::Binary => f.write_str("binary content"),
        }
    }
}

/// Read a file as text. Large files are memory-mapped. UTF-8 content is
/// returned unmodified (no BOM stripping, no newline conversion); anything
/// else that is not binary is read as Windows-1252.
pub fn read_text<P: AsRef<Path>>(path: P) -> Result<TextRead> {
    let path = path.as_ref();
    let metadata = std::fs::metadata(path)
        .with_context(|| format!("Failed to read metadata for {}", path.display()))?;

    if metadata.len() > MMAP_THRESHOLD {
        let file =
            File::open(path).with_context(|| format!("Failed to open file {}", path.display()))?;

        // Safety: read-only map of an existing regular file
        let mmap = unsafe { Mmap::map(&file) }
            .with_context(|| format!("Failed to memory-map {}", path.display()))?;

        Ok(decode_logged(path, &mmap))
    } else {
        let bytes =
            std::fs::read(path).with_context(|| format!("Failed to read file {}", path.display()))?;
        Ok(decode_logged(path, &bytes))
    }
}

fn decode_logged(path: &Path, bytes: &[u8]) -> TextRead {
    let (read, encoding) = detect(bytes);
    if encoding != UTF_8 {
        debug!(path = %path.display(), encoding = encoding.name(), "decoded as legacy text");
    }
    read
}

/// Classify raw bytes as text or not.
pub fn decode(bytes: &[u8]) -> TextRead {
    detect(bytes).0
}

/// NUL in the head means binary; otherwise UTF-8, falling back to
/// Windows-1252, which maps every byte.
fn detect(bytes: &[u8]) -> (TextRead, &'static Encoding) {
    let head = &bytes[..bytes.len().min(BINARY_SNIFF_BYTES)];
    if memchr::memchr(0, head).is_some() {
        return (TextRead::NotText(NotTextReason::Binary), UTF_8);
    }

    match std::str::from_utf8(bytes) {
        Ok(s) => (TextRead::Text(s.to_owned()), UTF_8),
        Err(_) => {
            let (text, _) = WINDOWS_1252.decode_without_bom_handling(bytes);
            (TextRead::Text(text.into_owned()), WINDOWS_1252)
        }
    }
}

/// Human-readable size in kilobytes with two decimals, e.g. `1.50 KB`.
pub fn format_kb(bytes: usize) -> String {
    format!("{:.2} KB", bytes as f64 / 1024.0)
}
