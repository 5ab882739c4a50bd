//! Capture file detection from leading magic bytes.

use anyhow::{Context, Result};
use std::fmt;
use std::fs::File;
use std::io::Read;
use std::path::Path;

/// How many leading bytes are inspected when classifying a file.
const SNIFF_LEN: usize = 8192;

/// Kinds of sample the uploader accepts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    Pcap,
    Zeek,
}

impl SampleKind {
    /// Value sent as the upload form's `type` field.
    pub fn upload_type(&self) -> &'static str {
        match self {
            SampleKind::Pcap => "pcap",
            SampleKind::Zeek => "zeek",
        }
    }
}

impl fmt::Display for SampleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SampleKind::Pcap => write!(f, "PCAP"),
            SampleKind::Zeek => write!(f, "Zeek"),
        }
    }
}

struct Signature {
    bytes: &'static [u8],
    description: &'static str,
}

static CAPTURE_SIGNATURES: &[Signature] = &[
    Signature {
        bytes: &[0xD4, 0xC3, 0xB2, 0xA1],
        description: "pcap capture file (little-endian)",
    },
    Signature {
        bytes: &[0xA1, 0xB2, 0xC3, 0xD4],
        description: "pcap capture file (big-endian)",
    },
    Signature {
        bytes: &[0x4D, 0x3C, 0xB2, 0xA1],
        description: "pcap capture file (nanosecond, little-endian)",
    },
    Signature {
        bytes: &[0xA1, 0xB2, 0x3C, 0x4D],
        description: "pcap capture file (nanosecond, big-endian)",
    },
    Signature {
        bytes: &[0x0A, 0x0D, 0x0D, 0x0A],
        description: "pcapng capture file",
    },
];

/// Result of sniffing a file: its kind when accepted, and a short
/// description either way.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Detection {
    pub kind: Option<SampleKind>,
    pub description: &'static str,
}

pub fn detect_bytes(data: &[u8]) -> Detection {
    if data.is_empty() {
        return Detection {
            kind: None,
            description: "empty",
        };
    }

    if let Some(sig) = CAPTURE_SIGNATURES.iter().find(|s| data.starts_with(s.bytes)) {
        return Detection {
            kind: Some(SampleKind::Pcap),
            description: sig.description,
        };
    }

    let is_text = data
        .iter()
        .all(|&b| b == b'\t' || b == b'\n' || b == b'\r' || (0x20..0x7F).contains(&b));
    if is_text {
        let first = data.iter().find(|b| !b.is_ascii_whitespace());
        let description = match first {
            Some(b'{') | Some(b'[') => "JSON data",
            _ => "ASCII text",
        };
        return Detection {
            kind: Some(SampleKind::Zeek),
            description,
        };
    }

    Detection {
        kind: None,
        description: "data",
    }
}

/// Read the head of `path` and classify it.
pub fn detect_file(path: &Path) -> Result<Detection> {
    let mut file = File::open(path).with_context(|| format!("Failed to open {}", path.display()))?;
    let mut buf = Vec::with_capacity(SNIFF_LEN);
    file.by_ref()
        .take(SNIFF_LEN as u64)
        .read_to_end(&mut buf)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    Ok(detect_bytes(&buf))
}

pub fn human_size(size: u64) -> String {
    const KB: f64 = 1024.0;
    let s = size as f64;
    if s < KB {
        format!("{} bytes", size)
    } else if s < KB * KB {
        format!("{:.2} KB", s / KB)
    } else if s < KB * KB * KB {
        format!("{:.2} MB", s / (KB * KB))
    } else {
        format!("{:.2} GB", s / (KB * KB * KB))
    }
}
