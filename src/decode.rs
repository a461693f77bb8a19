//! Lenient text decoding for files of unknown provenance.
//!
//! Encodings are tried in order and the first that accepts the bytes wins:
//!
//! 1. UTF-8
//! 2. Windows-1252 (fails on its five unassigned bytes)
//! 3. Latin-1, which maps every byte and so ends the chain
//!
//! Decoding therefore never fails.

/// Which step of the chain produced the text.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Encoding {
    Utf8,
    Windows1252,
    Latin1,
}

impl Encoding {
    pub fn as_str(&self) -> &'static str {
        match self {
            Encoding::Utf8 => "utf-8",
            Encoding::Windows1252 => "cp1252",
            Encoding::Latin1 => "latin-1",
        }
    }
}

/// Windows-1252 code points for bytes 0x80..=0x9F. `None` marks the bytes
/// the code page leaves unassigned.
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'),
    None,
    Some('\u{201A}'),
    Some('\u{0192}'),
    Some('\u{201E}'),
    Some('\u{2026}'),
    Some('\u{2020}'),
    Some('\u{2021}'),
    Some('\u{02C6}'),
    Some('\u{2030}'),
    Some('\u{0160}'),
    Some('\u{2039}'),
    Some('\u{0152}'),
    None,
    Some('\u{017D}'),
    None,
    None,
    Some('\u{2018}'),
    Some('\u{2019}'),
    Some('\u{201C}'),
    Some('\u{201D}'),
    Some('\u{2022}'),
    Some('\u{2013}'),
    Some('\u{2014}'),
    Some('\u{02DC}'),
    Some('\u{2122}'),
    Some('\u{0161}'),
    Some('\u{203A}'),
    Some('\u{0153}'),
    None,
    Some('\u{017E}'),
    Some('\u{0178}'),
];

/// Decodes `bytes` as Windows-1252, or `None` if an unassigned byte occurs.
pub fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            0x80..=0x9F => out.push(CP1252_HIGH[usize::from(b - 0x80)]?),
            _ => out.push(char::from(b)),
        }
    }
    Some(out)
}

/// Decodes `bytes` as ISO-8859-1: every byte maps to the code point of the
/// same value.
pub fn decode_latin1(bytes: &[u8]) -> String {
    bytes.iter().map(|&b| char::from(b)).collect()
}

/// Decodes with the fallback chain. Never fails.
pub fn decode(bytes: &[u8]) -> (String, Encoding) {
    if let Ok(text) = std::str::from_utf8(bytes) {
        return (text.to_string(), Encoding::Utf8);
    }
    if let Some(text) = decode_windows_1252(bytes) {
        return (text, Encoding::Windows1252);
    }
    (decode_latin1(bytes), Encoding::Latin1)
}
