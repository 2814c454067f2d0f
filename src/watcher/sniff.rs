//! Binary detection by file signature
//!
//! Only the head of a file is inspected. Anything that matches a known
//! binary signature is binary; everything else is treated as text.

use std::io::Read;
use std::path::Path;

/// Bytes read from the start of a file for sniffing
pub const SNIFF_LEN: usize = 512;

/// A magic byte pattern at a fixed offset; `None` matches any byte
struct Signature {
    kind: &'static str,
    offset: usize,
    pattern: &'static [Option<u8>],
}

macro_rules! signatures {
    (@byte _) => { None };
    (@byte $byte:literal) => { Some($byte) };
    ($($kind:literal => [$($byte:tt),+] $(+ $offset:literal)?),+ $(,)?) => {
        &[$(Signature {
            kind: $kind,
            offset: 0 $(+ $offset)?,
            pattern: &[$(signatures!(@byte $byte)),+],
        }),+]
    };
}

static SIGNATURES: &[Signature] = signatures![
    // images
    "png" => [0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A],
    "jpeg" => [0xFF, 0xD8, 0xFF],
    "gif" => [0x47, 0x49, 0x46, 0x38, _, 0x61],
    "tiff" => [0x49, 0x49, 0x2A, 0x00],
    "tiff" => [0x4D, 0x4D, 0x00, 0x2A],
    "webp" => [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x45, 0x42, 0x50],
    "ico" => [0x00, 0x00, 0x01, 0x00],
    "heic" => [0x66, 0x74, 0x79, 0x70, 0x68, 0x65, 0x69, 0x63] + 4,
    // audio and video
    "mp3" => [0x49, 0x44, 0x33],
    "wav" => [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x57, 0x41, 0x56, 0x45],
    "avi" => [0x52, 0x49, 0x46, 0x46, _, _, _, _, 0x41, 0x56, 0x49, 0x20],
    "flac" => [0x66, 0x4C, 0x61, 0x43],
    "ogg" => [0x4F, 0x67, 0x67, 0x53],
    "mkv" => [0x1A, 0x45, 0xDF, 0xA3],
    "mp4" => [0x66, 0x74, 0x79, 0x70] + 4,
    // archives
    "zip" => [0x50, 0x4B, 0x03, 0x04],
    "zip" => [0x50, 0x4B, 0x05, 0x06],
    "gz" => [0x1F, 0x8B],
    "bz2" => [0x42, 0x5A, 0x68],
    "xz" => [0xFD, 0x37, 0x7A, 0x58, 0x5A, 0x00],
    "zstd" => [0x28, 0xB5, 0x2F, 0xFD],
    "7z" => [0x37, 0x7A, 0xBC, 0xAF, 0x27, 0x1C],
    "rar" => [0x52, 0x61, 0x72, 0x21, 0x1A, 0x07],
    "tar" => [0x75, 0x73, 0x74, 0x61, 0x72] + 257,
    // documents
    "pdf" => [0x25, 0x50, 0x44, 0x46, 0x2D],
    "ole" => [0xD0, 0xCF, 0x11, 0xE0, 0xA1, 0xB1, 0x1A, 0xE1],
    "sqlite" => [0x53, 0x51, 0x4C, 0x69, 0x74, 0x65, 0x20, 0x66, 0x6F, 0x72, 0x6D, 0x61, 0x74, 0x20, 0x33, 0x00],
    // fonts
    "woff" => [0x77, 0x4F, 0x46, 0x46],
    "woff2" => [0x77, 0x4F, 0x46, 0x32],
    "ttf" => [0x00, 0x01, 0x00, 0x00, 0x00],
    "otf" => [0x4F, 0x54, 0x54, 0x4F, 0x00],
    // executables and objects
    "elf" => [0x7F, 0x45, 0x4C, 0x46],
    "exe" => [0x4D, 0x5A],
    "macho" => [0xCF, 0xFA, 0xED, 0xFE],
    "macho" => [0xCE, 0xFA, 0xED, 0xFE],
    "macho" => [0xCA, 0xFE, 0xBA, 0xBE],
    "wasm" => [0x00, 0x61, 0x73, 0x6D],
    "class" => [0xCA, 0xFE, 0xBA, 0xBE],
    "dex" => [0x64, 0x65, 0x78, 0x0A, 0x30, 0x33, 0x35, 0x00],
];

impl Signature {
    fn matches(&self, head: &[u8]) -> bool {
        let end = self.offset + self.pattern.len();
        if head.len() < end {
            return false;
        }
        head[self.offset..end]
            .iter()
            .zip(self.pattern)
            .all(|(byte, expected)| expected.map_or(true, |e| e == *byte))
    }
}

/// Kind of the first binary signature matching `head`
pub fn detect_binary(head: &[u8]) -> Option<&'static str> {
    SIGNATURES.iter().find(|sig| sig.matches(head)).map(|sig| sig.kind)
}

/// Whether `head` starts with a known binary signature
pub fn is_binary(head: &[u8]) -> bool {
    detect_binary(head).is_some()
}

/// Read up to [`SNIFF_LEN`] bytes of `path` and classify them
pub fn sniff_file(path: &Path) -> std::io::Result<bool> {
    let mut file = std::fs::File::open(path)?;
    let mut head = Vec::with_capacity(SNIFF_LEN);
    file.by_ref().take(SNIFF_LEN as u64).read_to_end(&mut head)?;
    Ok(is_binary(&head))
}
