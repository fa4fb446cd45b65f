//! The archive: a self-contained packaged transfer unit.
//!
//! An archive carries a set of objects (by identity) and a set of
//! manifests -- exactly what one side of a sync computed the other side
//! is missing. It is a miniature read-only store: [`ArchiveReader`]
//! serves object bytes and manifests on demand, so applying an archive
//! is just the normal import path run against it.
//!
//! # Wire layout
//!
//! ```text
//! "HIVA" | u32 version | u32 object_count
//! per object:
//!   32-byte id | varint raw_len | varint compressed_len
//!   | u32 crc32(compressed) | zstd bytes
//! u32 manifest_count | bincode manifest table
//! 32-byte BLAKE3 checksum of everything above
//! ```
//!
//! Integrity is layered: the trailer checksum covers the container, a
//! CRC covers each compressed entry, and decompressed bytes are verified
//! against their object identity before they are handed out.

pub mod reader;
pub mod writer;

pub use reader::ArchiveReader;
pub use writer::ArchiveWriter;

pub(crate) const MAGIC: &[u8; 4] = b"HIVA";
pub(crate) const VERSION: u32 = 1;

pub(crate) fn encode_varint(buf: &mut Vec<u8>, mut value: u64) {
    loop {
        let mut byte = (value & 0x7F) as u8;
        value >>= 7;
        if value > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
        if value == 0 {
            break;
        }
    }
}

pub(crate) fn decode_varint(data: &[u8]) -> Option<(u64, usize)> {
    let mut value: u64 = 0;
    let mut shift = 0;
    for (i, &byte) in data.iter().enumerate() {
        value |= ((byte & 0x7F) as u64) << shift;
        shift += 7;
        if byte & 0x80 == 0 {
            return Some((value, i + 1));
        }
        if shift >= 64 {
            return None;
        }
    }
    None
}
