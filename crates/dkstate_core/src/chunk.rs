//! Chunked container codec.
//!
//! A container is a flat sequence of `{id, version, length}` headers, each
//! followed by `length` payload bytes. Readers that do not understand an id
//! skip exactly `length` bytes, so a foreign chunk can never be mistaken for
//! the start of another one.

use std::fmt;
use std::io::{self, Read, Seek, Write};

use crate::reader::{LittleEndianReader, LittleEndianWriter};

pub const CHUNK_HEADER_SIZE: u64 = 12;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChunkId(pub u32);

impl ChunkId {
    pub const INFO: ChunkId = ChunkId::from_tag(*b"INFO");
    pub const GAME: ChunkId = ChunkId::from_tag(*b"GAME");
    pub const TRANSFER: ChunkId = ChunkId::from_tag(*b"INTR");
    pub const SCRIPT: ChunkId = ChunkId::from_tag(*b"SCRP");
    pub const PACKET_HEADER: ChunkId = ChunkId::from_tag(*b"PHDR");
    /// Everything after this header is a raw packet stream; it must be last.
    pub const PACKET_DATA: ChunkId = ChunkId::from_tag(*b"PDAT");

    pub const fn from_tag(tag: [u8; 4]) -> Self {
        Self(u32::from_le_bytes(tag))
    }

    pub fn is_known(&self) -> bool {
        matches!(
            *self,
            Self::INFO
                | Self::GAME
                | Self::TRANSFER
                | Self::SCRIPT
                | Self::PACKET_HEADER
                | Self::PACKET_DATA
        )
    }
}

impl fmt::Display for ChunkId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let tag = self.0.to_le_bytes();
        if tag.iter().all(|b| b.is_ascii_graphic()) {
            write!(f, "{}", String::from_utf8_lossy(&tag))
        } else {
            write!(f, "{:#010x}", self.0)
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkHeader {
    pub id: ChunkId,
    pub version: u32,
    pub length: u32,
}

pub fn write_chunk<W: Write>(
    w: &mut LittleEndianWriter<W>,
    id: ChunkId,
    version: u32,
    payload: &[u8],
) -> io::Result<()> {
    let length = u32::try_from(payload.len()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("chunk {id} payload of {} bytes is too large", payload.len()),
        )
    })?;
    write_chunk_header(
        w,
        ChunkHeader {
            id,
            version,
            length,
        },
    )?;
    w.write_bytes(payload)
}

pub fn write_chunk_header<W: Write>(
    w: &mut LittleEndianWriter<W>,
    header: ChunkHeader,
) -> io::Result<()> {
    w.write_u32(header.id.0)?;
    w.write_u32(header.version)?;
    w.write_u32(header.length)
}

/// Read the next chunk header.
///
/// Returns `Ok(None)` at end of stream, on a short header, and on a header
/// declaring more payload than the stream still holds; in each case the read
/// loop should stop.
pub fn read_chunk<R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
) -> io::Result<Option<ChunkHeader>> {
    if r.remaining()? < CHUNK_HEADER_SIZE {
        return Ok(None);
    }
    let header = ChunkHeader {
        id: ChunkId(r.read_u32()?),
        version: r.read_u32()?,
        length: r.read_u32()?,
    };
    if u64::from(header.length) > r.remaining()? {
        log::warn!(
            "chunk {} declares {} bytes but only {} remain; stopping",
            header.id,
            header.length,
            r.remaining()?
        );
        return Ok(None);
    }
    Ok(Some(header))
}

/// Skip the payload of `header`, falling back to end of stream if seeking
/// forward fails, so the caller's loop always advances.
pub fn skip_chunk<R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
    header: &ChunkHeader,
) -> io::Result<()> {
    if r.skip(u64::from(header.length)).is_err() {
        r.seek_to_end()?;
    }
    Ok(())
}

pub fn read_payload<R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
    header: &ChunkHeader,
) -> io::Result<Vec<u8>> {
    r.read_bytes(header.length as usize)
}
