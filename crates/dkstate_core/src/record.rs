use std::io::{self, Cursor, Read, Seek, Write};

use crate::reader::{LittleEndianReader, LittleEndianWriter};

/// A record with a fixed on-disk width, decoded field by field.
pub trait FixedRecord: Sized {
    const SIZE: usize;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self>;

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()>;

    fn from_bytes(bytes: &[u8]) -> io::Result<Self> {
        if bytes.len() < Self::SIZE {
            return Err(io::Error::new(
                io::ErrorKind::UnexpectedEof,
                format!("record needs {} bytes, got {}", Self::SIZE, bytes.len()),
            ));
        }
        let mut r = LittleEndianReader::new(Cursor::new(&bytes[..Self::SIZE]));
        Self::decode(&mut r)
    }

    fn to_bytes(&self) -> Vec<u8> {
        let mut w = LittleEndianWriter::new(Vec::with_capacity(Self::SIZE));
        self.encode(&mut w)
            .expect("writing a record into a Vec cannot fail");
        let mut bytes = w.into_inner();
        bytes.resize(Self::SIZE, 0);
        bytes
    }
}

/// Pads or cuts `bytes` to exactly `len` for fixed-size opaque fields.
pub(crate) fn fit_len(bytes: &[u8], len: usize) -> Vec<u8> {
    let mut out = bytes[..bytes.len().min(len)].to_vec();
    out.resize(len, 0);
    out
}
