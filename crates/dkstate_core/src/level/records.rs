use std::io::{self, Read, Seek, Write};

use serde::Serialize;

use crate::reader::{LittleEndianReader, LittleEndianWriter};
use crate::record::FixedRecord;

pub const THINGS_COUNT: usize = 2048;
pub const ACTN_POINTS_COUNT: usize = 32;
pub const LIGHTS_COUNT: usize = 400;
pub const SLAB_TYPES_COUNT: u16 = 58;
pub const NEUTRAL_PLAYER: u8 = 5;

/// Slab kinds the loaders need to know by name.
pub mod slab_kind {
    pub const ROCK: u16 = 0;
    pub const LAVA: u16 = 12;
    pub const WATER: u16 = 13;
    pub const BRIDGE: u16 = 51;
}

/// A thing placed by the level author.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InitThing {
    pub mappos: [u16; 3],
    pub oclass: u8,
    pub model: u8,
    pub owner: u8,
    pub range: u16,
    pub index: u16,
    pub params: [u8; 8],
}

impl FixedRecord for InitThing {
    const SIZE: usize = 21;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            mappos: r.read_u16_array()?,
            oclass: r.read_u8()?,
            model: r.read_u8()?,
            owner: r.read_u8()?,
            range: r.read_u16()?,
            index: r.read_u16()?,
            params: r.read_byte_array()?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        for v in self.mappos {
            w.write_u16(v)?;
        }
        w.write_u8(self.oclass)?;
        w.write_u8(self.model)?;
        w.write_u8(self.owner)?;
        w.write_u16(self.range)?;
        w.write_u16(self.index)?;
        w.write_bytes(&self.params)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InitActionPoint {
    pub x: u16,
    pub y: u16,
    pub range: u16,
    pub num: u16,
}

impl FixedRecord for InitActionPoint {
    const SIZE: usize = 8;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            x: r.read_u16()?,
            y: r.read_u16()?,
            range: r.read_u16()?,
            num: r.read_u16()?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u16(self.x)?;
        w.write_u16(self.y)?;
        w.write_u16(self.range)?;
        w.write_u16(self.num)
    }
}

/// A static light.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct InitLight {
    pub radius: u16,
    pub intensity: u8,
    pub flags: u8,
    pub params: [i16; 3],
    pub mappos: [u16; 3],
    pub light_type: u8,
    pub is_dynamic: u8,
    pub attached_slb: i16,
}

impl FixedRecord for InitLight {
    const SIZE: usize = 20;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            radius: r.read_u16()?,
            intensity: r.read_u8()?,
            flags: r.read_u8()?,
            params: r.read_i16_array()?,
            mappos: r.read_u16_array()?,
            light_type: r.read_u8()?,
            is_dynamic: r.read_u8()?,
            attached_slb: r.read_i16()?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u16(self.radius)?;
        w.write_u8(self.intensity)?;
        w.write_u8(self.flags)?;
        for v in self.params {
            w.write_i16(v)?;
        }
        for v in self.mappos {
            w.write_u16(v)?;
        }
        w.write_u8(self.light_type)?;
        w.write_u8(self.is_dynamic)?;
        w.write_i16(self.attached_slb)
    }
}

/// One tile of a structured slab document. Legacy slab files carry only
/// the kind; the position is implied by the record order.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlabPlacement {
    pub x: u16,
    pub y: u16,
    pub kind: u16,
}

/// Water, lava or bridge overlay of a tile.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Wlb {
    #[default]
    None,
    Lava,
    Water,
}

impl Wlb {
    pub fn from_bits(bits: u8) -> Self {
        match bits & 0x03 {
            1 => Self::Lava,
            2 => Self::Water,
            _ => Self::None,
        }
    }

    pub fn bits(self) -> u8 {
        match self {
            Self::None => 0,
            Self::Lava => 1,
            Self::Water => 2,
        }
    }

    /// The overlay a slab kind implies on its own.
    pub fn for_kind(kind: u16) -> Self {
        match kind {
            slab_kind::LAVA => Self::Lava,
            slab_kind::WATER => Self::Water,
            _ => Self::None,
        }
    }
}

/// Per-tile slab state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlabMapCell {
    pub kind: u16,
    pub owner: u8,
    pub wlb: Wlb,
    pub ext: u8,
}

/// Per-subtile map state.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct MapBlock {
    pub column: u16,
    pub flags: u8,
    pub wibble: u8,
    pub lightness: u16,
}

impl MapBlock {
    pub const COLUMN_MASK: u16 = 0x7FF;
    pub const DEFAULT_LIGHTNESS: u16 = 32;
}
