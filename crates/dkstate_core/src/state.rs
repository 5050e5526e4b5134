use std::io::{self, Read, Seek, Write};

use serde::Serialize;

use crate::layout::{ByteRange, FieldId, FieldLayout, RecordLayout};
use crate::reader::{LittleEndianReader, LittleEndianWriter};
use crate::record::{FixedRecord, fit_len};
use crate::version::EngineVersion;

pub const CAMPAIGN_FNAME_LEN: usize = 64;
pub const BONUS_LEVEL_STORAGE_COUNT: usize = 8;
pub const SIMULATION_DATA_SIZE: usize = 4096;
pub const WORLD_STATE_SIZE: usize = 88 + SIMULATION_DATA_SIZE;

pub const TRANSFER_CUSTOM_SIZE: usize = 248;
pub const TRANSFER_STATE_SIZE: usize = 8 + TRANSFER_CUSTOM_SIZE;

pub const WORLD_STATE_LAYOUT: RecordLayout = RecordLayout {
    record_len: WORLD_STATE_SIZE,
    fields: &[
        FieldLayout {
            id: FieldId::ContinueLevel,
            range: ByteRange::new(0, 4),
        },
        FieldLayout {
            id: FieldId::LoadedLevel,
            range: ByteRange::new(4, 8),
        },
        FieldLayout {
            id: FieldId::GameTurn,
            range: ByteRange::new(8, 12),
        },
        FieldLayout {
            id: FieldId::Version,
            range: ByteRange::new(12, 16),
        },
        FieldLayout {
            id: FieldId::CampaignFname,
            range: ByteRange::new(16, 16 + CAMPAIGN_FNAME_LEN),
        },
        FieldLayout {
            id: FieldId::BonusesFound,
            range: ByteRange::new(80, 80 + BONUS_LEVEL_STORAGE_COUNT),
        },
        FieldLayout {
            id: FieldId::Simulation,
            range: ByteRange::new(88, WORLD_STATE_SIZE),
        },
    ],
};

const _: () = assert!(
    WORLD_STATE_LAYOUT.misplaced_field().is_none(),
    "world state fields must tile the record"
);

/// The live world-state record, stored whole in saves and the continue file.
///
/// Only the header fields are interpreted here; `simulation` is owned by the
/// gameplay layer and round-trips untouched.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WorldState {
    pub continue_level_number: i32,
    pub loaded_level_number: i32,
    pub game_turn: u32,
    pub version_major: u16,
    pub version_minor: u16,
    pub campaign_fname: String,
    pub bonuses_found: [u8; BONUS_LEVEL_STORAGE_COUNT],
    #[serde(skip)]
    pub simulation: Vec<u8>,
}

impl Default for WorldState {
    fn default() -> Self {
        Self {
            continue_level_number: 0,
            loaded_level_number: 0,
            game_turn: 0,
            version_major: EngineVersion::CURRENT.major,
            version_minor: EngineVersion::CURRENT.minor,
            campaign_fname: String::new(),
            bonuses_found: [0; BONUS_LEVEL_STORAGE_COUNT],
            simulation: vec![0; SIMULATION_DATA_SIZE],
        }
    }
}

impl FixedRecord for WorldState {
    const SIZE: usize = WORLD_STATE_SIZE;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            continue_level_number: r.read_i32()?,
            loaded_level_number: r.read_i32()?,
            game_turn: r.read_u32()?,
            version_major: r.read_u16()?,
            version_minor: r.read_u16()?,
            campaign_fname: r.read_fixed_string(CAMPAIGN_FNAME_LEN)?,
            bonuses_found: r.read_byte_array()?,
            simulation: r.read_bytes(SIMULATION_DATA_SIZE)?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_i32(self.continue_level_number)?;
        w.write_i32(self.loaded_level_number)?;
        w.write_u32(self.game_turn)?;
        w.write_u16(self.version_major)?;
        w.write_u16(self.version_minor)?;
        w.write_fixed_string(&self.campaign_fname, CAMPAIGN_FNAME_LEN)?;
        w.write_bytes(&self.bonuses_found)?;
        w.write_bytes(&fit_len(&self.simulation, SIMULATION_DATA_SIZE))
    }
}

/// Creature carried over to the next level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct TransferredCreature {
    pub model: u8,
    pub explevel: u8,
}

/// Intra-level transfer record: what survives from one level to the next.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferState {
    pub creature: TransferredCreature,
    pub extra_levels_mask: u32,
    #[serde(skip)]
    pub custom: Vec<u8>,
}

impl Default for TransferState {
    fn default() -> Self {
        Self {
            creature: TransferredCreature::default(),
            extra_levels_mask: 0,
            custom: vec![0; TRANSFER_CUSTOM_SIZE],
        }
    }
}

impl FixedRecord for TransferState {
    const SIZE: usize = TRANSFER_STATE_SIZE;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        let model = r.read_u8()?;
        let explevel = r.read_u8()?;
        r.skip(2)?;
        Ok(Self {
            creature: TransferredCreature { model, explevel },
            extra_levels_mask: r.read_u32()?,
            custom: r.read_bytes(TRANSFER_CUSTOM_SIZE)?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u8(self.creature.model)?;
        w.write_u8(self.creature.explevel)?;
        w.write_u16(0)?;
        w.write_u32(self.extra_levels_mask)?;
        w.write_bytes(&fit_len(&self.custom, TRANSFER_CUSTOM_SIZE))
    }
}

/// Serialized script engine state. Variable length, opaque to this crate.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScriptState {
    pub data: Vec<u8>,
}

/// Header of a packet (replay) file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PacketHeader {
    pub version: EngineVersion,
    pub level_num: i32,
    pub action_seed: u32,
    pub players_exist: u8,
    pub players_comp: u8,
    pub chksum_available: bool,
}

impl FixedRecord for PacketHeader {
    const SIZE: usize = 20;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        let version = EngineVersion::new(r.read_u16()?, r.read_u16()?, r.read_u16()?, r.read_u16()?);
        let header = Self {
            version,
            level_num: r.read_i32()?,
            action_seed: r.read_u32()?,
            players_exist: r.read_u8()?,
            players_comp: r.read_u8()?,
            chksum_available: r.read_u8()? != 0,
        };
        r.skip(1)?;
        Ok(header)
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u16(self.version.major)?;
        w.write_u16(self.version.minor)?;
        w.write_u16(self.version.release)?;
        w.write_u16(self.version.build)?;
        w.write_i32(self.level_num)?;
        w.write_u32(self.action_seed)?;
        w.write_u8(self.players_exist)?;
        w.write_u8(self.players_comp)?;
        w.write_u8(u8::from(self.chksum_available))?;
        w.write_u8(0)
    }
}

/// One player input command from a replay stream.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Packet {
    pub turn: u32,
    pub checksum: u32,
    pub action: u8,
    pub control_flags: u16,
    pub par1: i32,
    pub par2: i32,
    pub pos_x: i32,
    pub pos_y: i32,
}

impl FixedRecord for Packet {
    const SIZE: usize = 27;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            turn: r.read_u32()?,
            checksum: r.read_u32()?,
            action: r.read_u8()?,
            control_flags: r.read_u16()?,
            par1: r.read_i32()?,
            par2: r.read_i32()?,
            pos_x: r.read_i32()?,
            pos_y: r.read_i32()?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u32(self.turn)?;
        w.write_u32(self.checksum)?;
        w.write_u8(self.action)?;
        w.write_u16(self.control_flags)?;
        w.write_i32(self.par1)?;
        w.write_i32(self.par2)?;
        w.write_i32(self.pos_x)?;
        w.write_i32(self.pos_y)
    }
}
