use std::io::{self, Cursor, Read, Seek, Write};

use serde::Serialize;

use crate::chunk::{CHUNK_HEADER_SIZE, ChunkId, read_chunk};
use crate::config::{SAVE_SLOTS_COUNT, SavePaths};
use crate::error::LoadError;
use crate::files::FileSource;
use crate::reader::{LittleEndianReader, LittleEndianWriter, truncate_to_field};
use crate::record::FixedRecord;
use crate::version::EngineVersion;

pub const SAVE_TEXTNAME_LEN: usize = 15;
pub const CAMPAIGN_NAME_LEN: usize = 64;
pub const CAMPAIGN_FNAME_LEN: usize = 64;
pub const PLAYER_NAME_LEN: usize = 64;

const CEF_IN_USE: u16 = 0x0001;

/// Summary of one save slot, stored as the `INFO` chunk at the head of a save.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CatalogueEntry {
    pub flags: u16,
    pub version: EngineVersion,
    pub level_num: i32,
    pub textname: String,
    pub campaign_name: String,
    pub campaign_fname: String,
    pub player_name: String,
}

impl Default for CatalogueEntry {
    fn default() -> Self {
        Self {
            flags: 0,
            version: EngineVersion::CURRENT,
            level_num: 0,
            textname: String::new(),
            campaign_name: String::new(),
            campaign_fname: String::new(),
            player_name: String::new(),
        }
    }
}

impl CatalogueEntry {
    pub fn in_use(&self) -> bool {
        self.flags & CEF_IN_USE != 0
    }

    pub fn set_in_use(&mut self, in_use: bool) {
        if in_use {
            self.flags |= CEF_IN_USE;
        } else {
            self.flags &= !CEF_IN_USE;
        }
    }

    /// A fresh in-use entry stamped with the running engine version.
    pub fn from_metadata(meta: &SaveMetadata) -> Self {
        Self {
            flags: CEF_IN_USE,
            version: EngineVersion::CURRENT,
            level_num: meta.level_num,
            textname: meta.textname.clone(),
            campaign_name: meta.campaign_name.clone(),
            campaign_fname: meta.campaign_fname.clone(),
            player_name: meta.player_name.clone(),
        }
        .truncated_to_fields()
    }

    /// Cuts every text field to what its on-disk width can hold.
    pub fn truncated_to_fields(mut self) -> Self {
        self.textname = truncate_to_field(&self.textname, SAVE_TEXTNAME_LEN).to_string();
        self.campaign_name = truncate_to_field(&self.campaign_name, CAMPAIGN_NAME_LEN).to_string();
        self.campaign_fname =
            truncate_to_field(&self.campaign_fname, CAMPAIGN_FNAME_LEN).to_string();
        self.player_name = truncate_to_field(&self.player_name, PLAYER_NAME_LEN).to_string();
        self
    }
}

impl FixedRecord for CatalogueEntry {
    const SIZE: usize = 2
        + EngineVersion::SIZE
        + 4
        + SAVE_TEXTNAME_LEN
        + CAMPAIGN_NAME_LEN
        + CAMPAIGN_FNAME_LEN
        + PLAYER_NAME_LEN;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        let flags = r.read_u16()?;
        let version = EngineVersion::new(r.read_u16()?, r.read_u16()?, r.read_u16()?, r.read_u16()?);
        Ok(Self {
            flags,
            version,
            level_num: r.read_i32()?,
            textname: r.read_fixed_string(SAVE_TEXTNAME_LEN)?,
            campaign_name: r.read_fixed_string(CAMPAIGN_NAME_LEN)?,
            campaign_fname: r.read_fixed_string(CAMPAIGN_FNAME_LEN)?,
            player_name: r.read_fixed_string(PLAYER_NAME_LEN)?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u16(self.flags)?;
        w.write_u16(self.version.major)?;
        w.write_u16(self.version.minor)?;
        w.write_u16(self.version.release)?;
        w.write_u16(self.version.build)?;
        w.write_i32(self.level_num)?;
        w.write_fixed_string(&self.textname, SAVE_TEXTNAME_LEN)?;
        w.write_fixed_string(&self.campaign_name, CAMPAIGN_NAME_LEN)?;
        w.write_fixed_string(&self.campaign_fname, CAMPAIGN_FNAME_LEN)?;
        w.write_fixed_string(&self.player_name, PLAYER_NAME_LEN)
    }
}

/// What the running game knows about itself when a save is requested.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SaveMetadata {
    pub textname: String,
    pub level_num: i32,
    pub campaign_name: String,
    pub campaign_fname: String,
    pub player_name: String,
}

/// Reads the leading `INFO` chunk of a save without touching the rest.
///
/// Only an `INFO` header whose length equals the entry size is accepted.
pub fn read_catalogue_entry(bytes: &[u8]) -> Option<CatalogueEntry> {
    let mut r = LittleEndianReader::new(Cursor::new(bytes));
    let header = read_chunk(&mut r).ok()??;
    if header.id != ChunkId::INFO || header.length as usize != CatalogueEntry::SIZE {
        log::debug!(
            "first chunk is {} with {} bytes, not a catalogue entry",
            header.id,
            header.length
        );
        return None;
    }
    let mut entry = CatalogueEntry::decode(&mut r).ok()?;
    entry.set_in_use(true);
    Some(entry)
}

/// The fixed table of save slots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SaveCatalogue {
    entries: Vec<CatalogueEntry>,
}

impl Default for SaveCatalogue {
    fn default() -> Self {
        Self::new()
    }
}

impl SaveCatalogue {
    pub fn new() -> Self {
        Self {
            entries: vec![CatalogueEntry::default(); SAVE_SLOTS_COUNT],
        }
    }

    pub fn entries(&self) -> &[CatalogueEntry] {
        &self.entries
    }

    pub fn entry(&self, slot: usize) -> Option<&CatalogueEntry> {
        self.entries.get(slot).filter(|e| e.in_use())
    }

    /// Re-reads every slot file's catalogue entry. Only the leading chunk
    /// header and entry are read. A slot whose file is missing or does not
    /// start with a well-formed `INFO` chunk ends up not in use. Returns the
    /// number of slots in use.
    pub fn scan_all_slots<F: FileSource>(&mut self, files: &F, paths: &SavePaths) -> usize {
        let head = CHUNK_HEADER_SIZE as usize + CatalogueEntry::SIZE;
        for (slot, entry) in self.entries.iter_mut().enumerate() {
            let path = paths.slot_file(slot);
            *entry = match files.read_range(&path, 0, head) {
                Ok(bytes) => read_catalogue_entry(&bytes).unwrap_or_else(|| {
                    log::debug!("slot {slot}: {} has no catalogue entry", path.display());
                    CatalogueEntry::default()
                }),
                Err(_) => CatalogueEntry::default(),
            };
        }
        self.count_in_use()
    }

    pub fn count_in_use(&self) -> usize {
        self.entries.iter().filter(|e| e.in_use()).count()
    }

    /// Snapshots `meta` into `slot`, stamped with the running engine version.
    pub fn fill_entry(
        &mut self,
        slot: usize,
        meta: &SaveMetadata,
    ) -> Result<&CatalogueEntry, LoadError> {
        let entry = self
            .entries
            .get_mut(slot)
            .ok_or(LoadError::InvalidSlot { slot })?;
        *entry = CatalogueEntry::from_metadata(meta);
        Ok(entry)
    }

    pub fn disable_slot(&mut self, slot: usize) {
        if let Some(entry) = self.entries.get_mut(slot) {
            entry.set_in_use(false);
        }
    }

    /// First slot not in use, if any.
    pub fn first_free_slot(&self) -> Option<usize> {
        self.entries.iter().position(|e| !e.in_use())
    }
}
