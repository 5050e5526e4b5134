//! Chunked save games and packet (replay) files.

use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Read, Seek, Write};
use std::path::{Path, PathBuf};

use crate::catalogue::{CatalogueEntry, SaveCatalogue, SaveMetadata};
use crate::chunk::{
    ChunkHeader, ChunkId, read_chunk, read_payload, skip_chunk, write_chunk, write_chunk_header,
};
use crate::config::SavePaths;
use crate::error::{LoadError, Loaded};
use crate::files::{DiskFiles, FileSource};
use crate::reader::{LittleEndianReader, LittleEndianWriter};
use crate::record::FixedRecord;
use crate::state::{
    Packet, PacketHeader, ScriptState, TransferState, WORLD_STATE_SIZE, WorldState,
};
use crate::version::EngineVersion;

/// Largest file the pre-chunk save format ever produced.
pub const PRIMITIVE_SAVE_MAX_LEN: u64 = 1_382_437;
/// A pre-chunk save was a raw world-state dump, so it holds at least one.
pub const PRIMITIVE_SAVE_MIN_LEN: u64 = WORLD_STATE_SIZE as u64;

const CHUNK_VERSION: u32 = 0;

const SGC_INFO: u32 = 0x01;
const SGC_GAME: u32 = 0x02;
const SGC_TRANSFER: u32 = 0x04;
const SGC_SCRIPT: u32 = 0x08;
const SGC_PACKET_HEADER: u32 = 0x10;
const SGC_PACKET_DATA: u32 = 0x20;

const SGC_FULL_GAME: u32 = SGC_INFO | SGC_GAME | SGC_TRANSFER | SGC_SCRIPT;
const SGC_PACKET_START: u32 = SGC_PACKET_HEADER | SGC_PACKET_DATA;
const SGC_PACKET_CONTINUE: u32 = SGC_FULL_GAME | SGC_PACKET_START;

pub fn is_primitive_save_version(file_len: u64) -> bool {
    (PRIMITIVE_SAVE_MIN_LEN..=PRIMITIVE_SAVE_MAX_LEN).contains(&file_len)
}

/// The three records that make up a resumable game.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GameSnapshot {
    pub world: WorldState,
    pub transfer: TransferState,
    pub script: ScriptState,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavedGame {
    pub entry: CatalogueEntry,
    pub snapshot: GameSnapshot,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PacketReplay {
    pub entry: Option<CatalogueEntry>,
    pub header: PacketHeader,
    pub packets: Vec<Packet>,
}

#[derive(Debug)]
pub enum LoadResult {
    FullGame(SavedGame),
    PacketReplayStart(PacketReplay),
    PacketReplayContinue(SavedGame, PacketReplay),
    Failed(LoadError),
}

impl LoadResult {
    pub fn is_success(&self) -> bool {
        !matches!(self, Self::Failed(_))
    }

    pub fn kind(&self) -> &'static str {
        match self {
            Self::FullGame(_) => "full-game",
            Self::PacketReplayStart(_) => "packet-replay-start",
            Self::PacketReplayContinue(..) => "packet-replay-continue",
            Self::Failed(_) => "failed",
        }
    }
}

#[derive(Default)]
struct ChunkSet {
    mask: u32,
    entry: Option<CatalogueEntry>,
    world: Option<WorldState>,
    transfer: Option<TransferState>,
    script: Option<ScriptState>,
    header: Option<PacketHeader>,
    packets: Vec<Packet>,
}

impl ChunkSet {
    fn saved_game(&mut self) -> Option<SavedGame> {
        Some(SavedGame {
            entry: self.entry.take()?,
            snapshot: GameSnapshot {
                world: self.world.take()?,
                transfer: self.transfer.take()?,
                script: self.script.take()?,
            },
        })
    }

    fn replay(&mut self) -> Option<PacketReplay> {
        Some(PacketReplay {
            entry: self.entry.clone(),
            header: self.header.take()?,
            packets: std::mem::take(&mut self.packets),
        })
    }

    fn into_result(mut self) -> LoadResult {
        let mask = self.mask;
        let has = |required: u32| mask & required == required;
        if has(SGC_PACKET_CONTINUE) {
            let replay = self.replay();
            if let (Some(game), Some(replay)) = (self.saved_game(), replay) {
                return LoadResult::PacketReplayContinue(game, replay);
            }
        } else if has(SGC_PACKET_START) {
            if let Some(replay) = self.replay() {
                return LoadResult::PacketReplayStart(replay);
            }
        } else if has(SGC_FULL_GAME) {
            if let Some(game) = self.saved_game() {
                return LoadResult::FullGame(game);
            }
        }
        LoadResult::Failed(LoadError::IncompleteSave { found: self.mask })
    }
}

fn check_version(version: EngineVersion, warnings: &mut Vec<LoadError>) {
    if !version.matches_running() {
        log::warn!(
            "saved with engine {version}, running {}; loading anyway",
            EngineVersion::CURRENT
        );
        warnings.push(LoadError::VersionMismatch {
            stored: version,
            running: EngineVersion::CURRENT,
        });
    }
}

fn fixed_chunk<T: FixedRecord, R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
    header: &ChunkHeader,
    warnings: &mut Vec<LoadError>,
) -> io::Result<Option<T>> {
    if header.length as usize != T::SIZE {
        log::warn!(
            "chunk {} has {} bytes, expected {}; skipping",
            header.id,
            header.length,
            T::SIZE
        );
        warnings.push(LoadError::ChunkSizeMismatch {
            id: header.id.0,
            expected: T::SIZE as u32,
            actual: header.length,
        });
        skip_chunk(r, header)?;
        return Ok(None);
    }
    T::decode(r).map(Some)
}

fn read_packet_stream<R: Read + Seek>(
    r: &mut LittleEndianReader<R>,
    warnings: &mut Vec<LoadError>,
) -> io::Result<Vec<Packet>> {
    let remaining = r.remaining()?;
    let count = remaining as usize / Packet::SIZE;
    let mut packets = Vec::with_capacity(count);
    for _ in 0..count {
        packets.push(Packet::decode(r)?);
    }
    let leftover = remaining as usize % Packet::SIZE;
    if leftover != 0 {
        log::warn!("packet stream ends with {leftover} stray bytes");
        warnings.push(LoadError::truncated(
            "packet stream",
            (count as u64 + 1) * Packet::SIZE as u64,
            remaining,
        ));
    }
    Ok(packets)
}

/// Parses a whole save or packet file.
pub fn decode_container(bytes: &[u8]) -> Loaded<LoadResult> {
    let mut warnings = Vec::new();
    let result = match decode_chunks(bytes, &mut warnings) {
        Ok(chunks) => chunks.into_result(),
        Err(err) => LoadResult::Failed(err),
    };
    Loaded::with_warnings(result, warnings)
}

fn decode_chunks(bytes: &[u8], warnings: &mut Vec<LoadError>) -> Result<ChunkSet, LoadError> {
    let file_len = bytes.len() as u64;
    let mut r = LittleEndianReader::new(Cursor::new(bytes));
    let mut chunks = ChunkSet::default();
    let mut first = true;

    while let Some(header) = read_chunk(&mut r)? {
        if first && !header.id.is_known() && is_primitive_save_version(file_len) {
            return Err(LoadError::PrimitiveSave { len: file_len });
        }
        first = false;

        match header.id {
            ChunkId::INFO => {
                if let Some(entry) = fixed_chunk::<CatalogueEntry, _>(&mut r, &header, warnings)? {
                    check_version(entry.version, warnings);
                    chunks.entry = Some(entry);
                    chunks.mask |= SGC_INFO;
                }
            }
            ChunkId::GAME => {
                if let Some(world) = fixed_chunk::<WorldState, _>(&mut r, &header, warnings)? {
                    chunks.world = Some(world);
                    chunks.mask |= SGC_GAME;
                }
            }
            ChunkId::TRANSFER => {
                if let Some(transfer) = fixed_chunk::<TransferState, _>(&mut r, &header, warnings)?
                {
                    chunks.transfer = Some(transfer);
                    chunks.mask |= SGC_TRANSFER;
                }
            }
            ChunkId::SCRIPT => {
                chunks.script = Some(ScriptState {
                    data: read_payload(&mut r, &header)?,
                });
                chunks.mask |= SGC_SCRIPT;
            }
            ChunkId::PACKET_HEADER => {
                if let Some(ph) = fixed_chunk::<PacketHeader, _>(&mut r, &header, warnings)? {
                    check_version(ph.version, warnings);
                    chunks.header = Some(ph);
                    chunks.mask |= SGC_PACKET_HEADER;
                }
            }
            ChunkId::PACKET_DATA => {
                chunks.packets = read_packet_stream(&mut r, warnings)?;
                chunks.mask |= SGC_PACKET_DATA;
                break;
            }
            other => {
                log::debug!("skipping unknown chunk {other} of {} bytes", header.length);
                warnings.push(LoadError::UnknownChunk {
                    id: other.0,
                    length: header.length,
                });
                skip_chunk(&mut r, &header)?;
            }
        }
    }

    if first && is_primitive_save_version(file_len) {
        return Err(LoadError::PrimitiveSave { len: file_len });
    }
    Ok(chunks)
}

fn write_game_chunks<W: Write>(
    w: &mut LittleEndianWriter<W>,
    snapshot: &GameSnapshot,
) -> io::Result<()> {
    write_chunk(w, ChunkId::GAME, CHUNK_VERSION, &snapshot.world.to_bytes())?;
    write_chunk(w, ChunkId::TRANSFER, CHUNK_VERSION, &snapshot.transfer.to_bytes())?;
    write_chunk(w, ChunkId::SCRIPT, CHUNK_VERSION, &snapshot.script.data)
}

fn create_file(path: &Path) -> io::Result<LittleEndianWriter<BufWriter<File>>> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            fs::create_dir_all(parent)?;
        }
    }
    Ok(LittleEndianWriter::new(BufWriter::new(File::create(path)?)))
}

/// Writes a full save: `INFO`, `GAME`, `INTR`, `SCRP` in that order.
///
/// On error the partially written file stays on disk.
pub fn write_save(path: &Path, entry: &CatalogueEntry, snapshot: &GameSnapshot) -> io::Result<()> {
    let mut w = create_file(path)?;
    write_chunk(&mut w, ChunkId::INFO, CHUNK_VERSION, &entry.to_bytes())?;
    write_game_chunks(&mut w, snapshot)?;
    w.into_inner().flush()
}

/// Writes a packet file. With a snapshot the replay continues a saved game,
/// without one it starts a level from scratch.
///
/// `PDAT` is written with length 0: everything after it is the packet stream.
pub fn write_packet_stream(
    path: &Path,
    entry: &CatalogueEntry,
    header: &PacketHeader,
    snapshot: Option<&GameSnapshot>,
    packets: &[Packet],
) -> io::Result<()> {
    let mut w = create_file(path)?;
    write_chunk(&mut w, ChunkId::INFO, CHUNK_VERSION, &entry.to_bytes())?;
    if let Some(snapshot) = snapshot {
        write_game_chunks(&mut w, snapshot)?;
    }
    write_chunk(&mut w, ChunkId::PACKET_HEADER, CHUNK_VERSION, &header.to_bytes())?;
    write_chunk_header(
        &mut w,
        ChunkHeader {
            id: ChunkId::PACKET_DATA,
            version: CHUNK_VERSION,
            length: 0,
        },
    )?;
    for packet in packets {
        packet.encode(&mut w)?;
    }
    w.into_inner().flush()
}

/// Save slots and their catalogue.
pub struct SaveGames<F: FileSource = DiskFiles> {
    paths: SavePaths,
    files: F,
    catalogue: SaveCatalogue,
}

impl SaveGames<DiskFiles> {
    pub fn on_disk(paths: SavePaths) -> Self {
        Self::new(paths, DiskFiles)
    }
}

impl<F: FileSource> SaveGames<F> {
    pub fn new(paths: SavePaths, files: F) -> Self {
        Self {
            paths,
            files,
            catalogue: SaveCatalogue::new(),
        }
    }

    pub fn paths(&self) -> &SavePaths {
        &self.paths
    }

    pub fn catalogue(&self) -> &SaveCatalogue {
        &self.catalogue
    }

    pub fn scan_catalogue(&mut self) -> usize {
        self.catalogue.scan_all_slots(&self.files, &self.paths)
    }

    /// Snapshots `meta` into the catalogue and writes the slot file.
    ///
    /// A failed write disables the slot: its file may be corrupt.
    pub fn save(
        &mut self,
        slot: usize,
        meta: &SaveMetadata,
        snapshot: &GameSnapshot,
    ) -> Result<PathBuf, LoadError> {
        let entry = self.catalogue.fill_entry(slot, meta)?.clone();
        let path = self.paths.slot_file(slot);
        if let Err(err) = write_save(&path, &entry, snapshot) {
            log::error!("failed writing {}: {err}", path.display());
            self.catalogue.disable_slot(slot);
            return Err(err.into());
        }
        log::debug!("saved level {} to {}", entry.level_num, path.display());
        Ok(path)
    }

    /// Loads a save slot. Any failure also disables the slot.
    pub fn load(&mut self, slot: usize) -> Loaded<LoadResult> {
        if slot >= self.catalogue.entries().len() {
            return Loaded::clean(LoadResult::Failed(LoadError::InvalidSlot { slot }));
        }
        let path = self.paths.slot_file(slot);
        let loaded = self.load_path(&path);
        if let LoadResult::Failed(err) = &loaded.value {
            log::warn!("slot {slot}: {err}; disabling");
            self.catalogue.disable_slot(slot);
        }
        loaded
    }

    pub fn write_packet_file(
        &self,
        num: usize,
        meta: &SaveMetadata,
        header: &PacketHeader,
        snapshot: Option<&GameSnapshot>,
        packets: &[Packet],
    ) -> Result<PathBuf, LoadError> {
        let entry = CatalogueEntry::from_metadata(meta);
        let path = self.paths.packet_file(num);
        write_packet_stream(&path, &entry, header, snapshot, packets)?;
        Ok(path)
    }

    pub fn load_packet_file(&self, num: usize) -> Loaded<LoadResult> {
        self.load_path(&self.paths.packet_file(num))
    }

    fn load_path(&self, path: &Path) -> Loaded<LoadResult> {
        match self.files.load_file(path) {
            Ok(bytes) => decode_container(&bytes),
            Err(err) => {
                log::debug!("cannot read {}: {err}", path.display());
                Loaded::clean(LoadResult::Failed(LoadError::Absent {
                    path: path.to_path_buf(),
                }))
            }
        }
    }
}
