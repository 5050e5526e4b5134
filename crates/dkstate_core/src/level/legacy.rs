//! Fixed-layout binary level files.
//!
//! Every file is read whole into a buffer, checked against a minimum size
//! for the map, and decoded field by field. Record tables carry a count
//! prefix that is clamped before any record is read.

use std::io::{self, Cursor};
use std::path::Path;

use crate::columns::{COLUMNS_COUNT, Column, ColumnPool, SlabSetEntry};
use crate::error::{LoadError, Loaded};
use crate::files::FileSource;
use crate::level::LevelMap;
use crate::level::entity::{EntityKind, EntityRegistry, RegisteredEntity};
use crate::level::records::{
    InitActionPoint, InitLight, InitThing, LIGHTS_COUNT, MapBlock, SLAB_TYPES_COUNT, Wlb,
    slab_kind,
};
use crate::reader::LittleEndianReader;
use crate::record::FixedRecord;

/// Zeroed slack after the file contents in every map buffer.
pub const MAP_FILE_PADDING: usize = 16;
/// Largest map file the loaders accept.
pub const ANY_MAP_FILE_MAX_SIZE: u64 = 1_048_576;

/// A whole map file followed by [`MAP_FILE_PADDING`] zero bytes.
#[derive(Debug, Clone)]
pub struct MapBuffer {
    data: Vec<u8>,
    len: usize,
}

impl MapBuffer {
    pub fn from_bytes(mut data: Vec<u8>) -> Self {
        let len = data.len();
        data.resize(len + MAP_FILE_PADDING, 0);
        Self { data, len }
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn bytes(&self) -> &[u8] {
        &self.data[..self.len]
    }

    pub fn reader(&self) -> LittleEndianReader<Cursor<&[u8]>> {
        LittleEndianReader::new(Cursor::new(self.data.as_slice()))
    }
}

fn check_size(path: &Path, len: u64, min_len: u64, optional: bool) -> Result<(), LoadError> {
    let what = path.display().to_string();
    if len < min_len {
        if optional {
            log::debug!("optional file {what} is too small ({len} < {min_len} bytes)");
        } else {
            log::warn!("map file {what} is too small ({len} < {min_len} bytes)");
        }
        return Err(LoadError::truncated(what, min_len, len));
    }
    if len > ANY_MAP_FILE_MAX_SIZE {
        log::warn!("map file {what} exceeds max size of {ANY_MAP_FILE_MAX_SIZE}");
        return Err(LoadError::TooLarge {
            what,
            actual: len,
            limit: ANY_MAP_FILE_MAX_SIZE,
        });
    }
    Ok(())
}

/// Loads `path` into a padded buffer. Missing files, files shorter than
/// `min_len` and oversized files are rejected. For optional files a missing
/// file is only worth a debug message.
pub fn load_map_buffer<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    min_len: u64,
    optional: bool,
) -> Result<MapBuffer, LoadError> {
    let absent = || LoadError::Absent {
        path: path.to_path_buf(),
    };
    let Some(len) = files.file_length(path) else {
        if optional {
            log::debug!("optional file {} not present", path.display());
        } else {
            log::warn!("map file {} doesn't exist", path.display());
        }
        return Err(absent());
    };
    check_size(path, len, min_len, optional)?;
    let bytes = files.load_file(path).map_err(|err| {
        log::warn!("reading {} failed: {err}", path.display());
        absent()
    })?;
    check_size(path, bytes.len() as u64, min_len, optional)?;
    log::trace!("map file {} loaded, {} bytes", path.display(), bytes.len());
    Ok(MapBuffer::from_bytes(bytes))
}

/// Shape of a count-prefixed record file.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordTable {
    pub header: usize,
    pub record: usize,
    pub max: usize,
}

impl RecordTable {
    /// `slabs.clm`: the temporary column list slab sets point into.
    pub const COLUMN_SET: Self = Self {
        header: 4,
        record: Column::SIZE,
        max: COLUMNS_COUNT,
    };

    pub fn for_kind(kind: EntityKind) -> Option<Self> {
        let (header, record) = match kind {
            EntityKind::Thing => (2, InitThing::SIZE),
            EntityKind::ActionPoint => (4, InitActionPoint::SIZE),
            EntityKind::Light => (4, InitLight::SIZE),
            EntityKind::Column => (8, Column::SIZE),
            EntityKind::SlabSet => (2, SlabSetEntry::SIZE),
            EntityKind::Slab => return None,
        };
        Some(Self {
            header,
            record,
            max: kind.max_count(),
        })
    }

    pub fn min_len(&self) -> u64 {
        self.header as u64
    }

    /// Number of records to read: the declared count when it fits in the
    /// file, cut to what fits otherwise, and never above `max`.
    pub fn clamp(
        &self,
        what: &str,
        declared: i64,
        file_len: usize,
        warnings: &mut Vec<LoadError>,
    ) -> usize {
        let fits = file_len.saturating_sub(self.header) / self.record;
        let mut count = match usize::try_from(declared) {
            Ok(n) if n <= fits => n,
            _ => {
                log::warn!("bad amount of records in {what}: declared {declared}, corrected to {fits}");
                warnings.push(LoadError::clamped(what, declared, fits));
                fits
            }
        };
        if count > self.max {
            log::warn!("only {} records supported, {what} has {count}", self.max);
            warnings.push(LoadError::clamped(what, declared, self.max));
            count = self.max;
        }
        count
    }

    fn declared(&self, buf: &MapBuffer) -> io::Result<i64> {
        let mut r = buf.reader();
        Ok(match self.header {
            2 => i64::from(r.read_u16()?),
            8 => i64::from(r.read_u32()?),
            _ => i64::from(r.read_i32()?),
        })
    }

    /// Reads the clamped table of `T` records following the header.
    pub fn decode<T: FixedRecord>(
        &self,
        buf: &MapBuffer,
        what: &str,
    ) -> Result<Loaded<Vec<T>>, LoadError> {
        debug_assert_eq!(self.record, T::SIZE);
        let mut warnings = Vec::new();
        let count = self.clamp(what, self.declared(buf)?, buf.len(), &mut warnings);
        let mut r = buf.reader();
        r.seek_to(self.header as u64)?;
        let mut records = Vec::with_capacity(count);
        for _ in 0..count {
            records.push(T::decode(&mut r)?);
        }
        Ok(Loaded::with_warnings(records, warnings))
    }
}

/// Reads a count-prefixed entity file and hands every record to the
/// registry. Records the registry refuses are logged and skipped.
pub fn load_registered<A, F, E>(
    files: &F,
    path: &Path,
    registry: &mut E,
    optional: bool,
) -> Result<Loaded<usize>, LoadError>
where
    A: RegisteredEntity,
    A::Record: FixedRecord,
    F: FileSource + ?Sized,
    E: EntityRegistry + ?Sized,
{
    let Some(table) = RecordTable::for_kind(A::KIND) else {
        return Ok(Loaded::clean(0));
    };
    let buf = load_map_buffer(files, path, table.min_len(), optional)?;
    let what = path.display().to_string();
    let mut loaded = table.decode::<A::Record>(&buf, &what)?;
    if A::KIND == EntityKind::Light && loaded.value.len() >= LIGHTS_COUNT / 2 {
        log::warn!(
            "more than {}% of light slots used by static lights",
            100 * loaded.value.len() / LIGHTS_COUNT
        );
    }
    let created = register_all::<A, E>(registry, &loaded.value, &mut loaded.warnings);
    Ok(Loaded::with_warnings(created, loaded.warnings))
}

/// Registers `records` one by one, returning how many were accepted.
pub fn register_all<A, E>(
    registry: &mut E,
    records: &[A::Record],
    warnings: &mut Vec<LoadError>,
) -> usize
where
    A: RegisteredEntity,
    E: EntityRegistry + ?Sized,
{
    let mut created = 0;
    for (index, record) in records.iter().enumerate() {
        match A::register(registry, record) {
            Ok(_) => created += 1,
            Err(err) => {
                log::error!("cannot allocate {} {index}: {err}", A::KIND);
                warnings.push(err);
            }
        }
    }
    created
}

fn subtile_len(map: &LevelMap, bytes_per_block: usize) -> u64 {
    (map.dims.subtile_blocks() * bytes_per_block) as u64
}

/// `dat`: per subtile the column index, stored negated.
pub fn load_dat<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<(), LoadError> {
    let buf = load_map_buffer(files, path, subtile_len(map, 2), false)?;
    let mut r = buf.reader();
    for block in &mut map.blocks {
        let raw = r.read_u16()?;
        block.column = raw.wrapping_neg() & MapBlock::COLUMN_MASK;
        block.lightness = MapBlock::DEFAULT_LIGHTNESS;
    }
    Ok(())
}

/// `flg`: per subtile a 16-bit word whose low byte holds the flags.
pub fn load_flg<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<(), LoadError> {
    let buf = load_map_buffer(files, path, subtile_len(map, 2), true)?;
    for (block, word) in map.blocks.iter_mut().zip(buf.bytes().chunks_exact(2)) {
        block.flags = word[0];
    }
    Ok(())
}

/// `wib`: one wibble value per subtile.
pub fn load_wib<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<(), LoadError> {
    let buf = load_map_buffer(files, path, subtile_len(map, 1), false)?;
    for (block, value) in map.blocks.iter_mut().zip(buf.bytes()) {
        block.wibble = *value;
    }
    Ok(())
}

/// `own`: one owner byte per subtile, applied to the slab containing it.
/// The extra edge row and column lie outside every slab.
pub fn load_own<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<(), LoadError> {
    let buf = load_map_buffer(files, path, subtile_len(map, 1), false)?;
    let stride = map.dims.subtiles_x() + 1;
    let (sub_x, sub_y) = (map.dims.subtiles_x(), map.dims.subtiles_y());
    for (i, owner) in buf.bytes().iter().take(map.dims.subtile_blocks()).enumerate() {
        let (sx, sy) = (i % stride, i / stride);
        if sx < sub_x && sy < sub_y {
            if let Some(slab) = map.slab_for_subtile_mut(sx, sy) {
                slab.owner = *owner;
            }
        }
    }
    Ok(())
}

/// `clm`: the level's authored columns, replacing the pool.
pub fn load_clm<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    pool: &mut ColumnPool,
) -> Result<Loaded<()>, LoadError> {
    let Some(table) = RecordTable::for_kind(EntityKind::Column) else {
        return Ok(Loaded::clean(()));
    };
    let buf = load_map_buffer(files, path, table.min_len(), false)?;
    let loaded = table.decode::<Column>(&buf, &path.display().to_string())?;
    let aux_index = {
        let mut r = buf.reader();
        r.seek_to(4)?;
        r.read_u32()?
    };
    Ok(loaded.map(|columns| pool.load_authored(columns, aux_index)))
}

/// `slabs.dat`: slab-set templates with raw column references.
pub fn load_slabset_file<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
) -> Result<Loaded<Vec<SlabSetEntry>>, LoadError> {
    let Some(table) = RecordTable::for_kind(EntityKind::SlabSet) else {
        return Ok(Loaded::clean(Vec::new()));
    };
    let buf = load_map_buffer(files, path, table.min_len(), false)?;
    table.decode(&buf, &path.display().to_string())
}

/// `slabs.clm`: the temporary column list negative slab-set references
/// index into.
pub fn load_column_set_file<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
) -> Result<Loaded<Vec<Column>>, LoadError> {
    let table = RecordTable::COLUMN_SET;
    let buf = load_map_buffer(files, path, table.min_len(), false)?;
    table.decode(&buf, &path.display().to_string())
}

/// Stores a slab kind, turning kinds the game does not know into rock.
pub fn set_slab_kind(map: &mut LevelMap, x: usize, y: usize, kind: u16) -> bool {
    let kind = if kind >= SLAB_TYPES_COUNT {
        log::warn!("slab type {kind} at ({x},{y}) exceeds limit of {SLAB_TYPES_COUNT}");
        slab_kind::ROCK
    } else {
        kind
    };
    match map.slab_mut(x, y) {
        Some(slab) => {
            slab.kind = kind;
            true
        }
        None => false,
    }
}

/// `slb`: one 16-bit slab kind per tile, row by row.
pub fn load_slb<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<(), LoadError> {
    let buf = load_map_buffer(files, path, (map.dims.tiles() * 2) as u64, false)?;
    let mut r = buf.reader();
    for y in 0..map.dims.tiles_y {
        for x in 0..map.dims.tiles_x {
            let kind = r.read_u16()?;
            set_slab_kind(map, x, y, kind);
        }
    }
    Ok(())
}

fn bridge_overlay(map: &LevelMap, x: usize, y: usize) -> Wlb {
    let (mut lava, mut water) = (0, 0);
    let x_range = x.saturating_sub(1)..=(x + 1).min(map.dims.tiles_x - 1);
    for ny in y.saturating_sub(1)..=(y + 1).min(map.dims.tiles_y - 1) {
        for nx in x_range.clone() {
            match map.slab(nx, ny).map(|s| s.kind) {
                Some(slab_kind::LAVA) => lava += 1,
                Some(slab_kind::WATER) => water += 1,
                _ => {}
            }
        }
    }
    if lava > water { Wlb::Lava } else { Wlb::Water }
}

/// Rebuilds every tile's overlay from the slab kinds. A bridge spans lava
/// when more lava than water surrounds it, water otherwise.
pub fn derive_wlb(map: &mut LevelMap) {
    let mut bridges = 0;
    for y in 0..map.dims.tiles_y {
        for x in 0..map.dims.tiles_x {
            let Some(kind) = map.slab(x, y).map(|s| s.kind) else {
                continue;
            };
            let wlb = if kind == slab_kind::BRIDGE {
                bridges += 1;
                bridge_overlay(map, x, y)
            } else {
                Wlb::for_kind(kind)
            };
            if let Some(slab) = map.slab_mut(x, y) {
                slab.wlb = wlb;
            }
        }
    }
    log::debug!("regenerated wlb flags, unsure for {bridges} bridge tiles");
}

/// `wlb`: one overlay byte per tile. Water or lava flags on tiles of another
/// kind are cleared unless the tile is a bridge. Returns the number of
/// tiles fixed.
pub fn load_wlb<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<usize, LoadError> {
    let buf = load_map_buffer(files, path, map.dims.tiles() as u64, true)?;
    let mut fixes = 0;
    for (slab, byte) in map.slabs.iter_mut().zip(buf.bytes()) {
        let wlb = Wlb::from_bits(*byte);
        let consistent = match wlb {
            Wlb::None => true,
            Wlb::Water => slab.kind == slab_kind::WATER,
            Wlb::Lava => slab.kind == slab_kind::LAVA,
        };
        if consistent || slab.kind == slab_kind::BRIDGE {
            slab.wlb = wlb;
        } else {
            slab.wlb = Wlb::None;
            fixes += 1;
        }
    }
    if fixes > 0 {
        log::error!("{} is muddled; fixed values for {fixes} tiles", path.display());
    }
    Ok(fixes)
}

/// `inf`: the first byte is the level's texture set. A missing file leaves
/// texture 0.
pub fn load_inf<F: FileSource + ?Sized>(
    files: &F,
    path: &Path,
    map: &mut LevelMap,
) -> Result<(), LoadError> {
    map.texture_id = 0;
    let buf = load_map_buffer(files, path, 1, false)?;
    map.texture_id = buf.bytes()[0];
    Ok(())
}

/// `slx`: one extended-data byte per tile. Anything but an exact fit
/// leaves every tile at zero.
pub fn load_slx<F: FileSource + ?Sized>(files: &F, path: &Path, map: &mut LevelMap) {
    for slab in &mut map.slabs {
        slab.ext = 0;
    }
    let expected = map.dims.tiles();
    if files.file_length(path).is_none() {
        log::debug!("no extended slab file {}", path.display());
        return;
    }
    match files.load_file(path) {
        Ok(bytes) if bytes.len() == expected => {
            for (slab, ext) in map.slabs.iter_mut().zip(bytes) {
                slab.ext = ext;
            }
            log::debug!("extended slab file {} ok", path.display());
        }
        Ok(bytes) => log::warn!(
            "invalid extended slab data in {}: {} bytes, expected {expected}",
            path.display(),
            bytes.len()
        ),
        Err(err) => log::warn!("reading {} failed: {err}", path.display()),
    }
}
