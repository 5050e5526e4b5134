//! Level loading.
//!
//! A level is a family of files sharing a number. For things, action
//! points, lights, columns and slabs a structured document is used when
//! present and the legacy binary file otherwise, independently per kind.

pub mod entity;
pub mod legacy;
pub mod records;
pub mod structured;

use std::collections::BTreeMap;
use std::io;
use std::path::Path;

use serde::Serialize;

use crate::columns::{Column, ColumnPool, SlabSet, SlabSetEntry, resolve_slabset_references};
use crate::config::{LevelPaths, MapDimensions};
use crate::error::{LoadError, Loaded};
use crate::files::{DiskFiles, FileSource};
use crate::record::FixedRecord;
use entity::{
    ActionPointAdapter, ColumnAdapter, EntityAdapter, EntityRegistry, LightAdapter,
    RegisteredEntity, SlabAdapter, SlabSetAdapter, ThingAdapter,
};
use records::{MapBlock, NEUTRAL_PLAYER, SlabMapCell};
use structured::load_sections;

pub const SLABSET_DOCUMENT: &str = "slabset.toml";
pub const COLUMNSET_DOCUMENT: &str = "columnset.toml";
pub const SLABSET_FILE: &str = "slabs.dat";
pub const COLUMNSET_FILE: &str = "slabs.clm";

/// Subtile blocks and tile slabs of the loaded level.
#[derive(Debug, Clone)]
pub struct LevelMap {
    pub dims: MapDimensions,
    pub blocks: Vec<MapBlock>,
    pub slabs: Vec<SlabMapCell>,
    pub texture_id: u8,
}

impl LevelMap {
    pub fn new(dims: MapDimensions) -> Self {
        Self {
            dims,
            blocks: Vec::new(),
            slabs: Vec::new(),
            texture_id: 0,
        }
    }

    /// Empties the map in place: every block shows column 0 at default
    /// lightness, every slab is neutral rock.
    pub fn reset(&mut self) {
        self.blocks.clear();
        self.blocks.resize(
            self.dims.subtile_blocks(),
            MapBlock {
                lightness: MapBlock::DEFAULT_LIGHTNESS,
                ..MapBlock::default()
            },
        );
        self.slabs.clear();
        self.slabs.resize(
            self.dims.tiles(),
            SlabMapCell {
                owner: NEUTRAL_PLAYER,
                ..SlabMapCell::default()
            },
        );
        self.texture_id = 0;
    }

    fn slab_index(&self, x: usize, y: usize) -> Option<usize> {
        (x < self.dims.tiles_x && y < self.dims.tiles_y).then(|| y * self.dims.tiles_x + x)
    }

    pub fn slab(&self, x: usize, y: usize) -> Option<&SlabMapCell> {
        self.slab_index(x, y).and_then(|i| self.slabs.get(i))
    }

    pub fn slab_mut(&mut self, x: usize, y: usize) -> Option<&mut SlabMapCell> {
        self.slab_index(x, y).and_then(|i| self.slabs.get_mut(i))
    }

    pub fn slab_for_subtile_mut(&mut self, sx: usize, sy: usize) -> Option<&mut SlabMapCell> {
        self.slab_mut(sx / MapDimensions::STL_PER_SLB, sy / MapDimensions::STL_PER_SLB)
    }

    pub fn block(&self, sx: usize, sy: usize) -> Option<&MapBlock> {
        if sx > self.dims.subtiles_x() || sy > self.dims.subtiles_y() {
            return None;
        }
        self.blocks.get(sy * (self.dims.subtiles_x() + 1) + sx)
    }
}

/// Where a part of the level came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Source {
    Structured,
    Legacy,
    Derived,
    Missing,
}

/// Summary of one level load.
#[derive(Debug, Clone, Default, Serialize)]
pub struct LevelReport {
    pub level: u32,
    pub sources: BTreeMap<&'static str, Source>,
    pub things: usize,
    pub action_points: usize,
    pub lights: usize,
    pub columns: usize,
    pub slabsets: usize,
    pub texture_id: u8,
    pub wlb_fixes: usize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Need {
    /// A failure fails the level.
    Required,
    /// A failure is logged; loading carries on.
    Expected,
    /// Absence is normal.
    Optional,
}

fn settle(what: &str, result: Result<(), LoadError>, need: Need, failure: &mut Option<LoadError>) {
    let Err(err) = result else {
        return;
    };
    match need {
        Need::Required => {
            log::error!("loading {what} failed: {err}");
            failure.get_or_insert(err);
        }
        Need::Expected => log::warn!("loading {what} failed: {err}"),
        Need::Optional => log::debug!("skipping {what}: {err}"),
    }
}

fn read_document<F: FileSource + ?Sized>(files: &F, path: &Path) -> Result<Option<String>, LoadError> {
    let Some(len) = files.file_length(path) else {
        return Ok(None);
    };
    if len > legacy::ANY_MAP_FILE_MAX_SIZE {
        return Err(LoadError::TooLarge {
            what: path.display().to_string(),
            actual: len,
            limit: legacy::ANY_MAP_FILE_MAX_SIZE,
        });
    }
    let bytes = files.load_file(path)?;
    let text = String::from_utf8(bytes).map_err(|err| {
        io::Error::new(
            io::ErrorKind::InvalidData,
            format!("{} is not UTF-8: {err}", path.display()),
        )
    })?;
    Ok(Some(text))
}

/// Owns everything a level load fills: the map, the column pool and the
/// resolved slab sets. Each load clears and refills them in place.
pub struct LevelLoadContext<F: FileSource = DiskFiles> {
    paths: LevelPaths,
    files: F,
    map: LevelMap,
    pool: ColumnPool,
    slabsets: Vec<SlabSet>,
}

impl LevelLoadContext<DiskFiles> {
    pub fn on_disk(paths: LevelPaths, dims: MapDimensions) -> Self {
        Self::new(paths, dims, DiskFiles)
    }
}

impl<F: FileSource> LevelLoadContext<F> {
    pub fn new(paths: LevelPaths, dims: MapDimensions, files: F) -> Self {
        Self {
            paths,
            files,
            map: LevelMap::new(dims),
            pool: ColumnPool::new(),
            slabsets: Vec::new(),
        }
    }

    pub fn paths(&self) -> &LevelPaths {
        &self.paths
    }

    pub fn files_mut(&mut self) -> &mut F {
        &mut self.files
    }

    pub fn map(&self) -> &LevelMap {
        &self.map
    }

    pub fn pool(&self) -> &ColumnPool {
        &self.pool
    }

    pub fn slabsets(&self) -> &[SlabSet] {
        &self.slabsets
    }

    fn structured<A: EntityAdapter>(
        &self,
        path: &Path,
    ) -> Result<Option<Loaded<Vec<A::Record>>>, LoadError> {
        match read_document(&self.files, path)? {
            Some(text) => {
                log::debug!("loading {} from {}", A::KIND, path.display());
                Ok(Some(load_sections::<A>(&text, path, A::KIND.max_count())?))
            }
            None => Ok(None),
        }
    }

    fn load_entities<A, E>(
        &self,
        level: u32,
        registry: &mut E,
        need: Need,
    ) -> Result<Loaded<(usize, Source)>, LoadError>
    where
        A: RegisteredEntity,
        A::Record: FixedRecord,
        E: EntityRegistry + ?Sized,
    {
        if let Some(ext) = A::KIND.structured_ext() {
            let path = self.paths.map_file(level, ext);
            if let Some(mut loaded) = self.structured::<A>(&path)? {
                let created =
                    legacy::register_all::<A, E>(registry, &loaded.value, &mut loaded.warnings);
                return Ok(Loaded::with_warnings(
                    (created, Source::Structured),
                    loaded.warnings,
                ));
            }
        }
        let Some(ext) = A::KIND.legacy_ext() else {
            return Ok(Loaded::clean((0, Source::Missing)));
        };
        let path = self.paths.map_file(level, ext);
        let loaded =
            legacy::load_registered::<A, F, E>(&self.files, &path, registry, need == Need::Optional)?;
        Ok(loaded.map(|created| (created, Source::Legacy)))
    }

    fn load_columns(&mut self, level: u32) -> Result<Loaded<Source>, LoadError> {
        let path = self.paths.map_file(level, "clmfx");
        if let Some(loaded) = self.structured::<ColumnAdapter>(&path)? {
            return Ok(loaded.map(|columns| {
                self.pool.load_authored(columns, 0);
                Source::Structured
            }));
        }
        let path = self.paths.map_file(level, "clm");
        let loaded = legacy::load_clm(&self.files, &path, &mut self.pool)?;
        Ok(loaded.map(|()| Source::Legacy))
    }

    /// Blocks must point into the pool; strays fall back to the default
    /// column.
    fn check_block_columns(&mut self) {
        let len = self.pool.len();
        let mut strays = 0;
        for block in &mut self.map.blocks {
            if usize::from(block.column) >= len {
                block.column = ColumnPool::DEFAULT_COLUMN;
                strays += 1;
            }
        }
        if strays > 0 {
            log::error!("{strays} map blocks refer to columns beyond the {len} loaded");
        }
    }

    fn load_slabsets(&mut self) -> Result<Loaded<Source>, LoadError> {
        let mut warnings = Vec::new();
        let mut source = Source::Legacy;

        let doc = self.paths.data_file(SLABSET_DOCUMENT);
        let entries: Vec<SlabSetEntry> = match self.structured::<SlabSetAdapter>(&doc)? {
            Some(loaded) => {
                source = Source::Structured;
                loaded.drain_into(&mut warnings)
            }
            None => legacy::load_slabset_file(&self.files, &self.paths.data_file(SLABSET_FILE))?
                .drain_into(&mut warnings),
        };

        let doc = self.paths.data_file(COLUMNSET_DOCUMENT);
        let column_set: Vec<Column> = match self.structured::<ColumnAdapter>(&doc)? {
            Some(loaded) => loaded.drain_into(&mut warnings),
            None => {
                legacy::load_column_set_file(&self.files, &self.paths.data_file(COLUMNSET_FILE))?
                    .drain_into(&mut warnings)
            }
        };

        self.slabsets = resolve_slabset_references(&entries, &column_set, &mut self.pool)
            .drain_into(&mut warnings);
        Ok(Loaded::with_warnings(source, warnings))
    }

    fn load_slabs(&mut self, level: u32) -> Result<Loaded<Source>, LoadError> {
        let path = self.paths.map_file(level, "slbfx");
        if let Some(loaded) = self.structured::<SlabAdapter>(&path)? {
            let mut warnings = Vec::new();
            for placement in loaded.drain_into(&mut warnings) {
                let (x, y) = (usize::from(placement.x), usize::from(placement.y));
                if !legacy::set_slab_kind(&mut self.map, x, y, placement.kind) {
                    log::warn!("{}: slab at ({x},{y}) is outside the map", path.display());
                    warnings.push(LoadError::InvalidSection {
                        kind: "slab",
                        section: format!("({x},{y})"),
                        reason: "outside the map".to_string(),
                    });
                }
            }
            return Ok(Loaded::with_warnings(Source::Structured, warnings));
        }
        let path = self.paths.map_file(level, "slb");
        legacy::load_slb(&self.files, &path, &mut self.map)?;
        Ok(Loaded::clean(Source::Legacy))
    }

    /// Loads level `level`, registering its things, action points and
    /// lights with `registry`.
    ///
    /// Every part is attempted. Missing ownership, slab or thing data fails
    /// the load with the first such error; other problems are logged and
    /// reported as warnings. The extended slab data is only read when the
    /// load is otherwise complete.
    pub fn load_level<E: EntityRegistry + ?Sized>(
        &mut self,
        level: u32,
        registry: &mut E,
    ) -> Result<Loaded<LevelReport>, LoadError> {
        registry.clear();
        self.map.reset();
        self.pool.clear();
        self.slabsets.clear();

        let slb = self.paths.map_file(level, "slb");
        if !self.files.exists(&slb) && !self.files.exists(&self.paths.map_file(level, "slbfx")) {
            log::error!("level map{level:05} doesn't exist");
            return Err(LoadError::Absent { path: slb });
        }

        let mut report = LevelReport {
            level,
            ..LevelReport::default()
        };
        let mut warnings = Vec::new();
        let mut failure = None;

        let path = self.paths.map_file(level, "dat");
        let result = legacy::load_dat(&self.files, &path, &mut self.map);
        settle("map data", result, Need::Expected, &mut failure);
        let path = self.paths.map_file(level, "flg");
        let result = legacy::load_flg(&self.files, &path, &mut self.map);
        settle("subtile flags", result, Need::Optional, &mut failure);

        let result = self.load_columns(level).map(|loaded| {
            report.sources.insert("column", loaded.drain_into(&mut warnings));
        });
        settle("columns", result, Need::Expected, &mut failure);
        self.check_block_columns();

        let result = self.load_slabsets().map(|loaded| {
            report.sources.insert("slabset", loaded.drain_into(&mut warnings));
        });
        settle("slab sets", result, Need::Expected, &mut failure);

        let result = self
            .load_entities::<LightAdapter, E>(level, registry, Need::Optional)
            .map(|loaded| {
                let (count, source) = loaded.drain_into(&mut warnings);
                report.lights = count;
                report.sources.insert("light", source);
            });
        settle("static lights", result, Need::Optional, &mut failure);

        let path = self.paths.map_file(level, "own");
        let result = legacy::load_own(&self.files, &path, &mut self.map);
        settle("ownership", result, Need::Required, &mut failure);
        let path = self.paths.map_file(level, "wib");
        let result = legacy::load_wib(&self.files, &path, &mut self.map);
        settle("wibble", result, Need::Expected, &mut failure);
        let path = self.paths.map_file(level, "inf");
        let result = legacy::load_inf(&self.files, &path, &mut self.map);
        settle("map info", result, Need::Expected, &mut failure);
        report.texture_id = self.map.texture_id;

        let result = self
            .load_entities::<ActionPointAdapter, E>(level, registry, Need::Expected)
            .map(|loaded| {
                let (count, source) = loaded.drain_into(&mut warnings);
                report.action_points = count;
                report.sources.insert("actionpoint", source);
            });
        settle("action points", result, Need::Expected, &mut failure);

        let result = self.load_slabs(level).map(|loaded| {
            report.sources.insert("slab", loaded.drain_into(&mut warnings));
        });
        let slabs_ok = result.is_ok();
        settle("slabs", result, Need::Required, &mut failure);
        if slabs_ok {
            let path = self.paths.map_file(level, "wlb");
            match legacy::load_wlb(&self.files, &path, &mut self.map) {
                Ok(fixes) => {
                    report.wlb_fixes = fixes;
                    report.sources.insert("wlb", Source::Legacy);
                }
                Err(err) => {
                    log::debug!("deriving wlb flags: {err}");
                    legacy::derive_wlb(&mut self.map);
                    report.sources.insert("wlb", Source::Derived);
                }
            }
        }

        let result = self
            .load_entities::<ThingAdapter, E>(level, registry, Need::Required)
            .map(|loaded| {
                let (count, source) = loaded.drain_into(&mut warnings);
                report.things = count;
                report.sources.insert("thing", source);
            });
        settle("things", result, Need::Required, &mut failure);

        if let Some(err) = failure {
            return Err(err);
        }
        let path = self.paths.map_file(level, "slx");
        legacy::load_slx(&self.files, &path, &mut self.map);

        let references = self.map.blocks.iter().map(|block| block.column);
        let cells = self.slabsets.iter().flat_map(|set| set.columns);
        self.pool.update_columns_use(references.chain(cells));

        report.columns = self.pool.len();
        report.slabsets = self.slabsets.len();
        log::info!(
            "level {level} loaded: {} things, {} action points, {} lights, {} columns",
            report.things,
            report.action_points,
            report.lights,
            report.columns
        );
        Ok(Loaded::with_warnings(report, warnings))
    }
}
