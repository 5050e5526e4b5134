use std::path::{Path, PathBuf};

/// Number of numbered save slots.
pub const SAVE_SLOTS_COUNT: usize = 8;

/// Where save files live and how they are named.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SavePaths {
    pub save_dir: PathBuf,
}

impl SavePaths {
    pub fn new(save_dir: impl Into<PathBuf>) -> Self {
        Self {
            save_dir: save_dir.into(),
        }
    }

    pub fn slot_file(&self, slot: usize) -> PathBuf {
        self.save_dir.join(format!("fx1g{slot:04}.sav"))
    }

    pub fn packet_file(&self, num: usize) -> PathBuf {
        self.save_dir.join(format!("fx1rp{num:04}.pck"))
    }

    pub fn continue_file(&self) -> PathBuf {
        self.save_dir.join("fx1contn.sav")
    }
}

impl Default for SavePaths {
    fn default() -> Self {
        Self::new("save")
    }
}

/// Level map size in slabs (tiles). Each tile is 3x3 subtiles, and the
/// subtile grid carries one extra row and column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapDimensions {
    pub tiles_x: usize,
    pub tiles_y: usize,
}

impl MapDimensions {
    pub const STL_PER_SLB: usize = 3;

    pub const fn new(tiles_x: usize, tiles_y: usize) -> Self {
        Self { tiles_x, tiles_y }
    }

    pub fn subtiles_x(&self) -> usize {
        self.tiles_x * Self::STL_PER_SLB
    }

    pub fn subtiles_y(&self) -> usize {
        self.tiles_y * Self::STL_PER_SLB
    }

    /// Subtile blocks stored per level, including the extra edge row/column.
    pub fn subtile_blocks(&self) -> usize {
        (self.subtiles_x() + 1) * (self.subtiles_y() + 1)
    }

    pub fn tiles(&self) -> usize {
        self.tiles_x * self.tiles_y
    }
}

impl Default for MapDimensions {
    fn default() -> Self {
        Self::new(85, 85)
    }
}

/// Directories searched during level loading.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LevelPaths {
    pub levels_dir: PathBuf,
    pub data_dir: PathBuf,
}

impl LevelPaths {
    pub fn new(levels_dir: impl Into<PathBuf>, data_dir: impl Into<PathBuf>) -> Self {
        Self {
            levels_dir: levels_dir.into(),
            data_dir: data_dir.into(),
        }
    }

    /// `map00007.tng` style per-level file.
    pub fn map_file(&self, level: u32, ext: &str) -> PathBuf {
        self.levels_dir.join(format!("map{level:05}.{ext}"))
    }

    pub fn data_file(&self, name: &str) -> PathBuf {
        self.data_dir.join(name)
    }

    pub fn levels_dir(&self) -> &Path {
        &self.levels_dir
    }
}

impl Default for LevelPaths {
    fn default() -> Self {
        Self::new("levels", "data")
    }
}
