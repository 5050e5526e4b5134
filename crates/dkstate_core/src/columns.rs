//! Column pool and slab-set resolution.
//!
//! The pool never holds two columns with the same structure. Slab-set
//! templates point into it after [`resolve_slabset_references`] has run.

use std::collections::HashMap;
use std::io::{self, Read, Seek, Write};

use serde::Serialize;

use crate::error::{LoadError, Loaded};
use crate::reader::{LittleEndianReader, LittleEndianWriter};
use crate::record::FixedRecord;

pub const COLUMNS_COUNT: usize = 2048;
pub const COLUMN_STACK_HEIGHT: usize = 8;
pub const SLABSET_COUNT: usize = 1304;
pub const SLABSET_CELLS: usize = 9;

const CLF_PERMANENT: u8 = 0x01;
const CLF_CEILING_MASK: u8 = 0x0E;
const CLF_FLOOR_MASK: u8 = 0xF0;

/// One vertical stack of cubes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Column {
    pub use_count: u16,
    pub bitfields: u8,
    pub solidmask: u16,
    pub baseblock: u16,
    pub orientation: u8,
    pub cubes: [u16; COLUMN_STACK_HEIGHT],
}

/// The part of a column that decides whether two columns are the same.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ColumnShape {
    pub baseblock: u16,
    pub orientation: u8,
    pub cubes: [u16; COLUMN_STACK_HEIGHT],
}

impl Column {
    /// A column with no cubes, showing only its floor texture.
    pub fn bare(baseblock: u16) -> Self {
        Self {
            baseblock,
            ..Self::default()
        }
    }

    pub fn shape(&self) -> ColumnShape {
        ColumnShape {
            baseblock: self.baseblock,
            orientation: self.orientation,
            cubes: self.cubes,
        }
    }

    pub fn is_permanent(&self) -> bool {
        self.bitfields & CLF_PERMANENT != 0
    }

    pub fn set_permanent(&mut self) {
        self.bitfields |= CLF_PERMANENT;
    }

    pub fn floor_height(&self) -> u8 {
        (self.bitfields & CLF_FLOOR_MASK) >> 4
    }

    pub fn set_floor_height(&mut self, height: u8) {
        self.bitfields = (self.bitfields & !CLF_FLOOR_MASK) | ((height << 4) & CLF_FLOOR_MASK);
    }

    pub fn ceiling_height(&self) -> u8 {
        (self.bitfields & CLF_CEILING_MASK) >> 1
    }

    pub fn set_ceiling_height(&mut self, height: u8) {
        self.bitfields =
            (self.bitfields & !CLF_CEILING_MASK) | ((height << 1) & CLF_CEILING_MASK);
    }

    pub fn make_solidmask(&mut self) {
        self.solidmask = self
            .cubes
            .iter()
            .enumerate()
            .filter(|(_, cube)| **cube != 0)
            .fold(0, |mask, (i, _)| mask | (1 << i));
    }

    /// Number of filled cubes stacked from the bottom without a gap.
    pub fn find_column_height(&self) -> u8 {
        self.cubes.iter().take_while(|c| **c != 0).count() as u8
    }

    /// Number of filled cubes hanging from the top above an empty gap.
    fn find_lintel_height(&self) -> u8 {
        let floor = self.find_column_height() as usize;
        if floor >= COLUMN_STACK_HEIGHT || self.cubes[floor..].iter().all(|c| *c == 0) {
            return 0;
        }
        let lintel = self.cubes.iter().rev().take_while(|c| **c != 0).count();
        lintel.min(7) as u8
    }

    /// Recomputes solid mask, floor height and lintel height from the cubes.
    pub fn init_derived(&mut self) {
        self.make_solidmask();
        self.set_floor_height(self.find_column_height());
        self.set_ceiling_height(self.find_lintel_height());
    }
}

impl FixedRecord for Column {
    const SIZE: usize = 24;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            use_count: r.read_u16()?,
            bitfields: r.read_u8()?,
            solidmask: r.read_u16()?,
            baseblock: r.read_u16()?,
            orientation: r.read_u8()?,
            cubes: r.read_u16_array()?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        w.write_u16(self.use_count)?;
        w.write_u8(self.bitfields)?;
        w.write_u16(self.solidmask)?;
        w.write_u16(self.baseblock)?;
        w.write_u8(self.orientation)?;
        for cube in self.cubes {
            w.write_u16(cube)?;
        }
        Ok(())
    }
}

/// Slab-set template as stored on disk: negative values index the column
/// set file, non-negative values name a floor type.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlabSetEntry {
    pub columns: [i16; SLABSET_CELLS],
}

impl FixedRecord for SlabSetEntry {
    const SIZE: usize = 2 * SLABSET_CELLS;

    fn decode<R: Read + Seek>(r: &mut LittleEndianReader<R>) -> io::Result<Self> {
        Ok(Self {
            columns: r.read_i16_array()?,
        })
    }

    fn encode<W: Write>(&self, w: &mut LittleEndianWriter<W>) -> io::Result<()> {
        for col in self.columns {
            w.write_i16(col)?;
        }
        Ok(())
    }
}

/// Slab-set template with every cell pointing into the column pool.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct SlabSet {
    pub columns: [u16; SLABSET_CELLS],
}

/// Shared pool of distinct columns. Index 0 is the bare default floor
/// until a level's column file replaces it.
#[derive(Debug, Clone)]
pub struct ColumnPool {
    columns: Vec<Column>,
    lookup: HashMap<ColumnShape, u16>,
    aux_index: u32,
}

impl Default for ColumnPool {
    fn default() -> Self {
        Self::new()
    }
}

impl ColumnPool {
    pub const DEFAULT_COLUMN: u16 = 0;

    pub fn new() -> Self {
        let mut pool = Self {
            columns: Vec::with_capacity(COLUMNS_COUNT),
            lookup: HashMap::with_capacity(COLUMNS_COUNT),
            aux_index: 0,
        };
        pool.clear();
        pool
    }

    /// Drops every column except the default one, keeping allocations.
    pub fn clear(&mut self) {
        self.columns.clear();
        self.lookup.clear();
        self.aux_index = 0;
        let default = Column::bare(0);
        self.lookup.insert(default.shape(), 0);
        self.columns.push(default);
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn get(&self, index: u16) -> Option<&Column> {
        self.columns.get(usize::from(index))
    }

    pub fn columns(&self) -> &[Column] {
        &self.columns
    }

    pub fn aux_index(&self) -> u32 {
        self.aux_index
    }

    /// Replaces the pool with a level's authored columns, which keep their
    /// file positions because map blocks refer to them by index. Derived
    /// fields are recomputed; for duplicated shapes the lowest index wins
    /// lookups.
    pub fn load_authored(&mut self, columns: impl IntoIterator<Item = Column>, aux_index: u32) {
        self.columns.clear();
        self.lookup.clear();
        for mut column in columns.into_iter().take(COLUMNS_COUNT) {
            column.init_derived();
            let index = self.columns.len() as u16;
            self.lookup.entry(column.shape()).or_insert(index);
            self.columns.push(column);
        }
        if self.columns.is_empty() {
            self.clear();
        }
        self.aux_index = aux_index.min(COLUMNS_COUNT as u32 - 1);
    }

    pub fn find(&self, column: &Column) -> Option<u16> {
        self.lookup.get(&column.shape()).copied()
    }

    /// Returns the index of a column with the same structure, appending
    /// `column` when there is none.
    pub fn register_column(&mut self, column: Column) -> Result<u16, LoadError> {
        if let Some(index) = self.find(&column) {
            if column.is_permanent() {
                self.columns[usize::from(index)].set_permanent();
            }
            return Ok(index);
        }
        if self.columns.len() >= COLUMNS_COUNT {
            return Err(LoadError::RegistryFull {
                kind: "column",
                index: self.columns.len(),
            });
        }
        let mut column = column;
        column.init_derived();
        let index = self.columns.len() as u16;
        self.lookup.insert(column.shape(), index);
        self.columns.push(column);
        Ok(index)
    }

    /// Index of the bare column with `baseblock`, created when missing.
    pub fn bare_floor(&mut self, baseblock: u16) -> Result<u16, LoadError> {
        let mut column = Column::bare(baseblock);
        column.set_permanent();
        self.register_column(column)
    }

    /// Recounts how many references point at each column.
    pub fn update_columns_use(&mut self, references: impl IntoIterator<Item = u16>) {
        for column in &mut self.columns {
            column.use_count = 0;
        }
        for index in references {
            if let Some(column) = self.columns.get_mut(usize::from(index)) {
                column.use_count = column.use_count.saturating_add(1);
            }
        }
    }
}

/// Rewrites slab-set references to pool indices.
///
/// Negative references materialize the matching column set entry into the
/// pool. Non-negative ones are floor types and map to the bare column with
/// that base block. Anything unresolvable points at the default column.
pub fn resolve_slabset_references(
    entries: &[SlabSetEntry],
    column_set: &[Column],
    pool: &mut ColumnPool,
) -> Loaded<Vec<SlabSet>> {
    let mut warnings = Vec::new();
    let mut resolved = Vec::with_capacity(entries.len());

    for (slabset, entry) in entries.iter().enumerate() {
        let mut set = SlabSet::default();
        for (cell, &reference) in entry.columns.iter().enumerate() {
            let index = if reference >= 0 {
                pool.bare_floor(reference as u16)
            } else {
                match column_set.get(usize::from(reference.unsigned_abs())) {
                    Some(column) => {
                        let mut column = *column;
                        column.set_permanent();
                        pool.register_column(column)
                    }
                    None => Err(LoadError::UnresolvedReference {
                        slabset,
                        cell,
                        reference: i32::from(reference),
                    }),
                }
            };
            set.columns[cell] = index.unwrap_or_else(|err| {
                log::error!("slab set {slabset} cell {cell}: {err}; using default column");
                warnings.push(LoadError::UnresolvedReference {
                    slabset,
                    cell,
                    reference: i32::from(reference),
                });
                ColumnPool::DEFAULT_COLUMN
            });
        }
        resolved.push(set);
    }

    Loaded::with_warnings(resolved, warnings)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn column(baseblock: u16, cubes: [u16; COLUMN_STACK_HEIGHT]) -> Column {
        Column {
            baseblock,
            cubes,
            ..Column::default()
        }
    }

    #[test]
    fn derived_fields_follow_cubes() {
        let mut col = column(1, [5, 5, 5, 0, 0, 0, 9, 9]);
        col.init_derived();
        assert_eq!(col.solidmask, 0b1100_0111);
        assert_eq!(col.floor_height(), 3);
        assert_eq!(col.ceiling_height(), 2);

        let mut full = column(1, [1; COLUMN_STACK_HEIGHT]);
        full.init_derived();
        assert_eq!(full.floor_height(), 8);
        assert_eq!(full.ceiling_height(), 0);
    }

    #[test]
    fn structure_ignores_derived_fields() {
        let mut pool = ColumnPool::new();
        let a = pool.register_column(column(3, [1, 2, 0, 0, 0, 0, 0, 0])).unwrap();
        let mut twin = column(3, [1, 2, 0, 0, 0, 0, 0, 0]);
        twin.use_count = 40;
        twin.bitfields = 0xFF;
        assert_eq!(pool.register_column(twin).unwrap(), a);
        let other = pool.register_column(column(3, [1, 3, 0, 0, 0, 0, 0, 0])).unwrap();
        assert_ne!(other, a);
        assert_eq!(pool.len(), 3);
    }

    #[test]
    fn pool_capacity_is_enforced() {
        let mut pool = ColumnPool::new();
        for i in 1..COLUMNS_COUNT {
            pool.register_column(Column::bare(i as u16)).unwrap();
        }
        let err = pool.register_column(Column::bare(9999)).unwrap_err();
        assert!(matches!(err, LoadError::RegistryFull { kind: "column", .. }));
    }

    #[test]
    fn references_resolve_into_pool() {
        let mut pool = ColumnPool::new();
        let set = vec![Column::default(), column(7, [4, 4, 0, 0, 0, 0, 0, 0])];
        let entries = [SlabSetEntry {
            columns: [-1, 0, 12, -1, -5, 12, 0, 0, 0],
        }];
        let loaded = resolve_slabset_references(&entries, &set, &mut pool);
        let cells = loaded.value[0].columns;

        assert_eq!(cells[0], cells[3]);
        assert_eq!(cells[2], cells[5]);
        assert_eq!(cells[1], 0);
        assert_eq!(cells[4], ColumnPool::DEFAULT_COLUMN);
        assert_eq!(pool.get(cells[0]).map(|c| c.baseblock), Some(7));
        assert_eq!(pool.get(cells[2]).map(|c| c.baseblock), Some(12));
        assert!(pool.get(cells[2]).is_some_and(Column::is_permanent));
        assert!(matches!(
            loaded.warnings.as_slice(),
            [LoadError::UnresolvedReference {
                cell: 4,
                reference: -5,
                ..
            }]
        ));
    }

    #[test]
    fn use_counts_are_recomputed() {
        let mut pool = ColumnPool::new();
        let a = pool.bare_floor(2).unwrap();
        pool.update_columns_use([a, a, 0]);
        assert_eq!(pool.get(a).map(|c| c.use_count), Some(2));
        pool.update_columns_use([0]);
        assert_eq!(pool.get(a).map(|c| c.use_count), Some(0));
    }
}
