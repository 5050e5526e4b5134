use std::fmt;

use serde::Serialize;

use crate::columns::{COLUMN_STACK_HEIGHT, COLUMNS_COUNT, Column, SLABSET_CELLS, SLABSET_COUNT, SlabSetEntry};
use crate::error::LoadError;
use crate::level::records::{
    ACTN_POINTS_COUNT, InitActionPoint, InitLight, InitThing, LIGHTS_COUNT, SlabPlacement,
    THINGS_COUNT,
};
use crate::level::structured::Section;

/// Entity kinds a level is assembled from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Thing,
    ActionPoint,
    Light,
    Column,
    SlabSet,
    Slab,
}

impl EntityKind {
    /// Table name used in structured documents.
    pub fn section_name(self) -> &'static str {
        match self {
            Self::Thing => "thing",
            Self::ActionPoint => "actionpoint",
            Self::Light => "light",
            Self::Column => "column",
            Self::SlabSet => "slabset",
            Self::Slab => "slab",
        }
    }

    /// Extension of the per-level structured document.
    pub fn structured_ext(self) -> Option<&'static str> {
        match self {
            Self::Thing => Some("tngfx"),
            Self::ActionPoint => Some("aptfx"),
            Self::Light => Some("lgtfx"),
            Self::Column => Some("clmfx"),
            Self::Slab => Some("slbfx"),
            Self::SlabSet => None,
        }
    }

    /// Extension of the per-level legacy binary file.
    pub fn legacy_ext(self) -> Option<&'static str> {
        match self {
            Self::Thing => Some("tng"),
            Self::ActionPoint => Some("apt"),
            Self::Light => Some("lgt"),
            Self::Column => Some("clm"),
            Self::Slab => Some("slb"),
            Self::SlabSet => None,
        }
    }

    /// Most records one level may declare. Slabs are bounded by the map.
    pub fn max_count(self) -> usize {
        match self {
            Self::Thing => THINGS_COUNT - 2,
            Self::ActionPoint => ACTN_POINTS_COUNT - 1,
            Self::Light => LIGHTS_COUNT - 1,
            Self::Column => COLUMNS_COUNT,
            Self::SlabSet => SLABSET_COUNT,
            Self::Slab => usize::MAX,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.section_name())
    }
}

/// Allocation of live entities, owned by the simulation. Any call may fail
/// when the simulation has no free slot.
pub trait EntityRegistry {
    fn clear(&mut self);

    fn create_thing(&mut self, thing: &InitThing) -> Result<usize, LoadError>;

    fn create_action_point(&mut self, point: &InitActionPoint) -> Result<usize, LoadError>;

    fn create_light(&mut self, light: &InitLight) -> Result<usize, LoadError>;
}

/// Plain in-memory registry with fixed slot counts.
#[derive(Debug, Clone, Serialize)]
pub struct LevelEntities {
    pub things: Vec<InitThing>,
    pub action_points: Vec<InitActionPoint>,
    pub lights: Vec<InitLight>,
    #[serde(skip)]
    capacity: [usize; 3],
}

impl Default for LevelEntities {
    fn default() -> Self {
        Self::with_capacity(THINGS_COUNT - 1, ACTN_POINTS_COUNT - 1, LIGHTS_COUNT - 1)
    }
}

impl LevelEntities {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(things: usize, action_points: usize, lights: usize) -> Self {
        Self {
            things: Vec::new(),
            action_points: Vec::new(),
            lights: Vec::new(),
            capacity: [things, action_points, lights],
        }
    }
}

fn push_bounded<T: Copy>(
    list: &mut Vec<T>,
    capacity: usize,
    kind: &'static str,
    item: &T,
) -> Result<usize, LoadError> {
    if list.len() >= capacity {
        return Err(LoadError::RegistryFull {
            kind,
            index: list.len(),
        });
    }
    list.push(*item);
    Ok(list.len() - 1)
}

impl EntityRegistry for LevelEntities {
    fn clear(&mut self) {
        self.things.clear();
        self.action_points.clear();
        self.lights.clear();
    }

    fn create_thing(&mut self, thing: &InitThing) -> Result<usize, LoadError> {
        push_bounded(&mut self.things, self.capacity[0], "thing", thing)
    }

    fn create_action_point(&mut self, point: &InitActionPoint) -> Result<usize, LoadError> {
        if self.action_points.iter().any(|p| p.num == point.num) {
            return Err(LoadError::RegistryFull {
                kind: "action point",
                index: usize::from(point.num),
            });
        }
        push_bounded(&mut self.action_points, self.capacity[1], "action point", point)
    }

    fn create_light(&mut self, light: &InitLight) -> Result<usize, LoadError> {
        push_bounded(&mut self.lights, self.capacity[2], "light", light)
    }
}

/// Builds one kind's record from a structured section.
pub trait EntityAdapter {
    const KIND: EntityKind;
    type Record: Clone + fmt::Debug;

    fn from_section(section: &Section<'_>) -> Result<Self::Record, String>;
}

/// Kinds that are handed to the [`EntityRegistry`] once decoded.
pub trait RegisteredEntity: EntityAdapter {
    fn register<E: EntityRegistry + ?Sized>(
        registry: &mut E,
        record: &Self::Record,
    ) -> Result<usize, LoadError>;
}

pub struct ThingAdapter;
pub struct ActionPointAdapter;
pub struct LightAdapter;
pub struct ColumnAdapter;
pub struct SlabSetAdapter;
pub struct SlabAdapter;

impl EntityAdapter for ThingAdapter {
    const KIND: EntityKind = EntityKind::Thing;
    type Record = InitThing;

    fn from_section(s: &Section<'_>) -> Result<InitThing, String> {
        Ok(InitThing {
            mappos: s.array("mappos", true)?,
            oclass: s.required("oclass")?,
            model: s.required("model")?,
            owner: s.optional("owner", 0)?,
            range: s.optional("range", 0)?,
            index: s.optional("index", 0)?,
            params: if s.has("params") {
                s.array("params", false)?
            } else {
                [0; 8]
            },
        })
    }
}

impl RegisteredEntity for ThingAdapter {
    fn register<E: EntityRegistry + ?Sized>(
        registry: &mut E,
        record: &InitThing,
    ) -> Result<usize, LoadError> {
        registry.create_thing(record)
    }
}

impl EntityAdapter for ActionPointAdapter {
    const KIND: EntityKind = EntityKind::ActionPoint;
    type Record = InitActionPoint;

    fn from_section(s: &Section<'_>) -> Result<InitActionPoint, String> {
        let num: u16 = s.required("num")?;
        if num == 0 || usize::from(num) >= ACTN_POINTS_COUNT {
            return Err(format!("`num` {num} is not a valid action point number"));
        }
        Ok(InitActionPoint {
            x: s.required("x")?,
            y: s.required("y")?,
            range: s.optional("range", 0)?,
            num,
        })
    }
}

impl RegisteredEntity for ActionPointAdapter {
    fn register<E: EntityRegistry + ?Sized>(
        registry: &mut E,
        record: &InitActionPoint,
    ) -> Result<usize, LoadError> {
        registry.create_action_point(record)
    }
}

impl EntityAdapter for LightAdapter {
    const KIND: EntityKind = EntityKind::Light;
    type Record = InitLight;

    fn from_section(s: &Section<'_>) -> Result<InitLight, String> {
        Ok(InitLight {
            radius: s.required("radius")?,
            intensity: s.required("intensity")?,
            flags: s.optional("flags", 0)?,
            params: if s.has("params") {
                s.array("params", false)?
            } else {
                [0; 3]
            },
            mappos: s.array("mappos", true)?,
            light_type: s.optional("light_type", 0)?,
            is_dynamic: u8::from(s.flag("is_dynamic")?),
            attached_slb: s.optional("attached_slb", 0)?,
        })
    }
}

impl RegisteredEntity for LightAdapter {
    fn register<E: EntityRegistry + ?Sized>(
        registry: &mut E,
        record: &InitLight,
    ) -> Result<usize, LoadError> {
        registry.create_light(record)
    }
}

impl EntityAdapter for ColumnAdapter {
    const KIND: EntityKind = EntityKind::Column;
    type Record = Column;

    fn from_section(s: &Section<'_>) -> Result<Column, String> {
        let mut column = Column {
            baseblock: s.required("baseblock")?,
            orientation: s.optional("orientation", 0)?,
            cubes: s.array::<u16, COLUMN_STACK_HEIGHT>("cubes", false)?,
            ..Column::default()
        };
        if s.flag("permanent")? {
            column.set_permanent();
        }
        column.init_derived();
        Ok(column)
    }
}

impl EntityAdapter for SlabSetAdapter {
    const KIND: EntityKind = EntityKind::SlabSet;
    type Record = SlabSetEntry;

    fn from_section(s: &Section<'_>) -> Result<SlabSetEntry, String> {
        Ok(SlabSetEntry {
            columns: s.array::<i16, SLABSET_CELLS>("columns", true)?,
        })
    }
}

impl EntityAdapter for SlabAdapter {
    const KIND: EntityKind = EntityKind::Slab;
    type Record = SlabPlacement;

    fn from_section(s: &Section<'_>) -> Result<SlabPlacement, String> {
        Ok(SlabPlacement {
            x: s.required("x")?,
            y: s.required("y")?,
            kind: s.required("kind")?,
        })
    }
}
