//! Save-game persistence and level loading for Dungeon Keeper style maps.
//!
//! [`container`] reads and writes numbered save slots and packet replays,
//! [`catalogue`] lists the slots, [`continue_game`] handles the quick-resume
//! file and [`level`] assembles a level from its legacy or structured files.

pub mod campaign;
pub mod catalogue;
pub mod chunk;
pub mod columns;
pub mod config;
pub mod container;
pub mod continue_game;
pub mod error;
pub mod files;
pub mod layout;
pub mod level;
pub mod reader;
pub mod record;
pub mod state;
pub mod version;

pub use campaign::{CampaignInfo, CampaignRegistry, Campaigns};
pub use catalogue::{CatalogueEntry, SaveCatalogue, SaveMetadata};
pub use columns::{Column, ColumnPool, SlabSet, SlabSetEntry};
pub use config::{LevelPaths, MapDimensions, SAVE_SLOTS_COUNT, SavePaths};
pub use container::{GameSnapshot, LoadResult, PacketReplay, SaveGames, SavedGame};
pub use continue_game::ContinueGame;
pub use error::{LoadError, Loaded};
pub use files::{DiskFiles, FileSource, MemoryFiles};
pub use level::entity::{EntityKind, EntityRegistry, LevelEntities};
pub use level::{LevelLoadContext, LevelMap, LevelReport};
pub use record::FixedRecord;
pub use version::EngineVersion;
