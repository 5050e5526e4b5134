use std::io;
use std::path::PathBuf;

use crate::version::EngineVersion;

/// Everything that can go wrong between bytes on disk and in-memory records.
///
/// Some variants are fatal for the call that produced them and come back as
/// `Err`. The recoverable ones (clamped counts, skipped chunks, version
/// mismatches, unresolved references) are collected in [`Loaded::warnings`]
/// so callers can report them without the loader aborting.
#[derive(thiserror::Error, Debug)]
pub enum LoadError {
    #[error("file {} is missing or unreadable", .path.display())]
    Absent { path: PathBuf },

    #[error("{what} is truncated: expected at least {expected} bytes, found {actual}")]
    Truncated {
        what: String,
        expected: u64,
        actual: u64,
    },

    #[error("{what} is {actual} bytes, exceeding the limit of {limit}")]
    TooLarge { what: String, actual: u64, limit: u64 },

    #[error("{what}: declared {declared} records, using {used}")]
    CountClamped {
        what: String,
        declared: i64,
        used: usize,
    },

    #[error("unrecognized chunk {id:#010x} ({length} bytes) skipped")]
    UnknownChunk { id: u32, length: u32 },

    #[error("chunk {id:#010x} has length {actual}, expected {expected}; skipped")]
    ChunkSizeMismatch { id: u32, expected: u32, actual: u32 },

    #[error("saved with engine {stored}, running {running}")]
    VersionMismatch {
        stored: EngineVersion,
        running: EngineVersion,
    },

    #[error("slab set {slabset} cell {cell}: column reference {reference} cannot be resolved")]
    UnresolvedReference {
        slabset: usize,
        cell: usize,
        reference: i32,
    },

    #[error("file is a pre-chunk save of {len} bytes; not supported")]
    PrimitiveSave { len: u64 },

    #[error("no free {kind} slot for record {index}")]
    RegistryFull { kind: &'static str, index: usize },

    #[error("{kind} section {section}: {reason}")]
    InvalidSection {
        kind: &'static str,
        section: String,
        reason: String,
    },

    #[error("structured document {}: {source}", .path.display())]
    Structured {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },

    #[error("save is incomplete: chunk mask {found:#06x}")]
    IncompleteSave { found: u32 },

    #[error("campaign {fname:?} could not be resolved")]
    CampaignUnavailable { fname: String },

    #[error("level {level} is not a resumable single player level")]
    NotResumable { level: i32 },

    #[error("save slot {slot} is out of range")]
    InvalidSlot { slot: usize },

    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

impl LoadError {
    pub(crate) fn truncated(what: impl Into<String>, expected: u64, actual: u64) -> Self {
        Self::Truncated {
            what: what.into(),
            expected,
            actual,
        }
    }

    pub(crate) fn clamped(what: impl Into<String>, declared: i64, used: usize) -> Self {
        Self::CountClamped {
            what: what.into(),
            declared,
            used,
        }
    }

    /// True for conditions the loaders degrade around instead of failing.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::CountClamped { .. }
                | Self::UnknownChunk { .. }
                | Self::ChunkSizeMismatch { .. }
                | Self::VersionMismatch { .. }
                | Self::UnresolvedReference { .. }
                | Self::RegistryFull { .. }
                | Self::InvalidSection { .. }
        )
    }
}

/// A successfully loaded value plus the recoverable problems met on the way.
#[derive(Debug)]
pub struct Loaded<T> {
    pub value: T,
    pub warnings: Vec<LoadError>,
}

impl<T> Loaded<T> {
    pub fn clean(value: T) -> Self {
        Self {
            value,
            warnings: Vec::new(),
        }
    }

    pub fn with_warnings(value: T, warnings: Vec<LoadError>) -> Self {
        Self { value, warnings }
    }

    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Loaded<U> {
        Loaded {
            value: f(self.value),
            warnings: self.warnings,
        }
    }

    /// Moves the warnings into `sink` and returns the bare value.
    pub fn drain_into(self, sink: &mut Vec<LoadError>) -> T {
        sink.extend(self.warnings);
        self.value
    }
}
