//! The quick-resume file written when a level is left.
//!
//! Unlike numbered saves it has no chunk headers: it is the world-state record
//! followed by the transfer record. Its length must match exactly.

use std::fs::{self, File};
use std::io::{self, BufWriter, Cursor, Write};
use std::path::PathBuf;

use serde::Serialize;

use crate::campaign::Campaigns;
use crate::config::SavePaths;
use crate::error::LoadError;
use crate::files::FileSource;
use crate::layout::FieldId;
use crate::reader::LittleEndianReader;
use crate::record::FixedRecord;
use crate::state::{
    BONUS_LEVEL_STORAGE_COUNT, TRANSFER_STATE_SIZE, TransferState, WORLD_STATE_LAYOUT,
    WORLD_STATE_SIZE, WorldState,
};

pub const CONTINUE_FILE_SIZE: u64 = (WORLD_STATE_SIZE + TRANSFER_STATE_SIZE) as u64;

/// What a resumed game needs from the continue file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ContinueGame {
    pub level: i32,
    pub campaign_fname: String,
    pub bonuses_found: [u8; BONUS_LEVEL_STORAGE_COUNT],
    pub transfer: TransferState,
}

/// Writes the continue file. When the loaded level can be resumed as a
/// single player level it becomes the stored continue level.
pub fn write_continue<C: Campaigns>(
    paths: &SavePaths,
    world: &WorldState,
    transfer: &TransferState,
    campaigns: &C,
) -> Result<PathBuf, LoadError> {
    let mut world = world.clone();
    if campaigns.is_singleplayer_like_level(world.loaded_level_number) {
        world.continue_level_number = world.loaded_level_number;
    }
    let path = paths.continue_file();
    fs::create_dir_all(&paths.save_dir)?;
    let mut out = BufWriter::new(File::create(&path)?);
    out.write_all(&world.to_bytes())?;
    out.write_all(&transfer.to_bytes())?;
    out.flush()?;
    log::debug!(
        "wrote continue file for level {} to {}",
        world.continue_level_number,
        path.display()
    );
    Ok(path)
}

struct ResumePoint {
    campaign_fname: String,
    level: i32,
}

fn read_field<F: FileSource>(
    files: &F,
    paths: &SavePaths,
    field: FieldId,
) -> Result<Vec<u8>, LoadError> {
    let path = paths.continue_file();
    let range = WORLD_STATE_LAYOUT.field(field).ok_or_else(|| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("world state layout has no {field:?} field"),
        )
    })?;
    Ok(files.read_range(&path, range.start as u64, range.len())?)
}

fn read_resume_point<F: FileSource>(
    files: &F,
    paths: &SavePaths,
) -> Result<ResumePoint, LoadError> {
    let path = paths.continue_file();
    let Some(len) = files.file_length(&path) else {
        return Err(LoadError::Absent { path });
    };
    if len != CONTINUE_FILE_SIZE {
        log::debug!(
            "{} is {len} bytes, expected {CONTINUE_FILE_SIZE}",
            path.display()
        );
        return Err(LoadError::Absent { path });
    }

    let fname = read_field(files, paths, FieldId::CampaignFname)?;
    let level = read_field(files, paths, FieldId::ContinueLevel)?;
    let fname_len = fname.len();
    let campaign_fname = LittleEndianReader::new(Cursor::new(fname)).read_fixed_string(fname_len)?;
    let mut r = LittleEndianReader::new(Cursor::new(level));
    Ok(ResumePoint {
        campaign_fname,
        level: r.read_i32()?,
    })
}

fn resolve<C: Campaigns>(point: &ResumePoint, campaigns: &mut C) -> Result<(), LoadError> {
    if !campaigns.change_campaign(&point.campaign_fname) {
        return Err(LoadError::CampaignUnavailable {
            fname: point.campaign_fname.clone(),
        });
    }
    if !campaigns.is_singleplayer_like_level(point.level) {
        return Err(LoadError::NotResumable { level: point.level });
    }
    Ok(())
}

/// Cheap check used to enable a "continue" option: reads only the campaign
/// file name and level number.
pub fn is_available<F: FileSource, C: Campaigns>(
    files: &F,
    paths: &SavePaths,
    campaigns: &mut C,
) -> bool {
    match read_resume_point(files, paths).and_then(|point| resolve(&point, campaigns)) {
        Ok(()) => true,
        Err(err) => {
            log::debug!("no game to continue: {err}");
            false
        }
    }
}

/// Reads the resume point plus the transfer record. Campaign or level
/// problems are reported as errors; the caller falls back to the menu.
pub fn load_continue<F: FileSource, C: Campaigns>(
    files: &F,
    paths: &SavePaths,
    campaigns: &mut C,
) -> Result<ContinueGame, LoadError> {
    let point = read_resume_point(files, paths)?;
    resolve(&point, campaigns)?;

    let path = paths.continue_file();
    let bonuses = read_field(files, paths, FieldId::BonusesFound)?;
    let transfer_bytes = files.read_range(&path, WORLD_STATE_SIZE as u64, TRANSFER_STATE_SIZE)?;
    let transfer = TransferState::from_bytes(&transfer_bytes)?;

    let mut bonuses_found = [0u8; BONUS_LEVEL_STORAGE_COUNT];
    let n = bonuses.len().min(BONUS_LEVEL_STORAGE_COUNT);
    bonuses_found[..n].copy_from_slice(&bonuses[..n]);

    Ok(ContinueGame {
        level: point.level,
        campaign_fname: point.campaign_fname,
        bonuses_found,
        transfer,
    })
}
