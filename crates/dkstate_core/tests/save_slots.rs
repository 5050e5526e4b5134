use std::fs;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use dkstate_core::campaign::{CampaignInfo, CampaignRegistry, Campaigns};
use dkstate_core::catalogue::read_catalogue_entry;
use dkstate_core::chunk::{ChunkHeader, ChunkId, write_chunk, write_chunk_header};
use dkstate_core::container::{PRIMITIVE_SAVE_MIN_LEN, decode_container};
use dkstate_core::continue_game::{self, CONTINUE_FILE_SIZE};
use dkstate_core::reader::LittleEndianWriter;
use dkstate_core::state::{Packet, PacketHeader, TransferState, WorldState};
use dkstate_core::{
    CatalogueEntry, EngineVersion, FixedRecord, GameSnapshot, LoadError, LoadResult,
    MemoryFiles, SaveCatalogue, SaveGames, SaveMetadata, SavePaths,
};

fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{}", std::process::id(), nanos))
}

fn keeper_metadata(level: i32) -> SaveMetadata {
    SaveMetadata {
        textname: "Eversmile".to_string(),
        level_num: level,
        campaign_name: "Original".to_string(),
        campaign_fname: "keeporig.cfg".to_string(),
        player_name: "Keeper".to_string(),
    }
}

fn snapshot(level: i32) -> GameSnapshot {
    GameSnapshot {
        world: WorldState {
            loaded_level_number: level,
            continue_level_number: level,
            campaign_fname: "keeporig.cfg".to_string(),
            ..WorldState::default()
        },
        ..GameSnapshot::default()
    }
}

fn info_chunk(entry: &CatalogueEntry) -> Vec<u8> {
    let mut w = LittleEndianWriter::new(Vec::new());
    write_chunk(&mut w, ChunkId::INFO, 0, &entry.to_bytes()).expect("write to vec");
    w.into_inner()
}

#[test]
fn save_then_scan_then_load_slot_two() {
    let dir = temp_dir("dkstate_save_slot");
    let mut saves = SaveGames::on_disk(SavePaths::new(&dir));
    let path = saves
        .save(2, &keeper_metadata(7), &snapshot(7))
        .expect("save slot 2");
    assert!(path.ends_with("fx1g0002.sav"));

    let mut fresh = SaveGames::on_disk(SavePaths::new(&dir));
    assert_eq!(fresh.scan_catalogue(), 1);
    let entry = fresh.catalogue().entry(2).expect("slot 2 in use");
    assert_eq!(entry.level_num, 7);
    assert_eq!(entry.player_name, "Keeper");
    assert_eq!(entry.version, EngineVersion::CURRENT);

    let loaded = fresh.load(2);
    assert!(loaded.warnings.is_empty());
    match loaded.value {
        LoadResult::FullGame(game) => {
            assert_eq!(game.snapshot.world.loaded_level_number, 7);
            assert_eq!(game.entry.textname, "Eversmile");
        }
        other => panic!("expected a full game, got {}", other.kind()),
    }

    fs::remove_dir_all(&dir).expect("remove temp dir");
}

#[test]
fn failed_load_disables_the_slot() {
    let dir = temp_dir("dkstate_bad_slot");
    let mut saves = SaveGames::on_disk(SavePaths::new(&dir));
    saves.save(4, &keeper_metadata(3), &snapshot(3)).expect("save");
    let entry = CatalogueEntry::from_metadata(&keeper_metadata(3));
    fs::write(saves.paths().slot_file(4), info_chunk(&entry)).expect("overwrite slot");

    assert_eq!(saves.scan_catalogue(), 1);
    let loaded = saves.load(4);
    assert!(matches!(
        loaded.value,
        LoadResult::Failed(LoadError::IncompleteSave { .. })
    ));
    assert_eq!(saves.catalogue().count_in_use(), 0);

    fs::remove_dir_all(&dir).expect("remove temp dir");
}

#[test]
fn only_well_formed_info_chunks_count_as_in_use() {
    let paths = SavePaths::new("saves");
    let entry = CatalogueEntry::from_metadata(&keeper_metadata(1));
    let mut files = MemoryFiles::new();

    files.insert(paths.slot_file(0), info_chunk(&entry));
    files.insert(paths.slot_file(5), info_chunk(&entry));

    let mut short = LittleEndianWriter::new(Vec::new());
    write_chunk(&mut short, ChunkId::INFO, 0, &entry.to_bytes()[..100]).expect("write to vec");
    files.insert(paths.slot_file(1), short.into_inner());

    let mut game_first = LittleEndianWriter::new(Vec::new());
    write_chunk(&mut game_first, ChunkId::GAME, 0, &WorldState::default().to_bytes())
        .expect("write to vec");
    files.insert(paths.slot_file(3), game_first.into_inner());

    files.insert(paths.slot_file(6), Vec::new());

    let mut catalogue = SaveCatalogue::new();
    assert_eq!(catalogue.scan_all_slots(&files, &paths), 2);
    assert_eq!(catalogue.count_in_use(), 2);
    assert!(catalogue.entry(0).is_some());
    assert!(catalogue.entry(1).is_none());
    assert!(catalogue.entry(5).is_some());
    assert_eq!(catalogue.first_free_slot(), Some(1));
}

#[test]
fn catalogue_entry_round_trips_after_truncation() {
    let meta = SaveMetadata {
        textname: "A rather long save description".to_string(),
        player_name: "K".repeat(100),
        ..keeper_metadata(12)
    };
    let entry = CatalogueEntry::from_metadata(&meta);
    assert!(entry.textname.len() < meta.textname.len());

    let read = read_catalogue_entry(&info_chunk(&entry)).expect("entry");
    assert_eq!(read, entry);
    assert!(read.in_use());
}

#[test]
fn unknown_chunk_between_known_ones_is_skipped() {
    for unknown_len in [0usize, 1, 27, 4096] {
        let entry = CatalogueEntry::from_metadata(&keeper_metadata(9));
        let world = snapshot(9).world;
        let mut w = LittleEndianWriter::new(Vec::new());
        write_chunk(&mut w, ChunkId::INFO, 0, &entry.to_bytes()).expect("write");
        write_chunk(&mut w, ChunkId(0x5A5A_5A5A), 3, &vec![0xAB; unknown_len]).expect("write");
        write_chunk(&mut w, ChunkId::GAME, 0, &world.to_bytes()).expect("write");
        write_chunk(&mut w, ChunkId::TRANSFER, 0, &TransferState::default().to_bytes())
            .expect("write");
        write_chunk(&mut w, ChunkId::SCRIPT, 0, b"scr").expect("write");

        let loaded = decode_container(&w.into_inner());
        assert!(matches!(
            loaded.warnings.as_slice(),
            [LoadError::UnknownChunk { length, .. }] if *length as usize == unknown_len
        ));
        match loaded.value {
            LoadResult::FullGame(game) => {
                assert_eq!(game.snapshot.world, world);
                assert_eq!(game.snapshot.script.data, b"scr");
            }
            other => panic!("expected a full game, got {}", other.kind()),
        }
    }
}

#[test]
fn packet_files_start_or_continue_a_game() {
    let dir = temp_dir("dkstate_packets");
    let saves = SaveGames::on_disk(SavePaths::new(&dir));
    let header = PacketHeader {
        version: EngineVersion::CURRENT,
        level_num: 5,
        action_seed: 0xDEAD,
        players_exist: 1,
        players_comp: 0,
        chksum_available: true,
    };
    let packets: Vec<Packet> = (0..3)
        .map(|turn| Packet {
            turn,
            action: 2,
            pos_x: -1,
            ..Packet::default()
        })
        .collect();

    saves
        .write_packet_file(0, &keeper_metadata(5), &header, None, &packets)
        .expect("write start replay");
    match saves.load_packet_file(0).value {
        LoadResult::PacketReplayStart(replay) => {
            assert_eq!(replay.header, header);
            assert_eq!(replay.packets, packets);
        }
        other => panic!("expected a replay start, got {}", other.kind()),
    }

    saves
        .write_packet_file(1, &keeper_metadata(5), &header, Some(&snapshot(5)), &packets)
        .expect("write continue replay");
    match saves.load_packet_file(1).value {
        LoadResult::PacketReplayContinue(game, replay) => {
            assert_eq!(game.snapshot.world.loaded_level_number, 5);
            assert_eq!(replay.packets.len(), 3);
        }
        other => panic!("expected a replay continue, got {}", other.kind()),
    }

    fs::remove_dir_all(&dir).expect("remove temp dir");
}

#[test]
fn pre_chunk_save_is_rejected() {
    let bytes = vec![0x11; PRIMITIVE_SAVE_MIN_LEN as usize + 7];
    let loaded = decode_container(&bytes);
    assert!(matches!(
        loaded.value,
        LoadResult::Failed(LoadError::PrimitiveSave { .. })
    ));
}

#[test]
fn packet_data_runs_to_end_of_file() {
    let header = PacketHeader {
        version: EngineVersion::CURRENT,
        level_num: 1,
        action_seed: 1,
        players_exist: 1,
        players_comp: 0,
        chksum_available: false,
    };
    let mut w = LittleEndianWriter::new(Vec::new());
    write_chunk(&mut w, ChunkId::PACKET_HEADER, 0, &header.to_bytes()).expect("write");
    write_chunk_header(
        &mut w,
        ChunkHeader {
            id: ChunkId::PACKET_DATA,
            version: 0,
            length: 0,
        },
    )
    .expect("write");
    let mut bytes = w.into_inner();
    bytes.extend(Packet::default().to_bytes());
    bytes.extend([1, 2, 3]);

    let loaded = decode_container(&bytes);
    assert!(matches!(&loaded.value, LoadResult::PacketReplayStart(r) if r.packets.len() == 1));
    assert!(matches!(loaded.warnings.as_slice(), [LoadError::Truncated { .. }]));
}

fn campaigns() -> CampaignRegistry {
    let mut reg = CampaignRegistry::new();
    reg.register(CampaignInfo::new("keeporig.cfg", "Original").with_single_levels(1..=20));
    reg
}

#[test]
fn continue_file_round_trip_and_length_check() {
    let dir = temp_dir("dkstate_continue");
    let paths = SavePaths::new(&dir);
    let mut reg = campaigns();
    let transfer = TransferState {
        extra_levels_mask: 0b101,
        ..TransferState::default()
    };
    let path = continue_game::write_continue(&paths, &snapshot(6).world, &transfer, &reg)
        .expect("write continue");
    assert_eq!(fs::metadata(&path).expect("stat").len(), CONTINUE_FILE_SIZE);

    let files = dkstate_core::DiskFiles;
    assert!(continue_game::is_available(&files, &paths, &mut reg));
    let game = continue_game::load_continue(&files, &paths, &mut reg).expect("continue");
    assert_eq!(game.level, 6);
    assert_eq!(game.transfer.extra_levels_mask, 0b101);

    let mut bytes = fs::read(&path).expect("read continue");
    bytes.push(0);
    fs::write(&path, &bytes).expect("grow by one byte");
    assert!(!continue_game::is_available(&files, &paths, &mut reg));

    bytes.truncate(bytes.len() - 2);
    fs::write(&path, &bytes).expect("shrink by one byte");
    assert!(!continue_game::is_available(&files, &paths, &mut reg));
    assert!(matches!(
        continue_game::load_continue(&files, &paths, &mut reg),
        Err(LoadError::Absent { .. })
    ));

    fs::remove_dir_all(&dir).expect("remove temp dir");
}

#[test]
fn continue_records_loaded_level_when_resumable() {
    let paths = SavePaths::new(temp_dir("dkstate_continue_level"));
    let mut reg = campaigns();
    assert!(reg.change_campaign("keeporig.cfg"));
    let world = WorldState {
        loaded_level_number: 11,
        continue_level_number: 3,
        campaign_fname: "keeporig.cfg".to_string(),
        ..WorldState::default()
    };
    continue_game::write_continue(&paths, &world, &TransferState::default(), &reg)
        .expect("write continue");
    let bytes = fs::read(paths.continue_file()).expect("read");
    assert_eq!(&bytes[..4], &11i32.to_le_bytes());

    let mut files = MemoryFiles::new();
    files.insert(paths.continue_file(), bytes);
    let game = continue_game::load_continue(&files, &paths, &mut reg).expect("continue");
    assert_eq!(game.level, 11);

    fs::remove_dir_all(&paths.save_dir).expect("remove temp dir");
}
