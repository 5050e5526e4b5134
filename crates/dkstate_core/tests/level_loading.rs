use std::fs;
use std::io::Write;
use std::path::PathBuf;
use std::time::{SystemTime, UNIX_EPOCH};

use flate2::Compression;
use flate2::write::GzEncoder;

use dkstate_core::level::records::{InitThing, Wlb, slab_kind};
use dkstate_core::level::{LevelLoadContext, Source};
use dkstate_core::{
    Column, FixedRecord, LevelEntities, LevelPaths, LoadError, MapDimensions, MemoryFiles,
    SlabSetEntry,
};

const DIMS: MapDimensions = MapDimensions::new(4, 4);

fn temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system time before unix epoch")
        .as_nanos();
    std::env::temp_dir().join(format!("{prefix}_{}_{}", std::process::id(), nanos))
}

fn tile_kinds() -> Vec<u16> {
    use slab_kind::{BRIDGE, LAVA, ROCK, WATER};
    vec![
        ROCK, ROCK, ROCK, ROCK, //
        LAVA, BRIDGE, LAVA, 10, //
        WATER, 10, 11, 10, //
        ROCK, 10, 10, ROCK,
    ]
}

fn things_file(declared: u16, present: usize) -> Vec<u8> {
    let mut bytes = declared.to_le_bytes().to_vec();
    for i in 0..present {
        let thing = InitThing {
            mappos: [(i % 256) as u16 * 256, 128, 0],
            oclass: 1,
            model: (i % 200) as u8,
            ..InitThing::default()
        };
        bytes.extend(thing.to_bytes());
    }
    bytes
}

fn column(baseblock: u16, cubes: [u16; 8]) -> Column {
    Column {
        baseblock,
        cubes,
        ..Column::default()
    }
}

fn columns_file(header: &[u8], columns: &[Column]) -> Vec<u8> {
    let mut bytes = header.to_vec();
    for column in columns {
        bytes.extend(column.to_bytes());
    }
    bytes
}

/// Every file a legacy level needs, keyed by path.
fn legacy_level(paths: &LevelPaths, level: u32) -> Vec<(PathBuf, Vec<u8>)> {
    let blocks = DIMS.subtile_blocks();
    let slb: Vec<u8> = tile_kinds().iter().flat_map(|k| k.to_le_bytes()).collect();
    let clm_columns = [column(0, [0; 8]), column(5, [1, 1, 0, 0, 0, 0, 0, 0])];
    let mut clm_header = 2u32.to_le_bytes().to_vec();
    clm_header.extend(0u32.to_le_bytes());
    let dat: Vec<u8> = (0..blocks)
        .flat_map(|i| (if i % 2 == 0 { 1u16 } else { 0 }).wrapping_neg().to_le_bytes())
        .collect();
    vec![
        (paths.map_file(level, "slb"), slb),
        (paths.map_file(level, "own"), vec![1; blocks]),
        (paths.map_file(level, "wib"), vec![0; blocks]),
        (paths.map_file(level, "dat"), dat),
        (paths.map_file(level, "inf"), vec![3]),
        (paths.map_file(level, "clm"), columns_file(&clm_header, &clm_columns)),
        (paths.map_file(level, "apt"), 0i32.to_le_bytes().to_vec()),
        (paths.map_file(level, "tng"), things_file(2, 2)),
    ]
}

fn memory_context(level: u32) -> LevelLoadContext<MemoryFiles> {
    let paths = LevelPaths::new("levels", "data");
    let mut files = MemoryFiles::new();
    for (path, bytes) in legacy_level(&paths, level) {
        files.insert(path, bytes);
    }
    LevelLoadContext::new(paths, DIMS, files)
}

fn slab_kinds(ctx: &LevelLoadContext<MemoryFiles>) -> Vec<u16> {
    ctx.map().slabs.iter().map(|s| s.kind).collect()
}

#[test]
fn legacy_level_loads_every_part() {
    let mut ctx = memory_context(1);
    let mut reg = LevelEntities::new();
    let loaded = ctx.load_level(1, &mut reg).expect("level 1");
    let report = loaded.value;

    assert_eq!(report.things, 2);
    assert_eq!(report.texture_id, 3);
    assert_eq!(report.columns, 2);
    assert_eq!(slab_kinds(&ctx), tile_kinds());
    assert_eq!(ctx.map().block(0, 0).map(|b| b.column), Some(1));
    assert_eq!(ctx.map().block(1, 0).map(|b| b.column), Some(0));
    assert_eq!(ctx.pool().get(1).map(|c| c.floor_height()), Some(2));
    assert!(ctx.pool().get(1).is_some_and(|c| c.use_count > 0));
    assert_eq!(reg.things[1].mappos[0], 256);
}

#[test]
fn missing_wlb_is_derived_from_neighbours() {
    let mut ctx = memory_context(1);
    let report = ctx
        .load_level(1, &mut LevelEntities::new())
        .expect("level 1")
        .value;
    assert_eq!(report.sources.get("wlb"), Some(&Source::Derived));
    let map = ctx.map();
    assert_eq!(map.slab(1, 1).map(|s| s.wlb), Some(Wlb::Lava));
    assert_eq!(map.slab(0, 2).map(|s| s.wlb), Some(Wlb::Water));
    assert_eq!(map.slab(2, 2).map(|s| s.wlb), Some(Wlb::None));
}

#[test]
fn truncated_things_file_yields_present_records() {
    let mut ctx = memory_context(2);
    let tng = ctx.paths().map_file(2, "tng");
    ctx.files_mut().insert(tng, things_file(500, 10));

    let mut reg = LevelEntities::new();
    let loaded = ctx.load_level(2, &mut reg).expect("level 2");
    assert_eq!(loaded.value.things, 10);
    assert_eq!(reg.things.len(), 10);
    assert!(loaded.warnings.iter().any(|w| matches!(
        w,
        LoadError::CountClamped {
            declared: 500,
            used: 10,
            ..
        }
    )));
}

#[test]
fn clamped_things_are_identical_across_loads() {
    let mut ctx = memory_context(3);
    let tng = ctx.paths().map_file(3, "tng");
    ctx.files_mut().insert(tng, things_file(5000, 2100));

    let mut reg = LevelEntities::new();
    ctx.load_level(3, &mut reg).expect("first load");
    let first = reg.things.clone();
    ctx.load_level(3, &mut reg).expect("second load");

    assert_eq!(first.len(), 2046);
    assert_eq!(reg.things, first);
}

#[test]
fn structured_slabs_win_and_legacy_gives_same_kinds() {
    let mut ctx = memory_context(4);
    let mut doc = String::new();
    for (i, kind) in tile_kinds().iter().enumerate() {
        doc.push_str(&format!(
            "[[slab]]\nx = {}\ny = {}\nkind = {kind}\n\n",
            i % DIMS.tiles_x,
            i / DIMS.tiles_x
        ));
    }
    let slbfx = ctx.paths().map_file(4, "slbfx");
    ctx.files_mut().insert(slbfx.clone(), doc);
    // Corrupt the legacy copy so a legacy read would show.
    let slb = ctx.paths().map_file(4, "slb");
    ctx.files_mut().insert(slb.clone(), vec![0; DIMS.tiles() * 2]);

    let report = ctx
        .load_level(4, &mut LevelEntities::new())
        .expect("structured")
        .value;
    assert_eq!(report.sources.get("slab"), Some(&Source::Structured));
    let structured = slab_kinds(&ctx);
    assert_eq!(structured, tile_kinds());

    ctx.files_mut().remove(&slbfx);
    let legacy = legacy_level(ctx.paths(), 4)
        .into_iter()
        .find(|(path, _)| *path == slb)
        .map(|(_, bytes)| bytes)
        .expect("slb bytes");
    ctx.files_mut().insert(slb, legacy);
    let report = ctx
        .load_level(4, &mut LevelEntities::new())
        .expect("legacy")
        .value;
    assert_eq!(report.sources.get("slab"), Some(&Source::Legacy));
    assert_eq!(slab_kinds(&ctx), structured);
}

#[test]
fn structured_entities_mix_with_legacy_ones() {
    let mut ctx = memory_context(5);
    let aptfx = ctx.paths().map_file(5, "aptfx");
    ctx.files_mut().insert(
        aptfx,
        "[common]\ncount = 2\n\n[actionpoint0]\nx = 512\ny = 512\nnum = 1\n\n\
         [actionpoint1]\nx = 768\ny = 256\nrange = 1280\nnum = 2\n",
    );
    let lgtfx = ctx.paths().map_file(5, "lgtfx");
    ctx.files_mut().insert(
        lgtfx,
        "[[light]]\nradius = 2560\nintensity = 36\nmappos = [1000, 1000, 512]\n",
    );

    let mut reg = LevelEntities::new();
    let report = ctx.load_level(5, &mut reg).expect("level 5").value;
    assert_eq!(report.sources.get("actionpoint"), Some(&Source::Structured));
    assert_eq!(report.sources.get("light"), Some(&Source::Structured));
    assert_eq!(report.sources.get("thing"), Some(&Source::Legacy));
    assert_eq!(reg.action_points.len(), 2);
    assert_eq!(reg.action_points[1].range, 1280);
    assert_eq!(reg.lights[0].intensity, 36);
}

#[test]
fn slab_set_columns_are_deduplicated() {
    let mut ctx = memory_context(6);
    let shared = column(9, [3, 3, 3, 0, 0, 0, 0, 0]);
    let twin = Column {
        use_count: 77,
        ..shared
    };
    let other = column(9, [3, 3, 4, 0, 0, 0, 0, 0]);
    let set = columns_file(&4i32.to_le_bytes(), &[Column::default(), shared, twin, other]);
    let entry = SlabSetEntry {
        columns: [-1, -2, -3, 0, 0, 12, -1, -2, -3],
    };
    let mut slabs = 1u16.to_le_bytes().to_vec();
    slabs.extend(entry.to_bytes());

    let data_clm = ctx.paths().data_file("slabs.clm");
    let data_dat = ctx.paths().data_file("slabs.dat");
    ctx.files_mut().insert(data_clm, set);
    ctx.files_mut().insert(data_dat, slabs);

    let loaded = ctx.load_level(6, &mut LevelEntities::new()).expect("level 6");
    assert_eq!(loaded.value.slabsets, 1);
    let cells = ctx.slabsets()[0].columns;
    assert_eq!(cells[0], cells[1]);
    assert_ne!(cells[0], cells[2]);
    assert_eq!(cells[3], cells[4]);
    assert_eq!(cells[6..], cells[..3]);
    assert!(ctx.pool().get(cells[0]).is_some_and(Column::is_permanent));
    assert_eq!(ctx.pool().get(cells[5]).map(|c| c.baseblock), Some(12));
}

#[test]
fn gzip_wrapped_level_files_load_from_disk() {
    let dir = temp_dir("dkstate_gzip_level");
    let paths = LevelPaths::new(dir.join("levels"), dir.join("data"));
    fs::create_dir_all(paths.levels_dir()).expect("create levels dir");
    for (path, bytes) in legacy_level(&paths, 7) {
        let is_slb = path.extension().is_some_and(|ext| ext == "slb");
        let contents = if is_slb {
            let mut enc = GzEncoder::new(Vec::new(), Compression::default());
            enc.write_all(&bytes).expect("compress");
            enc.finish().expect("finish gzip")
        } else {
            bytes
        };
        fs::write(&path, contents).expect("write level file");
    }

    let mut ctx = LevelLoadContext::on_disk(paths, DIMS);
    let report = ctx
        .load_level(7, &mut LevelEntities::new())
        .expect("level 7")
        .value;
    assert_eq!(report.things, 2);
    let kinds: Vec<u16> = ctx.map().slabs.iter().map(|s| s.kind).collect();
    assert_eq!(kinds, tile_kinds());

    fs::remove_dir_all(&dir).expect("remove temp dir");
}

#[test]
fn report_serializes_sources_by_name() {
    let mut ctx = memory_context(8);
    let report = ctx
        .load_level(8, &mut LevelEntities::new())
        .expect("level 8")
        .value;
    let json = serde_json::to_value(&report).expect("serialize report");
    assert_eq!(json["level"], 8);
    assert_eq!(json["sources"]["slab"], "legacy");
    assert_eq!(json["sources"]["wlb"], "derived");
    assert!(json["sources"].get("light").is_none());
    assert_eq!(json["things"], 2);
}

#[test]
fn oversized_gzip_slab_file_is_refused_by_its_trailer() {
    let dir = temp_dir("dkstate_gzip_bomb");
    let paths = LevelPaths::new(dir.join("levels"), dir.join("data"));
    fs::create_dir_all(paths.levels_dir()).expect("create levels dir");
    for (path, bytes) in legacy_level(&paths, 9) {
        fs::write(&path, bytes).expect("write level file");
    }
    let mut enc = GzEncoder::new(Vec::new(), Compression::fast());
    enc.write_all(&vec![0u8; 2 * 1024 * 1024]).expect("compress");
    fs::write(paths.map_file(9, "slb"), enc.finish().expect("finish gzip")).expect("write slb");

    let mut ctx = LevelLoadContext::on_disk(paths, DIMS);
    let err = ctx
        .load_level(9, &mut LevelEntities::new())
        .expect_err("oversized slabs fail the level");
    assert!(matches!(err, LoadError::TooLarge { actual: 2_097_152, .. }));

    fs::remove_dir_all(&dir).expect("remove temp dir");
}
