use std::fs;
use std::path::PathBuf;
use std::process;

use clap::{Args, Parser, Subcommand};
use dkstate_core::container::decode_container;
use dkstate_core::continue_game::{is_available, load_continue};
use dkstate_core::{
    CampaignInfo, CampaignRegistry, CatalogueEntry, DiskFiles, GameSnapshot, LevelEntities,
    LevelLoadContext, LevelPaths, LoadError, LoadResult, Loaded, MapDimensions, PacketReplay,
    SAVE_SLOTS_COUNT, SaveGames, SaveMetadata, SavePaths, SavedGame,
};
use serde_json::{Map as JsonMap, Value as JsonValue, json};

#[derive(Debug, Parser)]
#[command(author, version, about)]
struct Cli {
    /// Directory holding save slots, packet files and the continue file.
    #[arg(long = "save-dir", value_name = "DIR", default_value = "save", global = true)]
    save_dir: PathBuf,
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// List the save slots that hold a readable game.
    Slots,
    /// Decode a save slot, a packet file or any container file.
    Inspect(InspectArgs),
    /// Check whether the continue file can resume a campaign level.
    Continue(ContinueArgs),
    /// Load a level from its legacy or structured files.
    Level(LevelArgs),
    /// Write a fresh save for a level into a slot.
    Save(SaveArgs),
}

#[derive(Debug, Args)]
#[group(required = true, multiple = false)]
struct InspectArgs {
    #[arg(long)]
    slot: Option<usize>,
    #[arg(long)]
    packet: Option<usize>,
    #[arg(long, value_name = "FILE")]
    path: Option<PathBuf>,
}

#[derive(Debug, Args)]
struct ContinueArgs {
    /// Campaign file name the continue file is expected to name.
    #[arg(long, value_name = "FNAME", default_value = "keeporig.cfg")]
    campaign: String,
    /// Single player levels of the campaign, e.g. `1-20,105`.
    #[arg(long, value_name = "LIST", default_value = "1-20", value_parser = parse_level_list)]
    levels: LevelList,
}

#[derive(Debug, Args)]
struct LevelArgs {
    level: u32,
    #[arg(long = "levels-dir", value_name = "DIR", default_value = "levels")]
    levels_dir: PathBuf,
    #[arg(long = "data-dir", value_name = "DIR", default_value = "data")]
    data_dir: PathBuf,
    /// Map size in slabs.
    #[arg(long = "map-size", value_name = "WxH", value_parser = parse_map_size)]
    map_size: Option<MapDimensions>,
}

#[derive(Debug, Args)]
struct SaveArgs {
    /// Slot to write; the first free slot when omitted.
    #[arg(long)]
    slot: Option<usize>,
    #[arg(long)]
    level: i32,
    #[arg(long, default_value = "")]
    name: String,
    #[arg(long, default_value = "")]
    player: String,
    #[arg(long, value_name = "FNAME", default_value = "keeporig.cfg")]
    campaign: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct LevelList(Vec<i32>);

fn main() {
    env_logger::init();
    let cli = Cli::parse();
    let paths = SavePaths::new(&cli.save_dir);

    let json = match &cli.command {
        Command::Slots => slots(paths),
        Command::Inspect(args) => inspect(paths, args),
        Command::Continue(args) => continue_game(&paths, args),
        Command::Level(args) => level(args),
        Command::Save(args) => save(paths, args),
    };

    if cli.json {
        let rendered = serde_json::to_string_pretty(&json).unwrap_or_else(|e| {
            eprintln!("Error rendering JSON output: {e}");
            process::exit(1);
        });
        println!("{rendered}");
    } else {
        print_pairs(&json, "");
    }
}

fn slots(paths: SavePaths) -> JsonValue {
    let mut games = SaveGames::on_disk(paths);
    let in_use = games.scan_catalogue();
    log::info!(
        "{in_use} of {SAVE_SLOTS_COUNT} slots in use under {}",
        games.paths().save_dir.display()
    );
    let slots: Vec<JsonValue> = games
        .catalogue()
        .entries()
        .iter()
        .enumerate()
        .filter(|(_, entry)| entry.in_use())
        .map(|(slot, entry)| {
            let mut obj = entry_to_json(entry);
            obj.insert("slot".to_string(), json!(slot));
            JsonValue::Object(obj)
        })
        .collect();
    json!({
        "slots_total": SAVE_SLOTS_COUNT,
        "in_use": games.catalogue().count_in_use(),
        "slots": slots,
    })
}

fn inspect(paths: SavePaths, args: &InspectArgs) -> JsonValue {
    let loaded = if let Some(slot) = args.slot {
        let mut games = SaveGames::on_disk(paths);
        games.scan_catalogue();
        games.load(slot)
    } else if let Some(num) = args.packet {
        SaveGames::on_disk(paths).load_packet_file(num)
    } else if let Some(path) = &args.path {
        let bytes = fs::read(path).unwrap_or_else(|e| {
            eprintln!("Error reading {}: {e}", path.display());
            process::exit(1);
        });
        decode_container(&bytes)
    } else {
        eprintln!("one of --slot, --packet or --path is required");
        process::exit(2);
    };

    let Loaded { value, warnings } = loaded;
    for warning in &warnings {
        log::warn!("{warning}");
    }
    let mut obj = match &value {
        LoadResult::FullGame(game) => saved_game_to_json(game),
        LoadResult::PacketReplayStart(replay) => replay_to_json(replay),
        LoadResult::PacketReplayContinue(game, replay) => {
            let mut obj = saved_game_to_json(game);
            obj.extend(replay_to_json(replay));
            obj
        }
        LoadResult::Failed(err) => {
            eprintln!("Error loading save: {err}");
            process::exit(1);
        }
    };
    obj.insert("kind".to_string(), json!(value.kind()));
    obj.insert("warnings".to_string(), warnings_to_json(&warnings));
    JsonValue::Object(obj)
}

fn continue_game(paths: &SavePaths, args: &ContinueArgs) -> JsonValue {
    let mut campaigns = CampaignRegistry::new();
    campaigns.register(
        CampaignInfo::new(&args.campaign, &args.campaign)
            .with_single_levels(args.levels.0.iter().copied()),
    );

    if !is_available(&DiskFiles, paths, &mut campaigns) {
        log::info!("{} cannot be resumed", paths.continue_file().display());
        return json!({ "available": false });
    }
    match load_continue(&DiskFiles, paths, &mut campaigns) {
        Ok(game) => json!({
            "available": true,
            "level": game.level,
            "campaign_fname": game.campaign_fname,
            "bonuses_found": game.bonuses_found,
        }),
        Err(e) => {
            eprintln!("Error reading continue file: {e}");
            process::exit(1);
        }
    }
}

fn level(args: &LevelArgs) -> JsonValue {
    let paths = LevelPaths::new(&args.levels_dir, &args.data_dir);
    let dims = args.map_size.unwrap_or_default();
    log::debug!(
        "loading level {} from {} as {}x{} slabs",
        args.level,
        paths.levels_dir().display(),
        dims.tiles_x,
        dims.tiles_y
    );
    let mut ctx = LevelLoadContext::on_disk(paths, dims);
    let mut entities = LevelEntities::new();
    let loaded = ctx.load_level(args.level, &mut entities).unwrap_or_else(|e| {
        eprintln!("Error loading level {}: {e}", args.level);
        process::exit(1);
    });

    let mut obj = match serde_json::to_value(&loaded.value) {
        Ok(JsonValue::Object(obj)) => obj,
        _ => JsonMap::new(),
    };
    obj.insert("warnings".to_string(), warnings_to_json(&loaded.warnings));
    JsonValue::Object(obj)
}

fn save(paths: SavePaths, args: &SaveArgs) -> JsonValue {
    let mut games = SaveGames::on_disk(paths);
    games.scan_catalogue();
    let slot = args
        .slot
        .or_else(|| games.catalogue().first_free_slot())
        .unwrap_or_else(|| {
            eprintln!("Every save slot is in use; pass --slot to overwrite one");
            process::exit(1);
        });

    let meta = SaveMetadata {
        textname: args.name.clone(),
        level_num: args.level,
        campaign_name: args.campaign.clone(),
        campaign_fname: args.campaign.clone(),
        player_name: args.player.clone(),
    };
    let mut snapshot = GameSnapshot::default();
    snapshot.world.loaded_level_number = args.level;
    snapshot.world.campaign_fname = args.campaign.clone();

    log::debug!("writing level {} into slot {slot}", args.level);
    let written = games.save(slot, &meta, &snapshot).unwrap_or_else(|e| {
        eprintln!("Error writing slot {slot}: {e}");
        process::exit(1);
    });
    json!({
        "slot": slot,
        "path": written.display().to_string(),
    })
}

fn entry_to_json(entry: &CatalogueEntry) -> JsonMap<String, JsonValue> {
    let mut obj = JsonMap::new();
    obj.insert("level".to_string(), json!(entry.level_num));
    obj.insert("name".to_string(), json!(entry.textname));
    obj.insert("campaign".to_string(), json!(entry.campaign_name));
    obj.insert("campaign_fname".to_string(), json!(entry.campaign_fname));
    obj.insert("player".to_string(), json!(entry.player_name));
    obj.insert("version".to_string(), json!(entry.version.to_string()));
    obj
}

fn saved_game_to_json(game: &SavedGame) -> JsonMap<String, JsonValue> {
    let mut obj = entry_to_json(&game.entry);
    let world = &game.snapshot.world;
    obj.insert("loaded_level".to_string(), json!(world.loaded_level_number));
    obj.insert("continue_level".to_string(), json!(world.continue_level_number));
    obj.insert("game_turn".to_string(), json!(world.game_turn));
    obj.insert(
        "script_bytes".to_string(),
        json!(game.snapshot.script.data.len()),
    );
    obj
}

fn replay_to_json(replay: &PacketReplay) -> JsonMap<String, JsonValue> {
    let mut obj = replay
        .entry
        .as_ref()
        .map(entry_to_json)
        .unwrap_or_default();
    obj.insert("replay_level".to_string(), json!(replay.header.level_num));
    obj.insert(
        "replay_version".to_string(),
        json!(replay.header.version.to_string()),
    );
    obj.insert("packets".to_string(), json!(replay.packets.len()));
    obj
}

fn warnings_to_json(warnings: &[LoadError]) -> JsonValue {
    JsonValue::Array(warnings.iter().map(|w| json!(w.to_string())).collect())
}

/// Prints `key=value` lines, flattening nested objects with dotted keys.
fn print_pairs(value: &JsonValue, prefix: &str) {
    match value {
        JsonValue::Object(obj) => {
            for (key, value) in obj {
                let key = if prefix.is_empty() {
                    key.clone()
                } else {
                    format!("{prefix}.{key}")
                };
                print_pairs(value, &key);
            }
        }
        JsonValue::Array(items) if items.iter().any(JsonValue::is_object) => {
            for (i, item) in items.iter().enumerate() {
                print_pairs(item, &format!("{prefix}.{i}"));
            }
        }
        JsonValue::Array(items) => {
            let joined: Vec<String> = items.iter().map(scalar_to_string).collect();
            println!("{prefix}={}", joined.join(","));
        }
        other => println!("{prefix}={}", scalar_to_string(other)),
    }
}

fn scalar_to_string(value: &JsonValue) -> String {
    match value {
        JsonValue::String(s) => s.clone(),
        other => other.to_string(),
    }
}

fn parse_level_list(value: &str) -> Result<LevelList, String> {
    let mut levels = Vec::new();
    for part in value.split(',').map(str::trim).filter(|p| !p.is_empty()) {
        match part.split_once('-') {
            Some((start, end)) => {
                let start = parse_level(start)?;
                let end = parse_level(end)?;
                if start > end {
                    return Err(format!("empty level range {part:?}"));
                }
                levels.extend(start..=end);
            }
            None => levels.push(parse_level(part)?),
        }
    }
    Ok(LevelList(levels))
}

fn parse_level(value: &str) -> Result<i32, String> {
    value
        .trim()
        .parse()
        .map_err(|_| format!("invalid level number {value:?}"))
}

fn parse_map_size(value: &str) -> Result<MapDimensions, String> {
    let (w, h) = value
        .split_once(['x', 'X'])
        .ok_or_else(|| format!("expected WxH, got {value:?}"))?;
    let parse = |s: &str| {
        s.trim()
            .parse::<usize>()
            .ok()
            .filter(|n| *n > 0)
            .ok_or_else(|| format!("invalid map size {value:?}"))
    };
    Ok(MapDimensions::new(parse(w)?, parse(h)?))
}
