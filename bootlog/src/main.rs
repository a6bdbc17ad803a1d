use std::fs;
use std::io::{self, Read, Write};
use std::path::PathBuf;

use anyhow::{Context, bail};
use bootlog::config::{Config, load_config};
use bootlog::reader;
use bootlog::volume::DirVolume;
use bootlog::volume::dir::DirLogDirectory;
use bootlog::{FlushTrigger, LogEngine, MemoryLog};
use clap::{Parser, Subcommand};
use log::{Level, LevelFilter, info};

#[derive(Parser)]
#[command(name = "bootlog")]
#[command(about = "Persist a boot diagnostic log to rotating files", long_about = None)]
struct Cli {
    /// YAML configuration file; built-in defaults when omitted
    #[arg(long, global = true, value_name = "CONFIG")]
    config: Option<String>,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Append a log to every volume using ./bootlog persist --input boot.log /mnt/a")]
    Persist {
        /// Log text to persist, `-` for stdin
        #[arg(long, value_name = "INPUT", default_value = "-")]
        input: String,
        #[arg(value_name = "VOLUME_DIR", required = true)]
        volumes: Vec<PathBuf>,
    },
    #[command(about = "Show the file set of a volume using ./bootlog inspect /mnt/a")]
    Inspect {
        #[arg(value_name = "VOLUME_DIR")]
        volume: PathBuf,
    },
    #[command(about = "Print the log stored in a slot using ./bootlog cat /mnt/a --slot 3")]
    Cat {
        #[arg(value_name = "VOLUME_DIR")]
        volume: PathBuf,
        /// Slot to print; defaults to the one named by the index file
        #[arg(long)]
        slot: Option<u8>,
    },
}

fn main() -> Result<(), anyhow::Error> {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let cli = Cli::parse();
    let cfg = match &cli.config {
        Some(path) => load_config(path)?,
        None => Config::default(),
    };

    match cli.command {
        Commands::Persist { input, volumes } => persist(&cfg, &input, volumes),
        Commands::Inspect { volume } => inspect(&cfg, volume),
        Commands::Cat { volume, slot } => cat(&cfg, volume, slot),
    }
}

fn read_input(input: &str) -> anyhow::Result<Vec<u8>> {
    if input == "-" {
        let mut buf = Vec::new();
        io::stdin()
            .read_to_end(&mut buf)
            .context("failed to read log from stdin")?;
        return Ok(buf);
    }
    fs::read(input).with_context(|| format!("failed to read log from {input}"))
}

/// Splits an explicit `[ERROR] `, `[WARN] `, `[INFO] `, `[DEBUG] ` or `[TRACE] `
/// tag off a line.
fn split_level(line: &str) -> Option<(Level, &str)> {
    let (tag, message) = line.strip_prefix('[')?.split_once("] ")?;
    let level = match tag {
        "ERROR" => Level::Error,
        "WARN" => Level::Warn,
        "INFO" => Level::Info,
        "DEBUG" => Level::Debug,
        "TRACE" => Level::Trace,
        _ => return None,
    };
    Some((level, message))
}

/// Tagged lines become level entries subject to `min_level`; every other line,
/// blank ones included, is kept verbatim.
fn load_log(text: &str, min_level: LevelFilter) -> MemoryLog {
    let mut log = MemoryLog::new(min_level);
    for line in text.lines() {
        match split_level(line) {
            Some((level, message)) => log.push(level, message),
            None => log.push_raw(format!("{line}\n").as_bytes()),
        }
    }
    log
}

fn persist(cfg: &Config, input: &str, volumes: Vec<PathBuf>) -> anyhow::Result<()> {
    if !cfg.enabled {
        info!("boot log persistence is disabled");
        return Ok(());
    }
    let layout = cfg.layout()?;
    let text = read_input(input)?;
    let log = load_log(&String::from_utf8_lossy(&text), cfg.min_level()?);

    let engine = LogEngine::new(layout);
    for root in volumes {
        engine.on_volume_arrival(DirVolume::with_log_dir(root, cfg.log_dir.as_str()));
    }
    if engine.is_empty() {
        bail!("no usable volume");
    }
    engine.on_flush_trigger(FlushTrigger::Explicit, &log);
    for status in engine.devices() {
        println!("{status}");
    }
    Ok(())
}

fn inspect(cfg: &Config, volume: PathBuf) -> anyhow::Result<()> {
    let layout = cfg.layout()?;
    let dir = DirLogDirectory::new(volume.join(&cfg.log_dir));
    let report = reader::inspect(&dir, &layout)?;
    match report.last_slot {
        Some(0) => println!("index: no slot used yet"),
        Some(slot) => println!("index: last slot {slot}"),
        None => println!("index: missing or unreadable"),
    }
    for file in &report.files {
        let state = match file.size {
            None => "missing".to_string(),
            Some(size) if file.is_valid() => format!("{size} bytes"),
            Some(size) => format!("{size} bytes, expected {}", file.expected),
        };
        println!("{:<16}{state}", file.name);
    }
    Ok(())
}

fn cat(cfg: &Config, volume: PathBuf, slot: Option<u8>) -> anyhow::Result<()> {
    let layout = cfg.layout()?;
    let dir = DirLogDirectory::new(volume.join(&cfg.log_dir));
    let slot = match slot {
        Some(slot) => slot,
        None => match reader::last_slot(&dir)? {
            Some(slot) if slot > 0 => slot,
            _ => bail!("no slot has been written on {}", volume.display()),
        },
    };
    let Some(content) = reader::read_slot(&dir, &layout, slot)? else {
        bail!("slot {slot} does not exist on {}", volume.display());
    };
    io::stdout().write_all(&content)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_split_level_needs_explicit_tag() {
        assert_eq!(split_level("[WARN] disk slow"), Some((Level::Warn, "disk slow")));
        assert_eq!(split_level("[ERROR] no boot device"), Some((Level::Error, "no boot device")));
        assert_eq!(split_level("Error loading driver X"), None);
        assert_eq!(split_level("[info] lower case"), None);
        assert_eq!(split_level("[NOTICE] unknown"), None);
        assert_eq!(split_level("[INFO]"), None);
    }

    #[test]
    fn test_untagged_lines_are_kept_verbatim() {
        let log = load_log("Trace buffer allocated\n\nDebug port ready", LevelFilter::Info);
        assert_eq!(log.as_bytes(), b"Trace buffer allocated\n\nDebug port ready\n");
    }

    #[test]
    fn test_tagged_lines_follow_min_level() {
        let log = load_log("[DEBUG] probing\n[WARN] disk slow\nplain\n", LevelFilter::Info);
        let text = String::from_utf8(log.as_bytes().to_vec()).unwrap();
        assert!(!text.contains("probing"));
        assert!(text.ends_with("] WARN  disk slow\nplain\n"));
        assert_eq!(text.lines().count(), 2);
    }
}
