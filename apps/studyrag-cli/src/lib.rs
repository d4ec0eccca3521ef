//! Argument parsing and chunk-file loading for the `studyrag` binary.
use anyhow::{anyhow, bail, Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use walkdir::WalkDir;

use studyrag_core::types::Chunk;

pub const USAGE: &str = "Usage: studyrag <command> [args...]

Commands:
  ingest <chunks.jsonl|dir> [--force]     embed and index chunk records
  search <query> [--limit N] [--source S] rank indexed chunks for a query
  stats                                   print index name, count and location
  reset                                   delete every indexed chunk
  classify <failure text>                 show how a generation failure is classified";

#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Ingest { path: PathBuf, force: bool },
    Search { query: String, limit: Option<usize>, source: Option<String> },
    Stats,
    Reset,
    Classify { text: String },
}

pub fn parse_args(args: &[String]) -> Result<Command> {
    let (cmd, rest) = args.split_first().ok_or_else(|| anyhow!("missing command"))?;
    match cmd.as_str() {
        "ingest" => {
            let mut path = None;
            let mut force = false;
            for a in rest {
                match a.as_str() {
                    "--force" | "-f" => force = true,
                    _ if !a.starts_with('-') => path = Some(PathBuf::from(a)),
                    other => bail!("unknown ingest flag {other}"),
                }
            }
            let path = path.ok_or_else(|| anyhow!("ingest requires a chunks file or directory"))?;
            Ok(Command::Ingest { path, force })
        }
        "search" => {
            let mut words = Vec::new();
            let mut limit = None;
            let mut source = None;
            let mut i = 0;
            while i < rest.len() {
                match rest[i].as_str() {
                    "--limit" | "-k" => {
                        let v = rest
                            .get(i + 1)
                            .ok_or_else(|| anyhow!("--limit requires a number"))?;
                        let n = v
                            .parse::<usize>()
                            .with_context(|| format!("--limit requires a number, got {v}"))?;
                        limit = Some(n);
                        i += 1;
                    }
                    "--source" | "-s" => {
                        let v = rest
                            .get(i + 1)
                            .ok_or_else(|| anyhow!("--source requires a value"))?;
                        source = Some(v.clone());
                        i += 1;
                    }
                    w => words.push(w.to_string()),
                }
                i += 1;
            }
            if words.is_empty() {
                bail!("search requires a query");
            }
            Ok(Command::Search { query: words.join(" "), limit, source })
        }
        "stats" => Ok(Command::Stats),
        "reset" => Ok(Command::Reset),
        "classify" => {
            if rest.is_empty() {
                bail!("classify requires the failure text");
            }
            Ok(Command::Classify { text: rest.join(" ") })
        }
        other => bail!("unknown command {other}"),
    }
}

/// `.jsonl` files under `path` (or `path` itself), sorted for stable ingestion order.
pub fn chunk_files(path: &Path) -> Result<Vec<PathBuf>> {
    if path.is_file() {
        return Ok(vec![path.to_path_buf()]);
    }
    if !path.is_dir() {
        bail!("{} does not exist", path.display());
    }
    let mut files: Vec<PathBuf> = WalkDir::new(path)
        .into_iter()
        .filter_map(|e| e.ok())
        .filter(|e| e.file_type().is_file())
        .map(|e| e.into_path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("jsonl"))
        .collect();
    files.sort();
    Ok(files)
}

/// One `Chunk` JSON object per non-blank line.
pub fn read_chunks(file: &Path) -> Result<Vec<Chunk>> {
    let raw = fs::read_to_string(file).with_context(|| format!("reading {}", file.display()))?;
    raw.lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(n, line)| {
            serde_json::from_str::<Chunk>(line)
                .with_context(|| format!("{}:{}: invalid chunk record", file.display(), n + 1))
        })
        .collect()
}

pub fn load_chunks(path: &Path) -> Result<Vec<Chunk>> {
    let mut chunks = Vec::new();
    for file in chunk_files(path)? {
        chunks.extend(read_chunks(&file)?);
    }
    Ok(chunks)
}
