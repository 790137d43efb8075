//! Append-only session log, one JSON object per line.
//!
//! Files are named `relay-session-<YYYYmmdd-HHMMSS>_<suffix>.jsonl` so a
//! plain name sort is chronological. Entries hold raw text only.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result, bail};
use chrono::{DateTime, Utc};
use rand::Rng;
use serde::{Deserialize, Serialize};

const FILE_PREFIX: &str = "relay-session-";
const FILE_EXT: &str = "jsonl";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    fn tag(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TranscriptEntry {
    pub timestamp: DateTime<Utc>,
    pub role: Role,
    pub content: String,
}

impl TranscriptEntry {
    pub fn now(role: Role, content: impl Into<String>) -> Self {
        Self { timestamp: Utc::now(), role, content: content.into() }
    }
}

/// Handle on one session file.
#[derive(Debug, Clone)]
pub struct Transcript {
    path: PathBuf,
}

impl Transcript {
    /// Start a fresh session file in `dir`.
    pub fn create(dir: &Path) -> Result<Self> {
        fs::create_dir_all(dir)
            .with_context(|| format!("Failed to create transcript dir {}", dir.display()))?;

        let suffix: String = rand::rng()
            .sample_iter(rand::distr::Alphanumeric)
            .take(6)
            .map(char::from)
            .collect();
        let name = format!(
            "{FILE_PREFIX}{}_{suffix}.{FILE_EXT}",
            Utc::now().format("%Y%m%d-%H%M%S")
        );
        Ok(Self { path: dir.join(name) })
    }

    pub fn open(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    /// Find a session by `last`, by file path, or by an id prefix such as
    /// `20240501-1200`.
    pub fn resolve(dir: &Path, id: &str) -> Result<Self> {
        if id == "last" {
            return match latest(dir)? {
                Some(path) => Ok(Self::open(path)),
                None => bail!("No saved sessions in {}", dir.display()),
            };
        }

        let as_path = Path::new(id);
        if as_path.is_file() {
            return Ok(Self::open(as_path));
        }

        let wanted = format!("{FILE_PREFIX}{id}");
        let mut matches: Vec<PathBuf> = session_files(dir)?
            .into_iter()
            .filter(|p| file_name(p).is_some_and(|n| n.starts_with(&wanted)))
            .collect();

        match matches.len() {
            0 => bail!("No session matching '{id}' in {}", dir.display()),
            1 => Ok(Self::open(matches.remove(0))),
            n => bail!("'{id}' matches {n} sessions; give more of the timestamp"),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn append(&self, entry: &TranscriptEntry) -> Result<()> {
        let mut line = serde_json::to_string(entry).context("Failed to encode transcript entry")?;
        line.push('\n');

        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)
            .with_context(|| format!("Failed to open transcript {}", self.path.display()))?;
        file.write_all(line.as_bytes())
            .with_context(|| format!("Failed to append to {}", self.path.display()))
    }

    /// All entries in the order they were appended.
    pub fn load(&self) -> Result<Vec<TranscriptEntry>> {
        let text = fs::read_to_string(&self.path)
            .with_context(|| format!("Failed to read transcript {}", self.path.display()))?;

        text.lines()
            .enumerate()
            .filter(|(_, l)| !l.trim().is_empty())
            .map(|(i, l)| {
                serde_json::from_str(l)
                    .with_context(|| format!("{}:{}: bad transcript line", self.path.display(), i + 1))
            })
            .collect()
    }
}

fn file_name(p: &Path) -> Option<&str> {
    p.file_name()?.to_str()
}

fn session_files(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.exists() {
        return Ok(Vec::new());
    }
    let mut files: Vec<PathBuf> = fs::read_dir(dir)
        .with_context(|| format!("Failed to list {}", dir.display()))?
        .filter_map(|e| e.ok().map(|e| e.path()))
        .filter(|p| {
            file_name(p).is_some_and(|n| n.starts_with(FILE_PREFIX))
                && p.extension().is_some_and(|e| e == FILE_EXT)
        })
        .collect();
    files.sort();
    Ok(files)
}

/// Most recent session file in `dir`, if any.
pub fn latest(dir: &Path) -> Result<Option<PathBuf>> {
    Ok(session_files(dir)?.pop())
}

/// Prior turns as a prompt block.
pub fn render_conversation(entries: &[TranscriptEntry]) -> String {
    if entries.is_empty() {
        return String::new();
    }
    let mut out = String::from("<conversation>\n");
    for e in entries {
        let tag = e.role.tag();
        out.push_str(&format!("<{tag}>\n{}\n</{tag}>\n", e.content));
    }
    out.push_str("</conversation>\n");
    out
}
