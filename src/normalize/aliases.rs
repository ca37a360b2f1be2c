// src/normalize/aliases.rs
//! # Alias table
//!
//! Data-driven folding of team and competition spellings so that every source converges
//! on the same key ("Man Utd", "Manchester United FC" → `manchester united`).
//!
//! - Loads from TOML or JSON (same schema), or falls back to `default_seed()`.
//! - Keys and values are folded on load, so files may use any spelling.
//! - Lookup order for a team: token rewrites → stop-word removal → full-name alias.

use serde::Deserialize;
use std::collections::{BTreeSet, HashMap};
use std::fs;
use std::path::{Path, PathBuf};

use super::fold_tokens;
use crate::config::ConfigError;

pub const ENV_ALIASES_PATH: &str = "FOOTBALLAPI_ALIASES_PATH";
pub const DEFAULT_ALIASES_TOML: &str = "config/team_aliases.toml";
pub const DEFAULT_ALIASES_JSON: &str = "config/team_aliases.json";

/// On-disk schema. Every section is optional; a missing `stop_words` keeps the seed list.
#[derive(Debug, Clone, Default, Deserialize)]
struct AliasFile {
    #[serde(default)]
    stop_words: Option<Vec<String>>,
    #[serde(default)]
    tokens: HashMap<String, String>,
    #[serde(default)]
    teams: HashMap<String, String>,
    #[serde(default)]
    competitions: HashMap<String, String>,
}

#[derive(Debug, Clone, Default)]
pub struct AliasTable {
    stop_words: BTreeSet<String>,
    tokens: HashMap<String, String>,
    teams: HashMap<String, String>,
    competitions: HashMap<String, String>,
}

impl AliasTable {
    /// Table with no aliases and no stop words; names are only folded.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Normalized key for a team name. Never fails; empty input gives an empty key.
    pub fn team_key(&self, raw: &str) -> String {
        let base = self.strip_team_tokens(raw);
        match self.teams.get(&base) {
            Some(canon) => canon.clone(),
            None => base,
        }
    }

    /// Normalized key for a competition name.
    pub fn competition_key(&self, raw: &str) -> String {
        let base = fold_tokens(raw).join(" ");
        match self.competitions.get(&base) {
            Some(canon) => canon.clone(),
            None => base,
        }
    }

    pub fn team_alias_count(&self) -> usize {
        self.teams.len()
    }

    pub fn competition_alias_count(&self) -> usize {
        self.competitions.len()
    }

    /// Fold, rewrite tokens and drop stop words. Keeps the unstripped tokens when the
    /// name consists of stop words only ("Athletic Club").
    fn strip_team_tokens(&self, raw: &str) -> String {
        let tokens: Vec<String> = fold_tokens(raw)
            .into_iter()
            .map(|t| self.tokens.get(&t).cloned().unwrap_or(t))
            .collect();
        let kept: Vec<&str> = tokens
            .iter()
            .filter(|t| !self.stop_words.contains(t.as_str()))
            .map(String::as_str)
            .collect();
        if kept.is_empty() {
            tokens.join(" ")
        } else {
            kept.join(" ")
        }
    }

    fn from_file(file: AliasFile) -> Self {
        let seed_stop_words = || default_stop_words().iter().map(|s| s.to_string()).collect();
        let stop_words: BTreeSet<String> = match file.stop_words {
            Some(list) => list
                .iter()
                .flat_map(|w| fold_tokens(w))
                .collect(),
            None => seed_stop_words(),
        };

        let mut table = Self {
            stop_words,
            tokens: HashMap::new(),
            teams: HashMap::new(),
            competitions: HashMap::new(),
        };

        for (from, to) in file.tokens {
            let from = fold_tokens(&from).join(" ");
            let to = fold_tokens(&to).join(" ");
            if !from.is_empty() && !to.is_empty() && !from.contains(' ') {
                table.tokens.insert(from, to);
            }
        }

        // Team aliases are folded with the finished token/stop-word rules so that a file
        // entry like "Man. Utd FC" matches what `team_key` computes for that spelling.
        let mut teams = HashMap::with_capacity(file.teams.len());
        for (from, to) in file.teams {
            let from = table.strip_team_tokens(&from);
            let to = table.strip_team_tokens(&to);
            if !from.is_empty() && !to.is_empty() && from != to {
                teams.insert(from, to);
            }
        }
        table.teams = teams;

        for (from, to) in file.competitions {
            let from = fold_tokens(&from).join(" ");
            let to = fold_tokens(&to).join(" ");
            if !from.is_empty() && !to.is_empty() && from != to {
                table.competitions.insert(from, to);
            }
        }

        table
    }

    /// Parse a TOML document.
    pub fn from_toml_str(s: &str) -> Result<Self, String> {
        let file: AliasFile = toml::from_str(s).map_err(|e| e.to_string())?;
        Ok(Self::from_file(file))
    }

    /// Parse a JSON document.
    pub fn from_json_str(s: &str) -> Result<Self, String> {
        let file: AliasFile = serde_json::from_str(s).map_err(|e| e.to_string())?;
        Ok(Self::from_file(file))
    }

    /// Load from an explicit path. The extension picks the parser; the other format is
    /// tried as a fallback.
    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::AliasTable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        let ext = path
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default()
            .to_ascii_lowercase();

        let parsed = if ext == "json" {
            Self::from_json_str(&content).or_else(|e| Self::from_toml_str(&content).map_err(|_| e))
        } else {
            Self::from_toml_str(&content).or_else(|e| Self::from_json_str(&content).map_err(|_| e))
        };
        parsed.map_err(|reason| ConfigError::AliasTable {
            path: path.to_path_buf(),
            reason,
        })
    }

    /// Resolve the table using env var + fallbacks:
    /// 1) $FOOTBALLAPI_ALIASES_PATH (must exist)
    /// 2) config/team_aliases.toml
    /// 3) config/team_aliases.json
    /// 4) built-in seed
    pub fn load_default() -> Result<Self, ConfigError> {
        Self::load_with_override(std::env::var(ENV_ALIASES_PATH).ok().map(PathBuf::from))
    }

    pub fn load_with_override(path: Option<PathBuf>) -> Result<Self, ConfigError> {
        if let Some(pb) = path {
            if !pb.exists() {
                return Err(ConfigError::AliasTable {
                    path: pb,
                    reason: "file does not exist".to_string(),
                });
            }
            return Self::load_from(&pb);
        }
        for candidate in [DEFAULT_ALIASES_TOML, DEFAULT_ALIASES_JSON] {
            let p = PathBuf::from(candidate);
            if p.exists() {
                return Self::load_from(&p);
            }
        }
        Ok(Self::default_seed())
    }

    /// Built-in seed with the most common spelling variants across the four sources.
    pub fn default_seed() -> Self {
        let mut file = AliasFile::default();

        file.tokens.insert("utd".into(), "united".into());

        for (a, c) in [
            ("man united", "manchester united"),
            ("man utd", "manchester united"),
            ("man city", "manchester city"),
            ("spurs", "tottenham hotspur"),
            ("tottenham", "tottenham hotspur"),
            ("wolves", "wolverhampton wanderers"),
            ("wolverhampton", "wolverhampton wanderers"),
            ("newcastle", "newcastle united"),
            ("west ham", "west ham united"),
            ("brighton", "brighton & hove albion"),
            ("brighton and hove albion", "brighton & hove albion"),
            ("nottm forest", "nottingham forest"),
            ("nott'm forest", "nottingham forest"),
            ("leicester", "leicester city"),
            ("leeds", "leeds united"),
            ("sheffield weds", "sheffield wednesday"),
            ("inter", "internazionale"),
            ("inter milan", "internazionale"),
            ("psg", "paris saint-germain"),
            ("paris sg", "paris saint-germain"),
            ("bayern", "bayern munich"),
            ("bayern münchen", "bayern munich"),
            ("bayern munchen", "bayern munich"),
            ("dortmund", "borussia dortmund"),
            ("bvb", "borussia dortmund"),
            ("gladbach", "borussia monchengladbach"),
            ("m'gladbach", "borussia monchengladbach"),
            ("atletico de madrid", "atletico madrid"),
            ("atleti", "atletico madrid"),
            ("athletic club", "athletic bilbao"),
            ("real betis balompie", "real betis"),
            ("betis", "real betis"),
            ("sporting lisbon", "sporting cp"),
            ("sporting", "sporting cp"),
            ("ny red bulls", "new york red bulls"),
            ("la galaxy", "los angeles galaxy"),
        ] {
            file.teams.insert(a.to_string(), c.to_string());
        }

        for (a, c) in [
            ("english premier league", "premier league"),
            ("epl", "premier league"),
            ("laliga", "la liga"),
            ("spanish laliga", "la liga"),
            ("laliga ea sports", "la liga"),
            ("italian serie a", "serie a"),
            ("german bundesliga", "bundesliga"),
            ("french ligue 1", "ligue 1"),
            ("uefa champions league", "champions league"),
            ("uefa europa league", "europa league"),
            ("mls", "major league soccer"),
        ] {
            file.competitions.insert(a.to_string(), c.to_string());
        }

        Self::from_file(file)
    }
}

/// Club-form words that carry no identity ("FC", "AFC", "Club", ...).
fn default_stop_words() -> &'static [&'static str] {
    &[
        "ac", "afc", "cf", "club", "fc", "fk", "foot", "football", "if", "nk", "rc", "sc", "sk",
        "sv",
    ]
}
