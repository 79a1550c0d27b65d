//! State schema: dotted path -> metadata
//!
//! The schema is the single source of truth for feature ordering, reward
//! attribution, type validation, sort order and prompt hints. It is built
//! once at startup and shared read-only behind an `Arc`.

use crate::core::error::{ReconError, Result};
use crate::core::types::{EncoderKind, ValueType};
use crate::schema::path::SchemaPath;
use crate::schema::structure::STATUS_CODES;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

/// Metadata declared for one schema path
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SchemaEntry {
    #[serde(rename = "type")]
    pub value_type: ValueType,

    /// Reward weight per newly discovered primitive (non-negative)
    #[serde(default)]
    pub reward: f32,

    #[serde(default)]
    pub encoder: Option<EncoderKind>,

    /// Divisor for `normalize_by_specific_number`
    #[serde(default)]
    pub num_for_normalization: Option<f64>,

    /// Hint appended to the parsing prompt
    #[serde(default)]
    pub llm_prompt: Option<String>,

    /// Lists: pad/truncate to this many items before encoding
    #[serde(default)]
    pub max_items: Option<usize>,

    /// Lists of objects: child fields forming an item's identity
    #[serde(default)]
    pub identity: Option<Vec<String>>,

    /// Lists: encode opaquely from the numeric ids of the first N entries
    #[serde(default)]
    pub opaque_items: Option<usize>,
}

impl SchemaEntry {
    pub fn new(value_type: ValueType) -> Self {
        Self {
            value_type,
            reward: 0.0,
            encoder: None,
            num_for_normalization: None,
            llm_prompt: None,
            max_items: None,
            identity: None,
            opaque_items: None,
        }
    }

    pub fn reward(mut self, weight: f32) -> Self {
        self.reward = weight;
        self
    }

    pub fn encoder(mut self, kind: EncoderKind) -> Self {
        self.encoder = Some(kind);
        self
    }

    pub fn normalized_by(mut self, divisor: f64) -> Self {
        self.encoder = Some(EncoderKind::NormalizeBySpecificNumber);
        self.num_for_normalization = Some(divisor);
        self
    }

    pub fn prompt(mut self, hint: &str) -> Self {
        self.llm_prompt = Some(hint.to_string());
        self
    }

    pub fn max_items(mut self, n: usize) -> Self {
        self.max_items = Some(n);
        self
    }

    pub fn identity(mut self, fields: &[&str]) -> Self {
        self.identity = Some(fields.iter().map(|f| f.to_string()).collect());
        self
    }

    pub fn opaque(mut self, n: usize) -> Self {
        self.opaque_items = Some(n);
        self
    }
}

#[derive(Deserialize)]
struct SchemaFile {
    paths: BTreeMap<String, SchemaEntry>,
}

/// Immutable process-wide schema
#[derive(Debug, Clone)]
pub struct StateSchema {
    entries: BTreeMap<String, SchemaEntry>,
    parsed: BTreeMap<String, SchemaPath>,
}

impl StateSchema {
    /// Build a schema from `(path, entry)` pairs, validating every path
    pub fn from_entries(entries: impl IntoIterator<Item = (String, SchemaEntry)>) -> Result<Self> {
        let mut map = BTreeMap::new();
        let mut parsed = BTreeMap::new();
        for (path, entry) in entries {
            if entry.reward < 0.0 {
                return Err(ReconError::InvalidSchemaPath {
                    path,
                    reason: "reward weight must be non-negative".into(),
                });
            }
            if entry.encoder == Some(EncoderKind::NormalizeBySpecificNumber)
                && entry.num_for_normalization.map(|n| n <= 0.0).unwrap_or(true)
            {
                return Err(ReconError::InvalidSchemaPath {
                    path,
                    reason: "normalize_by_specific_number needs a positive num_for_normalization"
                        .into(),
                });
            }
            parsed.insert(path.clone(), SchemaPath::parse(&path)?);
            map.insert(path, entry);
        }
        Ok(Self {
            entries: map,
            parsed,
        })
    }

    /// Parse a TOML schema file body (`[paths."a.b"]` tables)
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let file: SchemaFile = toml::from_str(content)?;
        Self::from_entries(file.paths)
    }

    pub fn from_toml_file(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(ReconError::MissingFile(path.to_path_buf()));
        }
        Self::from_toml_str(&fs::read_to_string(path)?)
    }

    /// The configured schema file, or the built-in schema when none is set
    pub fn load(path: Option<&Path>) -> Result<Self> {
        match path {
            Some(path) => Self::from_toml_file(path),
            None => Ok(Self::default_recon()),
        }
    }

    /// Built-in reconnaissance schema
    pub fn default_recon() -> Self {
        use EncoderKind::*;
        use ValueType::{Bool, Dict, Int, List};

        let mut entries: Vec<(String, SchemaEntry)> = vec![
            ("target".into(), SchemaEntry::new(Dict)),
            ("target.ip".into(), SchemaEntry::new(ValueType::String).encoder(Base100)),
            ("target.os".into(), SchemaEntry::new(Dict)),
            (
                "target.os.name".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.1)
                    .encoder(Base100)
                    .prompt("OS family only, e.g. Linux, Windows, FreeBSD"),
            ),
            ("target.os.distribution".into(), SchemaEntry::new(Dict)),
            (
                "target.os.distribution.name".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.1)
                    .encoder(Base100)
                    .prompt("distribution name in lowercase, e.g. ubuntu, debian, centos"),
            ),
            (
                "target.os.distribution.version".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.1)
                    .encoder(Base100)
                    .prompt("version number only, e.g. 20.04"),
            ),
            (
                "target.os.kernel".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.1)
                    .encoder(Base100)
                    .prompt("kernel version only, e.g. 5.4.0"),
            ),
            (
                "target.os.architecture".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.05)
                    .encoder(Base100)
                    .prompt("CPU architecture, e.g. x86_64"),
            ),
            (
                "target.services".into(),
                SchemaEntry::new(List)
                    .max_items(8)
                    .identity(&["port", "protocol"])
                    .prompt("one entry per open port; leave the list empty if none"),
            ),
            (
                "target.services[].port".into(),
                SchemaEntry::new(Int)
                    .reward(0.2)
                    .normalized_by(65535.0)
                    .prompt("port number as an integer"),
            ),
            (
                "target.services[].protocol".into(),
                SchemaEntry::new(ValueType::String)
                    .encoder(Base100)
                    .prompt("transport protocol, tcp or udp"),
            ),
            (
                "target.services[].service".into(),
                SchemaEntry::new(ValueType::String)
                    .encoder(Base100)
                    .prompt("service name as reported, e.g. ssh, http"),
            ),
            (
                "target.services[].server_type".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.05)
                    .encoder(Base100)
                    .prompt("server product, e.g. Apache httpd, OpenSSH"),
            ),
            (
                "target.services[].server_version".into(),
                SchemaEntry::new(ValueType::String)
                    .reward(0.05)
                    .encoder(Base100)
                    .prompt("server version only, e.g. 2.4.41"),
            ),
            (
                "target.services[].supported_protocols".into(),
                SchemaEntry::new(List).max_items(3),
            ),
            (
                "target.services[].supported_protocols[]".into(),
                SchemaEntry::new(ValueType::String).encoder(Base100),
            ),
            (
                "target.services[].softwares".into(),
                SchemaEntry::new(List).max_items(2).identity(&["name", "version"]),
            ),
            (
                "target.services[].softwares[].name".into(),
                SchemaEntry::new(ValueType::String).reward(0.05).encoder(Base100),
            ),
            (
                "target.services[].softwares[].version".into(),
                SchemaEntry::new(ValueType::String).reward(0.05).encoder(Base100),
            ),
            (
                "web_directories_status".into(),
                SchemaEntry::new(Dict).prompt(
                    "map each HTTP status code to {path: reason}; keep {\"\": \"\"} when a code has no paths",
                ),
            ),
            ("attack_impact".into(), SchemaEntry::new(Dict)),
            (
                "attack_impact.shell_opened".into(),
                SchemaEntry::new(Bool).encoder(Identity),
            ),
            ("runtime_behavior".into(), SchemaEntry::new(Dict)),
            (
                "runtime_behavior.detected_by_defenses".into(),
                SchemaEntry::new(Bool).encoder(Identity),
            ),
            (
                "failed_cves".into(),
                SchemaEntry::new(List).opaque(3).normalized_by(1e9),
            ),
        ];

        for code in STATUS_CODES {
            entries.push((
                format!("web_directories_status.{}", code),
                SchemaEntry::new(Dict).reward(0.1).encoder(Count),
            ));
        }

        // Built-in entries are known-good; a failure here is a programming error
        match Self::from_entries(entries) {
            Ok(schema) => schema,
            Err(e) => panic!("built-in schema is invalid: {}", e),
        }
    }

    /// Metadata for a declared path; unknown paths are a key error
    pub fn lookup(&self, path: &str) -> Result<&SchemaEntry> {
        self.entries
            .get(path)
            .ok_or_else(|| ReconError::UnknownSchemaPath(path.to_string()))
    }

    pub fn get(&self, path: &str) -> Option<&SchemaEntry> {
        self.entries.get(path)
    }

    pub fn parsed_path(&self, path: &str) -> Option<&SchemaPath> {
        self.parsed.get(path)
    }

    /// Declared paths in lexicographic order
    pub fn iter_paths(&self) -> impl Iterator<Item = (&str, &SchemaEntry)> {
        self.entries.iter().map(|(k, v)| (k.as_str(), v))
    }

    pub fn llm_prompt_for(&self, path: &str) -> Option<&str> {
        self.entries.get(path).and_then(|e| e.llm_prompt.as_deref())
    }

    /// Direct declared children of a path (`target.os` -> `name`, `kernel`, ...)
    ///
    /// For a list path pass the member form, e.g. `target.services[]`.
    pub fn children_of(&self, path: &str) -> Vec<(&str, &SchemaEntry)> {
        let prefix = format!("{}.", path);
        self.entries
            .iter()
            .filter_map(|(k, v)| {
                let rest = k.strip_prefix(&prefix)?;
                if rest.contains('.') || rest.contains('[') {
                    None
                } else {
                    Some((rest, v))
                }
            })
            .collect()
    }

    /// Identity fields for a list of objects
    ///
    /// Falls back to every declared scalar child when the entry names none.
    pub fn identity_fields(&self, list_path: &str) -> Vec<String> {
        if let Some(fields) = self.entries.get(list_path).and_then(|e| e.identity.clone()) {
            return fields;
        }
        self.children_of(&format!("{}[]", list_path))
            .into_iter()
            .filter(|(_, e)| e.value_type.is_scalar())
            .map(|(name, _)| name.to_string())
            .collect()
    }

    /// Status codes declared under `web_directories_status`, in sorted order
    pub fn status_codes(&self) -> Vec<&str> {
        self.children_of("web_directories_status")
            .into_iter()
            .filter(|(_, e)| e.value_type == ValueType::Dict)
            .map(|(code, _)| code)
            .collect()
    }

    /// Weighted paths used by the reward function
    pub fn rewarded_paths(&self) -> impl Iterator<Item = (&SchemaPath, f32)> {
        self.entries
            .iter()
            .filter(|(_, e)| e.reward > 0.0)
            .filter_map(|(k, e)| self.parsed.get(k).map(|p| (p, e.reward)))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for StateSchema {
    fn default() -> Self {
        Self::default_recon()
    }
}
