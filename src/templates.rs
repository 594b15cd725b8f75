//! Template System - mode table, selector and read-only template source

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::perspective::SharingMode;
use crate::ENGINE_VERSION;

#[derive(Debug, Error)]
pub enum SelectError {
    #[error("Unsupported sharing mode: {0}")]
    UnsupportedMode(String),

    #[error("No template registered for sharing mode {0}")]
    UnimplementedMode(SharingMode),

    #[error("Template for {mode} requires engine >= {required}, current is {current}")]
    EngineVersionMismatch {
        mode: SharingMode,
        required: Version,
        current: String,
    },

    #[error("Template source unavailable at {location}: {source}")]
    SourceUnavailable {
        location: String,
        #[source]
        source: io::Error,
    },
}

/// DNA bundle backing a Holochain template.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DnaSource {
    pub location: String,
    /// Filesystem-safe name used for the rekey working files.
    pub nick: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TemplateEntry {
    pub template: String,
    #[serde(default = "default_version")]
    pub template_version: Version,
    #[serde(default = "default_version")]
    pub engine_min_version: Version,
    #[serde(default)]
    pub dna: Option<DnaSource>,
}

fn default_version() -> Version {
    Version::new(1, 0, 0)
}

impl TemplateEntry {
    pub fn bundle(template: impl Into<String>) -> Self {
        Self {
            template: template.into(),
            template_version: default_version(),
            engine_min_version: default_version(),
            dna: None,
        }
    }

    pub fn with_dna(mut self, location: impl Into<String>, nick: impl Into<String>) -> Self {
        self.dna = Some(DnaSource {
            location: location.into(),
            nick: nick.into(),
        });
        self
    }
}

/// Mode to template mapping.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TemplateTable {
    entries: BTreeMap<SharingMode, TemplateEntry>,
}

impl TemplateTable {
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    pub fn insert(&mut self, mode: SharingMode, entry: TemplateEntry) {
        self.entries.insert(mode, entry);
    }

    pub fn get(&self, mode: SharingMode) -> Option<&TemplateEntry> {
        self.entries.get(&mode)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&SharingMode, &TemplateEntry)> {
        self.entries.iter()
    }
}

impl Default for TemplateTable {
    fn default() -> Self {
        let mut table = Self::empty();
        table.insert(
            SharingMode::Permissionless,
            TemplateEntry::bundle("ipfs-links/build/bundle.js"),
        );
        table.insert(
            SharingMode::Holochain,
            TemplateEntry::bundle("social-context/build/bundle.js")
                .with_dna("social-context/social-context.dna", "social-context"),
        );
        table.insert(
            SharingMode::HolochainChannel,
            TemplateEntry::bundle("social-context-channel/build/bundle.js").with_dna(
                "social-context-channel/social-context-channel.dna",
                "social-context-channel",
            ),
        );
        table
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResolvedTemplate {
    pub mode: SharingMode,
    pub location: String,
    pub version: Version,
    pub dna: Option<DnaSource>,
}

/// Resolves a sharing mode to its template. Never falls back to a default.
#[derive(Debug, Clone)]
pub struct TemplateSelector {
    table: TemplateTable,
}

impl TemplateSelector {
    pub fn new(table: TemplateTable) -> Self {
        Self { table }
    }

    pub fn table(&self) -> &TemplateTable {
        &self.table
    }

    pub fn resolve(&self, mode: SharingMode) -> Result<ResolvedTemplate, SelectError> {
        let entry = self
            .table
            .get(mode)
            .ok_or(SelectError::UnimplementedMode(mode))?;

        check_engine_version(mode, entry)?;

        debug!(%mode, template = %entry.template, "resolved template");
        Ok(ResolvedTemplate {
            mode,
            location: entry.template.clone(),
            version: entry.template_version.clone(),
            dna: entry.dna.clone(),
        })
    }

    /// Resolve a raw sharing-mode tag.
    pub fn resolve_tag(&self, tag: &str) -> Result<ResolvedTemplate, SelectError> {
        self.resolve(tag.parse()?)
    }
}

fn check_engine_version(mode: SharingMode, entry: &TemplateEntry) -> Result<(), SelectError> {
    // ENGINE_VERSION comes from Cargo metadata, parse failure would be a build bug
    let current = Version::parse(ENGINE_VERSION).unwrap_or_else(|_| Version::new(0, 0, 0));
    if current < entry.engine_min_version {
        return Err(SelectError::EngineVersionMismatch {
            mode,
            required: entry.engine_min_version.clone(),
            current: ENGINE_VERSION.to_string(),
        });
    }
    Ok(())
}

/// Read-only access to template text and DNA bundles by location.
pub trait TemplateSource {
    fn read_template(&self, location: &str) -> Result<String, SelectError>;

    /// Local path of a DNA bundle. Must exist.
    fn package_path(&self, location: &str) -> Result<PathBuf, SelectError>;
}

/// Template source rooted at a local languages directory.
#[derive(Debug, Clone)]
pub struct FsTemplateSource {
    root: PathBuf,
}

impl FsTemplateSource {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn path_of(&self, location: &str) -> PathBuf {
        self.root.join(location.trim_start_matches('/'))
    }
}

impl TemplateSource for FsTemplateSource {
    fn read_template(&self, location: &str) -> Result<String, SelectError> {
        let path = self.path_of(location);
        debug!(path = %path.display(), "reading template file");
        fs::read_to_string(&path).map_err(|source| SelectError::SourceUnavailable {
            location: location.to_string(),
            source,
        })
    }

    fn package_path(&self, location: &str) -> Result<PathBuf, SelectError> {
        let path = self.path_of(location);
        if path.is_file() {
            Ok(path)
        } else {
            Err(SelectError::SourceUnavailable {
                location: location.to_string(),
                source: io::Error::new(io::ErrorKind::NotFound, "DNA bundle not found"),
            })
        }
    }
}
