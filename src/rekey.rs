//! DNA Rekeyer - unpack, rewrite identity, repack
//!
//! Every rekey runs in its own temporary directory under the work root. The
//! directory is removed on every exit path once it has been created.
//!
//! Working layout for nick `social-context`:
//!
//! ```text
//! <work_root>/social-context.XXXXXX/
//!     social-context.dna            copy of the source bundle
//!     social-context/dna.yaml       unpacked manifest
//!     social-context.rekeyed.dna    packed output
//! ```

use std::ffi::OsStr;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::Command;

use base64::Engine;
use serde_yaml::{Mapping, Value};
use tempfile::TempDir;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Manifest file name inside an unpacked DNA.
pub const MANIFEST_FILE: &str = "dna.yaml";

/// Identifier the Holochain templates read the bundle from.
pub const DNA_BINDING: &str = "dna";

#[derive(Debug, Error)]
pub enum RekeyError {
    #[error("Invalid DNA nick {0:?}: only ASCII letters, digits, '-', '_' and inner '.' are allowed")]
    InvalidNick(String),

    #[error("Could not prepare working copy for DNA {nick}: {source}")]
    Workspace {
        nick: String,
        #[source]
        source: io::Error,
    },

    #[error("Could not unpack DNA {nick}: {detail}")]
    UnpackFailure { nick: String, detail: String },

    #[error("Invalid manifest for DNA {nick}: {detail}")]
    Manifest { nick: String, detail: String },

    #[error("Could not pack DNA {nick}: {detail}")]
    PackFailure { nick: String, detail: String },
}

/// Failure reported by a packaging tool.
#[derive(Debug, Error)]
pub enum ToolError {
    #[error("failed to launch {program}: {source}")]
    Launch {
        program: String,
        #[source]
        source: io::Error,
    },

    #[error("{program} exited with {status}: {stderr}")]
    Exit {
        program: String,
        status: String,
        stderr: String,
    },

    #[error("{0}")]
    Other(String),
}

/// What a packaging tool claims it produced. `output` must be the path the
/// caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ToolRun {
    pub output: PathBuf,
    pub log: String,
}

/// External DNA packaging tool. Output paths are chosen by the caller.
pub trait PackagingTool {
    /// Unpack `bundle` into the directory `into`, which must then contain
    /// the manifest.
    fn unpack(&self, bundle: &Path, into: &Path) -> Result<ToolRun, ToolError>;

    /// Pack `working_dir` into the bundle file `output`.
    fn pack(&self, working_dir: &Path, output: &Path) -> Result<ToolRun, ToolError>;
}

/// Holochain `hc` CLI.
#[derive(Debug, Clone)]
pub struct HcTool {
    program: PathBuf,
}

impl HcTool {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            program: program.into(),
        }
    }

    fn run(&self, args: &[&OsStr], cwd: &Path, output: &Path) -> Result<ToolRun, ToolError> {
        let program = self.program.display().to_string();
        debug!(%program, ?args, "invoking packaging tool");
        // cwd is the run's temp dir so hc's scratch output goes away with it
        let result = Command::new(&self.program)
            .args(args)
            .current_dir(cwd)
            .output()
            .map_err(|source| ToolError::Launch {
                program: program.clone(),
                source,
            })?;

        let stdout = String::from_utf8_lossy(&result.stdout).into_owned();
        if !result.status.success() {
            return Err(ToolError::Exit {
                program,
                status: result.status.to_string(),
                stderr: String::from_utf8_lossy(&result.stderr).trim().to_string(),
            });
        }
        Ok(ToolRun {
            output: output.to_path_buf(),
            log: stdout,
        })
    }
}

impl Default for HcTool {
    fn default() -> Self {
        Self::new("hc")
    }
}

impl PackagingTool for HcTool {
    fn unpack(&self, bundle: &Path, into: &Path) -> Result<ToolRun, ToolError> {
        let cwd = bundle.parent().unwrap_or(Path::new("."));
        self.run(
            &[
                OsStr::new("dna"),
                OsStr::new("unpack"),
                bundle.as_os_str(),
                OsStr::new("-o"),
                into.as_os_str(),
            ],
            cwd,
            into,
        )
    }

    fn pack(&self, working_dir: &Path, output: &Path) -> Result<ToolRun, ToolError> {
        let cwd = working_dir.parent().unwrap_or(Path::new("."));
        self.run(
            &[
                OsStr::new("dna"),
                OsStr::new("pack"),
                working_dir.as_os_str(),
                OsStr::new("-o"),
                output.as_os_str(),
            ],
            cwd,
            output,
        )
    }
}

/// Rekeyed DNA ready to be spliced into a template.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DnaFragment {
    /// Single line base64 of the packed bundle.
    pub encoded: String,
    /// `var dna = "<encoded>";`
    pub code: String,
}

impl DnaFragment {
    fn from_bundle(bytes: &[u8]) -> Self {
        let encoded: String = base64::engine::general_purpose::STANDARD
            .encode(bytes)
            .chars()
            .filter(|c| *c != '\r' && *c != '\n')
            .collect();
        let code = format!("var {DNA_BINDING} = \"{encoded}\";");
        Self { encoded, code }
    }
}

pub fn validate_nick(nick: &str) -> Result<(), RekeyError> {
    let valid = !nick.is_empty()
        && !nick.starts_with('.')
        && nick
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
    if valid {
        Ok(())
    } else {
        Err(RekeyError::InvalidNick(nick.to_string()))
    }
}

/// Set `value` at a dotted `path` in a YAML manifest, creating intermediate
/// mappings. Existing keys keep their position.
pub fn set_identity(manifest: &mut Value, path: &str, value: &str) -> Result<(), String> {
    if path.split('.').any(str::is_empty) {
        return Err(format!("invalid identity field path {path:?}"));
    }
    let mut current = manifest;
    let mut keys = path.split('.').peekable();
    while let Some(key) = keys.next() {
        let map: &mut Mapping = current
            .as_mapping_mut()
            .ok_or_else(|| format!("expected a mapping at {key:?}"))?;
        let key = Value::String(key.to_string());
        if keys.peek().is_none() {
            map.insert(key, Value::String(value.to_string()));
            return Ok(());
        }
        if !map.contains_key(&key) {
            map.insert(key.clone(), Value::Mapping(Mapping::new()));
        }
        current = map
            .get_mut(&key)
            .ok_or_else(|| format!("missing key {key:?}"))?;
    }
    Err(format!("invalid identity field path {path:?}"))
}

/// Produces network-unique copies of DNA bundles.
#[derive(Debug, Clone)]
pub struct DnaRekeyer<T> {
    tool: T,
    work_root: PathBuf,
    identity_field: String,
}

impl<T: PackagingTool> DnaRekeyer<T> {
    pub fn new(tool: T, work_root: impl Into<PathBuf>) -> Self {
        Self {
            tool,
            work_root: work_root.into(),
            identity_field: "uuid".to_string(),
        }
    }

    pub fn with_identity_field(mut self, field: impl Into<String>) -> Self {
        self.identity_field = field.into();
        self
    }

    pub fn tool(&self) -> &T {
        &self.tool
    }

    pub fn work_root(&self) -> &Path {
        &self.work_root
    }

    /// Copy `bundle`, set its manifest identity to `uniqueness`, repack it
    /// and return it as a splice-ready fragment.
    pub fn rekey(&self, bundle: &Path, nick: &str, uniqueness: &str) -> Result<DnaFragment, RekeyError> {
        validate_nick(nick)?;
        let workspace = |source: io::Error| RekeyError::Workspace {
            nick: nick.to_string(),
            source,
        };

        fs::create_dir_all(&self.work_root).map_err(workspace)?;
        let scratch = tempfile::Builder::new()
            .prefix(&format!("{nick}."))
            .tempdir_in(&self.work_root)
            .map_err(workspace)?;
        debug!(%nick, dir = %scratch.path().display(), "created rekey working directory");

        let result = self.rekey_in(&scratch, bundle, nick, uniqueness);
        let dir = scratch.path().to_path_buf();
        if let Err(e) = scratch.close() {
            warn!(%nick, dir = %dir.display(), error = %e, "failed to remove rekey working directory");
        }
        result
    }

    fn rekey_in(
        &self,
        scratch: &TempDir,
        bundle: &Path,
        nick: &str,
        uniqueness: &str,
    ) -> Result<DnaFragment, RekeyError> {
        let root = scratch.path();
        let copy = root.join(format!("{nick}.dna"));
        let unpacked = root.join(nick);
        let manifest_path = unpacked.join(MANIFEST_FILE);
        let packed = root.join(format!("{nick}.rekeyed.dna"));

        fs::copy(bundle, &copy).map_err(|source| RekeyError::Workspace {
            nick: nick.to_string(),
            source,
        })?;

        let run = self
            .tool
            .unpack(&copy, &unpacked)
            .map_err(|e| RekeyError::UnpackFailure {
                nick: nick.to_string(),
                detail: e.to_string(),
            })?;
        if run.output != unpacked {
            return Err(RekeyError::UnpackFailure {
                nick: nick.to_string(),
                detail: format!(
                    "tool unpacked to {}, expected {}",
                    run.output.display(),
                    unpacked.display()
                ),
            });
        }
        if !manifest_path.is_file() {
            return Err(RekeyError::UnpackFailure {
                nick: nick.to_string(),
                detail: format!(
                    "{} missing after unpack (tool output: {})",
                    MANIFEST_FILE,
                    run.log.trim()
                ),
            });
        }

        self.rewrite_manifest(&manifest_path, nick, uniqueness)?;

        let run = self
            .tool
            .pack(&unpacked, &packed)
            .map_err(|e| RekeyError::PackFailure {
                nick: nick.to_string(),
                detail: e.to_string(),
            })?;
        if run.output != packed {
            return Err(RekeyError::PackFailure {
                nick: nick.to_string(),
                detail: format!("tool packed to {}, expected {}", run.output.display(), packed.display()),
            });
        }
        if !packed.is_file() {
            return Err(RekeyError::PackFailure {
                nick: nick.to_string(),
                detail: format!("no bundle at {} (tool output: {})", packed.display(), run.log.trim()),
            });
        }

        let bytes = fs::read(&packed).map_err(|e| RekeyError::PackFailure {
            nick: nick.to_string(),
            detail: e.to_string(),
        })?;
        info!(%nick, bytes = bytes.len(), "packed rekeyed DNA");
        Ok(DnaFragment::from_bundle(&bytes))
    }

    fn rewrite_manifest(&self, path: &Path, nick: &str, uniqueness: &str) -> Result<(), RekeyError> {
        let manifest_error = |detail: String| RekeyError::Manifest {
            nick: nick.to_string(),
            detail,
        };

        let text = fs::read_to_string(path).map_err(|e| manifest_error(e.to_string()))?;
        let mut manifest: Value =
            serde_yaml::from_str(&text).map_err(|e| manifest_error(e.to_string()))?;
        set_identity(&mut manifest, &self.identity_field, uniqueness).map_err(manifest_error)?;
        let rendered = serde_yaml::to_string(&manifest).map_err(|e| manifest_error(e.to_string()))?;

        debug!(%nick, field = %self.identity_field, "writing rekeyed DNA manifest");
        fs::write(path, rendered).map_err(|e| manifest_error(e.to_string()))
    }
}
