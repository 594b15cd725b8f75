//! Shared fixtures: a fake packaging tool and a languages directory.
#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use langforge_core::{
    DnaRekeyer, FsTemplateSource, LanguageExpression, LanguageFactory, ModuleIdentity, PackagingTool, PublishError,
    Publisher, TemplateSelector, TemplateTable, ToolError, ToolRun,
};

pub const DNA_MANIFEST: &str = "manifest_version: '1'\nname: social-context\nuuid: orig\nproperties: ~\nzomes:\n- name: social_context\n  bundled: ../target/social_context.wasm\n";

pub const PERMISSIONLESS_BUNDLE: &str = "'use strict';\nexports.name = \"ipfs-links\";\nexports.description = \"IPFS link store\";\nmodule.exports.create = function create(context) { return TEMPLATE_INFO; };";

pub const HOLOCHAIN_BUNDLE: &str = "'use strict';\nexports.name = \"social-context\";\nmodule.exports.create = function create(context) { return dna; };";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Behaviour {
    Working,
    /// Unpack reports success but leaves no manifest.
    SilentUnpack,
    /// Pack reports success but writes no bundle.
    SilentPack,
    /// Pack reports a tool error.
    FailingPack,
    /// Pack writes the bundle but reports a different output path.
    MisreportedPack,
}

/// Packaging tool whose bundle format is a JSON object of file name to
/// file contents.
#[derive(Debug)]
pub struct JsonBundleTool {
    behaviour: Behaviour,
    pub unpacked_dirs: Mutex<Vec<PathBuf>>,
}

impl JsonBundleTool {
    pub fn new(behaviour: Behaviour) -> Self {
        Self {
            behaviour,
            unpacked_dirs: Mutex::new(vec![]),
        }
    }

    pub fn working() -> Self {
        Self::new(Behaviour::Working)
    }

    pub fn bundle(files: &[(&str, &str)]) -> Vec<u8> {
        let map: BTreeMap<&str, &str> = files.iter().copied().collect();
        serde_json::to_vec(&map).unwrap()
    }

    pub fn files(bundle: &[u8]) -> BTreeMap<String, String> {
        serde_json::from_slice(bundle).unwrap()
    }
}

impl PackagingTool for JsonBundleTool {
    fn unpack(&self, bundle: &Path, into: &Path) -> Result<ToolRun, ToolError> {
        self.unpacked_dirs.lock().unwrap().push(into.to_path_buf());
        fs::create_dir_all(into).map_err(|e| ToolError::Other(e.to_string()))?;
        if self.behaviour == Behaviour::SilentUnpack {
            return Ok(ToolRun {
                output: into.to_path_buf(),
                log: "nothing to do".to_string(),
            });
        }
        let bytes = fs::read(bundle).map_err(|e| ToolError::Other(e.to_string()))?;
        let files: BTreeMap<String, String> =
            serde_json::from_slice(&bytes).map_err(|e| ToolError::Other(e.to_string()))?;
        for (name, content) in files {
            fs::write(into.join(name), content).map_err(|e| ToolError::Other(e.to_string()))?;
        }
        Ok(ToolRun {
            output: into.to_path_buf(),
            log: String::new(),
        })
    }

    fn pack(&self, working_dir: &Path, output: &Path) -> Result<ToolRun, ToolError> {
        match self.behaviour {
            Behaviour::SilentPack => {
                return Ok(ToolRun {
                    output: output.to_path_buf(),
                    log: "packed".to_string(),
                })
            }
            Behaviour::FailingPack => return Err(ToolError::Other("zome wasm missing".to_string())),
            _ => {}
        }
        let mut files = BTreeMap::new();
        for entry in fs::read_dir(working_dir).map_err(|e| ToolError::Other(e.to_string()))? {
            let entry = entry.map_err(|e| ToolError::Other(e.to_string()))?;
            let content = fs::read_to_string(entry.path()).map_err(|e| ToolError::Other(e.to_string()))?;
            files.insert(entry.file_name().to_string_lossy().into_owned(), content);
        }
        let bytes = serde_json::to_vec(&files).map_err(|e| ToolError::Other(e.to_string()))?;
        fs::write(output, bytes).map_err(|e| ToolError::Other(e.to_string()))?;
        let reported = match self.behaviour {
            Behaviour::MisreportedPack => output.with_extension("elsewhere"),
            _ => output.to_path_buf(),
        };
        Ok(ToolRun {
            output: reported,
            log: String::new(),
        })
    }
}

/// Publisher that refuses everything.
pub struct RejectingPublisher;

impl Publisher for RejectingPublisher {
    fn publish(&self, _expression: &LanguageExpression) -> Result<ModuleIdentity, PublishError> {
        Err(PublishError::Rejected("language language offline".to_string()))
    }
}

/// Languages directory laid out like the default template table.
pub struct LanguageRoot {
    pub dir: tempfile::TempDir,
}

impl LanguageRoot {
    pub fn new() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path();
        let dna = JsonBundleTool::bundle(&[("dna.yaml", DNA_MANIFEST)]);

        write(root, "ipfs-links/build/bundle.js", PERMISSIONLESS_BUNDLE.as_bytes());
        write(root, "social-context/build/bundle.js", HOLOCHAIN_BUNDLE.as_bytes());
        write(root, "social-context/social-context.dna", &dna);
        write(
            root,
            "social-context-channel/build/bundle.js",
            HOLOCHAIN_BUNDLE.replace("social-context", "social-context-channel").as_bytes(),
        );
        write(root, "social-context-channel/social-context-channel.dna", &dna);
        Self { dir }
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    pub fn work_root(&self) -> PathBuf {
        self.dir.path().join("tmp")
    }

    pub fn factory<P: Publisher>(
        &self,
        tool: JsonBundleTool,
        table: TemplateTable,
        publisher: P,
    ) -> LanguageFactory<JsonBundleTool, P, FsTemplateSource> {
        LanguageFactory::new(
            TemplateSelector::new(table),
            FsTemplateSource::new(self.path()),
            DnaRekeyer::new(tool, self.work_root()),
            publisher,
        )
    }
}

pub fn write(root: &Path, relative: &str, content: &[u8]) {
    let path = root.join(relative);
    fs::create_dir_all(path.parent().unwrap()).unwrap();
    fs::write(path, content).unwrap();
}

/// Entries left in the rekey work root.
pub fn leftovers(work_root: &Path) -> Vec<PathBuf> {
    match fs::read_dir(work_root) {
        Ok(entries) => entries.map(|e| e.unwrap().path()).collect(),
        Err(_) => vec![],
    }
}

/// Decode a `var dna = "...";` line back into bundle files.
pub fn decode_dna_line(line: &str) -> BTreeMap<String, String> {
    use base64::Engine;
    let encoded = line
        .strip_prefix("var dna = \"")
        .and_then(|rest| rest.strip_suffix("\";"))
        .expect("dna fragment line");
    let bytes = base64::engine::general_purpose::STANDARD.decode(encoded).unwrap();
    JsonBundleTool::files(&bytes)
}

pub fn manifest(files: &BTreeMap<String, String>) -> serde_yaml::Value {
    serde_yaml::from_str(&files["dna.yaml"]).unwrap()
}
