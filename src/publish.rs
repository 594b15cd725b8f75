//! Publishing - hands finished language bundles to expression storage

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::hashing::{canonical_json, multihash_base58};

#[derive(Debug, Error)]
pub enum PublishError {
    #[error("Storage error: {0}")]
    Storage(#[from] io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Publisher rejected language: {0}")]
    Rejected(String),
}

/// The expression a language is published as.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LanguageExpression {
    pub name: String,
    pub description: String,
    pub bundle_file: String,
    pub encrypted: bool,
    pub passphrase: String,
}

/// Content address and name of a published language.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModuleIdentity {
    pub address: String,
    pub name: String,
}

pub trait Publisher {
    fn publish(&self, expression: &LanguageExpression) -> Result<ModuleIdentity, PublishError>;
}

impl<P: Publisher + ?Sized> Publisher for &P {
    fn publish(&self, expression: &LanguageExpression) -> Result<ModuleIdentity, PublishError> {
        (**self).publish(expression)
    }
}

/// Content address of an expression.
pub fn expression_address(expression: &LanguageExpression) -> Result<String, PublishError> {
    let canonical = canonical_json(expression)?;
    Ok(multihash_base58(canonical.as_bytes()))
}

/// Stores each expression as `<address>.json` in a directory.
#[derive(Debug, Clone)]
pub struct DirectoryPublisher {
    dir: PathBuf,
}

impl DirectoryPublisher {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn load(&self, address: &str) -> Result<LanguageExpression, PublishError> {
        let content = fs::read_to_string(self.dir.join(format!("{address}.json")))?;
        Ok(serde_json::from_str(&content)?)
    }
}

impl Publisher for DirectoryPublisher {
    fn publish(&self, expression: &LanguageExpression) -> Result<ModuleIdentity, PublishError> {
        let address = expression_address(expression)?;
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{address}.json"));
        fs::write(&path, serde_json::to_string_pretty(expression)?)?;
        info!(%address, name = %expression.name, path = %path.display(), "stored language");
        Ok(ModuleIdentity {
            address,
            name: expression.name.clone(),
        })
    }
}

/// Keeps published expressions in memory.
#[derive(Debug, Default)]
pub struct MemoryPublisher {
    published: Mutex<Vec<(String, LanguageExpression)>>,
}

impl MemoryPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, address: &str) -> Option<LanguageExpression> {
        self.lock()
            .iter()
            .find(|(a, _)| a == address)
            .map(|(_, expression)| expression.clone())
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(String, LanguageExpression)>> {
        // a poisoned list is still a valid list
        self.published
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Publisher for MemoryPublisher {
    fn publish(&self, expression: &LanguageExpression) -> Result<ModuleIdentity, PublishError> {
        let address = expression_address(expression)?;
        self.lock().push((address.clone(), expression.clone()));
        Ok(ModuleIdentity {
            address,
            name: expression.name.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn expression() -> LanguageExpression {
        LanguageExpression {
            name: "ipfs-links".to_string(),
            description: "UUID: Qm".to_string(),
            bundle_file: "line0\nline1".to_string(),
            encrypted: false,
            passphrase: String::new(),
        }
    }

    #[test]
    fn test_address_is_content_derived() {
        let a = expression_address(&expression()).unwrap();
        let mut other = expression();
        other.bundle_file.push('\n');
        assert_eq!(a, expression_address(&expression()).unwrap());
        assert_ne!(a, expression_address(&other).unwrap());
    }

    #[test]
    fn test_directory_publisher_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let publisher = DirectoryPublisher::new(dir.path().join("store"));
        let identity = publisher.publish(&expression()).unwrap();
        assert_eq!(identity.name, "ipfs-links");
        assert_eq!(publisher.load(&identity.address).unwrap(), expression());
    }

    #[test]
    fn test_memory_publisher_records() {
        let publisher = MemoryPublisher::new();
        assert!(publisher.is_empty());
        let identity = publisher.publish(&expression()).unwrap();
        assert_eq!(publisher.len(), 1);
        assert_eq!(publisher.get(&identity.address), Some(expression()));
    }
}
