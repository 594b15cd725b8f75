//! LangForge Core - Language Templating & Fingerprint Engine
//!
//! # Guarantees
//! 1. Same spec bytes, same fingerprint
//! 2. Fragment offsets refer to the original template
//! 3. No mode falls back to another mode's template
//! 4. Rekey working copies never outlive the call
//! 5. Publisher failures reach the caller unchanged

pub mod assembly;
pub mod config;
pub mod factory;
pub mod hashing;
pub mod perspective;
pub mod publish;
pub mod rekey;
pub mod templates;

pub use assembly::{assemble, extract_metadata, AssemblyError, ExportedMetadata, Fragment, InsertAt};
pub use config::{ConfigError, FactoryConfig};
pub use factory::{FactoryError, GeneratedModule, IdentitySource, LanguageFactory, LanguageOptions};
pub use hashing::{canonical_json, derive_fingerprint, derive_with_payload, Fingerprint, FingerprintError};
pub use perspective::{SharedPerspective, SharingMode};
pub use publish::{DirectoryPublisher, LanguageExpression, MemoryPublisher, ModuleIdentity, PublishError, Publisher};
pub use rekey::{DnaFragment, DnaRekeyer, HcTool, PackagingTool, RekeyError, ToolError, ToolRun};
pub use templates::{
    DnaSource, FsTemplateSource, ResolvedTemplate, SelectError, TemplateEntry, TemplateSelector, TemplateSource,
    TemplateTable,
};

pub const ENGINE_VERSION: &str = env!("CARGO_PKG_VERSION");
