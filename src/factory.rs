//! Language Factory - single entry point for language creation
//!
//! Orchestrates selector, fingerprint, rekeyer and assembler, then hands the
//! result to the publisher. Nothing here is retried.

use std::path::Path;

use chrono::{DateTime, Utc};
use clap::ValueEnum;
use semver::Version;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, error, info, info_span, warn};
use uuid::Uuid;

use crate::assembly::{assemble, extract_metadata, injection_fragment, AssemblyError, Fragment, INJECTION_LINE};
use crate::config::FactoryConfig;
use crate::hashing::{derive_with_payload, Fingerprint, FingerprintError};
use crate::perspective::{SharedPerspective, SharingMode};
use crate::publish::{LanguageExpression, ModuleIdentity, PublishError, Publisher};
use crate::rekey::{DnaRekeyer, HcTool, PackagingTool, RekeyError};
use crate::templates::{FsTemplateSource, SelectError, TemplateSelector, TemplateSource};

/// File name of a language bundle inside its build directory.
pub const BUNDLE_FILE: &str = "bundle.js";

#[derive(Debug, Error)]
pub enum FactoryError {
    #[error("Fingerprint error: {0}")]
    Fingerprint(#[from] FingerprintError),

    #[error("Template selection failed: {0}")]
    Select(#[from] SelectError),

    #[error("DNA rekey failed: {0}")]
    Rekey(#[from] RekeyError),

    #[error("Assembly failed: {0}")]
    Assembly(#[from] AssemblyError),

    #[error("Publishing language {name} failed: {source}")]
    Publish {
        name: String,
        #[source]
        source: PublishError,
    },
}

/// Where a DNA's uniqueness value comes from. There is no default, callers
/// pick one.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum IdentitySource {
    /// Fingerprint of the shared perspective.
    Fingerprint,
    /// Caller passphrase, used verbatim.
    Passphrase,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageOptions {
    pub encrypt: bool,
    pub passphrase: String,
    pub identity: IdentitySource,
}

impl LanguageOptions {
    /// DNA identity is the perspective fingerprint.
    pub fn keyed_by_fingerprint() -> Self {
        Self {
            encrypt: false,
            passphrase: String::new(),
            identity: IdentitySource::Fingerprint,
        }
    }

    /// DNA identity is `passphrase`, verbatim.
    pub fn keyed_by_passphrase(passphrase: impl Into<String>) -> Self {
        Self {
            encrypt: false,
            passphrase: passphrase.into(),
            identity: IdentitySource::Passphrase,
        }
    }

    pub fn encrypted(mut self) -> Self {
        self.encrypt = true;
        self
    }
}

/// Assembled language, not yet published.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratedModule {
    pub name: String,
    pub description: String,
    pub source: String,
    pub encrypted: bool,
    pub fingerprint: Option<Fingerprint>,
    pub mode: Option<SharingMode>,
    pub template_version: Option<Version>,
    pub created_at: DateTime<Utc>,
}

impl GeneratedModule {
    /// The passphrase is never part of the published expression.
    pub fn to_expression(&self) -> LanguageExpression {
        LanguageExpression {
            name: self.name.clone(),
            description: self.description.clone(),
            bundle_file: self.source.clone(),
            encrypted: self.encrypted,
            passphrase: String::new(),
        }
    }
}

pub struct LanguageFactory<T, P, S = FsTemplateSource> {
    selector: TemplateSelector,
    source: S,
    rekeyer: DnaRekeyer<T>,
    publisher: P,
}

impl<P: Publisher> LanguageFactory<HcTool, P, FsTemplateSource> {
    pub fn from_config(config: &FactoryConfig, publisher: P) -> Self {
        let rekeyer = DnaRekeyer::new(HcTool::new(&config.hc_binary), config.work_dir())
            .with_identity_field(config.identity_field.clone());
        Self::new(
            TemplateSelector::new(config.templates.clone()),
            FsTemplateSource::new(&config.language_root),
            rekeyer,
            publisher,
        )
    }
}

impl<T, P, S> LanguageFactory<T, P, S>
where
    T: PackagingTool,
    P: Publisher,
    S: TemplateSource,
{
    pub fn new(selector: TemplateSelector, source: S, rekeyer: DnaRekeyer<T>, publisher: P) -> Self {
        Self {
            selector,
            source,
            rekeyer,
            publisher,
        }
    }

    pub fn selector(&self) -> &TemplateSelector {
        &self.selector
    }

    pub fn publisher(&self) -> &P {
        &self.publisher
    }

    /// Build a unique expression language from a bundle directory.
    ///
    /// Expects `<bundle_dir>/bundle.js` and the DNA at
    /// `<bundle_dir>/../<dna_nick>.dna`. The passphrase is the DNA identity.
    pub fn create_from_template(
        &self,
        bundle_dir: &Path,
        dna_nick: &str,
        options: &LanguageOptions,
    ) -> Result<ModuleIdentity, FactoryError> {
        let span = info_span!("create_from_template", run = %Uuid::new_v4(), nick = %dna_nick);
        let _guard = span.enter();
        info!(bundle = %bundle_dir.display(), "creating new expression language");

        let bundle_source = FsTemplateSource::new(bundle_dir);
        let template = bundle_source.read_template(BUNDLE_FILE)?;
        let dna_path = bundle_source.package_path(&format!("../{dna_nick}.dna"))?;

        if options.passphrase.is_empty() {
            warn!("empty passphrase, DNA identity will not be unique");
        }
        let dna = self.rekeyer.rekey(&dna_path, dna_nick, &options.passphrase)?;

        let source = assemble(&template, &[Fragment::append(dna.code)])?;
        let metadata = extract_metadata(&source)?;

        let module = GeneratedModule {
            name: metadata.name,
            description: String::new(),
            source,
            encrypted: options.encrypt,
            fingerprint: None,
            mode: None,
            template_version: None,
            created_at: Utc::now(),
        };
        self.publish(&module)
    }

    /// Assemble the link language for a shared perspective without
    /// publishing it.
    pub fn render_from_shared_perspective(
        &self,
        spec: &SharedPerspective,
        options: &LanguageOptions,
    ) -> Result<GeneratedModule, FactoryError> {
        let mode = spec.sharing_mode()?;
        let (fingerprint, payload) = derive_with_payload(spec)?;
        info!(name = %spec.name, %mode, %fingerprint, "creating link language for shared perspective");

        let resolved = self.selector.resolve(mode)?;
        let template = self.source.read_template(&resolved.location)?;
        debug!(location = %resolved.location, version = %resolved.version, "loaded template");

        let mut fragments = vec![Fragment::at_line(
            INJECTION_LINE,
            injection_fragment(&payload, &fingerprint),
        )];
        if let Some(dna) = &resolved.dna {
            let uniqueness = match options.identity {
                IdentitySource::Fingerprint => fingerprint.as_str(),
                IdentitySource::Passphrase => options.passphrase.as_str(),
            };
            debug!(nick = %dna.nick, identity = ?options.identity, "rekeying DNA");
            let bundle = self.source.package_path(&dna.location)?;
            let dna_fragment = self.rekeyer.rekey(&bundle, &dna.nick, uniqueness)?;
            fragments.push(Fragment::append(dna_fragment.code));
        }

        let source = assemble(&template, &fragments)?;
        let metadata = extract_metadata(&source)?;

        Ok(GeneratedModule {
            name: metadata.name,
            description: format!("UUID: {fingerprint}"),
            source,
            encrypted: options.encrypt,
            fingerprint: Some(fingerprint),
            mode: Some(mode),
            template_version: Some(resolved.version),
            created_at: Utc::now(),
        })
    }

    /// Build and publish the link language for a shared perspective.
    pub fn create_from_shared_perspective(
        &self,
        spec: &SharedPerspective,
        options: &LanguageOptions,
    ) -> Result<ModuleIdentity, FactoryError> {
        let span = info_span!("create_from_shared_perspective", run = %Uuid::new_v4());
        let _guard = span.enter();

        let module = self.render_from_shared_perspective(spec, options)?;
        self.publish(&module)
    }

    fn publish(&self, module: &GeneratedModule) -> Result<ModuleIdentity, FactoryError> {
        match self.publisher.publish(&module.to_expression()) {
            Ok(identity) => {
                info!(address = %identity.address, name = %identity.name, "new language published");
                Ok(identity)
            }
            Err(source) => {
                error!(name = %module.name, error = %source, "error creating new language");
                Err(FactoryError::Publish {
                    name: module.name.clone(),
                    source,
                })
            }
        }
    }
}
