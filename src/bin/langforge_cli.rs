//! LangForge CLI - Bridge interface for the host application
//!
//! Commands: templates, fingerprint, render, create, from-template
//! Outputs JSON to stdout, logs to stderr
//! Returns non-zero on failure

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;

use langforge_core::{
    derive_fingerprint, DirectoryPublisher, FactoryConfig, IdentitySource, LanguageFactory, LanguageOptions,
    SharedPerspective,
};

#[derive(Parser)]
#[command(name = "langforge-cli", version)]
#[command(about = "LangForge CLI - Language templating and fingerprint engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Path to factory config (JSON)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the languages directory
    #[arg(short, long)]
    language_root: Option<PathBuf>,
}

#[derive(clap::Args)]
struct PublishArgs {
    /// Mark the language as encrypted
    #[arg(long)]
    encrypt: bool,

    /// Sharing passphrase
    #[arg(long, default_value = "")]
    passphrase: String,

    /// Directory published languages are stored in
    #[arg(long, default_value = "published")]
    store: PathBuf,
}

#[derive(Subcommand)]
enum Commands {
    /// List the sharing mode template table
    Templates,

    /// Print the fingerprint of a shared perspective
    Fingerprint {
        /// JSON payload (SharedPerspective)
        #[arg(short, long)]
        spec: String,
    },

    /// Assemble a link language without publishing it
    Render {
        /// JSON payload (SharedPerspective)
        #[arg(short, long)]
        spec: String,

        /// Where the DNA identity comes from
        #[arg(long, value_enum)]
        identity: IdentitySource,

        /// Sharing passphrase
        #[arg(long, default_value = "")]
        passphrase: String,
    },

    /// Create and publish a link language for a shared perspective
    Create {
        /// JSON payload (SharedPerspective)
        #[arg(short, long)]
        spec: String,

        /// Where the DNA identity comes from
        #[arg(long, value_enum)]
        identity: IdentitySource,

        #[command(flatten)]
        publish: PublishArgs,
    },

    /// Create and publish a unique expression language from a bundle directory
    FromTemplate {
        /// Directory containing bundle.js
        #[arg(short, long)]
        bundle: PathBuf,

        /// DNA nick, the DNA is read from <bundle>/../<nick>.dna
        #[arg(short, long)]
        dna_nick: String,

        #[command(flatten)]
        publish: PublishArgs,
    },
}

fn fail(error: impl std::fmt::Display) -> ExitCode {
    let output = serde_json::json!({
        "success": false,
        "error": error.to_string(),
    });
    println!("{}", output);
    ExitCode::FAILURE
}

fn print_json(value: &serde_json::Value) -> ExitCode {
    match serde_json::to_string_pretty(value) {
        Ok(text) => {
            println!("{}", text);
            ExitCode::SUCCESS
        }
        Err(e) => fail(e),
    }
}

fn parse_spec(payload: &str) -> Result<SharedPerspective, String> {
    serde_json::from_str(payload).map_err(|e| format!("Invalid payload: {}", e))
}

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    let config = match &cli.config {
        Some(path) => match FactoryConfig::load(path) {
            Ok(c) => c,
            Err(e) => return fail(e),
        },
        None => FactoryConfig::default(),
    };
    let config = match cli.language_root {
        Some(root) => config.with_language_root(root),
        None => config,
    };

    match cli.command {
        Commands::Templates => {
            let templates: Vec<_> = config
                .templates
                .iter()
                .map(|(mode, entry)| {
                    serde_json::json!({
                        "mode": mode,
                        "template": entry.template,
                        "version": entry.template_version.to_string(),
                        "dna": entry.dna,
                    })
                })
                .collect();
            print_json(&serde_json::Value::Array(templates))
        }

        Commands::Fingerprint { spec } => {
            let spec = match parse_spec(&spec) {
                Ok(s) => s,
                Err(e) => return fail(e),
            };
            match derive_fingerprint(&spec) {
                Ok(fingerprint) => print_json(&serde_json::json!({
                    "success": true,
                    "fingerprint": fingerprint,
                })),
                Err(e) => fail(e),
            }
        }

        Commands::Render {
            spec,
            identity,
            passphrase,
        } => {
            let spec = match parse_spec(&spec) {
                Ok(s) => s,
                Err(e) => return fail(e),
            };
            let factory = LanguageFactory::from_config(&config, DirectoryPublisher::new("published"));
            let options = LanguageOptions {
                encrypt: false,
                passphrase,
                identity,
            };
            match factory.render_from_shared_perspective(&spec, &options) {
                Ok(module) => print_json(&serde_json::json!({
                    "success": true,
                    "module": module,
                })),
                Err(e) => fail(e),
            }
        }

        Commands::Create {
            spec,
            identity,
            publish,
        } => {
            let spec = match parse_spec(&spec) {
                Ok(s) => s,
                Err(e) => return fail(e),
            };
            let factory = LanguageFactory::from_config(&config, DirectoryPublisher::new(publish.store));
            let options = LanguageOptions {
                encrypt: publish.encrypt,
                passphrase: publish.passphrase,
                identity,
            };
            match factory.create_from_shared_perspective(&spec, &options) {
                Ok(language) => print_json(&serde_json::json!({
                    "success": true,
                    "language": language,
                })),
                Err(e) => fail(e),
            }
        }

        Commands::FromTemplate {
            bundle,
            dna_nick,
            publish,
        } => {
            let factory = LanguageFactory::from_config(&config, DirectoryPublisher::new(publish.store));
            let mut options = LanguageOptions::keyed_by_passphrase(publish.passphrase);
            if publish.encrypt {
                options = options.encrypted();
            }
            match factory.create_from_template(&bundle, &dna_nick, &options) {
                Ok(language) => print_json(&serde_json::json!({
                    "success": true,
                    "language": language,
                })),
                Err(e) => fail(e),
            }
        }
    }
}
