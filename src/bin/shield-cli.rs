//! Operator CLI for keys, PII envelopes and configuration checks.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use request_shield::config::loader::ENCRYPTION_KEY_ENV;
use request_shield::config::{load_config, EncryptionConfig};
use request_shield::crypto::{mask_for_logging, DataEncryptionService};

#[derive(Parser)]
#[command(name = "shield-cli")]
#[command(about = "Key management and PII tooling for request-shield", long_about = None)]
struct Cli {
    /// Config file to read the encryption section from. Without it the key
    /// comes from SHIELD_ENCRYPTION_KEY.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a new random 256-bit key
    Keygen,
    /// Encrypt a value into a base64 envelope
    Encrypt {
        value: String,
        /// Apply PII trimming and length rules
        #[arg(long)]
        pii: bool,
    },
    /// Decrypt a base64 envelope
    Decrypt {
        envelope: String,
        #[arg(long)]
        pii: bool,
    },
    /// Keyed hash of a value, for lookups without decryption
    Hash {
        value: String,
        /// Compare against this digest instead of printing one
        #[arg(long)]
        verify: Option<String>,
    },
    /// Mask a value the way logs show it
    Mask { value: String },
    /// Load and validate a configuration file
    CheckConfig { path: PathBuf },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    match cli.command {
        Commands::Keygen => {
            println!("{}", DataEncryptionService::generate_new_key());
        }
        Commands::Encrypt { value, pii } => {
            let service = service(cli.config.as_ref())?;
            let envelope = if pii {
                service.encrypt_pii(&value)?
            } else {
                service.encrypt(&value)?
            };
            println!("{envelope}");
        }
        Commands::Decrypt { envelope, pii } => {
            let service = service(cli.config.as_ref())?;
            let plaintext = if pii {
                service.decrypt_pii(&envelope)?
            } else {
                service.decrypt(&envelope)?
            };
            println!("{plaintext}");
        }
        Commands::Hash { value, verify } => {
            let service = service(cli.config.as_ref())?;
            match verify {
                Some(digest) => {
                    let matches = service.verify_hash(&value, &digest);
                    println!("{}", if matches { "match" } else { "no match" });
                    if !matches {
                        std::process::exit(1);
                    }
                }
                None => println!("{}", service.hash_sensitive_data(&value)?),
            }
        }
        Commands::Mask { value } => {
            println!("{}", mask_for_logging(Some(&value)));
        }
        Commands::CheckConfig { path } => {
            let config = load_config(&path)?;
            let service = DataEncryptionService::from_config(&config.encryption);
            println!("Configuration OK: {}", path.display());
            println!("  bind address:      {}", config.listener.bind_address);
            println!(
                "  default limit:     {} per {}s",
                config.rate_limit.requests_per_window, config.rate_limit.window_secs
            );
            for endpoint in &config.rate_limit.endpoints {
                println!(
                    "  endpoint {:<20} {} per {}s",
                    endpoint.name, endpoint.requests_per_window, endpoint.window_secs
                );
            }
            println!(
                "  encryption:        {}",
                if service.is_encryption_configured() {
                    "configured"
                } else {
                    "NOT configured"
                }
            );
        }
    }

    Ok(())
}

fn service(config: Option<&PathBuf>) -> Result<DataEncryptionService, Box<dyn std::error::Error>> {
    let encryption = match config {
        Some(path) => load_config(path)?.encryption,
        None => EncryptionConfig {
            key: std::env::var(ENCRYPTION_KEY_ENV).unwrap_or_default().into(),
            ..EncryptionConfig::default()
        },
    };

    let service = DataEncryptionService::from_config(&encryption);
    if !service.is_encryption_configured() {
        eprintln!("warning: encryption key is missing or a placeholder ({ENCRYPTION_KEY_ENV})");
    }
    Ok(service)
}
