//! hybridcrypt - RSA-OAEP messages and AES-256-GCM file packages
//!
//! Usage:
//!   hybridcrypt keygen <out.pem>                      - Generate a key pair
//!   hybridcrypt pubkey <private.pem>                  - Print the public key
//!   hybridcrypt encrypt -r <pub.pem>... -m <text>     - Encrypt a message
//!   hybridcrypt decrypt -k <private.pem> -m <text>    - Decrypt a message
//!   hybridcrypt pack -r <pub.pem>... -o <dir> <paths> - Encrypt files into packages
//!   hybridcrypt unpack -k <private.pem> -d <dir> <pkg> - Decrypt a package
//!   hybridcrypt inspect <pkg>                         - Show package header

use clap::{Parser, Subcommand};
use hybridcrypt::{
    archive::{Archive, BundleArchive},
    config::Config,
    crypto::{KeyPair, PublicKey},
    message,
    package::{self, EncryptOptions, PackageView},
    Error, Result,
};
use std::fs;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::{error, info, warn};
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(name = "hybridcrypt")]
#[command(author = "hybridcrypt Contributors")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "RSA-OAEP messages and AES-256-GCM multi-recipient file packages")]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "~/.config/hybridcrypt/config.json")]
    config: PathBuf,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate a key pair; the public key is written next to it as <name>_pub.pem
    Keygen {
        /// Private key output path (bare names go to the configured key directory)
        output: PathBuf,

        /// RSA modulus size in bits
        #[arg(long)]
        bits: Option<usize>,
    },

    /// Print the public key and fingerprint derived from a private key
    Pubkey {
        /// Private key PEM file
        key: PathBuf,
    },

    /// Encrypt a text message for one or more recipients
    Encrypt {
        /// Recipient public key PEM file (repeatable)
        #[arg(short, long = "recipient", required = true)]
        recipients: Vec<PathBuf>,

        /// Message text (reads --input or stdin when omitted)
        #[arg(short, long, conflicts_with = "input")]
        message: Option<String>,

        /// Read the message from a file
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Decrypt a text message
    Decrypt {
        /// Private key PEM file
        #[arg(short, long)]
        key: PathBuf,

        /// Encrypted message (reads --input or stdin when omitted)
        #[arg(short, long, conflicts_with = "input")]
        message: Option<String>,

        /// Read the encrypted message from a file
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Archive files and encrypt them into one package per recipient
    Pack {
        /// Recipient public key PEM file (repeatable)
        #[arg(short, long = "recipient", required = true)]
        recipients: Vec<PathBuf>,

        /// Directory to write packages to
        #[arg(short, long)]
        output_dir: PathBuf,

        /// Base name for package files (defaults to the first input's name)
        #[arg(long)]
        name: Option<String>,

        /// Files or directories to include
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Decrypt a package and extract its files
    Unpack {
        /// Private key PEM file
        #[arg(short, long)]
        key: PathBuf,

        /// Directory to extract into
        #[arg(short, long)]
        dest: PathBuf,

        /// Package file
        package: PathBuf,
    },

    /// Show the header of a package without decrypting it
    Inspect {
        /// Package file
        package: PathBuf,
    },
}

fn main() {
    let cli = Cli::parse();

    // Expand ~ in config path
    let config_path = expand_tilde(&cli.config);
    let config = match Config::load_or_default(&config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error: {}", e);
            std::process::exit(e.exit_code());
        }
    };

    // Setup logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_new(&config.logging.level).unwrap_or_else(|_| EnvFilter::new("info"))
    };

    let subscriber = FmtSubscriber::builder()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("Failed to set subscriber");

    if let Err(e) = run_command(cli.command, &config) {
        error!("Error: {}", e);
        std::process::exit(e.exit_code());
    }
}

fn run_command(command: Commands, config: &Config) -> Result<()> {
    match command {
        Commands::Keygen { output, bits } => cmd_keygen(config, &output, bits),

        Commands::Pubkey { key } => cmd_pubkey(&key),

        Commands::Encrypt {
            recipients,
            message,
            input,
        } => cmd_encrypt(&recipients, message, input),

        Commands::Decrypt {
            key,
            message,
            input,
        } => cmd_decrypt(&key, message, input),

        Commands::Pack {
            recipients,
            output_dir,
            name,
            paths,
        } => cmd_pack(config, &recipients, &output_dir, name, &paths),

        Commands::Unpack { key, dest, package } => cmd_unpack(&key, &dest, &package),

        Commands::Inspect { package } => cmd_inspect(&package),
    }
}

fn cmd_keygen(config: &Config, output: &Path, bits: Option<usize>) -> Result<()> {
    let mut key_config = config.clone();
    if let Some(bits) = bits {
        key_config.keys.bits = bits;
        key_config.validate()?;
    }

    let output = if output.parent().map_or(true, |p| p.as_os_str().is_empty()) {
        fs::create_dir_all(&config.keys.directory)?;
        config.keys.directory.join(output)
    } else {
        output.to_path_buf()
    };

    if output.exists() {
        return Err(Error::Io(std::io::Error::new(
            std::io::ErrorKind::AlreadyExists,
            format!("{:?} already exists, refusing to overwrite a key", output),
        )));
    }

    info!("Generating {}-bit RSA key pair...", key_config.keys.bits);
    let pair = KeyPair::generate(key_config.keys.bits)?;
    let public_path = pair.save_pem_files(&output)?;

    println!("Private key: {}", output.display());
    println!("Public key:  {}", public_path.display());
    println!("Fingerprint: {}", pair.public_key().fingerprint()?);
    Ok(())
}

fn cmd_pubkey(key: &Path) -> Result<()> {
    let pair = KeyPair::load_pem_file(key)?;

    print!("{}", pair.to_public_pem()?);
    println!("Fingerprint: {}", pair.public_key().fingerprint()?);
    println!("Modulus: {} bits", pair.modulus_size_bytes() * 8);
    Ok(())
}

fn cmd_encrypt(
    recipients: &[PathBuf],
    text: Option<String>,
    input: Option<PathBuf>,
) -> Result<()> {
    let keys = load_recipients(recipients)?;
    let text = read_input(text, input)?;
    let text = message::normalize_text(&text)?;

    let results = message::encrypt_for_recipients(text.as_bytes(), &keys);

    let mut first_error = None;
    for ((path, result), key) in recipients.iter().zip(results).zip(&keys) {
        match result {
            Ok(encoded) => {
                println!("# {} ({})", path.display(), short_fingerprint(key));
                println!("{}", encoded);
            }
            Err(e) => {
                warn!("Encryption for {} failed: {}", path.display(), e);
                first_error.get_or_insert(e);
            }
        }
    }

    match first_error {
        Some(e) => Err(e),
        None => Ok(()),
    }
}

fn cmd_decrypt(key: &Path, text: Option<String>, input: Option<PathBuf>) -> Result<()> {
    let pair = KeyPair::load_pem_file(key)?;
    let encoded = read_input(text, input)?;

    let plaintext = message::decrypt(&encoded, &pair)?;
    println!("{}", plaintext);
    Ok(())
}

fn cmd_pack(
    config: &Config,
    recipients: &[PathBuf],
    output_dir: &Path,
    name: Option<String>,
    paths: &[PathBuf],
) -> Result<()> {
    let keys = load_recipients(recipients)?;

    let name = name
        .or_else(|| {
            paths
                .first()
                .and_then(|p| p.file_stem())
                .map(|s| s.to_string_lossy().into_owned())
        })
        .unwrap_or_else(|| "package".to_string());

    info!("Archiving {} path(s)...", paths.len());
    let payload = BundleArchive::new().pack(paths)?;

    info!(
        "Encrypting {} bytes for {} recipient(s)...",
        payload.len(),
        keys.len()
    );
    let total = keys.len();
    let options = EncryptOptions::default()
        .parallel(config.package.parallel_wrap)
        .on_wrapped(Arc::new(move |index| {
            info!("Wrapped key for recipient {} of {}", index + 1, total);
        }));
    let packages = package::encrypt_package_with(&payload, &keys, &options)?;

    fs::create_dir_all(output_dir)?;
    for (index, (package, path)) in packages.iter().zip(recipients).enumerate() {
        let target = output_dir.join(format!(
            "{}_{}.{}",
            name,
            index + 1,
            config.package_extension()
        ));
        let file = fs::OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&target)?;
        let mut writer = std::io::BufWriter::new(file);
        package.write_to(&mut writer)?;
        writer.flush()?;

        println!("{} -> {}", path.display(), target.display());
    }

    Ok(())
}

fn cmd_unpack(key: &Path, dest: &Path, package_path: &Path) -> Result<()> {
    let pair = KeyPair::load_pem_file(key)?;
    let bytes = fs::read(package_path)?;

    info!("Decrypting {}...", package_path.display());
    let payload = package::decrypt_package(&bytes, &pair)?;

    fs::create_dir_all(dest)?;
    let written = BundleArchive::new().unpack(&payload, dest)?;
    for path in &written {
        println!("{}", path.display());
    }
    info!("Extracted {} file(s)", written.len());
    Ok(())
}

fn cmd_inspect(package_path: &Path) -> Result<()> {
    let bytes = fs::read(package_path)?;
    let view = PackageView::parse(&bytes)?;

    println!("Package: {}", package_path.display());
    println!("Wrapped key length: {} bytes", view.header_len());
    println!("Ciphertext length: {} bytes", view.ciphertext.len());
    println!("Total size: {} bytes", bytes.len());
    Ok(())
}

fn load_recipients(paths: &[PathBuf]) -> Result<Vec<PublicKey>> {
    paths
        .iter()
        .map(|path| {
            PublicKey::load_pem_file(path).map_err(|e| match e {
                Error::KeyFormat(msg) => {
                    Error::KeyFormat(format!("{}: {}", path.display(), msg))
                }
                other => other,
            })
        })
        .collect()
}

fn read_input(text: Option<String>, input: Option<PathBuf>) -> Result<String> {
    match (text, input) {
        (Some(text), _) => Ok(text),
        (None, Some(path)) => Ok(fs::read_to_string(path)?),
        (None, None) => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}

fn short_fingerprint(key: &PublicKey) -> String {
    key.fingerprint()
        .map(|f| f[..16].to_string())
        .unwrap_or_else(|_| "unknown".to_string())
}

/// Expand ~ to home directory
fn expand_tilde(path: &Path) -> PathBuf {
    if let Ok(rest) = path.strip_prefix("~") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    path.to_path_buf()
}
