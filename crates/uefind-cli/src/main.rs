use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Result, bail};
use clap::{Parser, Subcommand};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;
use uefind_core::{SignatureTable, load_signatures, parse_hex_address};

mod commands;
mod config;
mod session;
mod shutdown;

use config::CliConfig;
use session::{ImageOptions, Session};
use shutdown::ShutdownSignal;

#[derive(Parser)]
#[command(name = "uefind")]
#[command(version)]
#[command(about = "Locate Unreal Engine globals in a module image")]
struct Args {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    #[arg(short, long, global = true, default_value = "uefind.toml", env = "UEFIND_CONFIG")]
    config: PathBuf,

    /// JSON signature table to use instead of the built-in one
    #[arg(short, long, global = true)]
    signatures: Option<PathBuf>,

    /// Print machine-readable JSON
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(clap::Args)]
struct ImageArgs {
    /// Dumped module image
    image: PathBuf,

    /// Address the image is mapped at (hex)
    #[arg(short, long)]
    base: Option<String>,

    /// Module name to report instead of the file name
    #[arg(short, long)]
    module_name: Option<String>,
}

#[derive(Subcommand)]
enum Command {
    /// Locate every global in an image
    Scan {
        #[command(flatten)]
        image: ImageArgs,

        /// Write found globals to an offset list
        #[arg(long)]
        save: Option<PathBuf>,
    },
    /// Locate one global (GWorld, GNames or GObjects)
    Locate {
        class: String,

        #[command(flatten)]
        image: ImageArgs,
    },
    /// Scan an image for an arbitrary signature
    Sig {
        pattern: String,

        #[command(flatten)]
        image: ImageArgs,
    },
    /// Compile a signature and show its bytes and mask
    Pattern { pattern: String },
    /// Print a saved offset list
    Offsets { file: PathBuf },
    /// Parse and re-format a hex address
    Hex { value: String },
    /// Show the signature table, or export it as JSON
    Signatures {
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn main() -> Result<()> {
    let args = Args::parse();

    let directive = if args.verbose { "uefind=debug" } else { "uefind=info" };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(directive.parse()?))
        .with_writer(std::io::stderr)
        .init();

    match args.command {
        Command::Pattern { pattern } => commands::pattern::run(&pattern, args.json),
        Command::Offsets { file } => commands::offsets::run(&file, args.json),
        Command::Hex { value } => commands::hex::run(&value, args.json),
        Command::Signatures { output } => {
            let table = signature_table(args.signatures.as_deref())?;
            commands::signatures::run(&table, output.as_deref(), args.json)
        }
        Command::Scan { image, save } => {
            let session = open_session(&args.config, args.signatures.as_deref(), &image)?;
            commands::scan::run(&session, save.as_deref(), args.json)
        }
        Command::Locate { class, image } => {
            let session = open_session(&args.config, args.signatures.as_deref(), &image)?;
            commands::locate::run(&session, &class, args.json)
        }
        Command::Sig { pattern, image } => {
            let session = open_session(&args.config, args.signatures.as_deref(), &image)?;
            commands::sig::run(&session, &pattern, args.json)
        }
    }
}

fn signature_table(path: Option<&Path>) -> Result<SignatureTable> {
    match path {
        Some(path) => {
            let table = load_signatures(path)?;
            info!("Using signature table {} ({} variants)", table.version(), table.len());
            Ok(table)
        }
        None => Ok(SignatureTable::default()),
    }
}

fn open_session(
    config_path: &Path,
    signatures: Option<&Path>,
    image: &ImageArgs,
) -> Result<Session<uefind_core::ImageFile>> {
    let config = CliConfig::load_or_default(config_path);
    let table = signature_table(signatures)?;

    let base_address = match image.base.as_deref() {
        Some(text) => match parse_hex_address(text) {
            0 => bail!("Invalid base address: {}", text),
            base => Some(base),
        },
        None => None,
    };
    let options = ImageOptions {
        base_address,
        module_name: image.module_name.clone(),
    };

    let signal = Arc::new(ShutdownSignal::new());
    let handler_signal = Arc::clone(&signal);
    ctrlc::set_handler(move || {
        warn!("Received interrupt, cancelling...");
        handler_signal.trigger();
    })?;

    Session::open_image(&image.image, &options, &config, table, signal)
}
