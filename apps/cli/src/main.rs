use std::path::PathBuf;
use std::sync::{Arc, mpsc};

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use fwact_core::{
    ChannelSink, ExtensionConfig, FirmwareDetails, ImageLocationId, InstallerDetails, UpdateEvent,
    UpdateExtension,
};
use tracing::{error, info};

#[derive(Parser, Debug)]
#[command(author, version, about = "Firmware activation tool", long_about = None)]
struct Args {
    /// Path to a TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the active header path
    #[arg(long)]
    header: Option<PathBuf>,

    /// Override the activation script
    #[arg(long)]
    script: Option<PathBuf>,

    /// Override the firmware image directory
    #[arg(long)]
    firmware_dir: Option<PathBuf>,

    /// Override the post-activation settle delay (ms)
    #[arg(long)]
    settle_ms: Option<u64>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Print the active firmware details
    Details,
    /// Print the installer details
    Installer,
    /// Activate the image at a storage location and wait for the result
    Activate {
        /// Storage location id
        location: u32,
    },
    /// Write the effective configuration to a TOML file
    SaveConfig {
        /// Output path
        path: PathBuf,
    },
}

fn load_config(args: &Args) -> Result<ExtensionConfig> {
    let mut config = match &args.config {
        Some(path) => ExtensionConfig::load_from_file(path)?,
        None => ExtensionConfig::default(),
    };
    if let Some(header) = &args.header {
        config.header_path = header.clone();
    }
    if let Some(script) = &args.script {
        config.activation_script = script.clone();
    }
    if let Some(dir) = &args.firmware_dir {
        config.firmware_dir = dir.clone();
    }
    if let Some(ms) = args.settle_ms {
        config.settle_delay_ms = ms;
    }
    Ok(config)
}

fn wait_for(rx: &mpsc::Receiver<UpdateEvent>, accept: impl Fn(UpdateEvent) -> bool) -> Result<UpdateEvent> {
    loop {
        let event = rx.recv().context("event channel closed")?;
        if accept(event) {
            return Ok(event);
        }
    }
}

fn open_extension(config: &ExtensionConfig) -> Result<(UpdateExtension, mpsc::Receiver<UpdateEvent>)> {
    let ext = UpdateExtension::new(config)?;
    let (tx, rx) = mpsc::channel();
    ext.init_api(Arc::new(ChannelSink::new(tx)));
    Ok((ext, rx))
}

fn run(args: Args) -> Result<()> {
    let config = load_config(&args)?;

    match args.command {
        Commands::Details => {
            let (ext, rx) = open_extension(&config)?;
            let mut details = FirmwareDetails::default();
            let result = ext.get_active_firmware_details(Some(&mut details));
            wait_for(&rx, |e| e == UpdateEvent::ActiveDetailsReady)?;
            result?;
            println!("{}", details);
        }
        Commands::Installer => {
            let (ext, rx) = open_extension(&config)?;
            let mut details = InstallerDetails::default();
            ext.get_installer_details(Some(&mut details))?;
            wait_for(&rx, |e| e == UpdateEvent::InstallerDetailsReady)?;
            println!("{}", details);
        }
        Commands::Activate { location } => {
            let (ext, rx) = open_extension(&config)?;
            let handle = ext.activate_image(ImageLocationId(location))?;
            info!(location, "Activation started");
            let event = wait_for(&rx, UpdateEvent::is_activation_terminal)?;
            handle.wait();
            if event != UpdateEvent::ActivationDone {
                bail!("activation of location {} failed", location);
            }
            info!(location, "Activation done");
        }
        Commands::SaveConfig { path } => {
            config.save_to_file(&path)?;
            info!(path = %path.display(), "Configuration saved");
        }
    }

    Ok(())
}

fn main() {
    let args = Args::parse();

    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::builder()
                .with_default_directive(if args.verbose {
                    tracing::Level::DEBUG.into()
                } else {
                    tracing::Level::INFO.into()
                })
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .finish();

    tracing::subscriber::set_global_default(subscriber).expect("setting default subscriber failed");

    if let Err(e) = run(args) {
        error!("Error: {:#}", e);
        std::process::exit(1);
    }
}
