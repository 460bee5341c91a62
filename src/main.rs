//! Image Vault - CLI
//!
//! Command-line front end for the upload / download / bundle pipeline.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};

use image_vault::{ImageContentType, ImageService, ServiceConfig, UploadedFile};

#[derive(Parser)]
#[command(name = "image-vault")]
#[command(author = "Karen Tonoyan")]
#[command(version = image_vault::VERSION)]
#[command(about = "Image Vault - resize, encrypt and store images")]
struct Cli {
    /// JSON configuration file (defaults apply when omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Resize, encrypt and store images
    Upload {
        /// Image files (.png, .jpg, .jpeg)
        #[arg(required = true)]
        files: Vec<PathBuf>,

        /// Target width in pixels
        #[arg(long)]
        width: u32,

        /// Target height in pixels
        #[arg(long)]
        height: u32,
    },

    /// Decrypt one stored image
    Download {
        /// Stored file name
        name: String,

        /// Output path
        #[arg(short, long)]
        output: PathBuf,
    },

    /// Decrypt every stored image into a ZIP archive
    Bundle {
        /// Output path
        #[arg(short, long, default_value = "images.zip")]
        output: PathBuf,
    },

    /// List stored images
    List,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    if let Err(e) = run(cli) {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => ServiceConfig::load(path)?,
        None => ServiceConfig::default(),
    };
    let service = ImageService::from_config(&config).context("failed to start image service")?;

    match cli.command {
        Commands::Upload { files, width, height } => {
            let uploads = files
                .iter()
                .map(|path| read_upload(path))
                .collect::<anyhow::Result<Vec<_>>>()?;

            println!("📥 Uploading {} file(s) at {}x{}...", uploads.len(), width, height);
            let report = service.upload(&uploads, width, height)?;

            for name in report.stored() {
                println!("✅ {}", name);
            }
            for (name, err) in report.failed() {
                println!("❌ {} - {}", name, err);
            }

            if !report.is_complete() {
                bail!("{} of {} file(s) failed", report.failed().len(), uploads.len());
            }
        }

        Commands::Download { name, output } => {
            let image = service.download_with_type(&name)?;
            std::fs::write(&output, &image.bytes)
                .with_context(|| format!("cannot write {}", output.display()))?;
            println!(
                "📤 {} ({}, {} bytes) → {}",
                image.name,
                image.content_type,
                image.bytes.len(),
                output.display()
            );
        }

        Commands::Bundle { output } => {
            let archive = service.bundle_all()?;
            std::fs::write(&output, &archive)
                .with_context(|| format!("cannot write {}", output.display()))?;
            println!("📦 Archive written to: {} ({} bytes)", output.display(), archive.len());
        }

        Commands::List => {
            let names = service.list()?;
            if names.is_empty() {
                println!("📭 No images stored");
            } else {
                println!("🖼️ Stored images ({}):", names.len());
                println!("{:-<40}", "");
                for name in names {
                    println!("  {}", name);
                }
            }
        }
    }

    Ok(())
}

/// Read a file from disk as an upload; the declared type follows the extension
fn read_upload(path: &Path) -> anyhow::Result<UploadedFile> {
    let name = path
        .file_name()
        .and_then(|n| n.to_str())
        .with_context(|| format!("no usable file name in {}", path.display()))?
        .to_string();

    let content_type = ImageContentType::from_file_name(&name)
        .map(|t| t.as_str().to_string())
        .unwrap_or_else(|_| "application/octet-stream".to_string());

    let bytes = std::fs::read(path).with_context(|| format!("cannot read {}", path.display()))?;

    Ok(UploadedFile::new(name, content_type, bytes))
}
