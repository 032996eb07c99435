//! packdeploy CLI - extract installer packs into a target directory.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use indicatif::{ProgressBar, ProgressStyle};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

use packdeploy::pack::SelectedPack;
use packdeploy::pack::stream::PackStreamReader;
use packdeploy::resources::ResourceProvider;
use packdeploy::unpacker::{PlatformCapabilities, UnpackConfig, Unpacker};
use packdeploy::variables::{MapSubstitutor, ProgressEvent, StaticConditions};

#[derive(Parser)]
#[command(name = "packdeploy")]
#[command(version)]
#[command(about = "Pack extraction and deferred-file installation engine")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging (use RUST_LOG=debug for more detail)
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract the selected packs of an installer archive
    Install {
        /// Path to the installer archive (a jar/zip containing packs/)
        archive: PathBuf,

        /// Installation target directory
        #[arg(short, long)]
        output: PathBuf,

        /// Source directory for loose files (defaults to the target's parent)
        #[arg(short, long)]
        source: Option<PathBuf>,

        /// Pack to install, in order (repeatable)
        #[arg(short, long = "pack", required = true)]
        packs: Vec<String>,

        /// Variable assignment, NAME=VALUE (repeatable)
        #[arg(long = "var", value_parser = parse_assignment)]
        vars: Vec<(String, String)>,

        /// Condition id to treat as true (repeatable; none means all true)
        #[arg(long = "condition")]
        conditions: Vec<String>,

        /// Base URL for web-hosted pack archives
        #[arg(long)]
        web_base: Option<String>,

        /// Directory holding additional installation media (multi-volume)
        #[arg(long)]
        media: Option<PathBuf>,

        /// Pack stream decoder: raw, gzip or deflate
        #[arg(long, default_value = "raw")]
        decoder: String,
    },

    /// List the contents of packs inside an installer archive
    Info {
        /// Path to the installer archive
        archive: PathBuf,

        /// Pack to inspect (repeatable)
        #[arg(short, long = "pack", required = true)]
        packs: Vec<String>,

        /// Pack stream decoder: raw, gzip or deflate
        #[arg(long, default_value = "raw")]
        decoder: String,
    },
}

fn parse_assignment(s: &str) -> std::result::Result<(String, String), String> {
    match s.split_once('=') {
        Some((name, value)) if !name.is_empty() => Ok((name.to_string(), value.to_string())),
        _ => Err(format!("expected NAME=VALUE, got {s:?}")),
    }
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if cli.verbose || std::env::var("RUST_LOG").is_ok() {
        tracing_subscriber::fmt()
            .with_env_filter(EnvFilter::from_default_env().add_directive(
                if cli.verbose {
                    "packdeploy=debug".parse()?
                } else {
                    "packdeploy=warn".parse()?
                },
            ))
            .init();
    }

    match cli.command {
        Commands::Install {
            archive,
            output,
            source,
            packs,
            vars,
            conditions,
            web_base,
            media,
            decoder,
        } => install(
            archive, output, source, packs, vars, conditions, web_base, media, &decoder,
        ),
        Commands::Info {
            archive,
            packs,
            decoder,
        } => info(archive, &packs, &decoder),
    }
}

#[allow(clippy::too_many_arguments)]
fn install(
    archive: PathBuf,
    output: PathBuf,
    source: Option<PathBuf>,
    packs: Vec<String>,
    vars: Vec<(String, String)>,
    conditions: Vec<String>,
    web_base: Option<String>,
    media: Option<PathBuf>,
    decoder: &str,
) -> Result<()> {
    let mut resources = ResourceProvider::new(&archive).with_decoder(decoder)?;
    if let Some(base) = web_base {
        resources = resources.with_web_base(base);
    }
    if let Some(media) = media {
        resources = resources.with_media_dir(media);
    }

    let mut config =
        UnpackConfig::new(&output).with_capabilities(PlatformCapabilities::detect());
    if let Some(source) = source {
        config = config.with_source_dir(source);
    }

    let selection: Vec<SelectedPack> = packs.iter().map(SelectedPack::named).collect();
    let variables: BTreeMap<String, String> = vars.into_iter().collect();

    let bar = ProgressBar::new(0);
    bar.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} | {msg}")
            .context("progress template")?
            .progress_chars("=>-"),
    );
    let progress_bar = bar.clone();
    let progress = Arc::new(move |event: ProgressEvent| match event {
        ProgressEvent::StartUnpack { total_packs } => {
            progress_bar.set_message(format!("{total_packs} pack(s) selected"));
        }
        ProgressEvent::PackBegin { name, files } => {
            progress_bar.set_length(u64::from(files));
            progress_bar.set_position(0);
            progress_bar.set_message(name);
        }
        ProgressEvent::FileDone { path } => {
            progress_bar.inc(1);
            progress_bar.set_message(path);
        }
        ProgressEvent::Stopped => progress_bar.finish_and_clear(),
    });

    let mut unpacker = Unpacker::new(
        config,
        resources,
        selection,
        Box::new(StaticConditions::new(
            conditions,
            std::env::consts::OS,
        )),
        Box::new(MapSubstitutor::new(variables)),
    )?
    .with_progress(progress);

    match unpacker.run() {
        Ok(summary) => {
            println!("Installed {} paths.", summary.installed_paths.len());
            if summary.reboot_necessary {
                println!("Some files were in use; a reboot is required to finish.");
            }
            Ok(())
        }
        Err(e) if e.is_cancellation() => {
            bar.finish_and_clear();
            println!("Installation cancelled.");
            std::process::exit(2);
        }
        Err(e) => Err(e).context("installation failed"),
    }
}

fn info(archive: PathBuf, packs: &[String], decoder: &str) -> Result<()> {
    let resources = ResourceProvider::new(&archive).with_decoder(decoder)?;

    for name in packs {
        let stream = resources
            .open_pack(name, None)
            .with_context(|| format!("opening pack {name}"))?;
        let mut reader = PackStreamReader::open(stream)?;
        println!("Pack {name}: {} file(s)", reader.file_count());

        for _ in 0..reader.file_count() {
            let file = reader.next_file()?;
            let kind = if file.is_directory {
                "dir"
            } else if file.is_back_reference() {
                "ref"
            } else if file.is_repacked_jar {
                "jar"
            } else {
                "file"
            };
            print!("  [{kind:>4}] {} ({} bytes)", file.target_path, file.length);
            if let Some(condition) = &file.condition {
                print!(" if {condition}");
            }
            println!();
            reader.skip_payload(&file, false)?;
        }

        let trailers = reader.read_trailers()?;
        if !trailers.parsables.is_empty()
            || !trailers.executables.is_empty()
            || !trailers.update_checks.is_empty()
        {
            println!(
                "  trailers: {} parsable, {} executable, {} update check(s)",
                trailers.parsables.len(),
                trailers.executables.len(),
                trailers.update_checks.len()
            );
        }
    }
    Ok(())
}
