// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2024 Daniel J. H. Nebdal

//! Command-line surface: argument parsing, verb dispatch, and logging setup.

use std::fs::{self, File};
use std::io::{self, BufReader, Write};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{Context, Result, bail};
use clap::{Args, Parser, Subcommand};
use tracing::{error, warn};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::logic::{
    MANIFEST_ENTRY, PackageOutcome, extract_from_path, is_archive_path, package,
};
use crate::models::{FileAttachment, Manifest};

#[derive(Parser, Debug)]
#[command(name = "teamplay-manifest")]
#[command(about = "Parse and package teamplay manifests")]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output (can be used multiple times for increased verbosity)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the performer (target analysis container) of a manifest
    #[command(name = "printPerformer", alias = "print-performer")]
    PrintPerformer(SourceArgs),

    /// Print a human-readable summary of a manifest
    #[command(name = "printInfo", alias = "print-info")]
    PrintInfo(SourceArgs),

    /// Package a manifest and its data files into a ZIP archive
    Package(SourceArgs),

    /// Write the manifest found in a manifest or archive to ./MANIFEST.json
    Extract(SourceArgs),

    /// Create a new requested manifest
    Create(CreateArgs),

    /// Mark a manifest as completed with the given output files
    Complete(CompleteArgs),
}

#[derive(Args, Debug)]
pub struct SourceArgs {
    /// Manifest or package to work on
    #[arg(env = "TEAMPLAY_MANIFEST", default_value = MANIFEST_ENTRY)]
    pub file: PathBuf,
}

#[derive(Args, Debug)]
pub struct CreateArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Patient reference
    #[arg(long)]
    pub patient: String,

    /// Encounter or timepoint reference
    #[arg(long)]
    pub encounter: String,

    /// Target analysis container
    #[arg(long)]
    pub performer: String,

    /// Input file, MIME type guessed from the extension
    #[arg(short, long = "attach", value_name = "NAME=DESCRIPTION", value_parser = parse_attachment, required = true)]
    pub attach: Vec<FileAttachment>,
}

#[derive(Args, Debug)]
pub struct CompleteArgs {
    #[command(flatten)]
    pub source: SourceArgs,

    /// Output file, MIME type guessed from the extension
    #[arg(short, long = "attach", value_name = "NAME=DESCRIPTION", value_parser = parse_attachment, required = true)]
    pub attach: Vec<FileAttachment>,
}

/// How a verb ended when it did not fail outright.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Exit {
    Success,
    /// The verb declined to run (e.g. it would overwrite a file).
    Refused,
}

impl From<Exit> for ExitCode {
    fn from(exit: Exit) -> Self {
        match exit {
            Exit::Success => ExitCode::SUCCESS,
            Exit::Refused => ExitCode::FAILURE,
        }
    }
}

fn parse_attachment(raw: &str) -> std::result::Result<FileAttachment, String> {
    match raw.split_once('=') {
        Some((name, description)) if !name.is_empty() => {
            Ok(FileAttachment::with_guessed_mime(name, description))
        }
        _ => Err(format!("expected NAME=DESCRIPTION, got {raw:?}")),
    }
}

/// Parse arguments, run one verb in the current directory, and map the result to an exit code.
pub fn run() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let stdout = io::stdout();
    match execute(&cli.command, Path::new("."), &mut stdout.lock()) {
        Ok(exit) => exit.into(),
        Err(err) => {
            error!("{err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Logs go to stderr so stdout carries only command output.
fn init_tracing(verbose: u8) {
    let default = match verbose {
        0 => "teamplay_manifest=info",
        _ => "teamplay_manifest=debug",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(io::stderr),
        )
        .init();
}

/// Run `command` with relative paths resolved against `workdir`.
pub fn execute(command: &Command, workdir: &Path, out: &mut impl Write) -> Result<Exit> {
    match command {
        Command::PrintPerformer(args) => {
            let manifest = load_manifest(&workdir.join(&args.file))?;
            writeln!(out, "{}", manifest.performer)?;
        }
        Command::PrintInfo(args) => {
            let manifest = load_manifest(&workdir.join(&args.file))?;
            writeln!(out, "{manifest}")?;
        }
        Command::Package(args) => {
            if is_archive_path(&args.file) {
                warn!("Trying to create a package from a manifest inside a package.");
                warn!("If you really want this, extract the manifest and package it in two steps.");
                return Ok(Exit::Success);
            }
            let mut manifest = load_manifest(&workdir.join(&args.file))?;
            match package(&mut manifest, workdir).context("Failed to package manifest")? {
                PackageOutcome::Created(name) => writeln!(out, "{name}")?,
                PackageOutcome::MissingFiles(missing) => {
                    writeln!(out, "Missing files, nothing packaged: {missing:?}")?
                }
            }
        }
        Command::Extract(args) => {
            let manifest = load_manifest(&workdir.join(&args.file))?;
            let target = workdir.join(MANIFEST_ENTRY);
            if target.exists() {
                warn!("{MANIFEST_ENTRY} already exists in current directory. Will not overwrite.");
                return Ok(Exit::Refused);
            }
            write_manifest(&manifest, &target)?;
        }
        Command::Create(args) => {
            let target = workdir.join(&args.source.file);
            if is_archive_path(&target) {
                bail!("Refusing to write a manifest to archive path {:?}", target);
            }
            if target.exists() {
                warn!("{} already exists. Will not overwrite.", target.display());
                return Ok(Exit::Refused);
            }
            let manifest = Manifest::new(
                args.patient.as_str(),
                args.encounter.as_str(),
                args.performer.as_str(),
                args.attach.clone(),
            )?;
            write_manifest(&manifest, &target)?;
        }
        Command::Complete(args) => {
            let target = workdir.join(&args.source.file);
            if is_archive_path(&target) {
                bail!("Extract the manifest from {:?} before completing it", target);
            }
            let mut manifest = load_manifest(&target)?;
            manifest
                .mark_done(args.attach.clone())
                .with_context(|| format!("Failed to complete manifest {:?}", target))?;
            write_manifest(&manifest, &target)?;
        }
    }
    Ok(Exit::Success)
}

/// Load a manifest from a JSON file, or from the manifest entry of a ZIP archive.
fn load_manifest(path: &Path) -> Result<Manifest> {
    if is_archive_path(path) {
        return extract_from_path(path)
            .with_context(|| format!("Failed to read manifest from archive {:?}", path));
    }
    let file = File::open(path).with_context(|| format!("Failed to open manifest {:?}", path))?;
    Manifest::from_reader(BufReader::new(file))
        .with_context(|| format!("Failed to parse manifest {:?}", path))
}

fn write_manifest(manifest: &Manifest, target: &Path) -> Result<()> {
    let json = manifest.to_json_pretty()?;
    fs::write(target, json).with_context(|| format!("Failed to write manifest {:?}", target))
}
