use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};

use bracket_hdr::config::Config;
use bracket_hdr::labeler::{self, LabelReport, RenameOutcome};
use bracket_hdr::{discovery, pipeline, tools};

#[derive(Parser, Debug)]
#[command(
    name = "bracket-hdr",
    version,
    about = "Group bracketed exposures by capture time and fuse them into HDR images with align_image_stack + enfuse"
)]
struct Cli {
    #[command(subcommand)]
    command: Option<Command>,

    /// Path to config file (default: config.json next to binary)
    #[arg(short, long, value_name = "FILE", global = true)]
    config: Option<PathBuf>,

    /// Initialize a default config.json and exit
    #[arg(long)]
    init: bool,

    /// Output results as JSON
    #[arg(long, global = true)]
    json: bool,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Split RAW files into brackets by capture time and rename them Group_<N>_E<M>
    Label(LabelArgs),
    /// Align each Group_<N> set of images and fuse it into HDR batches
    Fuse(FuseArgs),
}

#[derive(Args, Debug)]
struct LabelArgs {
    /// Folder containing the RAW files
    #[arg(value_name = "FOLDER", default_value = ".")]
    folder: PathBuf,

    /// Maximum gap in seconds between shots of one bracket [default: 2]
    #[arg(short, long, value_name = "SECS")]
    window: Option<f64>,

    /// Label prefix for renamed files [default: Group]
    #[arg(short, long)]
    prefix: Option<String>,

    /// RAW extension to include; repeat for several [default: arw cr2 nef orf dng raf]
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Preview renames without touching any file
    #[arg(long)]
    dry_run: bool,
}

#[derive(Args, Debug)]
struct FuseArgs {
    /// Folder containing the labeled images
    #[arg(value_name = "FOLDER", default_value = ".")]
    folder: PathBuf,

    /// Label prefix to group by [default: Group]
    #[arg(short, long)]
    prefix: Option<String>,

    /// Image extension to include; repeat for several [default: jpg]
    #[arg(long = "ext", value_name = "EXT")]
    extensions: Vec<String>,

    /// Root folder for per-group aligned images [default: ./aligned]
    #[arg(long, value_name = "DIR")]
    aligned_dir: Option<PathBuf>,

    /// Folder for the fused HDR images [default: ./out]
    #[arg(short, long, value_name = "DIR")]
    out_dir: Option<PathBuf>,

    /// Aligned images fused per enfuse call [default: 3]
    #[arg(short, long)]
    batch_size: Option<usize>,

    /// Extension of the fused images [default: jpg]
    #[arg(long, value_name = "EXT")]
    output_ext: Option<String>,

    /// Kill a tool invocation after this many seconds; 0 waits forever [default: 600]
    #[arg(long, value_name = "SECS")]
    timeout: Option<u64>,

    /// Alignment executable [default: align_image_stack]
    #[arg(long, value_name = "PROGRAM")]
    align_tool: Option<String>,

    /// Fusion executable [default: enfuse]
    #[arg(long, value_name = "PROGRAM")]
    fuse_tool: Option<String>,
}

impl LabelArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(window) = self.window {
            config.labeler.time_window_secs = window;
        }
        if let Some(ref prefix) = self.prefix {
            config.labeler.prefix = prefix.clone();
        }
        if !self.extensions.is_empty() {
            config.labeler.raw_extensions = self.extensions.clone();
        }
    }
}

impl FuseArgs {
    fn apply(&self, config: &mut Config) {
        if let Some(ref prefix) = self.prefix {
            config.discovery.prefix = prefix.clone();
        }
        if !self.extensions.is_empty() {
            config.discovery.image_extensions = self.extensions.clone();
        }
        if let Some(ref dir) = self.aligned_dir {
            config.pipeline.aligned_dir = dir.clone();
        }
        if let Some(ref dir) = self.out_dir {
            config.pipeline.output_dir = dir.clone();
        }
        if let Some(size) = self.batch_size {
            config.pipeline.batch_size = size;
        }
        if let Some(ref ext) = self.output_ext {
            config.pipeline.output_extension = ext.clone();
        }
        if let Some(secs) = self.timeout {
            config.tools.timeout_secs = Some(secs);
        }
        if let Some(ref program) = self.align_tool {
            config.tools.align_program = program.clone();
        }
        if let Some(ref program) = self.fuse_tool {
            config.tools.fuse_program = program.clone();
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Set up logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level))
        .format_timestamp(None)
        .init();

    // Handle --init
    if cli.init {
        let config = Config::default();
        let path = cli.config.as_deref();
        config.save(path)?;
        let save_path = match path {
            Some(p) => p.to_path_buf(),
            None => Config::config_path()?,
        };
        println!("Default config written to {}", save_path.display());
        return Ok(());
    }

    let Some(command) = cli.command else {
        anyhow::bail!("No command specified. Use --help for usage.");
    };

    let mut config = Config::load(cli.config.as_deref())?;

    match command {
        Command::Label(args) => {
            args.apply(&mut config);
            config.normalize();
            config.validate()?;
            run_label(&args.folder, &config, args.dry_run, cli.json)
        }
        Command::Fuse(args) => {
            args.apply(&mut config);
            config.normalize();
            config.validate()?;
            run_fuse(&args.folder, &config, cli.json).await
        }
    }
}

fn run_label(folder: &Path, config: &Config, dry_run: bool, json: bool) -> Result<()> {
    log::info!(
        "Labeling {} (window {}s, prefix {})",
        folder.display(),
        config.labeler.time_window_secs,
        config.labeler.prefix
    );
    if dry_run {
        log::info!("DRY RUN — no files will be renamed");
    }

    let report = labeler::label_folder(folder, &config.labeler, dry_run)?;

    if dry_run && !json && !report.entries.is_empty() {
        print_rename_preview(&report);
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    log::info!(
        "Done: {} renamed, {} unchanged, {} failed across {} bracket(s)",
        report.renamed(),
        report.unchanged(),
        report.failed(),
        report.brackets
    );

    Ok(())
}

async fn run_fuse(folder: &Path, config: &Config, json: bool) -> Result<()> {
    let groups = discovery::discover_groups(
        folder,
        &config.discovery.prefix,
        &config.discovery.image_extensions,
    )?;

    if groups.is_empty() {
        log::warn!(
            "No images labeled {}_<N> found in {}",
            config.discovery.prefix,
            folder.display()
        );
        return Ok(());
    }

    log::info!(
        "Found {} group(s), {} image(s) in {}",
        groups.len(),
        groups.total_files(),
        folder.display()
    );
    log::info!(
        "Tools: {} → {}",
        config.tools.align_program,
        config.tools.fuse_program
    );

    let (aligner, fuser) = tools::build_toolchain(&config.tools);
    let report = pipeline::run_pipeline(&groups, &aligner, &fuser, &config.pipeline).await?;

    if json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    }

    log::info!(
        "Done: {} batch(es) fused, {} failed, {} group(s) skipped out of {}",
        report.succeeded_batches(),
        report.failed_batches(),
        report.skipped_groups(),
        report.groups.len()
    );

    Ok(())
}

// ANSI color codes
const GREEN: &str = "\x1b[32m";
const DIM: &str = "\x1b[2m";
const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";

/// Print a table of the renames a dry run would perform, one block per bracket.
fn print_rename_preview(report: &LabelReport) {
    println!();
    println!("  {BOLD}Planned renames:{RESET}");
    println!("  {DIM}{}{RESET}", "─".repeat(72));

    let mut current_group = 0;
    for entry in &report.entries {
        if entry.group_index != current_group {
            if current_group != 0 {
                println!("  {DIM}{}{RESET}", "─".repeat(72));
            }
            current_group = entry.group_index;
        }

        let from = file_name(&entry.from);
        let to = file_name(&entry.to);
        match entry.outcome {
            RenameOutcome::Unchanged => println!("  {DIM}{from:<34}   (unchanged){RESET}"),
            _ => println!("  {from:<34} → {GREEN}{to}{RESET}"),
        }
    }

    println!("  {DIM}{}{RESET}", "─".repeat(72));
    println!();
}

fn file_name(path: &Path) -> String {
    path.file_name()
        .map(|n| n.to_string_lossy().into_owned())
        .unwrap_or_else(|| path.display().to_string())
}
