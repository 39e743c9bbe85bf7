//! avprep - sharded worker for audio-visual speech corpus preparation
//!
//! Each invocation is one independent worker. Workers agree on nothing but
//! `--rank/--nshard` and the configuration file; shard files are merged
//! afterwards with `avprep merge`.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::{Args, Parser, Subcommand, ValueEnum};
use indicatif::{ProgressBar, ProgressStyle};

use avprep_core::config::{ConfigManager, Settings};
use avprep_core::counter::{recount_shard, NFRAMES_AUDIO, NFRAMES_VIDEO};
use avprep_core::detect::ExternalModelFactory;
use avprep_core::logging::{init_tracing, LogCallback, LogLevel};
use avprep_core::manifest::{read_clip_manifest, FILE_LIST, LABEL_LIST};
use avprep_core::media::{FfmpegBackend, MediaBackend};
use avprep_core::models::NoiseCategory;
use avprep_core::noise::{build_babble, build_manifests, slice_sources};
use avprep_core::output::OutputLayout;
use avprep_core::pipeline::{ProgressCallback, RunMode, ShardReport, ShardRunner};
use avprep_core::shard::{merge_shard_files, ShardSpec};

#[derive(Parser)]
#[command(name = "avprep", version)]
#[command(about = "Prepare mouth-ROI crops, frame counts and noise corpora, one shard per worker")]
struct Cli {
    /// Configuration file (created with defaults if missing)
    #[arg(short, long, global = true, default_value = "avprep.toml")]
    config: PathBuf,

    /// Debug output on stderr and in the shard log
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Args, Clone, Copy)]
struct ShardArgs {
    /// This worker's rank
    #[arg(long, default_value_t = 0)]
    rank: usize,

    /// Total number of workers
    #[arg(long, default_value_t = 1)]
    nshard: usize,
}

impl ShardArgs {
    fn spec(&self) -> Result<ShardSpec> {
        ShardSpec::new(self.rank, self.nshard).context("invalid shard arguments")
    }
}

#[derive(Args)]
struct ClipArgs {
    /// Clip manifest (TSV)
    manifest: PathBuf,

    #[command(flatten)]
    shard: ShardArgs,

    /// Parallel clip tasks (overrides [workers].threads)
    #[arg(short = 'j', long)]
    threads: Option<usize>,
}

#[derive(Subcommand)]
enum Command {
    /// Detect, align and crop the mouth region of every clip in the shard
    Crop {
        #[command(flatten)]
        clips: ClipArgs,

        /// Reprocess clips whose outputs already exist
        #[arg(long)]
        no_resume: bool,
    },
    /// Write landmark files only
    Detect {
        #[command(flatten)]
        clips: ClipArgs,
    },
    /// Recount existing outputs and rewrite the shard's count and list files
    Count {
        /// Clip manifest (TSV)
        manifest: PathBuf,

        #[command(flatten)]
        shard: ShardArgs,
    },
    /// Concatenate per-rank count and list files
    Merge {
        /// Number of workers that produced rank files
        #[arg(long)]
        nshard: usize,

        /// Directory holding the rank files (default: [paths].output_dir)
        #[arg(long)]
        dir: Option<PathBuf>,
    },
    /// Noise corpus tools
    Noise {
        #[command(subcommand)]
        command: NoiseCommand,
    },
    /// Configuration file tools
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

/// CLI wrapper for NoiseCategory (needed for clap ValueEnum)
#[derive(Clone, Copy, ValueEnum)]
enum CliCategory {
    Noise,
    Music,
    Babble,
    Speech,
}

impl From<CliCategory> for NoiseCategory {
    fn from(cli: CliCategory) -> Self {
        match cli {
            CliCategory::Noise => NoiseCategory::Noise,
            CliCategory::Music => NoiseCategory::Music,
            CliCategory::Babble => NoiseCategory::Babble,
            CliCategory::Speech => NoiseCategory::Speech,
        }
    }
}

#[derive(Subcommand)]
enum NoiseCommand {
    /// Cut long recordings into fixed-length clips
    Slice {
        /// Directory of source WAV files (searched recursively)
        source: PathBuf,
        /// Output directory
        out: PathBuf,

        /// Corpus name recorded with each clip
        #[arg(long, default_value = "demand")]
        corpus: String,

        #[arg(long, value_enum, default_value = "noise")]
        category: CliCategory,

        #[command(flatten)]
        shard: ShardArgs,
    },
    /// Mix random speech clips into babble
    Babble {
        /// Directory of speech WAV files
        speech: PathBuf,
        /// Output directory
        out: PathBuf,

        /// Base seed (overrides [noise].seed)
        #[arg(long)]
        seed: Option<u64>,

        /// Babble clips to produce over all shards (overrides [noise].babble_count)
        #[arg(long)]
        count: Option<usize>,

        #[command(flatten)]
        shard: ShardArgs,
    },
    /// Write per-category and combined TSV manifests
    Manifest {
        /// Output directory
        out: PathBuf,

        /// Input directory as `category=dir`; repeatable
        #[arg(short, long = "input", value_parser = parse_input, required = true)]
        inputs: Vec<(PathBuf, NoiseCategory)>,
    },
}

#[derive(Subcommand)]
enum ConfigCommand {
    /// Write a commented default configuration file
    Init {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Load and validate the configuration file
    Check,
}

fn parse_input(s: &str) -> Result<(PathBuf, NoiseCategory), String> {
    let (category, dir) = s
        .split_once('=')
        .ok_or_else(|| format!("expected category=dir, got '{}'", s))?;
    let category = NoiseCategory::parse(category)
        .ok_or_else(|| format!("unknown category '{}'", category))?;
    Ok((PathBuf::from(dir), category))
}

fn load_settings(path: &Path) -> Result<Settings> {
    let mut manager = ConfigManager::new(path);
    manager
        .load_or_create()
        .with_context(|| format!("failed to load {}", path.display()))?;
    Ok(manager.into_settings())
}

fn progress_bar(len: usize) -> ProgressBar {
    let pb = ProgressBar::new(len as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("{spinner:.cyan} [{elapsed_precise}] {bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );
    pb.enable_steady_tick(Duration::from_millis(120));
    pb
}

fn run_clips(settings: Settings, args: &ClipArgs, mode: RunMode) -> Result<ShardReport> {
    let manifest = read_clip_manifest(&args.manifest)?;
    let spec = args.shard.spec()?;

    let backend = FfmpegBackend::from_settings(&settings.media);
    let factory = ExternalModelFactory::new(settings.detection.clone());

    let pb = progress_bar(spec.assign(manifest.len()).len());
    let log_pb = pb.clone();
    let log_callback: LogCallback = Box::new(move |line: &str| log_pb.println(line));
    let progress_pb = pb.clone();
    let progress_callback: ProgressCallback =
        Box::new(move |done: usize, _total: usize, clip_id: &str| {
            progress_pb.set_position(done as u64);
            progress_pb.set_message(clip_id.to_string());
        });

    let runner = ShardRunner::from_settings(
        settings,
        spec,
        mode,
        Arc::new(backend),
        Arc::new(factory),
        Some(log_callback),
        Some(progress_callback),
    )?;

    let report = runner.run(&manifest.clips);
    pb.finish_and_clear();
    let report = report?;

    println!(
        "shard {}: {} done, {} resumed, {} failed ({})",
        spec,
        report.succeeded(),
        report.resumed,
        report.failures.len(),
        report.failure_file.display()
    );
    Ok(report)
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Command::Config { command } = &cli.command {
        return run_config(&cli.config, command);
    }

    let mut settings = load_settings(&cli.config)?;
    if cli.verbose {
        settings.logging.level = LogLevel::Debug;
    }
    init_tracing(settings.logging.level);
    tracing::debug!("avprep core {}", avprep_core::version());

    match cli.command {
        Command::Crop { clips, no_resume } => {
            if let Some(threads) = clips.threads {
                settings.workers.threads = threads;
            }
            if no_resume {
                settings.workers.resume = false;
            }
            run_clips(settings, &clips, RunMode::Crop)?;
        }
        Command::Detect { clips } => {
            if let Some(threads) = clips.threads {
                settings.workers.threads = threads;
            }
            run_clips(settings, &clips, RunMode::Landmarks)?;
        }
        Command::Count { manifest, shard } => {
            let manifest = read_clip_manifest(&manifest)?;
            let spec = shard.spec()?;
            let backend = FfmpegBackend::from_settings(&settings.media);
            if !backend.is_available() {
                bail!(
                    "{} or {} cannot be run",
                    settings.media.ffmpeg_path,
                    settings.media.ffprobe_path
                );
            }
            let layout = OutputLayout::from_settings(&settings.paths);
            let report = recount_shard(&backend, &layout, &spec, spec.select(&manifest.clips))?;
            for failure in &report.failures {
                eprintln!("{}\t{}", failure.clip_id, failure.message);
            }
            println!(
                "shard {}: counted {} clips ({} backend), {} without outputs",
                spec,
                report.counts.len(),
                backend.name(),
                report.failures.len()
            );
        }
        Command::Merge { nshard, dir } => {
            let dir = dir.unwrap_or_else(|| settings.paths.output_dir());
            let mut lengths = Vec::new();
            for name in [NFRAMES_AUDIO, NFRAMES_VIDEO, FILE_LIST, LABEL_LIST] {
                let lines = merge_shard_files(&dir, name, nshard)?;
                println!("{}: {} lines", dir.join(name).display(), lines);
                lengths.push(lines);
            }
            if lengths.windows(2).any(|w| w[0] != w[1]) {
                bail!("merged files disagree in length: {:?}", lengths);
            }
        }
        Command::Noise { command } => run_noise(&settings, command)?,
        // Handled before loading settings
        Command::Config { .. } => {}
    }

    Ok(())
}

fn run_noise(settings: &Settings, command: NoiseCommand) -> Result<()> {
    let mut noise = settings.noise.clone();
    match command {
        NoiseCommand::Slice {
            source,
            out,
            corpus,
            category,
            shard,
        } => {
            let report = slice_sources(&source, &out, &corpus, category.into(), &shard.spec()?, &noise)?;
            println!(
                "{} slices from {} sources ({} already present, {} rejected)",
                report.clips.len(),
                report.sources,
                report.existing,
                report.rejected.len()
            );
        }
        NoiseCommand::Babble {
            speech,
            out,
            seed,
            count,
            shard,
        } => {
            if let Some(seed) = seed {
                noise.seed = seed;
            }
            if let Some(count) = count {
                noise.babble_count = count;
            }
            let report = build_babble(&speech, &out, &shard.spec()?, &noise)?;
            println!(
                "{} babble clips ({} written), sources in {}",
                report.clips.len(),
                report.written,
                report.sources_file.display()
            );
        }
        NoiseCommand::Manifest { out, inputs } => {
            let report = build_manifests(&inputs, &out, &noise)?;
            for path in &report.written {
                println!("{}", path.display());
            }
        }
    }
    Ok(())
}

fn run_config(path: &Path, command: &ConfigCommand) -> Result<()> {
    match command {
        ConfigCommand::Init { force } => {
            if path.exists() && !force {
                bail!("{} already exists (use --force to overwrite)", path.display());
            }
            let manager = ConfigManager::new(path);
            manager.save()?;
            manager.ensure_dirs_exist()?;
            println!("wrote {}", path.display());
        }
        ConfigCommand::Check => {
            let mut manager = ConfigManager::new(path);
            manager
                .load()
                .with_context(|| format!("{} is not valid", path.display()))?;
            println!("{} ok", path.display());
        }
    }
    Ok(())
}
