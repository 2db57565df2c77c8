// Stem Slicer CLI entry point
// Separates a track into stems, labels stem keys, and slices drum hits and note events

use clap::{Args, CommandFactory, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use stem_slicer::config::{self, DrumHitSettings, NoteSliceSettings, Settings};
use stem_slicer::pipeline::{self, PipelineError, Processor, RunSummary};
use stem_slicer::{audio, tonal};

/// Stem post-processing: separation, key labels, drum hit and note slicing
///
/// With no subcommand, INPUT is separated (same as `stem-slicer separate INPUT`).
#[derive(Parser, Debug)]
#[command(name = "stem-slicer")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Option<Commands>,

    #[command(flatten)]
    separate: SeparateArgs,

    /// JSON settings file; command-line options override it
    #[arg(short, long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Verbose output (can be repeated: -v, -vv, -vvv)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true, default_value = "false")]
    quiet: bool,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Separate an audio file (or a time segment) into stems and write WAV outputs
    Separate(SeparateArgs),

    /// Slice a drum stem into classified hits
    SliceDrums {
        /// Drum stem WAV
        stem: PathBuf,

        /// Output directory for hit WAVs
        #[arg(short, long, default_value = "drum_hits")]
        out: PathBuf,

        /// File name prefix (defaults to the stem file name)
        #[arg(long)]
        prefix: Option<String>,

        #[command(flatten)]
        hits: HitArgs,
    },

    /// Slice a tonal stem into note/chord/phrase events labeled with pitch and key
    SliceNotes {
        /// Tonal stem WAV
        stem: PathBuf,

        /// Output directory for event WAVs
        #[arg(short, long, default_value = "events")]
        out: PathBuf,

        /// Stem label used in file names
        #[arg(long, default_value = "other")]
        stem_name: String,

        /// File name prefix (defaults to the stem file name)
        #[arg(long)]
        prefix: Option<String>,

        #[command(flatten)]
        notes: NoteArgs,
    },

    /// Estimate the key of WAV files
    Key {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Estimate the dominant note of WAV files
    Pitch {
        #[arg(required = true)]
        files: Vec<PathBuf>,
    },

    /// Print the effective settings as JSON
    ShowConfig,
}

#[derive(Args, Debug, Clone, Default)]
struct SeparateArgs {
    /// Audio file to process
    input: Option<PathBuf>,

    /// Output directory
    #[arg(short, long, default_value = "out")]
    out: PathBuf,

    /// Start time in seconds
    #[arg(long, value_name = "S")]
    start: Option<f64>,

    /// End time in seconds
    #[arg(long, value_name = "S")]
    end: Option<f64>,

    /// Separation model name (try htdemucs_6s for piano/guitar)
    #[arg(long)]
    model: Option<String>,

    /// Only write stems (skip all slicing)
    #[arg(long)]
    stems_only: bool,

    /// Slice the drum stem into hits and classify them
    #[arg(long)]
    drum_hits: bool,

    /// Slice tonal stems into event WAVs
    #[arg(long)]
    note_slices: bool,

    #[command(flatten)]
    hits: HitArgs,

    #[command(flatten)]
    notes: NoteArgs,
}

#[derive(Args, Debug, Clone, Default)]
struct HitArgs {
    /// Seconds before onset to include in a hit
    #[arg(id = "hit_pre", long = "hit-pre", value_name = "S")]
    pre: Option<f64>,

    /// Seconds after onset to include in a hit
    #[arg(id = "hit_post", long = "hit-post", value_name = "S")]
    post: Option<f64>,

    /// Minimum interval between onsets (seconds)
    #[arg(id = "hit_min_interval", long = "hit-min-interval", value_name = "S")]
    min_interval: Option<f64>,

    /// Onset detector sensitivity (higher = less sensitive)
    #[arg(id = "hit_delta", long = "hit-delta")]
    delta: Option<f32>,

    /// Limit number of hits
    #[arg(id = "hit_max_events", long = "hit-max-events", value_name = "N")]
    max_events: Option<usize>,
}

impl HitArgs {
    fn apply(&self, settings: &mut DrumHitSettings) {
        if let Some(v) = self.pre {
            settings.pre_s = v;
        }
        if let Some(v) = self.post {
            settings.post_s = v;
        }
        if let Some(v) = self.min_interval {
            settings.min_interval_s = v;
        }
        if let Some(v) = self.delta {
            settings.delta = v;
        }
        if self.max_events.is_some() {
            settings.max_events = self.max_events;
        }
    }
}

#[derive(Args, Debug, Clone, Default)]
struct NoteArgs {
    /// Comma-separated stems to slice
    #[arg(id = "note_stems", long = "note-stems", value_name = "LIST")]
    stems: Option<String>,

    /// Seconds before onset to include in a slice
    #[arg(id = "note_pre", long = "note-pre", value_name = "S")]
    pre: Option<f64>,

    /// Seconds after onset to include in a slice
    #[arg(id = "note_post", long = "note-post", value_name = "S")]
    post: Option<f64>,

    /// Minimum interval between onsets (seconds)
    #[arg(id = "note_min_interval", long = "note-min-interval", value_name = "S")]
    min_interval: Option<f64>,

    /// Onset detector sensitivity (higher = less sensitive)
    #[arg(id = "note_delta", long = "note-delta")]
    delta: Option<f32>,

    /// Limit number of slices per stem
    #[arg(id = "note_max_events", long = "note-max-events", value_name = "N")]
    max_events: Option<usize>,
}

impl NoteArgs {
    fn apply(&self, settings: &mut NoteSliceSettings) {
        if let Some(list) = &self.stems {
            settings.stems = NoteSliceSettings::parse_stem_list(list);
        }
        if let Some(v) = self.pre {
            settings.pre_s = v;
        }
        if let Some(v) = self.post {
            settings.post_s = v;
        }
        if let Some(v) = self.min_interval {
            settings.min_interval_s = v;
        }
        if let Some(v) = self.delta {
            settings.delta = v;
        }
        if self.max_events.is_some() {
            settings.max_events = self.max_events;
        }
    }
}

impl SeparateArgs {
    fn apply(&self, settings: &mut Settings) {
        let sep = &mut settings.separation;
        if let Some(v) = self.start {
            sep.start_s = v;
        }
        if self.end.is_some() {
            sep.end_s = self.end;
        }
        if let Some(model) = &self.model {
            sep.model = model.clone();
        }
        sep.stems_only |= self.stems_only;
        sep.drum_hits |= self.drum_hits;
        sep.note_slices |= self.note_slices;

        self.hits.apply(&mut settings.drum_hits);
        self.notes.apply(&mut settings.note_slices);
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(&cli);

    match run(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Fatal error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(cli: &Cli) {
    let level = match cli.verbose {
        0 => "warn",
        1 => "info",
        2 => "debug",
        _ => "trace",
    };
    let level = if cli.quiet { "error" } else { level };

    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(level))
        .format_target(false)
        .init();
}

fn run(cli: Cli) -> Result<(), PipelineError> {
    let mut settings = match &cli.config {
        Some(path) => config::load_settings(path)?,
        None => Settings::default(),
    };

    match cli.command {
        None => {
            let Some(input) = cli.separate.input.clone() else {
                // No input and no subcommand: behave like --help
                let _ = Cli::command().print_help();
                return Ok(());
            };
            cli.separate.apply(&mut settings);
            separate(&input, &cli.separate.out, settings)
        }
        Some(Commands::Separate(args)) => {
            let Some(input) = args.input.clone() else {
                let _ = Cli::command().print_help();
                return Ok(());
            };
            args.apply(&mut settings);
            separate(&input, &args.out, settings)
        }
        Some(Commands::SliceDrums {
            stem,
            out,
            prefix,
            hits,
        }) => {
            hits.apply(&mut settings.drum_hits);
            config::validate_settings(&settings)?;

            let prefix = prefix.unwrap_or_else(|| pipeline::track_name(&stem));
            let report = pipeline::slice_and_classify_drum_hits(
                &stem,
                &out,
                &settings.drum_hits.slice_config(),
                &prefix,
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some(Commands::SliceNotes {
            stem,
            out,
            stem_name,
            prefix,
            notes,
        }) => {
            notes.apply(&mut settings.note_slices);
            config::validate_settings(&settings)?;

            let prefix = prefix.unwrap_or_else(|| pipeline::track_name(&stem));
            let report = pipeline::slice_stem_into_events(
                &stem,
                &out,
                &prefix,
                &stem_name.to_lowercase(),
                &settings.note_slices.slice_config(),
            )?;
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(())
        }
        Some(Commands::Key { files }) => {
            for file in &files {
                let waveform = audio::read_waveform(file)?;
                let key = tonal::estimate_key(waveform.samples(), waveform.sample_rate());
                println!("{}\t{}", tonal::key_label(key), file.display());
            }
            Ok(())
        }
        Some(Commands::Pitch { files }) => {
            for file in &files {
                let waveform = audio::read_waveform(file)?;
                let pitch = tonal::estimate_pitch(waveform.samples(), waveform.sample_rate());
                println!(
                    "{}\t{:.2}\t{}",
                    pitch.label(),
                    pitch.voiced_ratio,
                    file.display()
                );
            }
            Ok(())
        }
        Some(Commands::ShowConfig) => {
            println!("{}", serde_json::to_string_pretty(&settings)?);
            Ok(())
        }
    }
}

fn separate(input: &Path, out_dir: &Path, settings: Settings) -> Result<(), PipelineError> {
    config::validate_settings(&settings)?;
    let summary = Processor::new(settings).process(input, out_dir)?;
    print_summary(&summary);
    Ok(())
}

fn print_summary(summary: &RunSummary) {
    println!();
    println!("== STEMS CREATED ==");
    for stem in &summary.outputs.stems {
        println!(" - {:>7} | key~{:<5} | {}", stem.name, stem.key, stem.path.display());
    }
    println!("Stems written to: {}", summary.stems_dir.display());

    if let Some(drums) = &summary.outputs.drum_hits {
        println!();
        println!("== DRUM HITS ==");
        println!(" Onsets detected: {}", drums.onsets_detected);
        println!(" Exported hits:   {}", drums.exported);
        println!("  - kick:  {}", drums.counts.kick);
        println!("  - snare: {}", drums.counts.snare);
        println!("  - hat:   {}", drums.counts.hat);
        println!("  - other: {}", drums.counts.other);
    }

    if !summary.outputs.note_slices.is_empty() {
        println!();
        println!("== NOTE SLICES ==");
        for report in &summary.outputs.note_slices {
            println!(
                " - {}: onsets={} slices={}",
                report.stem, report.onsets_detected, report.exported
            );
        }
    }
    println!();
}
