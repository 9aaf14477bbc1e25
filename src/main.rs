use anyhow::Result;
use clap::{Parser, ValueEnum};
use std::path::PathBuf;
use std::process::ExitCode;

use towebp::{
    BatchConverter, BatchOptions, BatchResult, Completion, ConfigError, ConversionReport, Profile,
    ProfileStore, ProgressReporter, ReportFormat, format_duration, generate_report,
    progress::ConsoleProgressReporter, utils::reduction_percent,
};

/// towebp - batch image to WebP converter
///
/// Converts PNG, JPEG, GIF, BMP and TIFF images to WebP, in parallel, with reusable profiles
#[derive(Parser)]
#[command(name = "towebp")]
#[command(about = "towebp - convert images to WebP")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(long_about = r#"
towebp converts raster images to the WebP format.

Features:
• Single files or whole directories, optionally recursive
• Parallel conversion on a bounded worker pool
• Collision-free output names: photo.webp, photo(1).webp, ...
• Optional timestamp preservation and deletion of originals after success
• Named profiles, a default profile and recall of the last used settings
"#)]
pub struct Args {
    /// Input image file(s) or directory(ies)
    #[arg(
        value_name = "INPUT",
        required_unless_present_any = ["list_profiles", "set_default_profile"]
    )]
    pub inputs: Vec<PathBuf>,

    /// WebP quality (0-100), overrides the profile
    #[arg(
        short,
        long,
        value_name = "QUALITY",
        value_parser = clap::value_parser!(u8).range(0..=100)
    )]
    pub quality: Option<u8>,

    /// Output directory, or output .webp file for a single input file
    #[arg(short, long, value_name = "PATH")]
    pub output: Option<PathBuf>,

    /// Recursively process subdirectories
    #[arg(short, long)]
    pub recursive: bool,

    /// Keep original files
    #[arg(long, conflicts_with = "delete_originals")]
    pub keep_originals: bool,

    /// Delete original files after successful conversion
    #[arg(long)]
    pub delete_originals: bool,

    /// Do not preserve original file timestamps
    #[arg(long)]
    pub no_preserve_timestamps: bool,

    /// Use lossless compression
    #[arg(long)]
    pub lossless: bool,

    /// Use a specific conversion profile
    #[arg(long, value_name = "NAME", conflicts_with = "use_last")]
    pub profile: Option<String>,

    /// Use the last used settings
    #[arg(long)]
    pub use_last: bool,

    /// Save the effective settings as a new profile
    #[arg(long, value_name = "NAME")]
    pub save_profile: Option<String>,

    /// List all available profiles
    #[arg(long)]
    pub list_profiles: bool,

    /// Set the default profile
    #[arg(long, value_name = "NAME")]
    pub set_default_profile: Option<String>,

    /// Add a prefix to output filenames
    #[arg(long, default_value = "", value_name = "TEXT")]
    pub prefix: String,

    /// Add a suffix to output filenames, before the extension
    #[arg(long, default_value = "", value_name = "TEXT")]
    pub suffix: String,

    /// Number of parallel workers (defaults to CPU core count)
    #[arg(short, long, value_name = "NUM")]
    pub threads: Option<usize>,

    /// Free space (MB) that must remain on the output volume
    #[arg(long, value_name = "MB")]
    pub min_free_space: Option<u64>,

    /// Skip the free disk space check
    #[arg(long)]
    pub no_space_check: bool,

    /// Write a conversion report to this file
    #[arg(long, value_name = "FILE")]
    pub report: Option<PathBuf>,

    /// Report output format
    #[arg(long, default_value = "json", value_enum)]
    pub report_format: ReportFormatArg,

    /// Profile store path (defaults to the user configuration directory)
    #[arg(short, long, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Verbose output mode
    #[arg(short, long)]
    pub verbose: bool,

    /// Quiet mode (no progress, no summary)
    #[arg(long, conflicts_with = "verbose")]
    pub quiet: bool,
}

#[derive(Debug, Clone, ValueEnum)]
pub enum ReportFormatArg {
    Json,
    Csv,
}

impl From<ReportFormatArg> for ReportFormat {
    fn from(format: ReportFormatArg) -> Self {
        match format {
            ReportFormatArg::Json => ReportFormat::Json,
            ReportFormatArg::Csv => ReportFormat::Csv,
        }
    }
}

fn main() -> ExitCode {
    let args = Args::parse();

    // Initialize logging
    if args.verbose {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Debug)
            .init();
    } else if !args.quiet {
        env_logger::Builder::from_default_env()
            .filter_level(log::LevelFilter::Info)
            .init();
    }

    match run(args) {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn run(args: Args) -> Result<ExitCode> {
    let mut store = match &args.config {
        Some(path) => ProfileStore::open(path),
        None => ProfileStore::open_default()?,
    };

    if args.list_profiles {
        print_profiles(&store);
        return Ok(ExitCode::SUCCESS);
    }

    if let Some(name) = &args.set_default_profile {
        store.set_default_profile(name)?;
        println!("Set default profile to: {name}");
        return Ok(ExitCode::SUCCESS);
    }

    // Profile or last used settings, then command line overrides
    let profile = if args.use_last {
        match store.last_used() {
            Some(profile) => profile,
            None => {
                log::info!("No last used settings found, using default profile");
                store.get_profile(None)?
            }
        }
    } else {
        store.get_profile(args.profile.as_deref())?
    };

    let mut settings = profile
        .to_settings()
        .with_prefix(args.prefix.clone())
        .with_suffix(args.suffix.clone());
    if let Some(quality) = args.quality {
        settings.quality = quality;
    }
    if args.lossless {
        settings.lossless = true;
    }
    if args.keep_originals && args.delete_originals {
        return Err(ConfigError::ConflictingOriginals.into());
    }
    if args.keep_originals {
        settings.preserve_originals = true;
    }
    if args.delete_originals {
        settings.preserve_originals = false;
    }
    if args.no_preserve_timestamps {
        settings.preserve_timestamps = false;
    }
    settings.validate()?;

    if let Some(missing) = args.inputs.iter().find(|input| !input.exists()) {
        return Err(ConfigError::InputNotFound(missing.clone()).into());
    }

    let effective = Profile::from(&settings);
    if let Err(e) = store.save_last_used(effective) {
        log::warn!("Failed to save last used settings: {e:#}");
    }
    if let Some(name) = &args.save_profile {
        store.save_custom_profile(name, effective)?;
        println!("Saved current settings as profile: {name}");
    }

    let mut options = BatchOptions::default()
        .with_recursive(args.recursive)
        .with_min_free_space_mb(args.min_free_space.unwrap_or(store.data().min_free_space_mb))
        .with_space_check(!args.no_space_check);
    if let Some(output) = args.output.clone() {
        options = options.with_output(output);
    }
    if let Some(threads) = args.threads.or(store.data().max_workers) {
        options = options.with_threads(threads);
    }

    let converter = BatchConverter::new(settings, options);
    let progress_reporter = if args.quiet {
        None
    } else {
        Some(Box::new(ConsoleProgressReporter::new(args.verbose)) as Box<dyn ProgressReporter>)
    };

    let result = converter.run_with_progress(&args.inputs, progress_reporter)?;

    if let Some(path) = &args.report {
        let report = ConversionReport::new(&result, converter.settings());
        generate_report(&report, args.report_format.clone().into(), path)?;
    }

    if !args.quiet {
        print_results_summary(&result);
    }

    Ok(if result.summary.failed == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn print_profiles(store: &ProfileStore) {
    println!("\nAvailable profiles (default: {}):", store.default_profile());
    for (name, profile) in store.list_profiles() {
        println!("\n{name}:");
        println!("  quality: {}", profile.quality);
        println!("  lossless: {}", profile.lossless);
        println!("  preserve_timestamps: {}", profile.preserve_timestamps);
        println!("  preserve_originals: {}", profile.preserve_originals);
    }
}

fn print_results_summary(result: &BatchResult) {
    use humansize::{DECIMAL, format_size};

    let summary = &result.summary;
    match summary.completion() {
        Completion::AllSucceeded => println!("\n🎉 Conversion completed!"),
        Completion::SomeFailed => println!("\n⚠️ Conversion completed with errors"),
        Completion::StoppedEarly => println!("\n⏹️ Conversion stopped early"),
    }
    println!("📊 Results Summary:");
    println!("  ✅ Converted: {} of {} files", summary.succeeded, summary.total);
    if summary.failed > 0 {
        println!("  ❌ Failed: {} files", summary.failed);
    }
    if summary.skipped > 0 {
        println!("  ⏭️ Skipped: {} files", summary.skipped);
    }

    if summary.bytes_before > 0 {
        println!("\n💾 Space Analysis:");
        println!("  📦 Original size: {}", format_size(summary.bytes_before, DECIMAL));
        println!("  🗜️ Compressed size: {}", format_size(summary.bytes_after, DECIMAL));
        println!(
            "  💾 Space saved: {} ({:.1}%)",
            format_size(summary.space_saved(), DECIMAL),
            reduction_percent(summary.bytes_before, summary.bytes_after)
        );
    }

    println!("\n⏱️ Performance:");
    println!("  🕐 Duration: {}", format_duration(result.duration));
    println!("  🧵 Workers used: {}", result.thread_count);

    let failures: Vec<_> = result
        .outcomes
        .iter()
        .filter_map(|outcome| outcome.error().map(|err| (&outcome.input, err)))
        .collect();
    if !failures.is_empty() && failures.len() <= 5 {
        println!("\n❌ Errors:");
        for (input, err) in &failures {
            println!("  • {}: {}", input.display(), err);
        }
    } else if failures.len() > 5 {
        println!("\n❌ {} errors occurred (use --report for full details)", failures.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn test_cli_definition_is_valid() {
        Args::command().debug_assert();
    }

    #[test]
    fn test_keep_and_delete_originals_conflict() {
        let parsed =
            Args::try_parse_from(["towebp", "in", "--keep-originals", "--delete-originals"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn test_input_not_required_for_profile_management() {
        assert!(Args::try_parse_from(["towebp", "--list-profiles"]).is_ok());
        assert!(Args::try_parse_from(["towebp", "--set-default-profile", "balanced"]).is_ok());
        assert!(Args::try_parse_from(["towebp"]).is_err());
    }

    #[test]
    fn test_quality_out_of_range_is_rejected() {
        assert!(Args::try_parse_from(["towebp", "in", "-q", "101"]).is_err());
        let args = Args::try_parse_from(["towebp", "a.png", "b", "-q", "70", "-r"]).unwrap();
        assert_eq!(args.quality, Some(70));
        assert_eq!(args.inputs.len(), 2);
        assert!(args.recursive);
    }
}
