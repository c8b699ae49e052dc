use clap::{Parser, Subcommand};
use std::error::Error;
use std::path::PathBuf;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use scene_vision::config::{Config, ENV_BROWSER, ENV_SCENE_URL, ENV_THRESHOLD};
use scene_vision::driver::{Frame, ImageFileDriver};
use scene_vision::engine::ComparisonEngine;
use scene_vision::oracle::{ComparisonMode, VisionOracle};
use scene_vision::report::{RecordingSink, ResultReporter};
use scene_vision::baseline::BaselineStore;

/// Scene Vision - visual regression checks for a 3D web scene
#[derive(Parser, Debug)]
#[command(
    name = "scene-vision",
    about = "Baseline management and pixel / vision-model screenshot comparison",
    after_help = "ENVIRONMENT VARIABLES:\n\
        SCENE_VISION_ENABLE_AI       Score with the vision oracle (or ENABLE_AI_ANALYSIS)\n\
        SCENE_VISION_API_KEY         Vision service credential (or OPENAI_API_KEY)\n\
        SCENE_VISION_THRESHOLD       Pass/fail score threshold (default 75)\n\
        SCENE_VISION_VLM_ENDPOINT    Chat-completion endpoint URL\n\
        SCENE_VISION_VLM_MODEL       Vision model name\n\
        SCENE_VISION_SNAPSHOT_DIR    Baseline root directory\n\
        SCENE_VISION_RESULTS_DIR     Diagnostics directory\n\
        RUST_LOG                     Log filter (default info)"
)]
struct Args {
    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Compare a screenshot against its baseline (seeding it on first run)
    Compare {
        /// Test identity used in the baseline file name
        #[arg(short, long)]
        test: String,

        /// Screenshot to check (PNG)
        #[arg(short, long)]
        image: PathBuf,

        /// Browser identity
        #[arg(short, long, env = ENV_BROWSER)]
        browser: Option<String>,

        /// Page URL recorded in baseline metadata
        #[arg(long, env = ENV_SCENE_URL)]
        url: Option<String>,

        /// Pass/fail score threshold for oracle mode
        #[arg(long, env = ENV_THRESHOLD, value_parser = clap::value_parser!(u8).range(0..=100))]
        threshold: Option<u8>,

        /// Score with the vision oracle instead of pixel diff (also on when the environment enables it)
        #[arg(long)]
        ai: bool,

        /// Output the verdict as JSON
        #[arg(long)]
        json: bool,
    },

    /// Judge a single screenshot with the vision oracle
    Analyze {
        /// Screenshot to analyze (PNG)
        #[arg(short, long)]
        image: PathBuf,

        /// Output the analysis as JSON
        #[arg(long)]
        json: bool,
    },

    /// Inspect and maintain stored baselines
    Baseline {
        #[command(subcommand)]
        action: BaselineAction,
    },

    /// Print the effective configuration
    Config,

    /// Create a solid-color PNG for trying out comparisons
    Mock {
        /// Width in pixels
        #[arg(short = 'W', long, default_value = "1280", value_parser = clap::value_parser!(u32).range(1..=MAX_MOCK_SIDE))]
        width: u32,

        /// Height in pixels
        #[arg(short = 'H', long, default_value = "720", value_parser = clap::value_parser!(u32).range(1..=MAX_MOCK_SIDE))]
        height: u32,

        /// Output file path
        #[arg(short, long, default_value = "./mock_screenshot.png")]
        output: PathBuf,

        /// Fill color as hex (e.g., "ff0000" for red)
        #[arg(short, long, default_value = "000000")]
        color: String,
    },
}

/// Largest side accepted by `mock`
const MAX_MOCK_SIDE: i64 = 16_384;

#[derive(Subcommand, Debug)]
enum BaselineAction {
    /// Print where a baseline lives (or would be created)
    Path {
        #[arg(short, long)]
        test: String,
        #[arg(short, long)]
        browser: Option<String>,
    },
    /// Print a baseline's metadata
    Show {
        #[arg(short, long)]
        test: String,
        #[arg(short, long)]
        browser: Option<String>,
    },
    /// Delete a baseline so the next run seeds a new one
    Delete {
        #[arg(short, long)]
        test: String,
        #[arg(short, long)]
        browser: Option<String>,
    },
    /// List every stored baseline
    List,
}

fn main() -> Result<(), Box<dyn Error>> {
    init_tracing();
    let args = Args::parse();
    let mut config = Config::from_env();

    match args.command {
        Some(Commands::Compare {
            test,
            image,
            browser,
            url,
            threshold,
            ai,
            json,
        }) => {
            if ai {
                config.oracle.enable_ai = true;
            }
            let threshold = threshold.unwrap_or(config.oracle.threshold);
            let browser = browser.unwrap_or_else(|| config.baseline.browser.clone());

            let engine = ComparisonEngine::from_config(&config);
            let mut driver = ImageFileDriver::new(&image, &browser);
            if let Some(url) = url {
                driver = driver.with_url(url);
            }

            let verdict = match engine.run_with_threshold(&mut driver, &test, threshold) {
                Ok(verdict) => verdict,
                Err(e) => {
                    error!(test = %test, error = %e, "comparison aborted");
                    return Err(e.into());
                }
            };

            let reporter = ResultReporter::new(threshold);
            let mut sink = RecordingSink::new();
            let outcome = reporter.finish(&verdict, &mut sink);
            let report_path = engine.results().report_path(&test);
            sink.write_json(&report_path)?;
            info!(path = %report_path.display(), "report written");

            if json {
                println!("{}", serde_json::to_string_pretty(&verdict)?);
            } else {
                print_verdict(&verdict, &sink);
            }

            if let Err(failure) = outcome {
                eprintln!("FAILED: {}", failure.test_name);
                for reason in &failure.reasons {
                    eprintln!("  - {}", reason);
                }
                std::process::exit(1);
            }
        }

        Some(Commands::Analyze { image, json }) => {
            let bytes = std::fs::read(&image)?;
            let oracle = VisionOracle::from_config(&config);
            let result = oracle.analyze_quality(&bytes);

            if json {
                println!("{}", serde_json::to_string_pretty(&result)?);
            } else {
                println!("Score: {}/100 (Valid: {})", result.score, result.is_valid);
                if !result.issues.is_empty() {
                    println!("Issues:");
                    for issue in &result.issues {
                        println!("  - {}", issue);
                    }
                }
                println!();
                println!("{}", result.analysis_text);
            }
        }

        Some(Commands::Baseline { action }) => {
            let store = BaselineStore::from_settings(&config.baseline);
            let default_browser = config.baseline.browser.clone();
            match action {
                BaselineAction::Path { test, browser } => {
                    let browser = browser.unwrap_or(default_browser);
                    store.check_names(&test, &browser)?;
                    let path = store.resolve_path(&test, &browser);
                    let state = if path.is_file() { "exists" } else { "missing" };
                    println!("{} ({})", path.display(), state);
                }
                BaselineAction::Show { test, browser } => {
                    let browser = browser.unwrap_or(default_browser);
                    match store.load_metadata(&test, &browser)? {
                        Some(metadata) => println!("{}", serde_json::to_string_pretty(&metadata)?),
                        None if store.has_baseline(&test, &browser) => {
                            println!("{} (no metadata recorded)", store.resolve_path(&test, &browser).display())
                        }
                        None => return Err(format!("no baseline for '{}' ({})", test, browser).into()),
                    }
                }
                BaselineAction::Delete { test, browser } => {
                    let browser = browser.unwrap_or(default_browser);
                    let path = store.resolve_path(&test, &browser);
                    store.delete_baseline(&test, &browser)?;
                    println!("Deleted baseline: {}", path.display());
                }
                BaselineAction::List => {
                    let entries = store.list_baselines()?;
                    if entries.is_empty() {
                        println!("No baselines under {}", store.root().display());
                    }
                    for entry in entries {
                        println!("{:<30} {}", entry.suite, entry.path.display());
                    }
                }
            }
        }

        Some(Commands::Config) => print_config(&config),

        Some(Commands::Mock {
            width,
            height,
            output,
            color,
        }) => {
            let color = parse_hex_color(&color)?;
            let png = Frame::new(width, height, color).to_png();
            std::fs::write(&output, &png)?;
            println!("Created mock screenshot: {}", output.display());
            println!("  Size: {}x{}", width, height);
        }

        None => {
            println!("Scene Vision - visual regression checks for a 3D web scene");
            println!();
            println!("Usage: scene-vision <COMMAND>");
            println!();
            println!("Commands:");
            println!("  compare   Compare a screenshot against its baseline");
            println!("  analyze   Judge a single screenshot with the vision oracle");
            println!("  baseline  Inspect and maintain stored baselines");
            println!("  config    Print the effective configuration");
            println!("  mock      Create a solid-color PNG");
            println!();
            println!("Run with --help for more information.");
        }
    }

    Ok(())
}

/// Logs go to stderr so `--json` output stays clean
fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn print_verdict(verdict: &scene_vision::TestVerdict, sink: &RecordingSink) {
    let status = if verdict.is_baseline {
        "BASELINE CREATED"
    } else if verdict.success {
        "PASS"
    } else {
        "FAIL"
    };
    println!("{}: {} ({} mode)", status, verdict.test_name, verdict.comparison_mode);
    println!("  Screenshot: {}", verdict.screenshot_path.display());
    println!("  Baseline:   {}", verdict.baseline_path.display());
    if let Some(diff) = &verdict.diff_path {
        println!("  Diff:       {}", diff.display());
    }
    if verdict.comparison_mode == ComparisonMode::Oracle || verdict.is_baseline {
        for annotation in &sink.annotations {
            let preview: String = annotation.description.chars().take(200).collect();
            println!("  {}: {}", annotation.kind, preview);
        }
    }
}

fn print_config(config: &Config) {
    let credential = match &config.oracle.api_key {
        Some(_) => "set (redacted)",
        None => "not set",
    };
    println!("Comparison mode:   {}", ComparisonMode::from_config(config));
    println!("Score threshold:   {}", config.oracle.threshold);
    println!("API key:           {}", credential);
    println!("VLM endpoint:      {}", config.vlm.endpoint);
    println!("VLM model:         {}", config.vlm.model);
    println!("VLM max tokens:    {}", config.vlm.max_tokens);
    println!(
        "VLM timeouts:      connect {}s, request {}s",
        config.vlm.connect_timeout, config.vlm.request_timeout
    );
    println!("Snapshot dir:      {}", config.baseline.snapshot_dir.display());
    println!("Default suite:     {}", config.baseline.default_suite);
    println!("Browser:           {}", config.baseline.browser);
    println!(
        "Pixel tolerance:   {} (max diff ratio {})",
        config.pixel.threshold, config.pixel.max_diff_ratio
    );
    println!("Results dir:       {}", config.results.dir.display());
    println!("Scene URL:         {}", config.scene.url);
    println!("CI:                {}", config.ci);
}

fn parse_hex_color(hex: &str) -> Result<[u8; 3], Box<dyn Error>> {
    let hex = hex.trim_start_matches('#');
    if hex.len() != 6 || !hex.is_ascii() {
        return Err("Color must be 6 hex digits (e.g., 'ff0000')".into());
    }
    let r = u8::from_str_radix(&hex[0..2], 16)?;
    let g = u8::from_str_radix(&hex[2..4], 16)?;
    let b = u8::from_str_radix(&hex[4..6], 16)?;
    Ok([r, g, b])
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mock_rejects_oversized_frames() {
        let err = Args::try_parse_from(["scene-vision", "mock", "-W", "70000", "-H", "70000"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let err = Args::try_parse_from(["scene-vision", "mock", "-W", "0"]).unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);

        let args = Args::try_parse_from(["scene-vision", "mock", "-W", "640", "-H", "480"]).unwrap();
        match args.command {
            Some(Commands::Mock { width, height, .. }) => assert_eq!((width, height), (640, 480)),
            other => panic!("unexpected command {:?}", other),
        }
    }

    #[test]
    fn test_compare_threshold_is_bounded() {
        let err = Args::try_parse_from(["scene-vision", "compare", "-t", "home", "-i", "a.png", "--threshold", "101"])
            .unwrap_err();
        assert_eq!(err.kind(), clap::error::ErrorKind::ValueValidation);
    }

    #[test]
    fn test_parse_hex_color() {
        assert_eq!(parse_hex_color("#ff8000").unwrap(), [255, 128, 0]);
        assert!(parse_hex_color("fff").is_err());
    }
}
