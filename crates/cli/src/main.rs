use anyhow::{Context, Result, bail};
use clap::Parser;
use indicatif::{ProgressBar, ProgressStyle};
use std::fs;
use std::path::PathBuf;
use std::time::Duration;
use timewarp_core::{
    OutcomeStatus, StyleCatalog, TimeWarp,
    config::Config,
    init,
    workspace::parse_seed,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Portrait to transform (JPEG or PNG)
    #[arg(required_unless_present = "list_styles")]
    image: Option<PathBuf>,

    /// Directory the results are written to
    #[arg(short, long, default_value = ".")]
    out: PathBuf,

    /// Optional seed, forwarded to every request on a best-effort basis
    #[arg(long, default_value = "")]
    seed: String,

    /// Override the model defined in .env
    #[arg(short, long)]
    model: Option<String>,

    /// Use this PNG as the mask instead of the automatic one (white = editable)
    #[arg(long, conflicts_with = "full_mask")]
    mask: Option<PathBuf>,

    /// Make the whole image editable
    #[arg(long, default_value_t = false)]
    full_mask: bool,

    /// Also write the mask that was used as mask.png
    #[arg(long, default_value_t = false)]
    save_mask: bool,

    /// Package every successful image into time-travel-photos.zip
    #[arg(long, default_value_t = false)]
    zip: bool,

    /// Write a JSON summary of the run as report.json
    #[arg(long, default_value_t = false)]
    report: bool,

    /// List available styles and exit
    #[arg(long)]
    list_styles: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Setup
    init();
    setup_logging();
    let args = Args::parse();

    // Handle --list-styles
    if args.list_styles {
        println!("Available styles:");
        for style in StyleCatalog::decades().iter() {
            println!("{}: {}", style.id, style.prompt);
        }
        return Ok(());
    }

    let Some(image_path) = args.image else {
        bail!("An image path is required");
    };
    let seed = parse_seed(&args.seed).context("Invalid --seed")?;

    // Load config and override model if specified via CLI
    let mut config = Config::load().context("Failed to load configuration")?;
    if let Some(m) = args.model {
        config = config.with_model_override(&m).context("Invalid --model")?;
    }

    let mut app = TimeWarp::with_config(config).context("Failed to initialize Gemini client")?;
    let workspace = app.workspace_mut();

    workspace
        .upload_path(&image_path)
        .with_context(|| format!("Failed to load {}", image_path.display()))?;

    if let Some(mask_path) = &args.mask {
        let bytes = fs::read(mask_path)
            .with_context(|| format!("Failed to read mask {}", mask_path.display()))?;
        workspace.load_mask(&bytes).context("Mask does not fit the image")?;
    } else if args.full_mask {
        workspace.mask_editor_mut().fill_all();
    }

    fs::create_dir_all(&args.out)
        .with_context(|| format!("Failed to create {}", args.out.display()))?;

    if args.save_mask {
        let png = workspace.mask_editor().snapshot().encode_png()?;
        fs::write(args.out.join("mask.png"), png)?;
    }

    // Generate
    let workspace = app.workspace();
    let total = workspace.catalog().len() as u64;
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::default_bar()
            .tick_chars("⠋⠙⠹⠸⠼⠴⠦⠧⠇⠏ ")
            .template("{spinner:.green} [{bar:30.magenta}] {pos}/{len} {msg}")?,
    );
    bar.set_message(format!("Sending to {}...", app.config().model_name));
    bar.enable_steady_tick(Duration::from_millis(100));

    let mut updates = workspace.orchestrator().subscribe();
    let watcher = {
        let bar = bar.clone();
        tokio::spawn(async move {
            while updates.changed().await.is_ok() {
                let progress = updates.borrow_and_update().progress.clone();
                bar.set_position(progress.completed as u64);
                bar.set_message(progress.label);
            }
        })
    };

    let result = workspace.generate(seed).await;
    watcher.abort();
    bar.finish_and_clear();
    let result = result.context("Generation could not start")?;

    // Results
    for outcome in &result.outcomes {
        match outcome.status {
            OutcomeStatus::Success => {
                let file = workspace.export_style(&outcome.style_id)?;
                let path = file.save_to(&args.out)?;
                println!("{}: saved {}", outcome.style_id, path.display());
            }
            OutcomeStatus::Failure => {
                println!(
                    "{}: failed ({})",
                    outcome.style_id,
                    outcome.error.as_deref().unwrap_or("Unknown error")
                );
            }
        }
    }
    println!(
        "{} of {} styles generated",
        result.success_count(),
        result.outcomes.len()
    );

    if args.zip {
        match workspace.export_all() {
            Ok(archive) => {
                let path = archive.file.save_to(&args.out)?;
                println!("Archive: {} ({} images)", path.display(), archive.entries.len());
            }
            Err(e) => eprintln!("Warning: {}", e),
        }
    }

    if args.report {
        let json = serde_json::to_string_pretty(&result)?;
        fs::write(args.out.join("report.json"), json)?;
    }

    Ok(())
}

/// Routes `log` output to stderr, level taken from `RUST_LOG`.
fn setup_logging() {
    let var = std::env::var("RUST_LOG").unwrap_or_else(|_| "info".to_string());
    let level: log::LevelFilter = var.parse().unwrap_or(log::LevelFilter::Info);

    let dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
                record.level(),
                message
            ))
        })
        .level(level)
        .chain(std::io::stderr());

    if let Err(e) = dispatch.apply() {
        eprintln!("Failed to apply logger configuration: {}", e);
    }
}
