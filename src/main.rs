//! Fieldcam Agent CLI
//!
//! Autonomous field camera trap with on-device detection.

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::filter::LevelFilter;
use tracing_subscriber::prelude::*;
use tracing_subscriber::{fmt, EnvFilter};

use fieldcam_agent::{
    camera::{Camera, CameraConfig, NoopCamera, ReplayCamera},
    clock::SystemClock,
    config::{CameraSource, Settings},
    core::{
        ActiveSessionController, BehaviorAnalyzer, DutyCycleScheduler, ExitReason,
        PassiveSyncController, SessionSettings,
    },
    detect::CommandDetector,
    media::{Archiver, FfmpegClipWriter, RecordingArchiver},
    notify::Notifier,
    project::{self, Project, LOG_BACKUPS, LOG_ROTATE_BYTES},
    stats::StatsLog,
    VERSION,
};

#[derive(Parser)]
#[command(name = "fieldcam")]
#[command(version = VERSION)]
#[command(about = "Autonomous field camera trap", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Args)]
struct ProjectArgs {
    /// Project identifier (directory name under the projects root)
    #[arg(long)]
    project_id: String,

    /// Root directory holding all projects
    #[arg(long)]
    projects_dir: Option<PathBuf>,

    /// Directory holding detector model files
    #[arg(long)]
    models_dir: Option<PathBuf>,
}

impl ProjectArgs {
    fn project(&self) -> Project {
        let root = self
            .projects_dir
            .clone()
            .unwrap_or_else(project::default_projects_root);
        let models = self
            .models_dir
            .clone()
            .unwrap_or_else(project::default_models_dir);
        Project::new(&root, &models, &self.project_id)
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Run the camera trap until interrupted
    Start {
        #[command(flatten)]
        project: ProjectArgs,

        /// Feed frames from this video instead of the configured camera
        #[arg(long)]
        replay: Option<PathBuf>,
    },

    /// Convert and upload recordings once
    Sync {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Show cumulative statistics
    Status {
        #[command(flatten)]
        project: ProjectArgs,
    },

    /// Show the effective configuration
    Config {
        #[command(flatten)]
        project: ProjectArgs,
    },
}

fn main() {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Start { project, replay } => cmd_start(&project.project(), replay),
        Commands::Sync { project } => cmd_sync(&project.project()),
        Commands::Status { project } => cmd_status(&project.project()),
        Commands::Config { project } => cmd_config(&project.project()),
    };

    if let Err(e) = result {
        eprintln!("Error: {e:#}");
        std::process::exit(1);
    }
}

fn cmd_start(project: &Project, replay: Option<PathBuf>) -> Result<()> {
    println!("Fieldcam Agent v{VERSION}");
    println!();

    let config_path = project.config_path();
    if !config_path.exists() {
        Settings::new_project(project.id())
            .save(&config_path)
            .context("writing default config")?;
        println!("Created a default config for project {:?} at", project.id());
        println!("  {}", config_path.display());
        println!();
        println!("Edit it (notification emails, active hours, cloud_data_dir),");
        println!("then run this command again.");
        return Ok(());
    }

    project.ensure_dirs().context("creating project directories")?;
    let log_path = project.log_path();
    init_logging(&log_path)?;

    let mut settings = Settings::load(&config_path).context("loading config")?;
    if let Some(source) = replay {
        settings.camera = CameraSource::Replay { source };
    }
    info!(project = project.id(), "runner initializing");

    let camera = build_camera(&settings, project);
    let notifier = build_notifier(&settings);
    let session = ActiveSessionController::new(
        SessionSettings::from_settings(&settings, project.video_dir()),
        BehaviorAnalyzer::new(settings.behavior()),
        notifier,
        Box::new(CommandDetector::new(
            &settings.detector_command,
            project.model_path(&settings.roi_model),
            settings.roi_confidence_thresh,
        )),
        Box::new(CommandDetector::new(
            &settings.detector_command,
            project.model_path(&settings.ooi_model),
            settings.ooi_confidence_thresh,
        )),
        Box::new(FfmpegClipWriter::new()),
    );
    let passive = PassiveSyncController::new(build_archiver(&settings, project), settings.active_window());

    let (tx, rx) = crossbeam_channel::bounded(1);
    ctrlc::set_handler(move || {
        let _ = tx.try_send(());
    })
    .context("installing Ctrl-C handler")?;

    let mut scheduler = DutyCycleScheduler::new(
        Box::new(SystemClock::new(rx)),
        camera,
        session,
        passive,
        StatsLog::with_persistence(project.stats_path()),
    )
    .with_error_attachment(log_path);
    info!("runner successfully initialized");

    match scheduler.run() {
        ExitReason::Interrupted => info!("exiting after interrupt"),
        ExitReason::Failed(detail) => warn!("exiting after failure: {detail}"),
    }

    println!();
    println!("{}", scheduler.stats().summary());
    Ok(())
}

fn cmd_sync(project: &Project) -> Result<()> {
    let settings = Settings::load(&project.config_path()).context("loading config")?;
    init_stderr_logging();

    let mut archiver = build_archiver(&settings, project);
    let report = archiver.convert_and_upload()?;
    println!(
        "Converted {} recording(s), {} failed, uploaded: {}",
        report.converted, report.failed, report.uploaded
    );
    Ok(())
}

fn cmd_status(project: &Project) -> Result<()> {
    let settings = Settings::load(&project.config_path()).context("loading config")?;

    println!("Fieldcam Agent Status");
    println!("=====================");
    println!();
    println!("Project: {}", settings.project_id);
    println!(
        "Active window: {:02}:00 - {:02}:00",
        settings.start_hour, settings.end_hour
    );
    println!(
        "Email notifications: {}",
        if settings.email_enabled() {
            "enabled"
        } else {
            "disabled (light mode)"
        }
    );
    println!(
        "Cloud sync: {}",
        settings.cloud_data_dir.as_deref().unwrap_or("disabled")
    );
    println!();

    if project.stats_path().exists() {
        let stats = StatsLog::with_persistence(project.stats_path());
        println!("{}", stats.summary());
    } else {
        println!("No previous session data found.");
    }
    Ok(())
}

fn cmd_config(project: &Project) -> Result<()> {
    let settings = Settings::load(&project.config_path()).context("loading config")?;

    println!("Configuration");
    println!("=============");
    println!();
    println!("Config file: {}", project.config_path().display());
    println!("Models dir: {}", project.models_dir().display());
    println!();
    println!("{}", serde_json::to_string_pretty(&settings)?);
    Ok(())
}

/// stderr at INFO (or `RUST_LOG`) plus a DEBUG file log in the project.
fn init_logging(log_path: &Path) -> Result<()> {
    if let Err(e) = project::rotate_log_file(log_path, LOG_ROTATE_BYTES, LOG_BACKUPS) {
        eprintln!("Warning: Could not rotate log file: {e}");
    }
    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(log_path)
        .with_context(|| format!("opening {}", log_path.display()))?;

    let stderr_layer = fmt::layer()
        .with_target(false)
        .with_writer(std::io::stderr)
        .with_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")));
    let file_layer = fmt::layer()
        .with_ansi(false)
        .with_writer(Mutex::new(file))
        .with_filter(LevelFilter::DEBUG);

    tracing_subscriber::registry()
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .context("installing tracing subscriber")?;
    Ok(())
}

fn init_stderr_logging() {
    let _ = tracing_subscriber::fmt()
        .with_target(false)
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .try_init();
}

fn build_camera(settings: &Settings, project: &Project) -> Box<dyn Camera> {
    let config = CameraConfig {
        width: settings.h_resolution,
        height: settings.v_resolution,
        framerate: settings.framerate,
        video_dir: project.video_dir(),
    };
    match &settings.camera {
        CameraSource::Noop => Box::new(NoopCamera::new(config)),
        CameraSource::Replay { source } => Box::new(ReplayCamera::new(
            config,
            source.clone(),
            settings.framegrab_interval,
        )),
    }
}

fn build_archiver(settings: &Settings, project: &Project) -> Box<dyn Archiver> {
    Box::new(RecordingArchiver::new(
        project.dir().to_path_buf(),
        project.video_dir(),
        settings.cloud_data_dir.as_deref(),
        settings.framerate,
    ))
}

#[cfg(feature = "email")]
fn build_notifier(settings: &Settings) -> Notifier {
    use fieldcam_agent::notify::SendGridTransport;

    let limiter = settings.rate_limiter();
    let (Some(api_key), Some(user_email)) = (&settings.sendgrid_api_key, &settings.user_email) else {
        return Notifier::disabled(limiter);
    };
    let from = settings
        .sendgrid_from_email
        .clone()
        .unwrap_or_else(|| user_email.clone());

    match SendGridTransport::new(api_key.clone(), from) {
        Ok(transport) => Notifier::new(
            Box::new(transport),
            Some(user_email.clone()),
            settings.admin_email.clone(),
            limiter,
        ),
        Err(e) => {
            warn!("could not initialize mail transport, continuing in light mode: {e}");
            Notifier::disabled(limiter)
        }
    }
}

#[cfg(not(feature = "email"))]
fn build_notifier(settings: &Settings) -> Notifier {
    if settings.email_enabled() {
        warn!("email settings ignored (email feature not enabled at compile time)");
    }
    Notifier::disabled(settings.rate_limiter())
}
