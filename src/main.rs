//! touchfeel CLI
//!
//! Usage:
//!   touchfeel                                   # Interactive terminal canvas
//!   touchfeel --replay gestures.jsonl           # Feed recorded pointer events
//!   touchfeel --serve                           # HTTP + WebSocket API server
//!   touchfeel --offline --json                  # No model endpoint, JSON output

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use clap::Parser;
use colored::Colorize;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing_subscriber::EnvFilter;

use touchfeel::config::{apply_overrides, load_config, ClassifierBackend, Overrides, TouchfeelConfig};
use touchfeel::core::{
    make_rng, run_server, spawn_session, system_clock, ApiSettings, AudioSink, Classifier,
    DeviceAudio, HttpClassifier, InteractionController, Journal, JsonlJournal, NullAudio,
    NullJournal, OfflineClassifier, PcmMixer, SessionHandle, SessionServices, SharedMixer,
    TerminalRenderer, Viewport,
};
use touchfeel::types::{PointerEvent, SessionStatus};
use touchfeel::VERSION;

#[derive(Parser, Debug)]
#[command(
    name = "touchfeel",
    version = VERSION,
    about = "touchfeel - Turn touch gestures into color and tone feedback",
    long_about = "touchfeel maps touch gestures on a canvas to color and tone feedback.\n\n\
                  Every 10 taps or holds, the recent history is sent to a classifier\n\
                  whose emotion pins the feedback and whose message is shown for 5s.\n\n\
                  Modes:\n  \
                  --interactive  Type pointer commands (default)\n  \
                  --replay FILE  Feed JSON pointer events, one per line\n  \
                  --serve        HTTP API server with WebSocket canvases\n\n\
                  Commands (interactive):\n  \
                  down X Y | move X Y | up | hold X Y [MS]\n  \
                  resize W H | status | quit"
)]
struct Args {
    /// Interactive mode - read pointer commands from stdin
    #[arg(short, long)]
    interactive: bool,

    /// Replay pointer events from a JSON-lines file
    #[arg(short, long, value_name = "FILE")]
    replay: Option<PathBuf>,

    /// Run as HTTP API server
    #[arg(short, long)]
    serve: bool,

    /// Server address (default: 127.0.0.1:3000)
    #[arg(long)]
    addr: Option<String>,

    /// Output as JSON
    #[arg(long)]
    json: bool,

    /// Disable colors in output
    #[arg(long)]
    no_color: bool,

    /// Debug logging
    #[arg(long)]
    verbose: bool,

    /// Config file (default: ~/.config/touchfeel/config.toml)
    #[arg(long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Model endpoint base URL
    #[arg(long)]
    classifier_url: Option<String>,

    /// Model name sent to the endpoint
    #[arg(long)]
    model: Option<String>,

    /// Classify with the local rule table instead of a model
    #[arg(long)]
    offline: bool,

    /// Taps/holds between classifications
    #[arg(long)]
    classify_every: Option<u32>,

    /// Directory for emotion logs
    #[arg(long)]
    journal_dir: Option<PathBuf>,

    /// Do not write emotion logs
    #[arg(long)]
    no_journal: bool,

    /// Canvas width in pixels
    #[arg(long)]
    width: Option<f64>,

    /// Canvas height in pixels
    #[arg(long)]
    height: Option<f64>,

    /// Child's nickname
    #[arg(long)]
    nickname: Option<String>,

    /// Child's birth month (YYYY-MM)
    #[arg(long)]
    birth_month: Option<String>,

    /// Child's gender
    #[arg(long)]
    gender: Option<String>,

    /// Seed for reproducible feedback
    #[arg(long)]
    seed: Option<u64>,

    /// Capture tones to a WAV file instead of playing them
    #[arg(long, value_name = "FILE")]
    pcm_out: Option<PathBuf>,

    /// Do not play tones
    #[arg(long)]
    mute: bool,
}

impl Args {
    fn overrides(&self) -> Overrides {
        Overrides {
            width: self.width,
            height: self.height,
            classifier_url: self.classifier_url.clone(),
            model: self.model.clone(),
            offline: self.offline,
            classify_every: self.classify_every,
            seed: self.seed,
            addr: self.addr.clone(),
            journal_dir: self.journal_dir.clone(),
            no_journal: self.no_journal,
            nickname: self.nickname.clone(),
            birth_month: self.birth_month.clone(),
            gender: self.gender.clone(),
        }
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();
    init_tracing(args.verbose);

    let mut config = load_config(args.config.as_deref())?;
    apply_overrides(&mut config, &args.overrides());
    config.validate()?;
    tracing::debug!(source = %config.source(), ?config, "configuration loaded");

    let services = build_services(&config)?;

    if args.serve {
        let settings = ApiSettings {
            viewport: config.viewport,
            classify_every: config.classify_every,
            profile: config.profile.clone(),
            seed: config.seed,
        };
        run_server(&config.addr, services, settings).await
    } else if let Some(ref path) = args.replay {
        run_replay(path, &args, &config, services).await
    } else {
        if !args.interactive {
            tracing::debug!("no mode given, defaulting to interactive");
        }
        run_interactive(&args, &config, services).await
    }
}

fn init_tracing(verbose: bool) {
    let default = if verbose { "touchfeel=debug" } else { "touchfeel=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn build_services(config: &TouchfeelConfig) -> anyhow::Result<SessionServices> {
    let classifier: Arc<dyn Classifier> = match config.classifier.backend {
        ClassifierBackend::Http => Arc::new(
            HttpClassifier::new(&config.classifier.url, &config.classifier.model, config.classifier.timeout)
                .context("building HTTP classifier")?,
        ),
        ClassifierBackend::Offline => Arc::new(OfflineClassifier::new()),
    };
    let journal: Arc<dyn Journal> = match &config.journal_dir {
        Some(dir) => Arc::new(JsonlJournal::new(dir)),
        None => Arc::new(NullJournal),
    };
    tracing::info!(
        classifier = classifier.name(),
        journal = ?config.journal_dir,
        "services ready"
    );

    let mut services = SessionServices::new(classifier, journal, system_clock());
    services.message_display = config.message_display;
    Ok(services)
}

/// Local session rendering to the terminal; tones go to the speaker,
/// or into a capture when `--pcm-out` is set
fn start_local_session(
    args: &Args,
    config: &TouchfeelConfig,
    services: SessionServices,
) -> (SessionHandle, tokio::task::JoinHandle<()>, Option<SharedMixer>) {
    let capture = args.pcm_out.as_ref().map(|_| SharedMixer::new(PcmMixer::default()));
    let audio: Box<dyn AudioSink> = match (&capture, args.mute) {
        (Some(mixer), _) => Box::new(mixer.clone()),
        (None, true) => Box::new(NullAudio),
        (None, false) => Box::new(DeviceAudio::new()),
    };
    let renderer = TerminalRenderer::new(config.viewport, args.no_color, args.json)
        .with_sources(services.clock.clone(), make_rng(config.seed));
    let controller = InteractionController::new(
        Box::new(renderer),
        audio,
        services.clock.clone(),
        make_rng(config.seed),
    )
    .with_profile(config.profile.clone())
    .with_classify_every(config.classify_every);

    let (handle, task) = spawn_session(controller, services);
    (handle, task, capture)
}

/// Run interactive terminal mode
async fn run_interactive(args: &Args, config: &TouchfeelConfig, services: SessionServices) -> anyhow::Result<()> {
    let (handle, task, capture) = start_local_session(args, config, services);

    print_header(config, args.no_color);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if line.eq_ignore_ascii_case("quit") || line.eq_ignore_ascii_case("exit") {
            break;
        }
        if line.eq_ignore_ascii_case("status") {
            print_status(&handle.status().await?, args);
            continue;
        }
        if let Some(viewport) = parse_resize(line) {
            handle.resize(viewport)?;
            continue;
        }

        match PointerEvent::parse_command(line) {
            Some(event) => {
                handle.pointer(event).await?;
            }
            None => println!("{}", "? try: down 10 20 | move 30 40 | up | hold 50 50 800".yellow()),
        }
    }

    let status = handle.status().await?;
    println!("\nSession ended. Operations: {}", status.history_len);
    finish(handle, task, capture, args).await
}

/// Replay pointer events from a file, then wait for pending classifications
async fn run_replay(path: &Path, args: &Args, config: &TouchfeelConfig, services: SessionServices) -> anyhow::Result<()> {
    let content = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("reading replay file {}", path.display()))?;
    let timeout = config.classifier.timeout + Duration::from_secs(1);
    let (handle, task, capture) = start_local_session(args, config, services);

    for (n, line) in content.lines().enumerate() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') {
            continue;
        }
        let event = match serde_json::from_str::<PointerEvent>(line) {
            Ok(event) => event,
            Err(_) => PointerEvent::parse_command(line)
                .with_context(|| format!("line {}: not a pointer event: {}", n + 1, line))?,
        };
        handle.pointer(event).await?;
    }

    wait_for_classifications(&handle, timeout).await?;
    print_status(&handle.status().await?, args);
    finish(handle, task, capture, args).await
}

async fn wait_for_classifications(handle: &SessionHandle, timeout: Duration) -> anyhow::Result<()> {
    let settled = |s: &SessionStatus| s.classifications_applied + s.classifications_failed >= s.classifications_requested;
    let mut status = handle.subscribe_status();

    let wait = async {
        loop {
            if settled(&*status.borrow_and_update()) {
                return Ok::<_, anyhow::Error>(());
            }
            status.changed().await?;
        }
    };
    match tokio::time::timeout(timeout, wait).await {
        Ok(result) => result,
        Err(_) => {
            tracing::warn!("gave up waiting for classification responses");
            Ok(())
        }
    }
}

async fn finish(
    handle: SessionHandle,
    task: tokio::task::JoinHandle<()>,
    capture: Option<SharedMixer>,
    args: &Args,
) -> anyhow::Result<()> {
    handle.shutdown()?;
    task.await?;

    let (Some(path), Some(mixer)) = (&args.pcm_out, capture) else {
        return Ok(());
    };
    let written = mixer.with(|m| {
        m.write_wav(path)
            .map(|_| (m.samples().len(), m.sample_rate(), m.dropped_samples()))
    });
    match written {
        Some(Ok((samples, rate, dropped))) => {
            if dropped > 0 {
                tracing::warn!(dropped, "capture limit reached, oldest samples were dropped");
            }
            println!("Wrote {} samples @ {}Hz to {}", samples, rate, path.display());
        }
        Some(Err(e)) => return Err(e).with_context(|| format!("writing {}", path.display())),
        None => tracing::warn!("audio capture unavailable, nothing written"),
    }
    Ok(())
}

fn parse_resize(line: &str) -> Option<Viewport> {
    let mut parts = line.split_whitespace();
    if !parts.next()?.eq_ignore_ascii_case("resize") {
        return None;
    }
    let width = parts.next()?.parse().ok()?;
    let height = parts.next()?.parse().ok()?;
    Some(Viewport::new(width, height))
}

fn print_header(config: &TouchfeelConfig, no_color: bool) {
    let title = format!("touchfeel v{} - {}x{} canvas", VERSION, config.viewport.width, config.viewport.height);
    if no_color {
        println!("{}", title);
    } else {
        println!("{}", title.bright_cyan().bold());
    }
    println!("Commands: down X Y | move X Y | up | hold X Y [MS] | resize W H | status | quit");
    println!();
}

fn print_status(status: &SessionStatus, args: &Args) {
    if args.json {
        match serde_json::to_string_pretty(status) {
            Ok(json) => println!("{}", json),
            Err(e) => tracing::warn!(error = %e, "failed to serialize status"),
        }
        return;
    }

    let mode = status.emotion_mode.to_string();
    println!(
        "phase={} mode={} emotion={} background={} history={} counter={} classified={}/{} failed={}",
        status.phase,
        if args.no_color { mode.normal() } else { mode.bold() },
        status.current_emotion,
        status.background.to_hex(),
        status.history_len,
        status.touches_since_classification,
        status.classifications_applied,
        status.classifications_requested,
        status.classifications_failed,
    );
    if let Some(message) = &status.message {
        println!("message: [{}] {}", message.emotion, message.text);
    }
}
