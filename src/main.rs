use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use speech_assistant::{
    create_router, vocabulary, AppState, AssistantSession, AudioBackendConfig, AudioBackendFactory,
    AudioSource, Config, NluClient, SessionConfig,
};
use std::time::Duration;
use tokio::sync::watch;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "speech-assistant", version, about = "Wake-word gated voice command client")]
struct Cli {
    /// Configuration file, extension optional
    #[arg(short, long, global = true, default_value = "config/speech-assistant")]
    config: String,

    /// Log level used when RUST_LOG is unset
    #[arg(long, global = true, default_value = "info")]
    log_level: String,

    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Run the assistant (default)
    Run(RunArgs),

    /// Upload the command vocabulary and match a single sentence
    Match {
        /// Sentence to match against the command vocabulary
        sentence: String,
    },
}

#[derive(Args, Default)]
struct RunArgs {
    /// Replay a 16kHz mono WAV file instead of capturing from the microphone
    #[arg(short, long)]
    input: Option<String>,

    /// Skip the wake-word gate and transcribe continuously
    #[arg(long)]
    no_kws: bool,

    /// Only spot keywords
    #[arg(long)]
    no_asr: bool,

    /// Print transcripts without matching them
    #[arg(long)]
    no_nlu: bool,

    /// Do not serve the status API
    #[arg(long)]
    no_http: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&cli.log_level));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    let cfg = Config::load(&cli.config)?;
    info!("Speech Assistant v{}", env!("CARGO_PKG_VERSION"));
    info!("Loaded config: {}", cfg.service.name);

    match cli.command.unwrap_or(Command::Run(RunArgs::default())) {
        Command::Run(args) => run(cfg, args).await,
        Command::Match { sentence } => match_sentence(&cfg, &sentence).await,
    }
}

async fn run(mut cfg: Config, args: RunArgs) -> Result<()> {
    if args.no_kws {
        cfg.kws.enabled = false;
    }
    if args.no_asr {
        cfg.asr.enabled = false;
    }
    if args.no_nlu {
        cfg.nlu.enabled = false;
    }
    if args.no_http {
        cfg.service.http.enabled = false;
    }
    if let Some(input) = args.input {
        cfg.audio.input = Some(input);
    }

    let session_config = SessionConfig::from_config(&cfg)?;

    let source = match cfg.audio.input.clone() {
        Some(path) => AudioSource::File {
            path,
            realtime: cfg.audio.realtime,
        },
        None => AudioSource::Microphone,
    };
    let audio_config = AudioBackendConfig {
        sample_rate: cfg.audio.sample_rate,
        frame_size: cfg.audio.frame_size,
        ..Default::default()
    };
    let backend = AudioBackendFactory::create(source, audio_config)?;

    let session = AssistantSession::connect(session_config).await?;
    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    let server = if cfg.service.http.enabled {
        let addr = format!("{}:{}", cfg.service.http.bind, cfg.service.http.port);
        let listener = tokio::net::TcpListener::bind(&addr)
            .await
            .with_context(|| format!("Failed to bind status API to {}", addr))?;
        info!("Status API listening on http://{}", addr);

        let router = create_router(AppState::new(session.subscribe()));
        let mut stop = shutdown_rx.clone();
        Some(tokio::spawn(async move {
            axum::serve(listener, router)
                .with_graceful_shutdown(async move {
                    let _ = stop.wait_for(|stop| *stop).await;
                })
                .await
        }))
    } else {
        None
    };

    println!("Press Ctrl+C to stop");

    let session_run = session.run(backend, shutdown_rx);
    tokio::pin!(session_run);

    let result = tokio::select! {
        result = &mut session_run => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                error!("Failed to listen for Ctrl+C: {}", e);
            }
            info!("Shutting down...");
            shutdown_tx.send_replace(true);
            session_run.await
        }
    };

    shutdown_tx.send_replace(true);
    if let Some(server) = server {
        match server.await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => error!("Status API error: {}", e),
            Err(e) => error!("Status API task failed: {}", e),
        }
    }

    let stats = result?;
    info!(
        "Session {} finished: {} frames, {} wakes, {} commands, {} matched, {} failed",
        stats.session_id,
        stats.frames_captured,
        stats.wake_count,
        stats.command_count,
        stats.matched_count,
        stats.failed_matches
    );

    Ok(())
}

async fn match_sentence(cfg: &Config, sentence: &str) -> Result<()> {
    let commands = vocabulary::load_commands(&cfg.nlu.commands_path)?;
    let client = NluClient::new(&cfg.nlu.url, Duration::from_millis(cfg.nlu.timeout_ms))?;

    client.upload_vocabulary(&commands).await?;
    let result = client.match_sentence(sentence).await?;

    println!("Sentence:   {}", sentence);
    println!("Best match: {}", result.best_match);
    println!("Score:      {}", result.score);

    Ok(())
}
