//! Narrator - spoken persona commentary for a running game
//!
//! This is the main entry point for the narrator binary. Game events arrive
//! on stdin, personas comment on them through the configured text generation
//! endpoint, and the commentary is played back one utterance at a time.

mod cli;

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use narrator::backend::{OpenAiGenerator, SharedGenerator};
use narrator::commentary::{CommentaryContext, GenerationEngine, RESET_REASON};
use narrator::config::{self, NarratorConfig};
use narrator::error::{Error, Result};
use narrator::feed::{self, FeedCommand};
use narrator::logging::{self, LogGuards};
use narrator::speech::{voices, ConsoleSpeech, SharedSpeech, SpeechBackend};
use narrator::telemetry::{StaticTelemetry, TelemetrySnapshot};
use narrator::version;

use crate::cli::{Cli, Commands, ConfigSubcommand, PersonasSubcommand, ProviderSubcommand};

/// Prompt used by `provider test`
const GREETING_PROMPT: &str =
    "The player has just configured your API key for Narrator. Greet them with a short response!";

fn main() {
    // Parse CLI arguments first (before logging, so we know verbosity)
    let cli = Cli::parse();

    if let Err(e) = dispatch(cli) {
        eprint!("{}", e.format_for_terminal());
        std::process::exit(e.exit_code());
    }
}

fn dispatch(cli: Cli) -> Result<()> {
    // Short commands use simple logging
    match cli.command {
        Commands::Version => {
            version::print_version();
            Ok(())
        }
        Commands::Config { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_config_command(subcommand)
        }
        Commands::Personas { subcommand } => {
            logging::init_simple(tracing::Level::WARN)?;
            handle_personas_command(subcommand)
        }
        Commands::Provider { subcommand } => {
            logging::init_simple(simple_level(cli.verbose))?;
            handle_provider_command(subcommand)
        }
        Commands::Run { config } => {
            let config = NarratorConfig::load(config.as_deref())?;

            // The guards must be kept alive for the lifetime of the program
            let _log_guards = init_logging_from_config(&config, cli.verbose, cli.quiet)?;

            let build = version::build_info();
            info!(
                version = %build.full_version(),
                target = %build.target,
                profile = %build.profile,
                "Starting narrator"
            );

            run_narrator(config)
        }
    }
}

fn simple_level(verbose: u8) -> tracing::Level {
    if verbose > 0 {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    }
}

/// Initialize logging from configuration
fn init_logging_from_config(config: &NarratorConfig, verbose: u8, quiet: bool) -> Result<LogGuards> {
    logging::init_logging(&config.logging, verbose, quiet)
}

fn build_runtime(threads: usize) -> Result<tokio::runtime::Runtime> {
    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .worker_threads(threads)
        .thread_name("narrator")
        .build()
        .map_err(|e| Error::Internal(format!("Failed to create async runtime: {}", e)))
}

/// Run the commentary pipeline until Ctrl+C or until stdin closes and
/// everything queued has been spoken
fn run_narrator(config: NarratorConfig) -> Result<()> {
    info!(
        base_url = %config.provider.base_url,
        model = %config.provider.model_id,
        personas = config.personas.len(),
        queue_capacity = config.commentary.queue_capacity,
        "Configuration loaded"
    );

    let runtime = build_runtime(num_cpus::get().clamp(1, 4))?;
    runtime.block_on(async_narrator_main(config))
}

async fn async_narrator_main(config: NarratorConfig) -> Result<()> {
    let generator: SharedGenerator = Arc::new(OpenAiGenerator::new(&config.provider)?);
    let engine = Arc::new(GenerationEngine::new(
        generator,
        config.provider.clone(),
        config.commentary.clone(),
    ));

    let telemetry = Arc::new(StaticTelemetry::new(TelemetrySnapshot {
        player_name: config.player.name.clone(),
        ..Default::default()
    }));

    let console = Arc::new(ConsoleSpeech::new(&config.speech));
    let speech: SharedSpeech = console;
    if !speech.is_configured() {
        warn!(error = %Error::SpeechUnconfigured, "No commentary will be produced");
    }

    let ctx = CommentaryContext::new(&config, engine.clone(), telemetry.clone(), speech.is_configured());

    match speech.list_voices().await {
        Ok(catalog) if !catalog.is_empty() => {
            let changed = voices::reconcile_personas(ctx.roster(), &catalog);
            debug!(voices = catalog.len(), changed, "Voice catalog reconciled");
        }
        Ok(_) => {}
        Err(e) => warn!(error = %e, "Could not list voices"),
    }

    let cancel = CancellationToken::new();
    let handles = ctx.spawn(Arc::clone(&speech), cancel.clone());

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    // Set up graceful shutdown on Ctrl+C
    let shutdown_signal = tokio::signal::ctrl_c();
    tokio::pin!(shutdown_signal);

    let mut drain_timer = tokio::time::interval(Duration::from_millis(500));
    drain_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut usage_timer = tokio::time::interval(Duration::from_secs(60));
    usage_timer.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!("Reading events from stdin");

    loop {
        tokio::select! {
            _ = &mut shutdown_signal => {
                info!("Shutdown signal received");
                break;
            }

            line = lines.next_line(), if stdin_open => {
                match line {
                    Ok(Some(line)) => handle_line(&ctx, &telemetry, &line),
                    Ok(None) => {
                        info!("Input closed, finishing queued commentary");
                        stdin_open = false;
                    }
                    Err(e) => {
                        warn!(error = %e, "Failed to read input");
                        stdin_open = false;
                    }
                }
            }

            _ = drain_timer.tick(), if !stdin_open => {
                if ctx.is_drained() {
                    info!("All commentary delivered");
                    break;
                }
            }

            _ = usage_timer.tick() => {
                debug!(
                    sent = engine.usage().characters_sent(),
                    received = engine.usage().characters_received(),
                    "Provider usage"
                );
            }
        }
    }

    cancel.cancel();
    for handle in handles {
        if let Err(e) = handle.await {
            warn!(error = %e, "Background task ended abnormally");
        }
    }

    info!(
        characters_sent = engine.usage().characters_sent(),
        characters_received = engine.usage().characters_received(),
        "Narrator shutting down"
    );

    Ok(())
}

fn handle_line(ctx: &Arc<CommentaryContext>, telemetry: &StaticTelemetry, line: &str) {
    match feed::parse_line(line) {
        Ok(FeedCommand::Phrase { text, priority }) => {
            ctx.add_phrase(text, priority, None);
        }
        Ok(FeedCommand::Reset) => ctx.reset(&[RESET_REASON]),
        Ok(FeedCommand::Session(session)) => {
            info!(?session, "Session state changed");
            telemetry.update(|t| t.session = session);
        }
        Ok(FeedCommand::Setting(setting)) => telemetry.update(|t| t.colony_setting = setting),
        Ok(FeedCommand::Roster(roster)) => telemetry.update(|t| t.colony_roster = roster),
        Ok(FeedCommand::Release(name)) => {
            if let Err(e) = ctx.release_persona(&name) {
                warn!(error = %e, "Cannot release persona");
            }
        }
        Ok(FeedCommand::Skip) => {}
        Err(e) => warn!(error = %e, line, "Ignoring input line"),
    }
}

/// Handle configuration subcommands
fn handle_config_command(subcommand: ConfigSubcommand) -> Result<()> {
    match subcommand {
        ConfigSubcommand::Show { config } => {
            let cfg = NarratorConfig::load(config.as_deref())?;
            println!("{}", toml::to_string_pretty(&cfg)?);
        }
        ConfigSubcommand::Init { path, force } => {
            let written = config::init_config(path.as_deref(), force)?;
            println!("Configuration written to {}", written.display());
        }
        ConfigSubcommand::Validate { config } => {
            NarratorConfig::load(config.as_deref())?;
            println!("Configuration is valid.");
        }
    }

    Ok(())
}

fn handle_personas_command(subcommand: PersonasSubcommand) -> Result<()> {
    match subcommand {
        PersonasSubcommand::List { config } => {
            let cfg = NarratorConfig::load(config.as_deref())?;
            println!("Configured personas:");
            for persona in &cfg.personas {
                let role = if persona.is_chronicler {
                    "chronicler"
                } else {
                    "improviser"
                };
                let voice = if persona.voice.is_empty() {
                    "(default voice)"
                } else {
                    persona.voice.as_str()
                };
                println!(
                    "  {:<16} {:<11} delay {}-{}s  {}",
                    persona.name,
                    role,
                    persona.phrase_delay_min_secs,
                    persona.phrase_delay_max_secs,
                    voice
                );
            }
        }
    }
    Ok(())
}

fn handle_provider_command(subcommand: ProviderSubcommand) -> Result<()> {
    match subcommand {
        ProviderSubcommand::Test { config } => {
            let cfg = NarratorConfig::load(config.as_deref())?;
            if cfg.provider.model_id.is_empty() {
                return Err(Error::ProviderUnconfigured(
                    "provider.model_id is empty".to_string(),
                ));
            }

            let generator: SharedGenerator = Arc::new(OpenAiGenerator::new(&cfg.provider)?);
            let engine = GenerationEngine::new(generator, cfg.provider.clone(), cfg.commentary.clone());

            let runtime = build_runtime(1)?;
            let reply = runtime.block_on(engine.simple_prompt(GREETING_PROMPT))?;

            println!("{}", reply);
            info!(
                sent = engine.usage().characters_sent(),
                received = engine.usage().characters_received(),
                "Provider answered"
            );
        }
    }
    Ok(())
}
