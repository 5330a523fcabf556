mod app;
mod cli;
mod client;
mod config;
mod error;
mod focus;
mod k8s;
mod layout;
mod logs;
mod message;
mod model;
mod mouse;
mod navigation;
mod runtime;
#[cfg(test)]
mod testing;
mod ui;
mod watch;

use anyhow::{Context, Result};
use clap::Parser;
use cli::CliArgs;
use client::ClusterClient;
use config::Settings;
use crossterm::event::{
    DisableMouseCapture, EnableMouseCapture, Event, EventStream, KeyEventKind,
};
use crossterm::execute;
use crossterm::terminal::{
    EnterAlternateScreen, LeaveAlternateScreen, disable_raw_mode, enable_raw_mode,
};
use futures::StreamExt;
use k8s::KubeGateway;
use logs::LogStreamService;
use message::Msg;
use ratatui::Terminal;
use ratatui::backend::CrosstermBackend;
use runtime::{Runtime, Services};
use std::fs::File;
use std::io::{self, Stdout};
use std::sync::{Arc, Mutex};
use std::time::Instant;
use tokio::sync::mpsc;
use tokio::time::{Duration, MissedTickBehavior, interval};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;
use watch::WatchService;

type TuiTerminal = Terminal<CrosstermBackend<Stdout>>;
const TICK_INTERVAL: Duration = Duration::from_millis(250);
const FLUSH_INTERVAL: Duration = Duration::from_millis(50);

#[derive(Debug, Clone, Copy)]
struct TerminalOptions {
    alt_screen: bool,
    mouse: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = CliArgs::parse();
    init_tracing(args.log_filter(), args.log_file.as_ref())?;

    let settings = Settings::load(args.config.as_deref())?;
    if let Some(source) = &settings.source {
        info!(path = %source.display(), "loaded config");
    }

    let gateway = KubeGateway::connect(args.kubeconfig.clone(), args.context.clone())
        .await
        .context("failed to connect to the cluster")?;
    debug!(contexts = gateway.available_contexts().len(), "kubeconfig contexts");
    let client: Arc<dyn ClusterClient> = Arc::new(gateway);

    let services = Services {
        client: Arc::clone(&client),
        logs: Arc::new(LogStreamService::new(
            Arc::clone(&client),
            settings.logs.clone(),
        )),
        watches: Arc::new(WatchService::new(
            Arc::clone(&client),
            settings.watch.clone(),
        )),
    };
    let scope = args.namespace_scope(&client.current_namespace());
    let options = TerminalOptions {
        alt_screen: !args.no_alt_screen,
        mouse: !args.no_mouse,
    };

    run(
        client.info(),
        scope,
        settings.runtime_settings(args.refresh_interval()),
        services,
        options,
    )
    .await
}

fn init_tracing(level_filter: &str, log_file: Option<&std::path::PathBuf>) -> Result<()> {
    let filter = EnvFilter::try_new(level_filter)
        .or_else(|_| EnvFilter::try_new("info"))
        .context("failed to initialize tracing filter")?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(false)
        .compact();

    match log_file {
        Some(path) => {
            let file = File::create(path)
                .with_context(|| format!("failed to create log file {}", path.display()))?;
            let _ = builder.with_writer(Mutex::new(file)).try_init();
        }
        None => {
            let _ = builder.with_writer(std::io::sink).try_init();
        }
    }

    Ok(())
}

async fn run(
    cluster: client::ClusterInfo,
    scope: model::NamespaceScope,
    settings: runtime::RuntimeSettings,
    services: Services,
    options: TerminalOptions,
) -> Result<()> {
    let mut terminal = init_terminal(options)?;
    let run_result = run_loop(&mut terminal, cluster, scope, settings, services).await;
    let restore_result = restore_terminal(&mut terminal, options);

    match (run_result, restore_result) {
        (Err(run_error), Err(restore_error)) => Err(anyhow::anyhow!(
            "{run_error:#}\nterminal restore error: {restore_error:#}"
        )),
        (Err(error), _) => Err(error),
        (_, Err(error)) => Err(error),
        (Ok(()), Ok(())) => Ok(()),
    }
}

fn init_terminal(options: TerminalOptions) -> Result<TuiTerminal> {
    enable_raw_mode().context("failed to enable raw mode")?;
    let mut stdout = io::stdout();
    if options.alt_screen {
        execute!(stdout, EnterAlternateScreen).context("failed to enter alternate screen")?;
    }
    if options.mouse {
        execute!(stdout, EnableMouseCapture).context("failed to enable mouse capture")?;
    }
    let backend = CrosstermBackend::new(stdout);
    let mut terminal = Terminal::new(backend).context("failed to create terminal backend")?;
    terminal.clear().context("failed to clear terminal")?;
    Ok(terminal)
}

fn restore_terminal(terminal: &mut TuiTerminal, options: TerminalOptions) -> Result<()> {
    if options.mouse {
        execute!(terminal.backend_mut(), DisableMouseCapture)
            .context("failed to disable mouse capture")?;
    }
    disable_raw_mode().context("failed to disable raw mode")?;
    if options.alt_screen {
        execute!(terminal.backend_mut(), LeaveAlternateScreen)
            .context("failed to leave alternate screen")?;
    }
    terminal.show_cursor().context("failed to show cursor")?;
    Ok(())
}

async fn run_loop(
    terminal: &mut TuiTerminal,
    cluster: client::ClusterInfo,
    scope: model::NamespaceScope,
    settings: runtime::RuntimeSettings,
    services: Services,
) -> Result<()> {
    let mut log_rx = services.logs.subscribe();
    let mut watch_rx = services.watches.subscribe();
    let (tx, mut rx) = mpsc::unbounded_channel::<Msg>();
    let mut runtime = Runtime::new(cluster, scope, settings, services, tx);

    let (width, height) = crossterm::terminal::size().context("failed to read terminal size")?;
    runtime.update(Msg::Resize { width, height }, Instant::now());
    runtime.init(Instant::now());

    let mut reader = EventStream::new();
    let mut ticker = interval(TICK_INTERVAL);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut flusher = interval(FLUSH_INTERVAL);
    flusher.set_missed_tick_behavior(MissedTickBehavior::Skip);

    // Only redraw after something was processed; buffered low-priority
    // messages leave the frame as it is.
    let mut dirty = true;
    loop {
        if dirty && runtime.is_ready() {
            terminal
                .draw(|frame| ui::render(frame, &runtime))
                .context("failed to render terminal frame")?;
            dirty = false;
        }

        if !runtime.running() {
            break;
        }

        tokio::select! {
            maybe_event = reader.next() => {
                match maybe_event {
                    Some(Ok(Event::Key(key))) if key.kind == KeyEventKind::Press => {
                        dirty |= runtime.update(Msg::Key(key), Instant::now());
                    }
                    Some(Ok(Event::Mouse(mouse))) => {
                        dirty |= runtime.update(Msg::Mouse(mouse), Instant::now());
                    }
                    Some(Ok(Event::Resize(width, height))) => {
                        dirty |= runtime.update(Msg::Resize { width, height }, Instant::now());
                    }
                    Some(Ok(_)) => {}
                    Some(Err(error)) => {
                        warn!(error = %error, "terminal event error");
                    }
                    None => {
                        dirty |= runtime.update(
                            Msg::Fatal(error::AppError::critical(
                                error::ErrorCategory::General,
                                "terminal event stream closed",
                            )),
                            Instant::now(),
                        );
                    }
                }
            }
            _ = ticker.tick() => dirty |= runtime.update(Msg::Tick, Instant::now()),
            _ = flusher.tick() => dirty |= runtime.flush_pending(Instant::now()),
            Some(msg) = rx.recv() => dirty |= runtime.update(msg, Instant::now()),
            Some(update) = log_rx.recv() => {
                dirty |= runtime.update(Msg::from(update), Instant::now());
            }
            Some(update) = watch_rx.recv() => {
                dirty |= runtime.update(Msg::from(update), Instant::now());
            }
        }
    }

    runtime.shutdown();
    match runtime.exit_error() {
        Some(error) => Err(anyhow::anyhow!("{error}")),
        None => Ok(()),
    }
}
