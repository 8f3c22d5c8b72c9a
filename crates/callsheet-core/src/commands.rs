use std::io::{self, Write};
use std::str::FromStr;

use anyhow::{Context, anyhow, bail};
use chrono::{DateTime, Utc};
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{debug, info, instrument, warn};

use crate::board::ReminderBoard;
use crate::config::{ClientSettings, ReminderSettings};
use crate::detector::Detector;
use crate::fetcher::{
    ChainedToken, EnvToken, FileToken, HttpReminderFetcher, StaticToken, TokenSource,
};
use crate::navigation::NavigationRequest;
use crate::popup::{ClickTarget, PopupAction, PopupView};
use crate::render::Palette;
use crate::service::ReminderService;

/// One line typed into `watch`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WatchInput {
    Dismiss(usize),
    Open(usize),
    List,
    Board,
    OpenRow(usize),
    Quit,
}

impl FromStr for WatchInput {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let tokens: Vec<&str> = s.split_whitespace().collect();
        let handle = |raw: &str| -> anyhow::Result<usize> {
            match raw.parse::<usize>() {
                Ok(n) if n >= 1 => Ok(n - 1),
                _ => Err(anyhow!("expected a positive number, got: {raw}")),
            }
        };

        match tokens.as_slice() {
            ["dismiss" | "x", n] => Ok(Self::Dismiss(handle(n)?)),
            ["open" | "o", n] => Ok(Self::Open(handle(n)?)),
            ["list" | "ls"] | [] => Ok(Self::List),
            ["board"] => Ok(Self::Board),
            ["board", "open", n] => Ok(Self::OpenRow(handle(n)?)),
            ["quit" | "exit" | "q"] => Ok(Self::Quit),
            _ => Err(anyhow!(
                "unknown command: {s} (try: dismiss N, open N, list, board, board open N, quit)"
            )),
        }
    }
}

pub fn token_source(client: &ClientSettings, cli_token: Option<String>) -> Box<dyn TokenSource> {
    if cli_token.is_some() {
        debug!("using token supplied on the command line");
        return Box::new(StaticToken(cli_token));
    }

    let mut sources: Vec<Box<dyn TokenSource>> = Vec::new();
    if let Some(path) = &client.token_file {
        sources.push(Box::new(FileToken { path: path.clone() }));
    }
    if let Some(var) = &client.token_env {
        sources.push(Box::new(EnvToken { var: var.clone() }));
    }
    Box::new(ChainedToken(sources))
}

pub fn build_fetcher(
    client: &ClientSettings,
    cli_token: Option<String>,
) -> anyhow::Result<HttpReminderFetcher> {
    HttpReminderFetcher::new(
        &client.api_base,
        token_source(client, cli_token),
        client.timeout,
    )
}

#[instrument(skip_all)]
pub async fn board(
    fetcher: &HttpReminderFetcher,
    settings: &ReminderSettings,
    palette: Palette,
) -> anyhow::Result<()> {
    let records = fetcher.fetch_due_reminders().await;
    let board = ReminderBoard::new(settings.timezone);
    board.replace(records, Utc::now());

    println!("Upcoming Reminders");
    board.render_to(&mut io::stdout().lock(), palette)
}

#[instrument(skip(fetcher, settings))]
pub async fn due(
    fetcher: &HttpReminderFetcher,
    settings: &ReminderSettings,
    at: Option<DateTime<Utc>>,
) -> anyhow::Result<()> {
    let now = at.unwrap_or_else(Utc::now);
    let records = fetcher.fetch_due_reminders().await;
    let detector = Detector::new(settings.lookahead, settings.timezone);
    let detected = detector.detect(&records, now);

    let mut out = io::stdout().lock();
    if detected.is_empty() {
        writeln!(
            out,
            "No calls scheduled in the next {} seconds",
            detector.lookahead().num_seconds()
        )?;
        return Ok(());
    }
    for reminder in detected {
        writeln!(out, "{}", reminder.message)?;
    }
    Ok(())
}

#[instrument(skip_all)]
pub async fn watch(
    fetcher: HttpReminderFetcher,
    settings: &ReminderSettings,
    palette: Palette,
) -> anyhow::Result<()> {
    info!(endpoint = fetcher.endpoint(), "watching for scheduled calls");
    let service = ReminderService::start(settings, fetcher);
    let mut view = service.popup_view();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    eprintln!("watching reminders; commands: dismiss N, open N, list, board, board open N, quit");

    let shutdown = crate::signals::wait_for_shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            signal = &mut shutdown => {
                warn!(%signal, "received shutdown signal; stopping");
                break;
            }
            alive = view.changed() => {
                if !alive {
                    break;
                }
                print_popups(&view, palette)?;
            }
            line = lines.next_line(), if stdin_open => {
                let Some(line) = line.context("failed reading stdin")? else {
                    debug!("stdin closed; continuing until signalled");
                    stdin_open = false;
                    continue;
                };
                match line.parse::<WatchInput>() {
                    Ok(WatchInput::Quit) => break,
                    Ok(input) => {
                        if let Err(err) = handle_input(input, &view, service.board(), palette) {
                            eprintln!("{err}");
                        }
                    }
                    Err(err) => eprintln!("{err}"),
                }
            }
        }
    }

    service.stop().await;
    Ok(())
}

fn handle_input(
    input: WatchInput,
    view: &PopupView,
    board: &ReminderBoard,
    palette: Palette,
) -> anyhow::Result<()> {
    match input {
        WatchInput::List => print_popups(view, palette),
        WatchInput::Dismiss(position) => {
            let tile = view
                .tile_at(position)
                .ok_or_else(|| anyhow!("no popup #{}", position + 1))?;
            if view.click(tile.id, ClickTarget::Close) == PopupAction::Ignored {
                bail!("popup #{} was already dismissed", position + 1);
            }
            Ok(())
        }
        WatchInput::Open(position) => {
            let tile = view
                .tile_at(position)
                .ok_or_else(|| anyhow!("no popup #{}", position + 1))?;
            match view.click(tile.id, ClickTarget::Tile) {
                PopupAction::Navigate(nav) => print_navigation(&nav),
                _ => bail!("popup #{} is no longer shown", position + 1),
            }
        }
        WatchInput::Board => {
            let mut out = io::stdout().lock();
            match board.refreshed_at() {
                Some(at) => writeln!(
                    out,
                    "Upcoming Reminders (refreshed {})",
                    at.format("%H:%M:%S UTC")
                )?,
                None => writeln!(out, "Upcoming Reminders (not loaded yet)")?,
            }
            board.render_to(&mut out, palette)
        }
        WatchInput::OpenRow(row) => {
            let nav = board
                .open(row)
                .ok_or_else(|| anyhow!("no board row #{}", row + 1))?;
            print_navigation(&nav)
        }
        WatchInput::Quit => Ok(()),
    }
}

fn print_popups(view: &PopupView, palette: Palette) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    if !view.is_visible() {
        writeln!(out, "(no active reminders)")?;
        return Ok(());
    }
    view.render_to(&mut out, palette)
}

fn print_navigation(nav: &NavigationRequest) -> anyhow::Result<()> {
    let mut out = io::stdout().lock();
    writeln!(out, "-> {}", nav.route)?;
    let state = serde_json::to_string_pretty(&nav.customer)
        .context("failed serializing customer record")?;
    writeln!(out, "{state}")?;
    Ok(())
}
