pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod detector;
pub mod fetcher;
pub mod navigation;
pub mod notifications;
pub mod poller;
pub mod popup;
pub mod record;
pub mod registry;
pub mod render;
pub mod service;
pub mod signals;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  let mut cfg = config::Config::load(
    cli.callrc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let _log_guard = cli::init_tracing(
    cli.verbose,
    cli.quiet,
    cfg.get_path("log.file").as_deref()
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting callsheet"
  );
  debug!(files = ?cfg.loaded_files, "loaded configuration");

  let client =
    config::ClientSettings::from_config(
      &cfg
    )?;
  let settings =
    config::ReminderSettings::from_config(
      &cfg,
      *datetime::display_timezone()
    )?;
  let palette =
    render::Palette::new(&cfg)?;
  let fetcher = commands::build_fetcher(
    &client, cli.token
  )?;

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to build async \
         runtime"
      )?;

  let command = cli
    .command
    .unwrap_or(cli::Command::Watch);
  runtime.block_on(async {
    match command {
      | cli::Command::Watch => {
        commands::watch(
          fetcher, &settings, palette
        )
        .await
      }
      | cli::Command::Board => {
        commands::board(
          &fetcher, &settings, palette
        )
        .await
      }
      | cli::Command::Due { at } => {
        commands::due(
          &fetcher, &settings, at
        )
        .await
      }
    }
  })?;

  info!("done");
  Ok(())
}
