pub mod calendar;
pub mod check;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod layout;
pub mod model;
pub mod render;
pub mod rows;
pub mod scale;
pub mod ticks;
pub mod window;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use calendar::FormatError;
pub use layout::{
  TimelineLayout,
  ViewportTracker
};
pub use model::{
  Activity,
  ActivityTransfer,
  EditError,
  Settings,
  Task,
  TaskType,
  TimelineState,
  Zoom
};
pub use window::Window;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting timeline CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.timelinerc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store = datastore::StateStore::open(
    &data_dir,
    Utc::now()
  )
  .with_context(|| {
    format!(
      "failed to open state store at \
       {}",
      data_dir.display()
    )
  })?;

  let renderer =
    render::Renderer::new(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &store, &cfg, &renderer, inv
  )?;

  info!("done");
  Ok(())
}
