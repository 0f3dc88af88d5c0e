pub mod board;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod digest;
pub mod error;
pub mod files;
pub mod ics;
pub mod item;
pub mod remaining;
pub mod render;
pub mod ticker;

use std::ffi::OsString;

use anyhow::Context;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::{
  CountdownError,
  CountdownResult
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let cli = cli::GlobalCli::parse_from(
    raw_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting countdown CLI"
  );
  debug!(overrides = cli.rc_overrides.len(), "parsed rc overrides");

  let mut cfg = config::Config::load(
    cli.countdownrc.as_deref()
  )?;
  cfg.apply_overrides(
    cli
      .rc_overrides
      .into_iter()
      .map(|kv| (kv.key, kv.value))
  );

  let zone =
    datetime::LocalZone::resolve(
      cfg.get("timezone").as_deref()
    );
  debug!(?zone, "resolved local zone");

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let store =
    datastore::DataStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open datastore at \
         {}",
        data_dir.display()
      )
    })?;

  let renderer =
    render::Renderer::new(&cfg, zone)?;

  commands::dispatch(
    &store,
    &cfg,
    &zone,
    &renderer,
    cli.command
  )?;

  info!("done");
  Ok(())
}
