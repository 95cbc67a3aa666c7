//! Command-line driver for the cross-process parameter store.
//!
//! A test harness calls this from the driver side (`create`, `set-*`,
//! `destroy`) while worker processes use `flint-store` directly; every
//! invocation is its own process, which is the point — the store needs
//! no handshake beyond the durable handle row.

use anyhow::{Context, Result, bail};
use flint_config::FlintConfig;
use flint_store::ParamStore;
use std::env;
use tracing_subscriber::EnvFilter;

const USAGE: &str = "usage: flintctl <create|destroy|get|reset-time|set-time <i64>|set-mock-wait <true|false>>";

fn main() -> Result<()> {
    let config_path = env::var("FLINT_CONFIG").unwrap_or_else(|_| "flint.toml".into());
    let config = FlintConfig::load_or_default(config_path).context("loading config")?;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.log_level.clone()));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    std::fs::create_dir_all(&config.runtime_dir)
        .with_context(|| format!("creating runtime dir '{}'", config.runtime_dir))?;

    let mut store = ParamStore::open(&config.runtime_dir, &config.directory_file);

    let mut args = env::args().skip(1);
    let Some(cmd) = args.next() else {
        bail!("{USAGE}");
    };

    match cmd.as_str() {
        "create" => store.create()?,
        "destroy" => store.destroy()?,
        "get" => {
            let params = store.get()?;
            println!(
                "current_time={} mock_wait_returns_immediately={}",
                params.current_time, params.mock_wait_returns_immediately
            );
        }
        "reset-time" => store.reset_time()?,
        "set-time" => {
            let value: i64 = args
                .next()
                .context("set-time needs a value")?
                .parse()
                .context("set-time value must be an i64")?;
            store.set_current_time(value)?;
        }
        "set-mock-wait" => {
            let value: bool = args
                .next()
                .context("set-mock-wait needs a value")?
                .parse()
                .context("set-mock-wait value must be true or false")?;
            store.set_mock_wait_immediately(value)?;
        }
        other => bail!("unknown command '{other}'\n{USAGE}"),
    }

    Ok(())
}
