use std::str::FromStr;

use anyhow::{anyhow, Result};
use log::LevelFilter;

use crate::settings::LoggingConfig;

pub fn parse_level(level: &str) -> Result<LevelFilter> {
    LevelFilter::from_str(level).map_err(|_| {
        anyhow!("unknown logging level '{}' (expected off, error, warn, info, debug or trace)", level)
    })
}

pub fn setup_logging(config: &LoggingConfig) -> Result<()> {
    let level = parse_level(&config.level)?;

    let mut dispatch = fern::Dispatch::new()
        .format(|out, message, record| {
            out.finish(format_args!(
                "{} [{}][{}] {}",
                chrono::Local::now().format("%Y-%m-%d %H:%M:%S%.3f"),
                record.level(),
                record.target(),
                message,
            ))
        })
        .level(level)
        // reqwest and hyper are chatty at debug
        .level_for("hyper", LevelFilter::Warn)
        .level_for("reqwest", LevelFilter::Warn)
        .chain(std::io::stderr());

    if let Some(path) = &config.file {
        dispatch = dispatch.chain(fern::log_file(path)?);
    }

    dispatch.apply()?;
    Ok(())
}
