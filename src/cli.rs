use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;

use crate::config::{Config, LogSettings, Settings, load_config};

/// Command line of the proxy binary.
#[derive(Parser, Debug)]
#[command(name = "logproxy", version)]
#[command(about = "Transparent TCP proxy that logs every relayed byte")]
pub struct Args {
    /// Listen/local address (required here or in the config file)
    #[arg(short = 'l', value_name = "ADDR")]
    pub listen: Option<String>,

    /// Remote/server address (required here or in the config file)
    #[arg(short = 'r', value_name = "ADDR")]
    pub remote: Option<String>,

    /// Log to file instead of stdout
    #[arg(short = 'o', value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Append to the log file instead of truncating it
    #[arg(short = 'a')]
    pub append: bool,

    /// Force connections to run synchronously
    #[arg(short = 's')]
    pub synchronous: bool,

    /// Log bytes in hex format
    #[arg(short = 'x')]
    pub hex: bool,

    /// Log with the console format instead of JSON lines
    #[arg(short = 'c')]
    pub console: bool,

    /// Do not log data, only session lifecycle
    #[arg(short = 'n')]
    pub no_data: bool,

    /// Session id prefix
    #[arg(short = 'p', value_name = "PREFIX")]
    pub prefix: Option<String>,

    /// Log time in ISO-8601 format
    #[arg(short = 't')]
    pub iso_time: bool,

    /// Log listener status
    #[arg(short = 'v')]
    pub verbose: bool,

    /// Read settings from a TOML file; command line values take precedence
    #[arg(short = 'f', long = "config", value_name = "FILE")]
    pub config: Option<PathBuf>,
}

impl Args {
    /// Settings given on the command line alone.
    #[must_use]
    pub fn settings(&self) -> Settings {
        Settings {
            listen: self.listen.clone(),
            remote: self.remote.clone(),
            prefix: self.prefix.clone(),
            synchronous: self.synchronous,
            hex: self.hex,
            no_data: self.no_data,
            log: LogSettings {
                output: self.output.clone(),
                append: self.append,
                console: self.console,
                iso_time: self.iso_time,
                verbose: self.verbose,
            },
        }
    }

    /// Merges the optional config file with the command line and resolves
    /// the result.
    pub async fn into_config(self) -> Result<Config> {
        let base = match &self.config {
            Some(path) => load_config(path)?,
            None => Settings::default(),
        };
        base.merge(self.settings()).resolve().await
    }
}
