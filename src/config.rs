use anyhow::{Context, Result, bail};
use serde::Deserialize;
use std::{
    fs,
    net::SocketAddr,
    path::{Path, PathBuf},
};
use tokio::net::lookup_host;

use crate::event::Encoding;

/// Fully resolved proxy configuration. Built once at startup and never
/// modified afterwards.
#[derive(Clone, Debug)]
pub struct Config {
    pub listen: SocketAddr,
    pub remote: SocketAddr,
    pub session: SessionOptions,
    pub log: LogOptions,
}

/// Settings consumed by the dispatcher and the session handler.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct SessionOptions {
    /// Handle one session at a time instead of one task per session.
    pub synchronous: bool,
    pub encoding: Encoding,
    /// Record relayed bytes; when off only lifecycle events are produced.
    pub log_data: bool,
    /// Prepended to every session number.
    pub prefix: String,
}

/// Settings for the log output.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LogOptions {
    /// Log file; stdout when unset.
    pub output: Option<PathBuf>,
    pub append: bool,
    /// Human readable console lines instead of JSON.
    pub console: bool,
    /// RFC 3339 timestamps instead of unix microseconds.
    pub iso_time: bool,
    /// Also emit listener and dispatcher lifecycle records.
    pub verbose: bool,
}

/// Unresolved settings as read from a config file and the command line.
#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct Settings {
    pub listen: Option<String>,
    pub remote: Option<String>,
    pub prefix: Option<String>,
    pub synchronous: bool,
    pub hex: bool,
    pub no_data: bool,
    pub log: LogSettings,
}

#[derive(Clone, Debug, Default, Deserialize, PartialEq, Eq)]
#[serde(default, deny_unknown_fields)]
pub struct LogSettings {
    pub output: Option<PathBuf>,
    pub append: bool,
    pub console: bool,
    pub iso_time: bool,
    pub verbose: bool,
}

pub fn load_config(path: &Path) -> Result<Settings> {
    let content = fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&content)
        .with_context(|| format!("Failed to parse {} as valid TOML", path.display()))
}

impl Settings {
    /// Layers `overrides` on top of `self`: values present in `overrides`
    /// replace ours, flags set in either are kept.
    #[must_use]
    pub fn merge(self, overrides: Self) -> Self {
        Self {
            listen: overrides.listen.or(self.listen),
            remote: overrides.remote.or(self.remote),
            prefix: overrides.prefix.or(self.prefix),
            synchronous: self.synchronous || overrides.synchronous,
            hex: self.hex || overrides.hex,
            no_data: self.no_data || overrides.no_data,
            log: LogSettings {
                output: overrides.log.output.or(self.log.output),
                append: self.log.append || overrides.log.append,
                console: self.log.console || overrides.log.console,
                iso_time: self.log.iso_time || overrides.log.iso_time,
                verbose: self.log.verbose || overrides.log.verbose,
            },
        }
    }

    /// Checks required fields and resolves both addresses.
    pub async fn resolve(self) -> Result<Config> {
        let Some(listen) = self.listen.filter(|addr| !addr.is_empty()) else {
            bail!("no listen address provided");
        };
        let Some(remote) = self.remote.filter(|addr| !addr.is_empty()) else {
            bail!("no remote address provided");
        };

        Ok(Config {
            listen: resolve_addr(&listen).await?,
            remote: resolve_addr(&remote).await?,
            session: SessionOptions {
                synchronous: self.synchronous,
                encoding: if self.hex {
                    Encoding::Hex
                } else {
                    Encoding::Raw
                },
                log_data: !self.no_data,
                prefix: self.prefix.unwrap_or_default(),
            },
            log: LogOptions {
                output: self.log.output,
                append: self.log.append,
                console: self.log.console,
                iso_time: self.log.iso_time,
                verbose: self.log.verbose,
            },
        })
    }
}

/// Resolves a `host:port` pair to its first TCP socket address.
pub async fn resolve_addr(addr: &str) -> Result<SocketAddr> {
    lookup_host(addr)
        .await
        .with_context(|| format!("Failed to resolve address {addr}"))?
        .next()
        .with_context(|| format!("No addresses found for {addr}"))
}
