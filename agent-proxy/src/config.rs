//! Configuration surface (C10/A3): the frontend's CLI flags and the
//! backend's host-supplied options, mirroring the original's
//! `frontend.Config`/`caddy.Options` pair but with `clap`/`serde`
//! replacing hand-rolled flag parsing and JSON shims.

use std::time::Duration;

use serde::Deserialize;

use crate::error::ProxyError;

/// Immutable frontend options (§3 Options), resolved from CLI flags.
#[derive(Debug, Clone)]
pub struct Options {
    pub listen_addr: String,
    pub server_uri: http::Uri,
    pub connector: String,
    pub log_level: String,
    pub connect_timeout: Duration,
    pub read_timeout: Duration,
    pub write_timeout: Duration,
    pub skip_tls_verify: bool,
    pub compression: Option<String>,
    pub metrics_addr: String,
}

impl Options {
    pub fn from_args(args: &FrontendArgs) -> Result<Self, ProxyError> {
        if args.connector != "caddy-http3" {
            return Err(ProxyError::ConfigInvalid(format!(
                "unsupported connector {:?}, only caddy-http3 is supported",
                args.connector
            )));
        }
        let server_uri: http::Uri = args
            .server
            .parse()
            .map_err(|e| ProxyError::ConfigInvalid(format!("invalid -server URI: {e}")))?;
        let compression = server_uri
            .query()
            .and_then(|q| url::form_urlencoded::parse(q.as_bytes()).find(|(k, _)| k == "compression"))
            .map(|(_, v)| v.into_owned());

        let write_timeout = args.write_timeout.unwrap_or(args.timeout);
        let read_timeout = args.read_timeout.unwrap_or(args.timeout);

        Ok(Options {
            listen_addr: args.listen.clone(),
            server_uri,
            connector: args.connector.clone(),
            log_level: args.log_level.clone(),
            connect_timeout: args.connect_timeout,
            read_timeout,
            write_timeout,
            skip_tls_verify: args.insecure_skip_verify,
            compression,
            metrics_addr: args.metrics_addr.clone(),
        })
    }
}

/// CLI flags (§6 Frontend CLI).
#[derive(Debug, Clone, clap::Parser)]
#[command(name = "tunnelgate-frontend")]
pub struct FrontendArgs {
    #[arg(long, default_value = ":59487")]
    pub listen: String,

    #[arg(long, default_value = "https://example.invalid/?version=v1&compression=snappy")]
    pub server: String,

    #[arg(long, default_value = "caddy-http3")]
    pub connector: String,

    #[arg(long, default_value = "info")]
    pub log_level: String,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "10s")]
    pub connect_timeout: Duration,

    #[arg(long, value_parser = humantime::parse_duration, default_value = "60s")]
    pub timeout: Duration,

    #[arg(long, value_parser = humantime::parse_duration)]
    pub read_timeout: Option<Duration>,

    #[arg(long, value_parser = humantime::parse_duration)]
    pub write_timeout: Option<Duration>,

    #[arg(long)]
    pub pprof_addr: Option<String>,

    #[arg(long, default_value = "0.0.0.0:9090")]
    pub metrics_addr: String,

    #[arg(long)]
    pub insecure_skip_verify: bool,

    #[arg(long)]
    pub version: bool,
}

/// One entry of the backend's `users` list (§9 open question): parsed
/// and retained, never enforced here. Authentication is delegated to
/// the embedding host's own auth module.
#[derive(Debug, Clone, Deserialize)]
pub struct User {
    pub name: String,
    pub password: String,
}

/// Backend configuration consumed from the host reverse proxy (§6).
#[derive(Debug, Clone, Deserialize)]
pub struct BackendConfig {
    pub path: String,
    #[serde(default)]
    pub upstream_tcp: Option<String>,
    #[serde(default)]
    pub upstream_udp: Option<String>,
    #[serde(with = "duration_str_opt", default)]
    pub connect_timeout: Option<Duration>,
    #[serde(with = "duration_str_opt", default)]
    pub read_timeout: Option<Duration>,
    #[serde(with = "duration_str_opt", default)]
    pub write_timeout: Option<Duration>,
    #[serde(with = "duration_str_opt", default)]
    pub timeout: Option<Duration>,
    #[serde(default)]
    pub users: Vec<User>,
}

const DEFAULT_CONNECT_TIMEOUT: Duration = Duration::from_secs(3);
const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(60);
const DEFAULT_WRITE_TIMEOUT: Duration = Duration::from_secs(5);

impl BackendConfig {
    pub fn validate(&self) -> Result<(), ProxyError> {
        if self.upstream_tcp.is_none() && self.upstream_udp.is_none() {
            return Err(ProxyError::ConfigInvalid(
                "one of upstream_tcp or upstream_udp must be given".into(),
            ));
        }
        Ok(())
    }

    pub fn connect_timeout(&self) -> Duration {
        self.connect_timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT)
    }

    pub fn read_timeout(&self) -> Duration {
        self.read_timeout
            .or(self.timeout)
            .unwrap_or(DEFAULT_READ_TIMEOUT)
    }

    pub fn write_timeout(&self) -> Duration {
        self.write_timeout
            .or(self.timeout)
            .unwrap_or(DEFAULT_WRITE_TIMEOUT)
    }
}

mod duration_str_opt {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer};

    pub fn deserialize<'de, D>(deserializer: D) -> Result<Option<Duration>, D::Error>
    where
        D: Deserializer<'de>,
    {
        let raw: Option<String> = Option::deserialize(deserializer)?;
        match raw {
            None => Ok(None),
            Some(s) => duration_str::parse(&s).map(Some).map_err(serde::de::Error::custom),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn backend_config_requires_an_upstream() {
        let cfg = BackendConfig {
            path: "tunnel".into(),
            upstream_tcp: None,
            upstream_udp: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            timeout: None,
            users: vec![],
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn backend_config_defaults_match_upstream_caddy_module() {
        let cfg = BackendConfig {
            path: "tunnel".into(),
            upstream_tcp: Some("127.0.0.1:9000".into()),
            upstream_udp: None,
            connect_timeout: None,
            read_timeout: None,
            write_timeout: None,
            timeout: None,
            users: vec![],
        };
        assert_eq!(cfg.connect_timeout(), DEFAULT_CONNECT_TIMEOUT);
        assert_eq!(cfg.read_timeout(), DEFAULT_READ_TIMEOUT);
        assert_eq!(cfg.write_timeout(), DEFAULT_WRITE_TIMEOUT);
    }
}
