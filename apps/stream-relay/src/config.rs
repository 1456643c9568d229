use std::{fmt, net::SocketAddr, time::Duration};

use anyhow::{bail, Context};

use crate::cli::Cli;

/// Settings resolved once at startup and handed to each component.
#[derive(Clone)]
pub struct Config {
    pub listen_addr: SocketAddr,
    pub jwt_secret: String,
    pub jwt_issuer: Option<String>,
    pub jwt_audience: Option<String>,
    pub status_url: Option<String>,
    pub service_token: Option<String>,
    pub status_queue_depth: usize,
    pub status_timeout: Duration,
    pub shutdown_grace: Duration,
}

impl Config {
    pub fn status_enabled(&self) -> bool {
        self.status_url.is_some()
    }
}

impl TryFrom<Cli> for Config {
    type Error = anyhow::Error;

    fn try_from(cli: Cli) -> Result<Self, Self::Error> {
        let listen_addr: SocketAddr = cli
            .listen_addr
            .parse()
            .with_context(|| format!("invalid listen address: {}", cli.listen_addr))?;
        if cli.jwt_secret.trim().is_empty() {
            bail!("JWT_SECRET must not be empty");
        }
        if cli.status_queue_depth == 0 {
            bail!("status queue depth must be greater than zero");
        }

        Ok(Config {
            listen_addr,
            jwt_secret: cli.jwt_secret,
            jwt_issuer: normalize_opt(cli.jwt_issuer),
            jwt_audience: normalize_opt(cli.jwt_audience),
            status_url: normalize_opt(cli.status_url),
            service_token: normalize_opt(cli.service_token),
            status_queue_depth: cli.status_queue_depth,
            status_timeout: Duration::from_secs(cli.status_timeout_secs),
            shutdown_grace: Duration::from_secs(cli.shutdown_grace_secs),
        })
    }
}

impl fmt::Debug for Config {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Config")
            .field("listen_addr", &self.listen_addr)
            .field("jwt_secret", &"<redacted>")
            .field("jwt_issuer", &self.jwt_issuer)
            .field("jwt_audience", &self.jwt_audience)
            .field("status_url", &self.status_url)
            .field("service_token", &self.service_token.as_ref().map(|_| "<redacted>"))
            .field("status_queue_depth", &self.status_queue_depth)
            .field("status_timeout", &self.status_timeout)
            .field("shutdown_grace", &self.shutdown_grace)
            .finish()
    }
}

fn normalize_opt(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}
