use clap::Parser;

use crate::status::DEFAULT_QUEUE_DEPTH;

#[derive(Parser, Debug)]
#[command(
    name = "stream-relay",
    author,
    version,
    about = "WebRTC signaling relay between streamers and viewers"
)]
pub struct Cli {
    /// Address to bind the HTTP and websocket listener to.
    #[arg(long, env = "STREAM_RELAY_LISTEN_ADDR", default_value = "0.0.0.0:8080")]
    pub listen_addr: String,

    /// Shared HS256 secret used to verify peer identity tokens.
    #[arg(long, env = "JWT_SECRET", hide_env_values = true)]
    pub jwt_secret: String,

    /// Expected `iss` claim, if the issuer sets one.
    #[arg(long, env = "JWT_ISSUER")]
    pub jwt_issuer: Option<String>,

    /// Expected `aud` claim, if the issuer sets one.
    #[arg(long, env = "JWT_AUDIENCE")]
    pub jwt_audience: Option<String>,

    /// Base URL of the status service told about streamer availability.
    #[arg(long, env = "SERVER_URL")]
    pub status_url: Option<String>,

    /// Bearer token presented to the status service.
    #[arg(long, env = "SERVICE_JWT", hide_env_values = true)]
    pub service_token: Option<String>,

    /// Pending status updates kept before new ones are dropped.
    #[arg(long, env = "STREAM_RELAY_STATUS_QUEUE_DEPTH", default_value_t = DEFAULT_QUEUE_DEPTH)]
    pub status_queue_depth: usize,

    /// Per-request timeout for the status service.
    #[arg(long, env = "STREAM_RELAY_STATUS_TIMEOUT_SECS", default_value_t = 5)]
    pub status_timeout_secs: u64,

    /// Grace period applied during shutdown.
    #[arg(long, env = "STREAM_RELAY_SHUTDOWN_GRACE_SECS", default_value_t = 2)]
    pub shutdown_grace_secs: u64,
}
