use std::net::SocketAddr;

use structopt::StructOpt;

/// UDP-to-HTTP MPEG-TS relay.
#[derive(StructOpt, Debug, Clone)]
#[structopt(name = "udp2http")]
pub struct Opt {
    /// Address the HTTP server listens on
    #[structopt(long = "listen", default_value = "0.0.0.0:8080")]
    pub listen: SocketAddr,

    /// Maximum number of concurrently tracked UDP programs
    #[structopt(long, default_value = "100")]
    pub max_programs: usize,

    /// Maximum number of concurrent HTTP clients per program
    #[structopt(long, default_value = "100")]
    pub max_streams_per_program: usize,

    /// Seconds a program entry may sit idle (no streams, no users) before
    /// its ingest worker reaps it
    #[structopt(long, default_value = "10")]
    pub idle_timeout_secs: u64,
}
