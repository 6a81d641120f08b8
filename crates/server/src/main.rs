use std::process;

use clap::Parser;
use tracing_subscriber::EnvFilter;

use logmq_server::{ServerOptions, start_server};

#[derive(Parser, Debug)]
#[clap(author, version, about = "LogMQ - durable append-only streams over HTTP", long_about = None)]
struct Opts {
    /// Host to bind to
    #[arg(long, env = "LOGMQ_HOST", default_value = "127.0.0.1")]
    host: String,

    /// Port to listen on (0 for auto-assign)
    #[arg(long, env = "LOGMQ_PORT", default_value_t = 4610)]
    port: u16,

    /// Long-poll timeout in milliseconds
    #[arg(long, env = "LOGMQ_LONG_POLL_TIMEOUT_MS", default_value_t = 30_000)]
    long_poll_timeout_ms: u64,

    /// Maximum duration of one SSE connection in milliseconds
    #[arg(long, env = "LOGMQ_SSE_MAX_DURATION_MS", default_value_t = 60_000)]
    sse_max_duration_ms: u64,

    /// Largest accepted request body in bytes
    #[arg(long, env = "LOGMQ_MAX_APPEND_BYTES", default_value_t = 16 * 1024 * 1024)]
    max_append_bytes: usize,

    /// TTL sweep cadence in milliseconds
    #[arg(long, env = "LOGMQ_SWEEP_INTERVAL_MS", default_value_t = 5_000)]
    sweep_interval_ms: u64,
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .init();

    let opts: Opts = match Opts::try_parse() {
        Ok(opts) => opts,
        Err(e) => {
            let _ = e.print();
            process::exit(e.exit_code());
        }
    };

    let options = ServerOptions {
        host: opts.host,
        port: opts.port,
        long_poll_timeout_ms: opts.long_poll_timeout_ms,
        sse_max_duration_ms: opts.sse_max_duration_ms,
        max_append_bytes: opts.max_append_bytes,
        sweep_interval_ms: opts.sweep_interval_ms,
        ..Default::default()
    };

    if let Err(e) = start_server(options).await {
        eprintln!("server error: {}", e);
        process::exit(1);
    }
}
