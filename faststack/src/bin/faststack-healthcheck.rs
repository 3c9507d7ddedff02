use axum::http::StatusCode;
use clap::Parser;
use faststack::healthcheck::healthcheck_with_timeout;
use std::process::ExitCode;
use std::time::Duration;

/// Checks if a service responds with an acceptable status code. Exits with 0 when healthy and 1
/// otherwise.
#[derive(Parser, Debug)]
#[command(name = "faststack-healthcheck", version, about)]
struct Args {
    /// URL to probe with a GET request.
    url: String,

    /// Acceptable status codes.
    #[arg(short, long, num_args = 1.., default_value = "200", value_parser = parse_status)]
    status: Vec<StatusCode>,

    /// Print the probe result.
    #[arg(short, long)]
    verbose: bool,

    /// Request timeout in seconds.
    #[arg(short, long, default_value_t = 10)]
    timeout: u64,
}

fn parse_status(value: &str) -> Result<StatusCode, String> {
    value
        .parse::<u16>()
        .map_err(|error| error.to_string())
        .and_then(|code| StatusCode::from_u16(code).map_err(|error| error.to_string()))
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = Args::parse();

    let result =
        healthcheck_with_timeout(&args.url, &args.status, Duration::from_secs(args.timeout)).await;

    if args.verbose {
        println!("{}", result.describe());
    }

    if result.healthy {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}
