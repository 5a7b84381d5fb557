//! sslocal binary
//!
//! Usage: sslocal [OPTIONS]
//!
//! Options:
//!   -c, --config <FILE>  Path to configuration file
//!   -h, --help           Print help information

use std::env;
use std::sync::Arc;

use sslocal::proxy::{listener, tunnel::TunnelContext};
use sslocal::Config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_max_level(tracing::Level::INFO)
        .with_target(false)
        .init();

    let args: Vec<String> = env::args().collect();

    if args.len() < 2 {
        print_usage();
        std::process::exit(1);
    }

    match args[1].as_str() {
        "-h" | "--help" => {
            print_usage();
            Ok(())
        }
        "-c" | "--config" => {
            if args.len() < 3 {
                eprintln!("Error: --config requires a file path");
                std::process::exit(1);
            }
            run(&args[2]).await
        }
        other => {
            eprintln!("Unknown option: {}", other);
            print_usage();
            std::process::exit(1);
        }
    }
}

fn print_usage() {
    println!(
        r#"sslocal - local SOCKS5 front-end for a Shadowsocks AEAD relay

USAGE:
    sslocal --config <FILE>

OPTIONS:
    -c, --config <FILE>  Path to configuration file
    -h, --help           Print help information

CONFIGURATION FILE FORMAT (JSON):
    {{
        "server_addr": "relay.example.com",
        "server_port": 8388,
        "password": "<shared password>",
        "method": "aes-256-gcm",
        "local_port": 1080,
        "timeout": 60
    }}

    "method" is one of aes-128-gcm, aes-256-gcm, chacha20-ietf-poly1305.
    "local_port" defaults to 1080, "timeout" to 60 seconds.
"#
    );
}

async fn run(config_path: &str) -> anyhow::Result<()> {
    let config = load_config(config_path)?;
    let ctx = Arc::new(TunnelContext::new(config));
    listener::run(ctx).await?;
    Ok(())
}

fn load_config(path: &str) -> anyhow::Result<Config> {
    let content = std::fs::read_to_string(path)?;
    let config: Config = serde_json::from_str(&content)?;
    config.validate().map_err(|e| anyhow::anyhow!(e))?;
    Ok(config)
}
