use std::path::PathBuf;
use std::process;
use std::time::Duration;

use clap::Parser;

use ringlet::chord::types::{NodeAddr, NodeConfig};
use ringlet::chord::{
    DEFAULT_BITS, DEFAULT_CHECK_PREDECESSOR_MS, DEFAULT_FIX_FINGERS_MS, DEFAULT_STABILIZE_MS,
    DEFAULT_SUCCESSOR_COUNT,
};
use ringlet::commands;
use ringlet::network::node::Peer;

#[derive(Parser)]
#[command(name = "ringlet")]
#[command(about = "A Chord DHT node storing small file payloads")]
struct Cli {
    /// Bind address
    #[arg(short = 'a', long = "addr", default_value = "localhost")]
    addr: String,

    /// Bind port
    #[arg(short = 'p', long = "port", default_value_t = 8000)]
    port: u16,

    /// Seed node address; leave unspecified to create a new ring
    #[arg(long = "ja", value_name = "ADDR", default_value = "Unspecified")]
    join_addr: String,

    /// Seed node port
    #[arg(long = "jp", value_name = "PORT", default_value_t = 8000)]
    join_port: u16,

    /// Milliseconds between invocations of stabilize
    #[arg(long = "ts", value_name = "MS", default_value_t = DEFAULT_STABILIZE_MS)]
    stabilize_ms: u64,

    /// Milliseconds between invocations of fix_fingers
    #[arg(long = "tff", value_name = "MS", default_value_t = DEFAULT_FIX_FINGERS_MS)]
    fix_fingers_ms: u64,

    /// Milliseconds between invocations of check_predecessor
    #[arg(long = "tcp", value_name = "MS", default_value_t = DEFAULT_CHECK_PREDECESSOR_MS)]
    check_predecessor_ms: u64,

    /// Number of successors to maintain
    #[arg(short = 'r', long = "successors", default_value_t = DEFAULT_SUCCESSOR_COUNT)]
    successors: usize,

    /// Client name whose hash becomes the node identifier (hex characters)
    #[arg(short = 'i', long = "id", default_value = "Default")]
    client_name: String,

    /// Identifier space size in bits
    #[arg(short = 'm', long = "bits", default_value_t = DEFAULT_BITS)]
    bits: u32,

    /// Base directory for per-node file storage
    #[arg(long = "files-root", default_value = "../files")]
    files_root: PathBuf,
}

fn valid_host(host: &str) -> bool {
    host == "localhost" || host.parse::<std::net::IpAddr>().is_ok()
}

fn validate(cli: Cli) -> Result<NodeConfig, String> {
    if !valid_host(&cli.addr) {
        return Err(format!("bind address {:?} is not an IP or localhost", cli.addr));
    }
    if cli.port < 1024 {
        return Err(format!("port {} out of range 1024..=65535", cli.port));
    }
    for (flag, value) in [
        ("ts", cli.stabilize_ms),
        ("tff", cli.fix_fingers_ms),
        ("tcp", cli.check_predecessor_ms),
    ] {
        if !(1..=60_000).contains(&value) {
            return Err(format!("{flag} {value} out of range 1..=60000"));
        }
    }
    if !(1..=32).contains(&cli.successors) {
        return Err(format!("successor count {} out of range 1..=32", cli.successors));
    }
    if !(1..=160).contains(&cli.bits) {
        return Err(format!("identifier bits {} out of range 1..=160", cli.bits));
    }

    let client_name = if cli.client_name == "Default" {
        None
    } else if !cli.client_name.is_empty()
        && cli.client_name.chars().all(|c| c.is_ascii_hexdigit())
    {
        Some(cli.client_name)
    } else {
        return Err(format!(
            "client name {:?} must match [0-9a-fA-F]*",
            cli.client_name
        ));
    };

    let join_addr = if cli.join_addr == "Unspecified" {
        None
    } else if valid_host(&cli.join_addr) {
        if cli.join_port < 1024 {
            return Err(format!("join port {} out of range 1024..=65535", cli.join_port));
        }
        Some(NodeAddr::new(format!("{}:{}", cli.join_addr, cli.join_port)))
    } else {
        return Err(format!(
            "join address {:?} is not an IP or localhost",
            cli.join_addr
        ));
    };

    Ok(NodeConfig {
        bind_addr: cli.addr,
        bind_port: cli.port,
        join_addr,
        stabilize_interval: Duration::from_millis(cli.stabilize_ms),
        fix_fingers_interval: Duration::from_millis(cli.fix_fingers_ms),
        check_predecessor_interval: Duration::from_millis(cli.check_predecessor_ms),
        successor_count: cli.successors,
        client_name,
        bits: cli.bits,
        files_root: cli.files_root,
    })
}

#[tokio::main]
async fn main() {
    env_logger::Builder::from_default_env()
        .format_timestamp_millis()
        .init();

    let cli = Cli::try_parse().unwrap_or_else(|e| {
        let _ = e.print();
        process::exit(1);
    });
    let config = match validate(cli) {
        Ok(config) => config,
        Err(msg) => {
            eprintln!("invalid arguments: {msg}");
            process::exit(1);
        }
    };

    let peer = match Peer::start(config).await {
        Ok(peer) => peer,
        Err(e) => {
            eprintln!("failed to start node: {e}");
            process::exit(1);
        }
    };

    commands::run_prompt(peer).await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    fn parse(args: &[&str]) -> Cli {
        Cli::try_parse_from(std::iter::once("ringlet").chain(args.iter().copied())).unwrap()
    }

    #[test]
    fn defaults_create_a_new_ring() {
        let config = validate(parse(&[])).unwrap();
        assert_eq!(config.bind_addr, "localhost");
        assert_eq!(config.bind_port, 8000);
        assert!(config.join_addr.is_none());
        assert_eq!(config.stabilize_interval, Duration::from_millis(3000));
        assert_eq!(config.successor_count, 3);
        assert!(config.client_name.is_none());
    }

    #[test]
    fn join_flags_build_the_seed_address() {
        let config = validate(parse(&["--ja", "127.0.0.1", "--jp", "8001"])).unwrap();
        assert_eq!(
            config.join_addr.unwrap().as_str(),
            "127.0.0.1:8001"
        );
    }

    #[test]
    fn out_of_range_values_are_rejected() {
        assert!(validate(parse(&["-p", "1000"])).is_err());
        assert!(validate(parse(&["--ts", "0"])).is_err());
        assert!(validate(parse(&["--ts", "60001"])).is_err());
        assert!(validate(parse(&["-r", "33"])).is_err());
        assert!(validate(parse(&["-a", "not-a-host"])).is_err());
        assert!(validate(parse(&["--ja", "bogus..host"])).is_err());
        assert!(validate(parse(&["--ja", "127.0.0.1", "--jp", "80"])).is_err());
    }

    #[test]
    fn client_name_must_be_hex() {
        assert!(validate(parse(&["-i", "cafe42"])).is_ok());
        assert!(validate(parse(&["-i", "not hex!"])).is_err());
        let config = validate(parse(&["-i", "Default"])).unwrap();
        assert!(config.client_name.is_none());
    }

    #[test]
    fn dial_timeout_tracks_stabilize_interval() {
        let config = validate(parse(&["--ts", "2000"])).unwrap();
        assert_eq!(config.dial_timeout(), Duration::from_millis(6000));
    }
}
