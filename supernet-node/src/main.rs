//! Node binary entry point: parses CLI flags, assembles a [`NodeConfig`],
//! and drives a [`supernet_node::Node`] until shutdown.
//!
//! Exit codes: `0` on a clean shutdown, `1` on a fatal runtime error, `2` on
//! a configuration error.

use {
    clap::{App, Arg},
    log::error,
    std::process::ExitCode,
    supernet_node::{config::NodeConfig, error::NodeError, Node},
};

fn build_cli() -> App<'static, 'static> {
    App::new("supernet-node")
        .version("0.1.0")
        .about("A node for a multi-chain proof-of-stake blockchain platform")
        .arg(
            Arg::with_name("config")
                .long("config")
                .value_name("PATH")
                .help("Path to a JSON config file overriding the built-in defaults")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("bind-addr")
                .long("bind-addr")
                .value_name("IP:PORT")
                .help("Address to bind the peer listener on")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("network-id")
                .long("network-id")
                .value_name("ID")
                .help("Network id peers must match to be accepted")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("node-root")
                .long("node-root")
                .value_name("DIR")
                .help("Root directory for this node's persistent state")
                .takes_value(true),
        )
        .arg(
            Arg::with_name("signer-secret")
                .long("signer-secret")
                .value_name("SECRET")
                .help("Seed for this node's in-memory TLS/BLS signer (development only)")
                .takes_value(true),
        )
}

fn init_logging() {
    if std::env::var("RUST_LOG").is_err() {
        std::env::set_var("RUST_LOG", "info");
    }
    env_logger::init();
}

fn load_config(matches: &clap::ArgMatches) -> Result<NodeConfig, NodeError> {
    let file_path = matches.value_of("config").map(std::path::Path::new);
    let config = NodeConfig::load(file_path, matches)?;
    config.validate()?;
    Ok(config)
}

async fn run(config: NodeConfig) -> Result<(), NodeError> {
    let node = Node::new(config)?;
    node.run().await
}

fn main() -> ExitCode {
    let matches = build_cli().get_matches();
    init_logging();

    let config = match load_config(&matches) {
        Ok(config) => config,
        Err(e @ NodeError::Config(_)) | Err(e @ NodeError::ConfigFile { .. }) | Err(e @ NodeError::ConfigParse(_)) => {
            error!("configuration error: {e}");
            return ExitCode::from(2);
        }
        Err(e) => {
            error!("startup error: {e}");
            return ExitCode::from(1);
        }
    };

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(rt) => rt,
        Err(e) => {
            error!("failed to start async runtime: {e}");
            return ExitCode::from(1);
        }
    };

    match runtime.block_on(run(config)) {
        Ok(()) => ExitCode::from(0),
        Err(e) => {
            error!("node exited with error: {e}");
            ExitCode::from(1)
        }
    }
}
