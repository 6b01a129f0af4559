// Copyright (c) 2026 ALAS Technology. MIT License.
// See LICENSE for details.

//! # Vesper Payment Node
//!
//! Entry point for the `vesper-node` binary. Parses CLI arguments,
//! initializes logging, and runs the selected mode.
//!
//! The binary supports three subcommands:
//!
//! - `init`     -- initialize a data directory and generate an identity key
//! - `loopback` -- run two in-process nodes through the payment lifecycle
//! - `version`  -- print build version information

mod cli;
mod logging;

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context, Result};
use clap::Parser;
use tokio::signal;
use tokio::sync::broadcast;
use tokio::time::timeout;

use vesper_protocol::config::{
    self, NETWORK_ID_DEVNET, NETWORK_ID_MAINNET, NETWORK_ID_TESTNET,
};
use vesper_protocol::crypto::keys::VesperKeypair;
use vesper_protocol::identity::Fingerprint;
use vesper_protocol::network::dispatch::NoopChannelHandler;
use vesper_protocol::network::memory::MemoryHub;
use vesper_protocol::node::{Node, NodeConfig, NodeEvent};
use vesper_protocol::wallet::store::MemoryWalletStore;

use cli::{Commands, VesperNodeCli};
use logging::LogFormat;

/// Endpoint name the loopback listener binds on the in-process hub.
const LOOPBACK_ENDPOINT: &str = "loopback:2448";

#[tokio::main]
async fn main() -> Result<()> {
    let cli = VesperNodeCli::parse();

    match cli.command {
        Commands::Init(args) => init_node(args),
        Commands::Loopback(args) => run_loopback(args).await,
        Commands::Version => {
            print_version();
            Ok(())
        }
    }
}

// ---------------------------------------------------------------------------
// init
// ---------------------------------------------------------------------------

/// Initializes a new node data directory and generates an identity keypair.
fn init_node(args: cli::InitArgs) -> Result<()> {
    logging::init_logging("vesper_node=info", LogFormat::Pretty);

    let network_id = match args.network.as_str() {
        "mainnet" => NETWORK_ID_MAINNET,
        "testnet" => NETWORK_ID_TESTNET,
        "devnet" => NETWORK_ID_DEVNET,
        other => bail!("unknown network '{other}' (expected mainnet, testnet, or devnet)"),
    };

    let data_dir = &args.data_dir;
    tracing::info!(data_dir = %data_dir.display(), network = %args.network, "initializing node");

    std::fs::create_dir_all(data_dir)
        .with_context(|| format!("failed to create data directory: {}", data_dir.display()))?;

    let key_path = data_dir.join("node.key");
    if key_path.exists() && !args.force {
        bail!(
            "identity key already exists at {} (pass --force to replace it and become someone new)",
            key_path.display()
        );
    }

    let keypair = VesperKeypair::generate();
    write_identity(&key_path, &keypair)?;

    let fingerprint = Fingerprint::of(&keypair.public_key());
    let hrp = config::hrp_for_network(network_id)
        .context("no address prefix registered for network")?;

    let profile_path = data_dir.join("profile.json");
    let profile = serde_json::json!({
        "network": args.network,
        "fingerprint": fingerprint.to_string(),
        "public_key": keypair.public_key_hex(),
    });
    std::fs::write(&profile_path, serde_json::to_string_pretty(&profile)?)
        .with_context(|| format!("failed to write profile to {}", profile_path.display()))?;

    tracing::info!(
        fingerprint = %fingerprint,
        key_path = %key_path.display(),
        "identity keypair generated"
    );

    println!("Node initialized successfully.");
    println!("  Data directory : {}", data_dir.display());
    println!(
        "  Network        : {} (addresses start with '{hrp}1')",
        args.network
    );
    println!("  Identity key   : {}", key_path.display());
    println!("  Fingerprint    : {fingerprint}");
    println!("  Public key     : {}", keypair.public_key_hex());
    println!();
    println!(
        "Peers dial you as {fingerprint}@<host>:{}",
        config::DEFAULT_PEER_PORT
    );

    Ok(())
}

// ---------------------------------------------------------------------------
// loopback
// ---------------------------------------------------------------------------

/// Spins up two in-process nodes over the memory hub, connects them with
/// fingerprint pinning, exchanges chat, and pushes one payment through
/// propose/commit. Then idles until ctrl-c so the session plumbing can be
/// watched under a debugger or log tail.
async fn run_loopback(args: cli::LoopbackArgs) -> Result<()> {
    logging::init_logging(
        "vesper_node=info,vesper_protocol=info",
        LogFormat::from_str_lossy(&args.log_format),
    );

    let identity = match &args.identity {
        Some(path) => load_identity(path)?,
        None => VesperKeypair::generate(),
    };

    tracing::info!(
        fingerprint = %Fingerprint::of(&identity.public_key()),
        funding = args.funding,
        payment = args.payment,
        "starting loopback pair"
    );

    let hub = MemoryHub::new();
    let (alice, alice_store) = loopback_node_with(identity, &hub);
    let (bob, _bob_store) = loopback_node_with(VesperKeypair::generate(), &hub);
    let alice_fp = alice.fingerprint();

    // Stream both event feeds to stdout as JSON lines.
    let printers = [
        spawn_event_printer("alice", alice.subscribe()),
        spawn_event_printer("bob", bob.subscribe()),
    ];
    let mut bob_sync = bob.subscribe();

    // Wire the pair up.
    let bob_fp = bob.listen(LOOPBACK_ENDPOINT).await?;
    alice
        .connect(&format!("{bob_fp}@{LOOPBACK_ENDPOINT}"))
        .await?;

    // Wait until Bob's side has registered the session before he speaks.
    let _ = timeout(Duration::from_secs(1), bob_sync.recv())
        .await
        .context("timed out waiting for the inbound session")?
        .context("event stream closed before the session registered")?;

    alice.say(bob_fp, "loopback: hello from alice").await?;
    bob.say(alice_fp, "loopback: hello back from bob").await?;

    // Fund Alice and run one payment through the full lifecycle.
    alice_store.seed_utxo(args.funding, 1);
    let invoice = bob.fresh_address()?.encode();

    let held = alice.propose(&[(invoice.clone(), args.payment)])?;
    tracing::info!(txid = %held.txid, fee = held.tx.fee, "proposal held");

    let committed = alice.commit(held.txid)?;
    tracing::info!(txid = %committed.txid, "payment committed");

    let balance = alice.balance()?;
    println!();
    println!("loopback pair is up:");
    println!("  alice    {alice_fp}");
    println!("  bob      {bob_fp}");
    println!(
        "  payment  {} motes -> {} (txid {})",
        args.payment, invoice, committed.txid
    );
    println!(
        "  alice    {} motes total, {} confirmed",
        balance.total, balance.confirmed
    );
    println!(
        "  wire     {} transaction(s) broadcast",
        alice_store.broadcast_count()
    );
    println!();
    println!("loopback pair idle; press ctrl-c to stop");

    shutdown_signal().await;
    tracing::info!("shutdown signal received, closing sessions");

    alice.shutdown().await;
    bob.shutdown().await;

    // Let the disconnect events reach stdout before the printers go away.
    tokio::time::sleep(Duration::from_millis(50)).await;
    for printer in printers {
        printer.abort();
    }

    tracing::info!("vesper-node stopped");
    Ok(())
}

/// Builds a devnet node on the hub with its own in-memory wallet.
fn loopback_node_with(
    identity: VesperKeypair,
    hub: &MemoryHub,
) -> (Node, Arc<MemoryWalletStore>) {
    let store = Arc::new(MemoryWalletStore::new(NETWORK_ID_DEVNET));
    let config = NodeConfig {
        network_id: NETWORK_ID_DEVNET,
        ..NodeConfig::default()
    };
    let node = Node::new(
        identity,
        Arc::new(hub.clone()),
        store.clone(),
        Arc::new(NoopChannelHandler),
        config,
    );
    (node, store)
}

/// Prints one node's event stream to stdout as JSON lines, tagged with the
/// node's loopback name.
fn spawn_event_printer(
    name: &'static str,
    mut events: broadcast::Receiver<NodeEvent>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        loop {
            match events.recv().await {
                Ok(event) => match serde_json::to_string(&event) {
                    Ok(line) => println!("[{name}] {line}"),
                    Err(e) => tracing::warn!(error = %e, "event serialization failed"),
                },
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "event printer lagged");
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    })
}

// ---------------------------------------------------------------------------
// Identity files
// ---------------------------------------------------------------------------

/// Writes the secret key hex-encoded, readable by owner only.
fn write_identity(path: &Path, keypair: &VesperKeypair) -> Result<()> {
    std::fs::write(path, hex::encode(keypair.secret_key_bytes()))
        .with_context(|| format!("failed to write identity key to {}", path.display()))?;

    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        std::fs::set_permissions(path, std::fs::Permissions::from_mode(0o600))
            .with_context(|| format!("failed to restrict permissions on {}", path.display()))?;
    }

    Ok(())
}

/// Loads a keypair from a hex-encoded identity file.
fn load_identity(path: &Path) -> Result<VesperKeypair> {
    let hex_str = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read identity key from {}", path.display()))?;
    VesperKeypair::from_hex(&hex_str)
        .with_context(|| format!("invalid identity key in {}", path.display()))
}

// ---------------------------------------------------------------------------
// version
// ---------------------------------------------------------------------------

/// Prints version information to stdout.
fn print_version() {
    println!("vesper-node {}", env!("CARGO_PKG_VERSION"));
    println!("protocol    {}", vesper_protocol::config::PROTOCOL_VERSION);
    println!("rustc       {}", rustc_version());
}

/// Returns the Rust compiler version used to build this binary.
fn rustc_version() -> &'static str {
    option_env!("RUSTC_VERSION").unwrap_or("unknown")
}

// ---------------------------------------------------------------------------
// Shutdown
// ---------------------------------------------------------------------------

/// Waits for SIGINT (Ctrl+C) or SIGTERM, whichever comes first.
///
/// On non-Unix platforms, only Ctrl+C is supported.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
