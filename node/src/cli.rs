//! # CLI Interface
//!
//! Defines the command-line argument structure for `vesper-node` using
//! `clap` derive. Supports three subcommands: `init`, `loopback`, and
//! `version`.

use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// Vesper peer-to-peer payment node.
///
/// A self-sovereign payment node for the Vesper network. Holds one Ed25519
/// identity, maintains fingerprint-pinned sessions with peers, and builds,
/// holds, and broadcasts UTXO payments.
#[derive(Parser, Debug)]
#[command(
    name = "vesper-node",
    about = "Vesper peer-to-peer payment node",
    version,
    propagate_version = true
)]
pub struct VesperNodeCli {
    /// Subcommand to execute.
    #[command(subcommand)]
    pub command: Commands,
}

/// Top-level subcommands for the Vesper node binary.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Initialize a new node -- creates the data directory and generates
    /// a fresh identity keypair.
    Init(InitArgs),
    /// Run two in-process nodes against each other: connect, chat, and
    /// push a payment through the full propose/commit lifecycle.
    Loopback(LoopbackArgs),
    /// Print version information and exit.
    Version,
}

/// Arguments for the `init` subcommand.
#[derive(Parser, Debug)]
pub struct InitArgs {
    /// Path to the data directory to initialize.
    #[arg(long, short = 'd', env = "VESPER_DATA_DIR", default_value = "~/.vesper")]
    pub data_dir: PathBuf,

    /// Network to configure for: mainnet, testnet, or devnet.
    #[arg(long, default_value = "devnet")]
    pub network: String,

    /// Overwrite an existing identity key. Off by default because a
    /// replaced key is a replaced identity, fingerprints and all.
    #[arg(long)]
    pub force: bool,
}

/// Arguments for the `loopback` subcommand.
#[derive(Parser, Debug)]
pub struct LoopbackArgs {
    /// Identity key file for the dialing node (from `init`). A fresh
    /// throwaway identity is generated when omitted.
    #[arg(long, env = "VESPER_IDENTITY")]
    pub identity: Option<PathBuf>,

    /// Motes seeded into the dialing node's devnet wallet.
    #[arg(long, default_value_t = 1_000_000)]
    pub funding: u64,

    /// Payment size in motes for the scripted propose/commit run.
    #[arg(long, default_value_t = 250_000)]
    pub payment: u64,

    /// Log output format: "pretty" or "json".
    #[arg(long, env = "VESPER_LOG_FORMAT", default_value = "pretty")]
    pub log_format: String,
}
