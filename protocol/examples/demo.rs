//! Interactive CLI demo of the full Vesper node lifecycle.
//!
//! Walks through identity creation, secure channel establishment with
//! fingerprint pinning, peer-to-peer chat, and the propose/commit payment
//! lifecycle, plus the sweep and fan-out maintenance operations. The output
//! uses ANSI escape codes for colored, storytelling-style terminal
//! rendering.
//!
//! Run with:
//!   cargo run --example demo --release

use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::broadcast;
use tokio::time::timeout;

use vesper_protocol::config::NETWORK_ID_DEVNET;
use vesper_protocol::crypto::keys::VesperKeypair;
use vesper_protocol::identity::Fingerprint;
use vesper_protocol::network::dispatch::NoopChannelHandler;
use vesper_protocol::network::memory::MemoryHub;
use vesper_protocol::node::{Node, NodeConfig, NodeEvent};
use vesper_protocol::wallet::store::MemoryWalletStore;

// ---------------------------------------------------------------------------
// ANSI color constants
// ---------------------------------------------------------------------------

const RESET: &str = "\x1b[0m";
const BOLD: &str = "\x1b[1m";
const DIM: &str = "\x1b[2m";
const ITALIC: &str = "\x1b[3m";

const GREEN: &str = "\x1b[32m";
const YELLOW: &str = "\x1b[33m";
const BLUE: &str = "\x1b[34m";
const MAGENTA: &str = "\x1b[35m";
const CYAN: &str = "\x1b[36m";
const WHITE: &str = "\x1b[37m";

const BG_BLUE: &str = "\x1b[44m";

// ---------------------------------------------------------------------------
// Display helpers
// ---------------------------------------------------------------------------

fn banner() {
    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    VESPER  --  Peer-to-Peer Payment Node Walkthrough               {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    Version 0.1.0  |  Ed25519 identities + pinned channels          {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();
}

fn section(num: u32, title: &str) {
    println!();
    println!(
        "{BOLD}{CYAN}===[{YELLOW} Step {num} {CYAN}]=============================================================={RESET}"
    );
    println!("{BOLD}{WHITE}  {title}{RESET}");
    println!(
        "{CYAN}------------------------------------------------------------------------{RESET}"
    );
}

fn subsection(text: &str) {
    println!("{DIM}{CYAN}  >> {text}{RESET}");
}

fn success(text: &str) {
    println!("{GREEN}  [OK] {text}{RESET}");
}

fn info(label: &str, value: &str) {
    println!("{WHITE}  {BOLD}{label}:{RESET} {YELLOW}{value}{RESET}");
}

fn timing(label: &str, elapsed: Duration) {
    let ms = elapsed.as_secs_f64() * 1000.0;
    println!("{DIM}{MAGENTA}  [{label}: {ms:.2} ms]{RESET}");
}

fn identity_display(name: &str, fingerprint: Fingerprint, color: &str) {
    println!("  {color}{BOLD}{name}{RESET}  {DIM}{fingerprint}{RESET}");
}

fn balance_row(name: &str, balance: u64, color: &str) {
    println!("  {color}{BOLD}{name:<12}{RESET}  {WHITE}{balance:>12}{RESET} {DIM}motes{RESET}");
}

fn chat_line(name: &str, text: &str, color: &str) {
    println!("  {color}{BOLD}<{name}>{RESET} {WHITE}{text}{RESET}");
}

fn separator() {
    println!(
        "{DIM}{CYAN}  . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . . {RESET}"
    );
}

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

/// Build a devnet node on the shared hub, returning its wallet store too.
fn spawn_node(hub: &MemoryHub) -> (Node, Arc<MemoryWalletStore>) {
    let store = Arc::new(MemoryWalletStore::new(NETWORK_ID_DEVNET));
    let config = NodeConfig {
        network_id: NETWORK_ID_DEVNET,
        ..NodeConfig::default()
    };
    let node = Node::new(
        VesperKeypair::generate(),
        Arc::new(hub.clone()),
        store.clone(),
        Arc::new(NoopChannelHandler),
        config,
    );
    (node, store)
}

/// Wait for the next node event; the in-process hub delivers in microseconds.
async fn next_event(events: &mut broadcast::Receiver<NodeEvent>) -> NodeEvent {
    timeout(Duration::from_secs(1), events.recv())
        .await
        .expect("event timeout")
        .expect("event stream closed")
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() {
    let demo_start = Instant::now();

    banner();

    // -----------------------------------------------------------------------
    // Step 1: Identity Creation
    // -----------------------------------------------------------------------

    section(1, "Sovereign Identity Generation");
    subsection("Generating Ed25519 keypairs and deriving peer fingerprints...");

    let t = Instant::now();
    let hub = MemoryHub::new();
    let (alice, alice_store) = spawn_node(&hub);
    let (bob, bob_store) = spawn_node(&hub);
    timing("keygen + node assembly x2", t.elapsed());

    let alice_fp = alice.fingerprint();
    let bob_fp = bob.fingerprint();

    println!();
    identity_display("Alice", alice_fp, BLUE);
    identity_display("Bob  ", bob_fp, GREEN);
    println!();
    success("Fingerprints derived: SHA-256(pubkey), first 16 bytes, hex forever");

    let mut alice_events = alice.subscribe();
    let mut bob_events = bob.subscribe();

    // -----------------------------------------------------------------------
    // Step 2: Bob Opens His Doors
    // -----------------------------------------------------------------------

    section(2, "Listening for Peers");
    subsection("Bob binds an endpoint on the in-process hub...");

    let advertised = bob.listen("bob.vesper.dev:2448").await.expect("listen");
    info("Endpoint", "bob.vesper.dev:2448");
    info("Advertised fingerprint", &advertised.to_string());
    success("Bob is accepting authenticated connections");

    // -----------------------------------------------------------------------
    // Step 3: Fingerprint-Pinned Dialing
    // -----------------------------------------------------------------------

    section(3, "Secure Channel with Fingerprint Pinning");
    subsection("First, an impostor check: Alice dials with the WRONG fingerprint...");

    let stranger = Fingerprint::of(&VesperKeypair::generate().public_key());
    let refused = alice
        .connect(&format!("{stranger}@bob.vesper.dev:2448"))
        .await;
    assert!(refused.is_err(), "wrong fingerprint must be refused");
    println!("  {YELLOW}[REFUSED]{RESET} {}", refused.unwrap_err());
    success("Wrong key never reaches the session layer; Bob saw nothing");

    subsection("Now the real thing: Alice pins Bob's actual fingerprint...");
    let t = Instant::now();
    let dialed = alice
        .connect(&format!("{bob_fp}@bob.vesper.dev:2448"))
        .await
        .expect("dial");
    timing("dial + mutual authentication", t.elapsed());
    assert_eq!(dialed, bob_fp);

    // Both sides observe the session coming up.
    let _ = next_event(&mut alice_events).await; // PeerConnected on Alice
    let _ = next_event(&mut bob_events).await; // PeerConnected on Bob

    for session in bob.sessions() {
        info(
            "Bob sees session",
            &format!("{} [{}]", session.fingerprint, session.state),
        );
    }
    success("Authenticated channel up; identities verified on both ends");

    // -----------------------------------------------------------------------
    // Step 4: Chat and the Invoice
    // -----------------------------------------------------------------------

    section(4, "Peer-to-Peer Chat");
    subsection("Bob invoices Alice over the encrypted channel...");

    let invoice_addr = bob.fresh_address().expect("address").encode();
    bob.say(alice_fp, &format!("hey, that coffee was 300000 motes -> {invoice_addr}"))
        .await
        .expect("say");

    let invoice = match next_event(&mut alice_events).await {
        NodeEvent::ChatReceived { text, .. } => {
            chat_line("bob", &text, GREEN);
            text.rsplit(' ').next().expect("address").to_string()
        }
        other => panic!("expected chat, got {other:?}"),
    };

    alice.say(bob_fp, "highway robbery. paying anyway.").await.expect("say");
    if let NodeEvent::ChatReceived { text, .. } = next_event(&mut bob_events).await {
        chat_line("alice", &text, BLUE);
    }
    success("Chat frames flow both ways over the session");

    // -----------------------------------------------------------------------
    // Step 5: Funding and the Proposal
    // -----------------------------------------------------------------------

    section(5, "Payment Proposal (Held, Not Sent)");
    subsection("Seeding Alice's devnet wallet and building the payment...");

    alice_store.seed_utxo(600_000, 100);
    alice_store.seed_utxo(250_000, 101);
    alice_store.seed_utxo(120_000, 102);

    println!();
    balance_row("Alice", alice.balance().unwrap().total, BLUE);
    balance_row("Bob", bob.balance().unwrap().total, GREEN);
    println!();

    let t = Instant::now();
    let held = alice
        .propose(&[(invoice.clone(), 300_000)])
        .expect("propose");
    timing("coin selection + signing", t.elapsed());

    info("Proposal txid", &held.txid.to_string());
    info("State", &held.state.to_string());
    info("Inputs consumed", &held.consumed.len().to_string());
    info("Fee", &format!("{} motes (flat)", held.tx.fee));
    for output in &held.tx.outputs {
        let owner = if output.address == invoice { "to Bob" } else { "change" };
        println!(
            "  {DIM}  output {:>10} motes  {owner}{RESET}",
            output.value
        );
    }
    assert_eq!(alice_store.broadcast_count(), 0);
    success("Transaction built and signed but NOT broadcast: inputs are pinned");

    // -----------------------------------------------------------------------
    // Step 6: Commit
    // -----------------------------------------------------------------------

    section(6, "Commit: The Point of No Return");
    subsection("Alice reviews the held proposal and commits it...");

    let committed = alice.commit(held.txid).expect("commit");
    assert_eq!(alice_store.broadcast_count(), 1);
    info("Broadcast txid", &committed.txid.to_string());
    info("Final state", &format!("{}", committed.state));

    separator();
    println!();
    println!("  {BOLD}{WHITE}--- Alice's Wallet After Commit ---{RESET}");
    let balance = alice.balance().unwrap();
    balance_row("total", balance.total, BLUE);
    balance_row("confirmed", balance.confirmed, BLUE);
    println!();
    success("One broadcast, spent coin gone, change back as an unconfirmed coin");

    // -----------------------------------------------------------------------
    // Step 7: Buyer's Remorse (Abort)
    // -----------------------------------------------------------------------

    section(7, "Buyer's Remorse: Abort Releases the Coins");
    subsection("Alice proposes a second payment, thinks better of it...");

    let impulse = alice
        .propose(&[(invoice.clone(), 200_000)])
        .expect("propose");
    info("Held proposals", &alice.pending().len().to_string());

    let aborted = alice.abort(impulse.txid).expect("abort");
    info("Aborted txid", &aborted.txid.to_string());
    info("Held proposals now", &alice.pending().len().to_string());
    assert_eq!(alice_store.broadcast_count(), 1, "abort never broadcasts");
    success("Inputs released; the wallet never knew it almost happened");

    // -----------------------------------------------------------------------
    // Step 8: Sweep
    // -----------------------------------------------------------------------

    section(8, "Sweep: Consolidating Dusty Corners");
    subsection("Bob's wallet has accumulated small coins; sweep them into one place...");

    bob_store.seed_utxo(80_000, 50);
    bob_store.seed_utxo(45_000, 51);
    bob_store.seed_utxo(30_000, 52);
    bob_store.seed_utxo(9_000, 53); // below the sweep floor, stays put

    let cold_addr = bob.fresh_address().expect("address").encode();
    let t = Instant::now();
    let swept = bob.sweep(&cold_addr, 16).expect("sweep");
    timing("sweep construction + broadcast", t.elapsed());

    for txid in &swept {
        println!("  {GREEN}[SWEPT]{RESET} {DIM}{txid}{RESET}");
    }
    info("Sweep transactions", &swept.len().to_string());
    info(
        "Coins left untouched",
        "1 (below the 10000-mote sweep floor)",
    );
    success("Largest-first, one coin per transaction, flat fee each");

    // -----------------------------------------------------------------------
    // Step 9: Fan-Out
    // -----------------------------------------------------------------------

    section(9, "Fan-Out: Splitting Value for Future Channels");
    subsection("Alice splits one big coin into five small distinct ones...");

    let fan_addr = alice.fresh_address().expect("address").encode();
    let fanned = alice.fan_out(&fan_addr, 5, 20_000).expect("fan out");
    info("Fan-out txid", &fanned.to_string());

    let last = alice_store.broadcasts().last().cloned().expect("broadcast");
    for output in last.outputs.iter().filter(|o| o.address == fan_addr) {
        println!("  {DIM}  minted {:>10} motes{RESET}", output.value);
    }
    success("Values ascend by one mote so every output is distinguishable");

    // -----------------------------------------------------------------------
    // Final Summary
    // -----------------------------------------------------------------------

    alice.shutdown().await;
    bob.shutdown().await;

    let total_elapsed = demo_start.elapsed();

    println!();
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}    DEMO COMPLETE -- Final Summary                                  {RESET}"
    );
    println!(
        "{BG_BLUE}{BOLD}{WHITE}                                                                    {RESET}"
    );
    println!();

    println!("  {BOLD}{WHITE}Node Statistics:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    info("Identities created", "2 (Alice, Bob)");
    info("Impostor dials refused", "1");
    info("Chat lines exchanged", "2");
    info(
        "Alice broadcasts",
        &alice_store.broadcast_count().to_string(),
    );
    info("Bob broadcasts", &bob_store.broadcast_count().to_string());
    info("Signing algorithm", "Ed25519 (ed25519-dalek 2.1)");
    info("Fingerprints", "SHA-256, truncated to 16 bytes");
    info("Address format", "Bech32 with network-scoped HRP");
    info("Wallet model", "UTXO with in-memory reservations");
    println!();

    println!("  {BOLD}{WHITE}Final Balances:{RESET}");
    println!("  {DIM}----------------------------------------------{RESET}");
    balance_row("Alice", alice.balance().unwrap().total, BLUE);
    balance_row("Bob", bob.balance().unwrap().total, GREEN);
    println!();
    println!(
        "  {ITALIC}{DIM}The missing motes: one 300000 payment on the wire, plus one flat fee per broadcast.{RESET}"
    );

    println!();
    println!(
        "  {BOLD}{GREEN}Total demo time: {:.2}s{RESET}",
        total_elapsed.as_secs_f64()
    );
    println!();
}
