//! # StrataKV CLI
//!
//! Two modes:
//!
//! - `shell` — a REPL over a local store. Reads commands from stdin,
//!   executes them against the engine, prints results to stdout. Works both
//!   interactively and scripted (pipe commands via stdin).
//! - `serve` — runs the TCP server so remote clients can reach the store.
//!
//! ## Shell commands
//!
//! ```text
//! SET key value        Insert or update a key
//! GET key              Look up a key (prints value or "(nil)")
//! DEL key              Delete a key (writes a tombstone)
//! RANGE start end      Inclusive range scan
//! BATCH k=v [k=v ...]  Apply several puts in one engine lock
//! FLUSH                Drain the memtable into a fresh segment
//! STATS                Print engine debug info
//! EXIT / QUIT          Shut down gracefully
//! ```
//!
//! ## Example
//!
//! ```text
//! $ stratakv shell --data-dir ./data
//! StrataKV shell (data_dir=./data, segments=1)
//! > SET name Alice
//! OK
//! > GET name
//! Alice
//! > RANGE a z
//! name -> Alice
//! (1 entries)
//! > EXIT
//! bye
//! ```

use std::io::{self, BufRead, Write};
use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Result;
use clap::{Parser, Subcommand};
use engine::{Engine, Options};
use net::{Server, ServerConfig};
use tracing_subscriber::{fmt, EnvFilter};

#[derive(Parser, Debug)]
#[command(name = "stratakv")]
#[command(about = "Persistent key-value store over an append-only segmented log")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Cmd,
}

/// Store options shared by every mode.
#[derive(clap::Args, Debug)]
struct StoreArgs {
    /// Data directory
    #[arg(short, long, default_value = "./stratakv_data")]
    data_dir: PathBuf,

    /// Segment size cap in KiB
    #[arg(long, default_value_t = 1024)]
    segment_kb: u64,

    /// Memtable flush budget in KiB
    #[arg(long, default_value_t = 1024)]
    memtable_kb: usize,

    /// Skip the per-record fsync (faster, weaker durability)
    #[arg(long)]
    no_sync: bool,
}

#[derive(Subcommand, Debug)]
enum Cmd {
    /// Interactive shell over a local store
    Shell(StoreArgs),

    /// Serve the store over TCP
    Serve {
        #[command(flatten)]
        store: StoreArgs,

        /// Listen address (host:port)
        #[arg(short, long, default_value = "127.0.0.1:4466")]
        listen: String,

        /// Maximum concurrent client connections
        #[arg(long, default_value_t = 1024)]
        max_connections: usize,
    },
}

fn open_engine(args: &StoreArgs) -> Result<Engine> {
    let opts = Options {
        max_segment_size: args.segment_kb * 1024,
        memtable_budget: args.memtable_kb * 1024,
        sync_writes: !args.no_sync,
    };
    Ok(Engine::open_with(&args.data_dir, opts)?)
}

fn main() -> Result<()> {
    // Logs go to stderr so shell output stays parseable.
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .with_target(true)
        .init();

    match Cli::parse().command {
        Cmd::Shell(store) => shell(&store),
        Cmd::Serve {
            store,
            listen,
            max_connections,
        } => serve(&store, &listen, max_connections),
    }
}

fn serve(store: &StoreArgs, listen: &str, max_connections: usize) -> Result<()> {
    let engine = Arc::new(open_engine(store)?);
    let server = Server::bind(
        listen,
        Arc::clone(&engine),
        ServerConfig {
            workers: 0,
            max_connections,
        },
    )?;

    tracing::info!(addr = %server.local_addr()?, data_dir = %store.data_dir.display(), "serving");
    server.run()?;

    engine.close()?;
    Ok(())
}

fn shell(store: &StoreArgs) -> Result<()> {
    let engine = open_engine(store)?;

    println!(
        "StrataKV shell (data_dir={}, segments={})",
        store.data_dir.display(),
        engine.segment_count()
    );
    println!("Commands: SET key value | GET key | DEL key | RANGE start end");
    println!("          BATCH k=v [k=v ...] | FLUSH | STATS | EXIT");
    print!("> ");
    io::stdout().flush().ok();

    let stdin = io::stdin();
    for line in stdin.lock().lines() {
        let line = line?;
        let mut parts = line.split_whitespace();
        if let Some(cmd) = parts.next() {
            match cmd.to_uppercase().as_str() {
                "SET" => {
                    if let Some(key) = parts.next() {
                        let value: String = parts.collect::<Vec<&str>>().join(" ");
                        if value.is_empty() {
                            println!("ERR usage: SET key value");
                        } else {
                            match engine.put(key, Some(value.as_bytes())) {
                                Ok(()) => println!("OK"),
                                Err(e) => println!("ERR set failed: {e}"),
                            }
                        }
                    } else {
                        println!("ERR usage: SET key value");
                    }
                }
                "GET" => {
                    if let Some(key) = parts.next() {
                        match engine.read(key) {
                            Ok(Some(value)) => println!("{}", String::from_utf8_lossy(&value)),
                            Ok(None) => println!("(nil)"),
                            Err(e) => println!("ERR read failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: GET key");
                    }
                }
                "DEL" => {
                    if let Some(key) = parts.next() {
                        match engine.delete(key) {
                            Ok(()) => println!("OK"),
                            Err(e) => println!("ERR del failed: {e}"),
                        }
                    } else {
                        println!("ERR usage: DEL key");
                    }
                }
                "RANGE" => match (parts.next(), parts.next()) {
                    (Some(start), Some(end)) => match engine.read_range(start, end) {
                        Ok(results) => {
                            if results.is_empty() {
                                println!("(empty)");
                            } else {
                                for (key, value) in &results {
                                    println!("{key} -> {}", String::from_utf8_lossy(value));
                                }
                                println!("({} entries)", results.len());
                            }
                        }
                        Err(e) => println!("ERR range failed: {e}"),
                    },
                    _ => println!("ERR usage: RANGE start end"),
                },
                "BATCH" => {
                    let mut keys = Vec::new();
                    let mut values = Vec::new();
                    let mut bad = false;
                    for pair in parts {
                        match pair.split_once('=') {
                            Some((key, value)) => {
                                keys.push(key.to_string());
                                values.push(value.as_bytes().to_vec());
                            }
                            None => {
                                println!("ERR usage: BATCH k=v [k=v ...]");
                                bad = true;
                                break;
                            }
                        }
                    }
                    if !bad {
                        if keys.is_empty() {
                            println!("ERR usage: BATCH k=v [k=v ...]");
                        } else {
                            let key_refs: Vec<&str> = keys.iter().map(String::as_str).collect();
                            let value_refs: Vec<Option<&[u8]>> =
                                values.iter().map(|v| Some(v.as_slice())).collect();
                            match engine.batch_put(&key_refs, &value_refs) {
                                Ok(()) => println!("OK ({} keys)", keys.len()),
                                Err(e) => println!("ERR batch failed: {e}"),
                            }
                        }
                    }
                }
                "FLUSH" => match engine.flush() {
                    Ok(()) => println!("OK (segments={})", engine.segment_count()),
                    Err(e) => println!("ERR flush failed: {e}"),
                },
                "STATS" => {
                    println!("{engine:?}");
                }
                "EXIT" | "QUIT" => {
                    println!("bye");
                    break;
                }
                other => {
                    println!("unknown command: {other}");
                }
            }
        }

        print!("> ");
        io::stdout().flush().ok();
    }

    engine.close()?;
    Ok(())
}
