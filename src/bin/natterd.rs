use clap::Parser;
use config::Config;
use natter::{Server, ServerEvent};
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

// ============================================================================
// Tracing Initialization
// ============================================================================

/// Initialize tracing for the natter crate based on verbosity level
fn init_tracing(verbosity: u8) {
    let level = match verbosity {
        0 => return, // No tracing
        1 => "info",
        2 => "debug",
        _ => "trace", // 3 or more
    };

    let filter = format!("natter={}", level);
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_target(true)
        .with_writer(std::io::stderr)
        .pretty()
        .init();
}

// ============================================================================
// CLI Argument Parsing
// ============================================================================

#[derive(Parser)]
#[command(author, version, about = "Chat server core", long_about = None)]
struct Args {
    /// IPv4 address to bind the server to
    #[arg(short, long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to bind the server to
    #[arg(short, long, default_value_t = 11701)]
    port: u16,

    /// Increase logging verbosity (-v: info, -vv: debug, -vvv: trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Configuration file path (TOML format)
    #[arg(long)]
    config: Option<String>,
}

// ============================================================================
// Main Entry Point
// ============================================================================

fn main() -> ExitCode {
    let args = Args::parse();

    init_tracing(args.verbose);

    // Create config - load from file if specified, otherwise use defaults
    let config = if let Some(config_path) = &args.config {
        match Config::builder()
            .add_source(config::File::with_name(config_path))
            .build()
        {
            Ok(c) => c,
            Err(err) => {
                eprintln!("Failed to load config file '{}': {}", config_path, err);
                return ExitCode::FAILURE;
            }
        }
    } else {
        Config::default()
    };

    // Start up the server
    let mut server = match Server::new(&config) {
        Ok(s) => s,
        Err(err) => {
            eprintln!("Failed to initialize server: {err}");
            return ExitCode::FAILURE;
        }
    };
    let local_addr = match server.listen(&args.bind, args.port) {
        Ok(addr) => addr,
        Err(err) => {
            eprintln!("Failed to listen on {}:{}: {err}", args.bind, args.port);
            return ExitCode::FAILURE;
        }
    };
    println!("Listening on {local_addr}");

    // The single-threaded event dispatch loop. The Data arm is the hook
    // point where chat semantics (framing, rooms, relaying) would attach;
    // for now the consumer just prints what each connection sent.
    loop {
        let events = match server.fetch_events() {
            Ok(events) => events,
            Err(err) => {
                eprintln!("Fatal error fetching server events: {err}");
                return ExitCode::FAILURE;
            }
        };

        for event in events {
            match event {
                ServerEvent::Inactive => {
                    eprintln!("Server has no listener and no connections, exiting");
                    return ExitCode::FAILURE;
                }
                ServerEvent::Connected { id } => match server.peer_addr(id) {
                    Some(peer_addr) => println!("Accepted a client: {peer_addr} (id: {id})"),
                    None => println!("Accepted a client (id: {id})"),
                },
                ServerEvent::Disconnected { id } => {
                    println!("Client disconnected (id: {id})");
                }
                ServerEvent::Data { id, data } => {
                    println!(
                        "Received {} bytes from client {id}: {}",
                        data.len(),
                        String::from_utf8_lossy(&data)
                    );
                }
            }
        }
    }
}
