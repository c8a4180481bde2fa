use clap::Parser;
use common::net::{self, FrameReader};
use drizlink_client::discovery;
use drizlink_client::handlers::connection::{self, Prompt};

#[derive(Parser)]
#[command(name = "drizlink-client")]
#[command(about = "DrizLink peer client", long_about = None)]
#[command(version)]
struct Cli {
    /// Server address in format host:port (interactive discovery if omitted)
    #[arg(short, long)]
    server: Option<String>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let level = if cli.verbose {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    env_logger::Builder::from_default_env()
        .filter_level(level)
        .init();

    let mut input = connection::stdin_prompt();

    let address = match cli.server {
        Some(address) => {
            println!("Connecting to server at {address}...");
            if let Err(reason) = net::check_server_availability(&address).await {
                eprintln!("❌ Error: No server running at {address}");
                eprintln!("  Details: {reason}");
                eprintln!("Please check the address or start a server first.");
                std::process::exit(1);
            }
            address
        }
        None => prompt_for_server_address(&mut input).await,
    };

    let stream = match connection::connect(&address).await {
        Ok(stream) => stream,
        Err(e) => {
            eprintln!("❌ Error connecting to server: {e}");
            std::process::exit(1);
        }
    };
    let (rd, wt) = stream.into_split();
    let mut reader = FrameReader::new(rd);
    let writer = net::share_writer(wt);

    if let Err(e) = connection::login(&mut reader, &writer, &mut input).await {
        eprintln!("❌ Error during login: {e}");
        std::process::exit(1);
    }

    println!("\n✨ Welcome to DrizLink - P2P File Sharing! ✨");
    println!("------------------------------------------------");
    println!("✅ Successfully connected to server!");
    println!("Type /help to see available commands");
    println!("------------------------------------------------");

    tokio::spawn(connection::read_loop(reader, writer.clone()));
    connection::write_loop(writer, &mut input).await;
}

/// Interactive server selection: offer discovery, fall back to manual entry.
/// Exits with code 1 when the user gives up.
async fn prompt_for_server_address(input: &mut Prompt) -> String {
    println!("Would you like to search for available servers? (y/n)");
    let choice = read_line(input).await.to_lowercase();
    if choice == "y" || choice == "yes" {
        let servers = discovery::discover_servers(common::discovery::DISCOVERY_PORT).await;
        if servers.is_empty() {
            println!("⚠️  No servers found automatically");
        } else {
            println!("\n📡 Available servers found:");
            for (i, server) in servers.iter().enumerate() {
                println!("  {}. {server}", i + 1);
            }
            println!("\nEnter the number of the server to connect to:");
            let choice = read_line(input).await;
            if let Ok(index) = choice.parse::<usize>() {
                if index >= 1 && index <= servers.len() {
                    return servers[index - 1].clone();
                }
            }
        }
    }

    loop {
        println!("Enter server address (format host:port):");
        let address = read_line(input).await;
        if !address.contains(':') {
            println!("❌ Invalid address format. Please use host:port (e.g., localhost:8080)");
            continue;
        }
        match net::check_server_availability(&address).await {
            Ok(()) => return address,
            Err(reason) => {
                println!("❌ No server available at {address}: {reason}");
                println!("Would you like to try another address? (y/n)");
                let retry = read_line(input).await.to_lowercase();
                if retry != "y" && retry != "yes" {
                    std::process::exit(1);
                }
            }
        }
    }
}

async fn read_line(input: &mut Prompt) -> String {
    use std::io::Write as _;
    print!(">>> ");
    let _ = std::io::stdout().flush();
    match input.next_line().await {
        Ok(Some(line)) => line.trim().to_string(),
        _ => std::process::exit(1),
    }
}
