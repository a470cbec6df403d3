use clap::{Args, Parser, Subcommand};
use std::path::{Path, PathBuf};
use std::process::ExitCode;

use shuttle_o_mat::client::{self, ClientQueue, FlushOutcome, HttpTransport};
use shuttle_o_mat::ingest::PingPayload;
use shuttle_o_mat::network::Network;
use shuttle_o_mat::web::{self, Config};

#[derive(Parser)]
#[command(name = "shuttle-o-mat")]
#[command(about = "Campus shuttle telemetry ingestion and arrival estimates")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the HTTP server
    Serve {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Check a config file and the reference data it points to
    Validate {
        #[arg(short, long, default_value = "config.yaml")]
        config: PathBuf,
    },
    /// Device-side queue operations
    Client {
        #[command(subcommand)]
        command: ClientCommands,
    },
}

#[derive(Subcommand)]
enum ClientCommands {
    /// Queue a location sample and try to deliver the queue
    Push {
        #[command(flatten)]
        remote: RemoteArgs,
        #[arg(long)]
        vehicle: String,
        #[arg(long, allow_hyphen_values = true)]
        lat: f64,
        #[arg(long, allow_hyphen_values = true)]
        lng: f64,
        /// RFC 3339 capture time; now when omitted
        #[arg(long)]
        timestamp: Option<String>,
        #[arg(long)]
        speed: Option<f64>,
        #[arg(long)]
        heading: Option<f64>,
        #[arg(long)]
        accuracy: Option<f64>,
        #[arg(long)]
        battery: Option<f64>,
    },
    /// Deliver everything queued
    Flush {
        #[command(flatten)]
        remote: RemoteArgs,
    },
    /// Show what is waiting in the queue
    Status {
        #[arg(short, long, default_value = "shuttle-queue.json")]
        queue: PathBuf,
    },
}

#[derive(Args)]
struct RemoteArgs {
    #[arg(short, long, default_value = "shuttle-queue.json")]
    queue: PathBuf,
    #[arg(long, default_value_t = client::DEFAULT_CAPACITY)]
    capacity: usize,
    #[arg(long, default_value = "http://127.0.0.1:8080/api/ingest")]
    endpoint: String,
    #[arg(long)]
    token: String,
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { config } => serve(&config).await,
        Commands::Validate { config } => validate(&config),
        Commands::Client { command } => run_client(command).await,
    }
}

async fn serve(path: &Path) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Error loading config: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match web::run_server(config).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Server error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn validate(path: &Path) -> ExitCode {
    let config = match Config::from_file(path) {
        Ok(c) => c,
        Err(e) => {
            eprintln!("Config error: {}", e);
            return ExitCode::FAILURE;
        }
    };

    match Network::load(&config.reference.path) {
        Ok(network) => {
            println!(
                "Config is valid ({} identities, bind {})",
                config.identities.len(),
                config.web.bind
            );
            for route in network.routes() {
                println!(
                    "  route {}: {} stops, {:.0} m{}",
                    route.id,
                    route.stops.len(),
                    route.length_m(),
                    if route.is_loop { ", loop" } else { "" }
                );
            }
            for vehicle in network.vehicles() {
                println!(
                    "  vehicle {} ({}) on {}",
                    vehicle.label,
                    vehicle.id,
                    vehicle.route_id.as_deref().unwrap_or("no route")
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Reference data error: {}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run_client(command: ClientCommands) -> ExitCode {
    let result = match command {
        ClientCommands::Push {
            remote,
            vehicle,
            lat,
            lng,
            timestamp,
            speed,
            heading,
            accuracy,
            battery,
        } => {
            let sample = PingPayload {
                vehicle_label: vehicle,
                lat: Some(lat),
                lng: Some(lng),
                timestamp: Some(timestamp.unwrap_or_else(|| chrono::Utc::now().to_rfc3339())),
                speed,
                heading,
                accuracy,
                battery,
            };
            match open_queue(&remote) {
                Ok(mut queue) => queue.enqueue(sample).await.map(|o| (o, queue.len())),
                Err(e) => Err(e),
            }
        }
        ClientCommands::Flush { remote } => match open_queue(&remote) {
            Ok(mut queue) => queue.flush().await.map(|o| (o, queue.len())),
            Err(e) => Err(e),
        },
        ClientCommands::Status { queue } => return status(&queue),
    };

    match result {
        Ok((outcome, pending)) => {
            match outcome {
                FlushOutcome::Empty => println!("Queue is empty"),
                FlushOutcome::Delivered { processed, .. } => {
                    println!("Delivered {} samples, {} pending", processed, pending)
                }
                FlushOutcome::Failed => println!("Delivery failed, {} pending", pending),
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Queue error: {}", e);
            ExitCode::FAILURE
        }
    }
}

fn open_queue(remote: &RemoteArgs) -> Result<ClientQueue<HttpTransport>, client::ClientError> {
    let transport = HttpTransport::new(remote.endpoint.clone(), remote.token.clone());
    ClientQueue::open(&remote.queue, remote.capacity, transport)
}

fn status(path: &Path) -> ExitCode {
    match client::load_pending(path) {
        Ok(pending) => {
            println!("{} samples pending in {}", pending.len(), path.display());
            if let Some(last) = pending.last() {
                println!(
                    "  last: {} at {} ({}, {})",
                    last.vehicle_label,
                    last.timestamp.as_deref().unwrap_or("?"),
                    last.lat.unwrap_or_default(),
                    last.lng.unwrap_or_default()
                );
            }
            ExitCode::SUCCESS
        }
        Err(e) => {
            eprintln!("Queue error: {}", e);
            ExitCode::FAILURE
        }
    }
}
