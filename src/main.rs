use clap::{Parser, Subcommand};
use opsdeck::app::App;
use opsdeck::services::registry::ServerInput;

#[derive(Parser)]
#[command(name = "opsdeck", about = "Operations console for a self-hosted application stack")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Register a remote server profile
    Add {
        #[arg(long)]
        name: String,
        #[arg(long)]
        host: String,
        #[arg(long)]
        port: Option<u16>,
        #[arg(long)]
        user: String,
        #[arg(long, default_value = "")]
        password: String,
        #[arg(long)]
        key_file: Option<String>,
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long, default_value = "")]
        description: String,
        #[arg(long)]
        inactive: bool,
    },
    /// List registered servers
    List,
    /// Remove a server profile and close its session
    Remove { id: i64 },
    /// Test connectivity without occupying a pool slot
    Test { id: i64 },
    /// Run a command on a server through the session pool
    Exec {
        id: i64,
        #[arg(trailing_var_arg = true, required = true)]
        command: Vec<String>,
    },
    /// Show registry, audit, and pool statistics
    Stats,
}

async fn run(app: &App, command: Command) -> Result<bool, opsdeck::errors::OpsError> {
    match command {
        Command::Add {
            name,
            host,
            port,
            user,
            password,
            key_file,
            timeout,
            description,
            inactive,
        } => {
            let profile = app.manager.add_server(ServerInput {
                name,
                host,
                port,
                username: user,
                password,
                key_file_path: key_file,
                timeout_secs: timeout,
                description,
                active: !inactive,
            })?;
            println!(
                "Added server {} ({}@{}:{})",
                profile.id, profile.username, profile.host, profile.port
            );
            Ok(true)
        }
        Command::List => {
            for profile in app.manager.list_servers() {
                let auth = if profile.key_file_path.is_some() {
                    "key"
                } else {
                    "password"
                };
                println!(
                    "{:>4}  {:<20} {}@{}:{}  auth={}  active={}",
                    profile.id, profile.name, profile.username, profile.host, profile.port, auth,
                    profile.active
                );
            }
            Ok(true)
        }
        Command::Remove { id } => {
            app.manager.remove_server(id).await?;
            println!("Removed server {}", id);
            Ok(true)
        }
        Command::Test { id } => {
            let report = app.manager.test_connection(id).await?;
            println!("{}", report.message);
            Ok(report.success)
        }
        Command::Exec { id, command } => {
            let outcome = app.manager.execute_command(id, &command.join(" ")).await?;
            if !outcome.stdout.is_empty() {
                print!("{}", outcome.stdout);
            }
            if !outcome.stderr.is_empty() {
                eprint!("{}", outcome.stderr);
            }
            eprintln!("{}", outcome.message);
            Ok(outcome.success)
        }
        Command::Stats => {
            let stats = app.manager.statistics();
            println!(
                "servers: {} total, {} active",
                stats.total_servers, stats.active_servers
            );
            println!(
                "audit: {} records, {} today",
                stats.total_audit_records, stats.records_today
            );
            println!("sessions: {} live", stats.live_sessions);
            Ok(true)
        }
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    let app = match App::initialize() {
        Ok(app) => app,
        Err(err) => {
            eprintln!("opsdeck: {}", err);
            std::process::exit(1);
        }
    };
    let result = run(&app, cli.command).await;
    app.manager.shutdown().await;
    match result {
        Ok(true) => {}
        Ok(false) => std::process::exit(1),
        Err(err) => {
            eprintln!("opsdeck: {}", err);
            std::process::exit(1);
        }
    }
}
