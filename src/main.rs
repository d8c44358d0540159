//! Infobase Backup Tool
//!
//! Provides CLI interface for listing infobases on the platform host and
//! dumping one of them to the cloud

// dtbackuptool/src/main.rs
use anyhow::{Context, Result};
use dtbackuptool::BackupService;
use dtbackuptool::cloud::CloudArtifact;
use dtbackuptool::config::AppConfig;
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;

/// Main entry point for the backup tool
#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    match run_app().await {
        Ok(Outcome::Done) => {
            println!("✅ Operation completed successfully.");
            ExitCode::SUCCESS
        }
        Ok(Outcome::Reported { success: true }) => ExitCode::SUCCESS,
        Ok(Outcome::Reported { success: false }) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("❌ Error: {:?}", e);
            ExitCode::FAILURE
        }
    }
}

/// How `run_app` finished.
#[derive(Debug, PartialEq, Eq)]
enum Outcome {
    Done,
    /// The user already got the one status line for this outcome.
    Reported { success: bool },
}

fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::from_default_env();
    let env_filter = match "info".parse() {
        Ok(directive) => env_filter.add_directive(directive),
        Err(_) => env_filter,
    };

    let _ = tracing_subscriber::fmt().with_env_filter(env_filter).try_init();
}

fn load_config() -> Result<AppConfig> {
    // Values from .env become environment variables and override config.json.
    dotenv::dotenv().ok();

    // Expects config.json next to where the tool is started, falls back to
    // the environment alone when there is none.
    let config_path = PathBuf::from("config.json");
    if config_path.exists() {
        AppConfig::load_from_json(&config_path)
            .context(format!("Failed to load application configuration from {}", config_path.display()))
    } else {
        AppConfig::load_from_env().context("Failed to load application configuration from the environment")
    }
}

async fn run_app() -> Result<Outcome> {
    let app_config = load_config()?;
    let service = BackupService::from_config(app_config);

    let args: Vec<String> = env::args().collect();
    let choice = if args.len() > 1 {
        args[1].trim().to_string()
    } else {
        prompt_line("Select an operation:\n1. List infobases (or type 'list')\n2. Back up an infobase (or type 'backup')\n3. Show platform version (or type 'version')\nEnter your choice: ")?
    };

    match choice.as_str() {
        "1" | "list" => {
            println!("📋 Listing infobases...");
            let databases = service.list_databases().await.context("Failed to list infobases")?;
            if databases.is_empty() {
                println!("No infobases registered in the cluster.");
            }
            for db in databases {
                match db.description.as_deref().filter(|d| !d.is_empty()) {
                    Some(descr) => println!("  • {} — {}", db.name, descr),
                    None => println!("  • {}", db.name),
                }
            }
        }
        "2" | "backup" => {
            let name = match args.get(2) {
                Some(name) => name.trim().to_string(),
                None => prompt_line("Infobase name: ")?,
            };
            if name.is_empty() {
                anyhow::bail!("Infobase name is required");
            }

            println!("🚀 Starting backup of {}...", name);
            let (message, outcome) = report_backup(service.request_backup(&name).await);
            println!("{}", message);
            return Ok(outcome);
        }
        "3" | "version" => {
            let version = service
                .get_platform_version()
                .await
                .context("Failed to detect platform version")?;
            println!("Platform version: {}", version);
        }
        _ => {
            println!("❌ Invalid choice. Please enter '1' (list), '2' (backup), or '3' (version).");
            anyhow::bail!("Invalid operation choice");
        }
    }
    Ok(Outcome::Done)
}

/// One status line per backup outcome.
fn report_backup(result: dtbackuptool::Result<CloudArtifact>) -> (String, Outcome) {
    match result {
        Ok(artifact) => (format!("🔗 {}", artifact.link), Outcome::Done),
        Err(e) => {
            let success = e.is_informational();
            (e.status_message(), Outcome::Reported { success })
        }
    }
}

/// Prints `prompt` and reads one trimmed line from stdin
fn prompt_line(prompt: &str) -> Result<String> {
    use std::io::{Write, stdin, stdout};

    print!("{}", prompt);
    stdout().flush().context("Failed to flush stdout")?;

    let mut input = String::new();
    stdin().read_line(&mut input).context("Failed to read user input")?;
    Ok(input.trim().to_string())
}
