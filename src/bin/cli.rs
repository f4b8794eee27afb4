//! Intranet CLI
//!
//! Command-line interface for intranet operations:
//! - Print a default config file
//! - Convert brand colors to HSL
//! - Write the demo data blob
//! - Check server status
//! - Sign in and bulk-import users

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use intranet::provisioning::CreateUserRequest;
use intranet::storage::{demo_dataset, LocalStore, Role};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use uuid::Uuid;

#[derive(Parser)]
#[command(name = "intranet-cli")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Admin tool for the brokerage intranet")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// API server URL
    #[arg(long, default_value = "http://localhost:8080", global = true)]
    pub api_url: String,

    /// Session token for authenticated commands
    #[arg(long, global = true)]
    pub token: Option<String>,

    /// Output format (table, json)
    #[arg(short, long, default_value = "table", global = true)]
    pub format: String,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Generate default config file
    Config {
        /// Output path (default: stdout)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Convert a hex color to the "H S% L%" form used by the theme
    Hsl {
        /// Color such as #1e40af
        hex: String,
    },

    /// Write the demo data blob
    Seed {
        /// Directory holding the blob
        #[arg(long)]
        data_dir: PathBuf,
        /// Overwrite an existing blob
        #[arg(long)]
        force: bool,
    },

    /// Show server status
    Status,

    /// Sign in and print a session token
    SignIn {
        email: String,
        password: String,
    },

    /// Create users from a CSV file
    ImportUsers {
        /// CSV with columns email,password,first_name,last_name and optional
        /// phone,position,delegation_id,department_id,role
        path: PathBuf,
        /// Validate the file without calling the API
        #[arg(long)]
        dry_run: bool,
    },

    /// Send a test contact form submission
    Contact {
        name: String,
        email: String,
        message: String,
    },
}

/// One row of an import file
#[derive(Debug, Deserialize)]
struct UserRow {
    email: String,
    password: String,
    first_name: String,
    last_name: String,
    #[serde(default)]
    phone: Option<String>,
    #[serde(default)]
    position: Option<String>,
    #[serde(default)]
    delegation_id: Option<String>,
    #[serde(default)]
    department_id: Option<String>,
    #[serde(default)]
    role: Option<String>,
}

impl UserRow {
    fn into_request(self) -> anyhow::Result<CreateUserRequest> {
        let role = match non_empty(self.role).as_deref() {
            None | Some("user") => Role::User,
            Some("manager") => Role::Manager,
            Some("admin") => Role::Admin,
            Some(other) => bail!("unknown role {:?}", other),
        };

        Ok(CreateUserRequest {
            email: self.email,
            password: self.password,
            first_name: self.first_name,
            last_name: self.last_name,
            phone: non_empty(self.phone),
            position: non_empty(self.position),
            delegation_id: parse_id(self.delegation_id).context("invalid delegation_id")?,
            department_id: parse_id(self.department_id).context("invalid department_id")?,
            role,
            permissions: None,
        })
    }
}

fn non_empty(value: Option<String>) -> Option<String> {
    value.map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
}

fn parse_id(value: Option<String>) -> anyhow::Result<Option<Uuid>> {
    Ok(non_empty(value).map(|v| v.parse()).transpose()?)
}

/// Parse an import file; rows that fail are returned with their line number
fn read_users(path: &Path) -> anyhow::Result<(Vec<CreateUserRequest>, Vec<String>)> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_path(path)
        .with_context(|| format!("cannot open {:?}", path))?;

    let mut requests = Vec::new();
    let mut errors = Vec::new();
    for (i, row) in reader.deserialize::<UserRow>().enumerate() {
        // Header is line 1
        let line = i + 2;
        match row.map_err(anyhow::Error::from).and_then(UserRow::into_request) {
            Ok(req) => requests.push(req),
            Err(e) => errors.push(format!("line {}: {}", line, e)),
        }
    }
    Ok((requests, errors))
}

fn require_token(token: &Option<String>) -> anyhow::Result<&str> {
    token
        .as_deref()
        .context("this command needs --token (run `intranet-cli sign-in` first)")
}

/// Turn an error response into a readable failure
async fn check(response: reqwest::Response) -> anyhow::Result<serde_json::Value> {
    let status = response.status();
    let body: serde_json::Value = response.json().await.unwrap_or(serde_json::Value::Null);
    if !status.is_success() {
        let message = body["error"]["message"].as_str().unwrap_or("no details");
        bail!("request failed ({}): {}", status, message);
    }
    Ok(body)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    let client = reqwest::Client::new();

    match cli.command {
        Commands::Config { output } => {
            let config = intranet::config::generate_default_config();

            match output {
                Some(path) => {
                    // Create parent directory if needed
                    if let Some(parent) = path.parent() {
                        std::fs::create_dir_all(parent)?;
                    }
                    std::fs::write(&path, &config)?;
                    println!("Config written to {:?}", path);
                }
                None => {
                    print!("{}", config);
                }
            }
        }

        Commands::Hsl { hex } => match intranet::theme::hex_to_hsl(&hex) {
            Some(hsl) => println!("{}", hsl),
            None => bail!("not a hex color: {}", hex),
        },

        Commands::Seed { data_dir, force } => {
            let store = LocalStore::open(&data_dir, demo_dataset());
            if !store.is_persistent() {
                bail!("cannot write demo data under {:?}", data_dir);
            }
            if force {
                store.reset()?;
            }

            let data = store.read();
            println!("Demo data at {:?}", store.path().unwrap_or(data_dir));
            println!("  Rows: {}", data.len());
        }

        Commands::Status => {
            let response = client
                .get(format!("{}/health", cli.api_url))
                .send()
                .await;

            match response {
                Ok(resp) if resp.status().is_success() => {
                    let health: serde_json::Value = resp.json().await?;

                    if cli.format == "json" {
                        println!("{}", serde_json::to_string_pretty(&health)?);
                        return Ok(());
                    }

                    println!(
                        "Intranet v{}",
                        health["version"].as_str().unwrap_or("unknown")
                    );
                    println!();
                    println!(
                        "API Status: {}",
                        health["status"].as_str().unwrap_or("unknown")
                    );
                    println!(
                        "Storage:    {} ({})",
                        health["storage"].as_str().unwrap_or("-"),
                        health["backend"].as_str().unwrap_or("-")
                    );
                    println!("Sessions:   {}", health["sessions"].as_u64().unwrap_or(0));
                    println!(
                        "WebSockets: {}",
                        health["ws_connections"].as_u64().unwrap_or(0)
                    );

                    if let Some(uptime) = health["uptime_seconds"].as_u64() {
                        println!();
                        println!("Uptime: {}", format_duration(uptime));
                    }
                }
                Ok(resp) => {
                    bail!("API returned error: {}", resp.status());
                }
                Err(e) => {
                    eprintln!("Cannot connect to the intranet API at {}", cli.api_url);
                    eprintln!();
                    eprintln!("Make sure the server is running:");
                    eprintln!("  cargo run --bin intranet");
                    return Err(e.into());
                }
            }
        }

        Commands::SignIn { email, password } => {
            let response = client
                .post(format!("{}/api/v1/auth/sign-in", cli.api_url))
                .json(&serde_json::json!({ "email": email, "password": password }))
                .send()
                .await?;
            let session = check(response).await?;

            if cli.format == "json" {
                println!("{}", serde_json::to_string_pretty(&session)?);
            } else {
                println!("{}", session["token"].as_str().unwrap_or_default());
                eprintln!(
                    "Signed in as {} ({}), expires {}",
                    session["user"]["email"].as_str().unwrap_or("-"),
                    session["user"]["role"].as_str().unwrap_or("-"),
                    session["expires_at"].as_str().unwrap_or("-")
                );
            }
        }

        Commands::ImportUsers { path, dry_run } => {
            let (requests, errors) = read_users(&path)?;

            println!("Rows parsed: {}", requests.len());
            if !errors.is_empty() {
                println!("Rows rejected: {}", errors.len());
                for error in errors.iter().take(10) {
                    println!("  {}", error);
                }
            }

            if dry_run {
                println!();
                println!("(Dry run - no users were created)");
                return Ok(());
            }
            if requests.is_empty() {
                return Ok(());
            }

            let token = require_token(&cli.token)?;
            let response = client
                .post(format!("{}/api/v1/functions/create-users", cli.api_url))
                .bearer_auth(token)
                .json(&requests)
                .send()
                .await?;
            let report = check(response).await?;

            println!();
            println!("Created: {}", report["created"].as_u64().unwrap_or(0));
            println!("Failed:  {}", report["failed"].as_u64().unwrap_or(0));
            if let Some(failures) = report["errors"].as_array() {
                for failure in failures {
                    println!(
                        "  {}: {}",
                        failure["email"].as_str().unwrap_or("-"),
                        failure["error"].as_str().unwrap_or("-")
                    );
                }
            }
        }

        Commands::Contact {
            name,
            email,
            message,
        } => {
            let response = client
                .post(format!("{}/api/v1/functions/contact", cli.api_url))
                .json(&serde_json::json!({
                    "name": name,
                    "email": email,
                    "message": message,
                    "consent": true,
                }))
                .send()
                .await?;
            let receipt = check(response).await?;
            println!("{}", serde_json::to_string_pretty(&receipt)?);
        }
    }

    Ok(())
}

fn format_duration(seconds: u64) -> String {
    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m {}s", seconds / 60, seconds % 60)
    } else if seconds < 86400 {
        format!("{}h {}m", seconds / 3600, (seconds % 3600) / 60)
    } else {
        format!("{}d {}h", seconds / 86400, (seconds % 86400) / 3600)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_users() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "email,password,first_name,last_name,role,delegation_id").unwrap();
        writeln!(file, "ana@example.com,secret-pass,Ana,Gil,manager,").unwrap();
        writeln!(file, "luis@example.com,secret-pass,Luis,Paz,,10000000-0000-4000-8000-000000000101").unwrap();
        writeln!(file, "bad@example.com,secret-pass,Bad,Row,owner,").unwrap();
        file.flush().unwrap();

        let (requests, errors) = read_users(file.path()).unwrap();

        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].role, Role::Manager);
        assert!(requests[0].delegation_id.is_none());
        assert_eq!(requests[1].role, Role::User);
        assert!(requests[1].delegation_id.is_some());
        assert_eq!(errors.len(), 1);
        assert!(errors[0].starts_with("line 4"));
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(59), "59s");
        assert_eq!(format_duration(3700), "1h 1m");
        assert_eq!(format_duration(90000), "1d 1h");
    }
}
