use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use reqwest::Client;
use serde_json::Value;
use tracing_subscriber::EnvFilter;

// ── CLI definition ─────────────────────────────────────────────────────────────

#[derive(Parser)]
#[command(name = "ferry", about = "Ferry — publish files as share links", version)]
struct Cli {
    /// Ferry server URL (default: http://localhost:8080 or $FERRY_SERVER)
    #[arg(long, env = "FERRY_SERVER", default_value = "http://localhost:8080")]
    server: String,

    /// Admin bearer token, obtained via `ferry login` ($FERRY_TOKEN)
    #[arg(long, env = "FERRY_TOKEN")]
    token: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start the Ferry HTTP server
    Serve {
        /// Port to listen on (default: $FERRY_PORT or 8080)
        #[arg(long, env = "FERRY_PORT", default_value = "8080")]
        port: u16,
        /// Host to bind (default: $FERRY_HOST or 0.0.0.0)
        #[arg(long, env = "FERRY_HOST", default_value = "0.0.0.0")]
        host: String,
    },
    /// Log in as administrator and print a bearer token
    Login {
        /// Admin username
        #[arg(long, env = "FERRY_ADMIN_USER", default_value = "admin")]
        username: String,
        /// Admin password
        #[arg(long)]
        password: String,
    },
    /// Upload one or more files
    Upload {
        /// Paths of the files to upload
        #[arg(name = "PATH", required = true)]
        paths: Vec<PathBuf>,
    },
    /// List uploaded files
    Files,
    /// Delete an uploaded file (also unlinks it from every share)
    RmFile {
        /// File id
        id: String,
    },
    /// Create a share over uploaded files and print its link
    Share {
        /// File ids to include
        #[arg(name = "FILE_ID", required = true)]
        file_ids: Vec<String>,
        /// Optional share title
        #[arg(long, default_value = "")]
        title: String,
        /// Optional password protecting the share
        #[arg(long)]
        password: Option<String>,
        /// Time until expiry, e.g. 24h, 7d (rounded up to whole hours)
        #[arg(long)]
        expires: Option<String>,
    },
    /// List all shares
    Shares,
    /// Delete a share (the files stay)
    Unshare {
        /// Share id
        id: String,
    },
    /// Print the public link for a share code
    Link {
        /// Share code
        code: String,
    },
}

// ── Entry point ───────────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_env("FERRY_LOG").unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Serve { port, host } => cmd_serve(host, port).await,

        Commands::Login { username, password } => {
            cmd_login(&cli.server, &username, &password).await
        }

        Commands::Upload { paths } => {
            let token = require_token(&cli.token)?;
            cmd_upload(&cli.server, &token, &paths).await
        }

        Commands::Files => {
            let token = require_token(&cli.token)?;
            cmd_files(&cli.server, &token).await
        }

        Commands::RmFile { id } => {
            let token = require_token(&cli.token)?;
            cmd_rm_file(&cli.server, &token, &id).await
        }

        Commands::Share {
            file_ids,
            title,
            password,
            expires,
        } => {
            let token = require_token(&cli.token)?;
            cmd_share(&cli.server, &token, file_ids, title, password, expires).await
        }

        Commands::Shares => {
            let token = require_token(&cli.token)?;
            cmd_shares(&cli.server, &token).await
        }

        Commands::Unshare { id } => {
            let token = require_token(&cli.token)?;
            cmd_unshare(&cli.server, &token, &id).await
        }

        Commands::Link { code } => {
            println!("{}", share_url(&cli.server, &code));
            Ok(())
        }
    }
}

// ── Command implementations ───────────────────────────────────────────────────

async fn cmd_serve(host: String, port: u16) -> Result<()> {
    let cfg = ferry_server::ServerConfig {
        host,
        port,
        ..Default::default()
    };
    ferry_server::run(cfg).await
}

async fn cmd_login(server: &str, username: &str, password: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .post(format!("{}/api/auth/login", server.trim_end_matches('/')))
        .json(&serde_json::json!({"username": username, "password": password}))
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;

    if status.is_success() {
        let token = json["token"].as_str().unwrap_or("");
        println!("{token}");
        eprintln!("hint: export FERRY_TOKEN={token}");
    } else {
        anyhow::bail!("{}", json["error"].as_str().unwrap_or("login failed"));
    }
    Ok(())
}

async fn cmd_upload(server: &str, token: &str, paths: &[PathBuf]) -> Result<()> {
    let mut form = reqwest::multipart::Form::new();
    for path in paths {
        let bytes = tokio::fs::read(path)
            .await
            .with_context(|| format!("read {}", path.display()))?;
        let name = path
            .file_name()
            .and_then(|s| s.to_str())
            .unwrap_or("file")
            .to_owned();
        let part = reqwest::multipart::Part::bytes(bytes).file_name(name);
        form = form.part("files", part);
    }

    let client = Client::new();
    let resp = client
        .post(format!("{}/api/files/upload", server.trim_end_matches('/')))
        .bearer_auth(token)
        .multipart(form)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!("{}", json["error"].as_str().unwrap_or("upload failed"));
    }

    for file in json["files"].as_array().cloned().unwrap_or_default() {
        println!(
            "✓ uploaded {} ({})  id={}",
            file["name"].as_str().unwrap_or("?"),
            format_size(file["size"].as_i64().unwrap_or(0)),
            file["id"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

async fn cmd_files(server: &str, token: &str) -> Result<()> {
    let json = get_json(server, token, "/api/files").await?;
    let files = json["files"].as_array().cloned().unwrap_or_default();
    if files.is_empty() {
        println!("(no files)");
        return Ok(());
    }
    for f in &files {
        println!(
            "  {}  {} — {} — {}",
            f["id"].as_str().unwrap_or("?"),
            f["name"].as_str().unwrap_or("?"),
            format_size(f["size"].as_i64().unwrap_or(0)),
            f["mime_type"].as_str().unwrap_or("?"),
        );
    }
    Ok(())
}

async fn cmd_rm_file(server: &str, token: &str, id: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .delete(format!("{}/api/files/{}", server.trim_end_matches('/'), id))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    if resp.status().is_success() {
        println!("✓ deleted file {id}");
    } else {
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!("{}", json["error"].as_str().unwrap_or("delete failed"));
    }
    Ok(())
}

async fn cmd_share(
    server: &str,
    token: &str,
    file_ids: Vec<String>,
    title: String,
    password: Option<String>,
    expires: Option<String>,
) -> Result<()> {
    let expires_in = expires.as_deref().map(parse_expires_hours).transpose()?;

    let body = serde_json::json!({
        "title": title,
        "password": password,
        "file_ids": file_ids,
        "expires_in": expires_in,
    });

    let client = Client::new();
    let resp = client
        .post(format!("{}/api/shares", server.trim_end_matches('/')))
        .bearer_auth(token)
        .json(&body)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!("{}", json["error"].as_str().unwrap_or("share failed"));
    }

    let share = &json["share"];
    let code = share["code"].as_str().unwrap_or("?");
    println!("✓ share {} created", share["id"].as_str().unwrap_or("?"));
    println!("{}", share_url(server, code));
    Ok(())
}

async fn cmd_shares(server: &str, token: &str) -> Result<()> {
    let json = get_json(server, token, "/api/shares").await?;
    let shares = json["shares"].as_array().cloned().unwrap_or_default();
    if shares.is_empty() {
        println!("(no shares)");
        return Ok(());
    }
    for s in &shares {
        let expiry = match s["expires_at"].as_i64() {
            Some(exp) => {
                let now = std::time::SystemTime::now()
                    .duration_since(std::time::UNIX_EPOCH)
                    .unwrap_or_default()
                    .as_secs() as i64;
                let secs_left = exp - now;
                if secs_left > 0 {
                    format!("expires in {}", format_duration(secs_left as u64))
                } else {
                    "expired".to_string()
                }
            }
            None => "no expiry".to_string(),
        };
        let lock = if s["has_password"].as_bool().unwrap_or(false) {
            "password"
        } else {
            "open"
        };
        println!(
            "  {}  {}  — {} file(s) — {lock} — {expiry}",
            s["id"].as_str().unwrap_or("?"),
            s["code"].as_str().unwrap_or("?"),
            s["files"].as_array().map(Vec::len).unwrap_or(0),
        );
    }
    Ok(())
}

async fn cmd_unshare(server: &str, token: &str, id: &str) -> Result<()> {
    let client = Client::new();
    let resp = client
        .delete(format!("{}/api/shares/{}", server.trim_end_matches('/'), id))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    if resp.status().is_success() {
        println!("✓ deleted share {id}");
    } else {
        let json: Value = resp.json().await.unwrap_or_default();
        anyhow::bail!("{}", json["error"].as_str().unwrap_or("delete failed"));
    }
    Ok(())
}

// ── Helpers ───────────────────────────────────────────────────────────────────

fn require_token(token: &Option<String>) -> Result<String> {
    token
        .clone()
        .context("--token / FERRY_TOKEN is required for this command (see `ferry login`)")
}

fn share_url(server: &str, code: &str) -> String {
    format!("{}/api/s/{}", server.trim_end_matches('/'), code)
}

async fn get_json(server: &str, token: &str, path: &str) -> Result<Value> {
    let client = Client::new();
    let resp = client
        .get(format!("{}{}", server.trim_end_matches('/'), path))
        .bearer_auth(token)
        .send()
        .await
        .context("HTTP request failed")?;

    let status = resp.status();
    let json: Value = resp.json().await.context("parse response")?;
    if !status.is_success() {
        anyhow::bail!(
            "server returned {status}: {}",
            json["error"].as_str().unwrap_or("")
        );
    }
    Ok(json)
}

/// Parse a humantime duration into whole hours, rounding up.
fn parse_expires_hours(s: &str) -> Result<i64> {
    let d: humantime::Duration = s
        .parse()
        .with_context(|| format!("invalid duration: {s}"))?;
    let secs = d.as_secs();
    if secs == 0 {
        anyhow::bail!("expiry must be positive");
    }
    Ok(secs.div_ceil(3600) as i64)
}

fn format_duration(secs: u64) -> String {
    if secs >= 86400 {
        format!("{}d", secs / 86400)
    } else if secs >= 3600 {
        format!("{}h", secs / 3600)
    } else if secs >= 60 {
        format!("{}m", secs / 60)
    } else {
        format!("{}s", secs)
    }
}

fn format_size(bytes: i64) -> String {
    const KIB: i64 = 1024;
    const MIB: i64 = 1024 * KIB;
    const GIB: i64 = 1024 * MIB;
    if bytes >= GIB {
        format!("{:.1} GiB", bytes as f64 / GIB as f64)
    } else if bytes >= MIB {
        format!("{:.1} MiB", bytes as f64 / MIB as f64)
    } else if bytes >= KIB {
        format!("{:.1} KiB", bytes as f64 / KIB as f64)
    } else {
        format!("{bytes} B")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn expiry_rounds_up_to_whole_hours() {
        assert_eq!(parse_expires_hours("1h").unwrap(), 1);
        assert_eq!(parse_expires_hours("90m").unwrap(), 2);
        assert_eq!(parse_expires_hours("7d").unwrap(), 168);
        assert_eq!(parse_expires_hours("30s").unwrap(), 1);
        assert!(parse_expires_hours("0s").is_err());
        assert!(parse_expires_hours("soon").is_err());
    }

    #[test]
    fn sizes_are_humanized() {
        assert_eq!(format_size(512), "512 B");
        assert_eq!(format_size(2048), "2.0 KiB");
        assert_eq!(format_size(5 * 1024 * 1024), "5.0 MiB");
    }
}
