use std::path::{Path, PathBuf};

use chrono::Utc;
use clap::{Parser, Subcommand};
use ed25519_dalek::SigningKey;
use ed25519_dalek::pkcs8::DecodePrivateKey;
use tracing_subscriber::EnvFilter;
use zf_license::{
    DEFAULT_KEY_ID, Ed25519Verifier, Keyring, LicenseClaims, LicenseError, LicenseReason,
    LicenseVerifier, issue_token,
};
use zf_project::ProjectError;
use zf_runtime::{RoomModel, RuntimeError, Simulation, SimulationSample};

#[derive(Debug, thiserror::Error)]
enum CliError {
    #[error(transparent)]
    Project(#[from] ProjectError),

    #[error(transparent)]
    Runtime(#[from] RuntimeError),

    #[error(transparent)]
    License(#[from] LicenseError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Signing key could not be loaded: {0}")]
    SigningKey(String),

    #[error("License rejected: {0}")]
    Rejected(LicenseReason),
}

type CliResult<T> = Result<T, CliError>;

#[derive(Parser)]
#[command(name = "zf-cli")]
#[command(about = "zoneflow CLI - floor heating control tooling", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate an installation file
    Validate {
        /// Path to the installation YAML file
        config: PathBuf,
    },
    /// Verify or issue license tokens
    #[command(subcommand)]
    License(LicenseCommands),
    /// Run the installation against a simulated house
    Simulate {
        /// Path to the installation YAML file
        config: PathBuf,
        /// Simulated duration in hours
        #[arg(long, default_value_t = 6.0)]
        hours: f64,
        /// Constant outside temperature (°C)
        #[arg(long, default_value_t = 5.0)]
        outside: f64,
        /// Initial temperature of every room (°C)
        #[arg(long, default_value_t = 18.0)]
        start_temp: f64,
        /// Operation mode (auto, heat, cool, off)
        #[arg(long, default_value = "auto")]
        mode: String,
        /// Print samples as JSON instead of a table
        #[arg(long)]
        json: bool,
    },
}

#[derive(Subcommand)]
enum LicenseCommands {
    /// Check a token against the configured public keys
    Verify {
        token: String,
        /// JSON object of key id -> public key PEM (defaults to the environment)
        #[arg(long)]
        keys: Option<PathBuf>,
    },
    /// Sign a new token
    Issue {
        /// PKCS#8 PEM private key
        #[arg(long)]
        key: PathBuf,
        /// Subject, e.g. github:octocat
        #[arg(long)]
        sub: String,
        #[arg(long, default_value_t = 30)]
        days: i64,
        #[arg(long, default_value = "zoneflow")]
        issuer: String,
        #[arg(long, default_value = "github_sponsors")]
        source: String,
        #[arg(long, default_value = "pro")]
        tier: String,
        #[arg(long, default_value = DEFAULT_KEY_ID)]
        kid: String,
    },
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> CliResult<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Validate { config } => cmd_validate(&config),
        Commands::License(LicenseCommands::Verify { token, keys }) => {
            cmd_license_verify(&token, keys.as_deref())
        }
        Commands::License(LicenseCommands::Issue {
            key,
            sub,
            days,
            issuer,
            source,
            tier,
            kid,
        }) => cmd_license_issue(&key, &sub, days, &issuer, &source, &tier, &kid),
        Commands::Simulate {
            config,
            hours,
            outside,
            start_temp,
            mode,
            json,
        } => cmd_simulate(&config, hours, outside, start_temp, &mode, json).await,
    }
}

fn cmd_validate(config: &Path) -> CliResult<()> {
    println!("Validating installation: {}", config.display());
    let def = zf_project::load_yaml(config)?;
    let skipped = def.zones.values().filter(|z| z.circuits.is_empty()).count();
    println!("✓ Installation is valid ({} zones)", def.zones.len());
    if skipped > 0 {
        println!("  {skipped} zone(s) without circuits will be skipped");
    }
    Ok(())
}

fn cmd_license_verify(token: &str, keys: Option<&Path>) -> CliResult<()> {
    let verifier = match keys {
        Some(path) => {
            let map = zf_project::load_key_map(path)?;
            Ed25519Verifier::new(Keyring::from_pem_map(&map)?)
        }
        None => Ed25519Verifier::from_sources(None),
    };
    let status = verifier.verify(Some(token), Utc::now());
    if !status.pro_enabled {
        return Err(CliError::Rejected(status.reason));
    }
    println!("✓ License valid (pro features enabled)");
    Ok(())
}

fn cmd_license_issue(
    key: &Path,
    sub: &str,
    days: i64,
    issuer: &str,
    source: &str,
    tier: &str,
    kid: &str,
) -> CliResult<()> {
    let pem = std::fs::read_to_string(key)?;
    let signing =
        SigningKey::from_pkcs8_pem(&pem).map_err(|err| CliError::SigningKey(err.to_string()))?;
    let claims = LicenseClaims::for_days(issuer, sub, source, tier, Utc::now(), days)?;
    let token = issue_token(&signing, kid, &claims)?;
    println!("{token}");
    Ok(())
}

async fn cmd_simulate(
    config: &Path,
    hours: f64,
    outside: f64,
    start_temp: f64,
    mode: &str,
    json: bool,
) -> CliResult<()> {
    let def = zf_project::load_yaml(config)?;
    tracing::info!(hours, outside, start_temp, mode, "starting simulation");
    let mut sim = Simulation::new(def, Utc::now(), outside, start_temp, RoomModel::default())?;
    sim.installation().set_operation_mode(mode).await;

    let samples = sim.run(hours, 60).await?;
    if json {
        println!("{}", serde_json::to_string_pretty(&samples)?);
    } else {
        print_table(&samples);
    }
    Ok(())
}

fn print_table(samples: &[SimulationSample]) {
    let Some(first) = samples.first() else {
        return;
    };
    let mut header = format!("{:>6}", "hour");
    for id in first.zones.keys() {
        header.push_str(&format!(" {:>14}", id.as_str()));
    }
    header.push_str(&format!(" {:>8} {:>8}", "flow", "written"));
    println!("{header}");

    for sample in samples {
        let hours = (sample.at - first.at).num_minutes() as f64 / 60.0;
        let mut line = format!("{hours:>6.1}");
        for zone in sample.zones.values() {
            let marker = if zone.active { '*' } else { ' ' };
            line.push_str(&format!(" {:>13.2}{marker}", zone.temperature));
        }
        line.push_str(&format!(
            " {:>8} {:>8}",
            fmt_flow(sample.flow),
            fmt_flow(sample.dispatched_flow)
        ));
        println!("{line}");
    }
}

fn fmt_flow(flow: Option<f64>) -> String {
    flow.map_or_else(|| "-".to_string(), |f| format!("{f:.1}"))
}
