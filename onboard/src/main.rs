//! Onboard - Entry Point
//!
//! Discovers nearby unpaired devices, provisions one onto the home network
//! and registers it with the backend.

use std::collections::HashMap;
use std::env;

use anyhow::{bail, Context};
use secrecy::SecretString;

use onboard::app::options::AppOptions;
use onboard::app::run::{run, Command, PairCommand};
use onboard::filesys::file::File;
use onboard::logs::{init_logging, LogOptions};
use onboard::pairing::flow::RegistrationTarget;
use onboard::provisioning::models::WifiCredentials;
use onboard::storage::layout::StorageLayout;
use onboard::storage::settings::Settings;
use onboard::utils::version_info;

use tracing::{error, info};

#[tokio::main]
async fn main() {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();
    let mut cli_args: HashMap<String, String> = HashMap::new();

    for arg in args.iter().skip(1) {
        if let Some((key, value)) = arg.split_once('=') {
            // Handle --key=value format
            let clean_key = key.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), value.to_string());
        } else if arg.starts_with("--") {
            // Handle standalone flags like --version
            let clean_key = arg.trim_start_matches('-');
            cli_args.insert(clean_key.to_string(), "true".to_string());
        }
    }

    // Print version and exit
    if cli_args.contains_key("version") {
        match serde_json::to_string_pretty(&version_info()) {
            Ok(version) => println!("{}", version),
            Err(e) => eprintln!("Failed to render version: {e}"),
        }
        return;
    }

    if let Err(e) = run_cli(&cli_args).await {
        error!("{:#}", e);
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run_cli(cli_args: &HashMap<String, String>) -> anyhow::Result<()> {
    let command = parse_command(cli_args)?;

    let layout = StorageLayout::default();
    let settings_file = match cli_args.get("settings") {
        Some(path) => File::new(path),
        None => layout.settings_file(),
    };
    let settings = load_settings(&settings_file).await?;

    // Initialize logging
    let log_options = LogOptions {
        log_level: settings.log_level.clone(),
        log_dir: settings.log_dir.clone(),
        json_format: settings.log_json,
        ..Default::default()
    };
    let _log_guard = match init_logging(log_options) {
        Ok(guard) => guard,
        Err(e) => {
            println!("Failed to initialize logging: {e}");
            None
        }
    };

    let options = AppOptions::from_settings(&settings, layout);
    info!("Running onboard with options: {:?}", options);

    run(options, command, await_shutdown_signal())
        .await
        .context("onboarding failed")
}

async fn load_settings(file: &File) -> anyhow::Result<Settings> {
    let settings = if file.exists().await {
        file.read_json::<Settings>()
            .await
            .with_context(|| format!("unable to read settings file {}", file.path().display()))?
    } else {
        Settings::default()
    };
    settings.validate().context("invalid settings")?;
    Ok(settings)
}

fn parse_command(cli_args: &HashMap<String, String>) -> anyhow::Result<Command> {
    if cli_args.contains_key("discover") {
        return Ok(Command::Discover);
    }

    let Some(device_id) = cli_args.get("pair") else {
        bail!("usage: onboard --discover | --pair=<device id> --ssid=<network> --password=<secret>");
    };
    let ssid = cli_args.get("ssid").context("--pair requires --ssid=<network>")?;
    let password = cli_args
        .get("password")
        .context("--pair requires --password=<secret>")?;

    let target = match (cli_args.get("location"), cli_args.get("zone")) {
        (Some(location_id), Some(zone_id)) => Some(RegistrationTarget {
            location_id: location_id.clone(),
            zone_id: zone_id.clone(),
            name: cli_args.get("name").cloned(),
        }),
        (None, None) => None,
        _ => bail!("--location and --zone must be given together"),
    };

    let login = match (cli_args.get("email"), cli_args.get("account-password")) {
        (Some(email), Some(secret)) => Some((email.clone(), SecretString::from(secret.clone()))),
        (None, None) => None,
        _ => bail!("--email and --account-password must be given together"),
    };

    Ok(Command::Pair(PairCommand {
        device_id: device_id.clone(),
        credentials: WifiCredentials::new(ssid.clone(), password.clone()),
        target,
        login,
    }))
}

async fn await_shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{signal, SignalKind};
        let Ok(mut sigterm) = signal(SignalKind::terminate()) else {
            error!("Failed to install SIGTERM handler");
            let _ = tokio::signal::ctrl_c().await;
            return;
        };

        tokio::select! {
            _ = sigterm.recv() => {
                info!("SIGTERM received, cancelling...");
            }
            _ = tokio::signal::ctrl_c() => {
                info!("Ctrl+C received, cancelling...");
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Ctrl+C received, cancelling...");
    }
}
