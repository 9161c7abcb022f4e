use std::process::ExitCode;
use std::time::Duration;

use clap::Parser;
use renogy_discord_alert::config::Args;
use renogy_discord_alert::{logging, DiscordWebhook, Monitor, RenogyClient};

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    if let Err(err) = logging::init(&args.log_file) {
        eprintln!("Failed to set up logging: {err:#}");
        return ExitCode::FAILURE;
    }

    log::info!("start renogy discord alert for {}", args.device_config().label());

    match run(&args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("Critical error in main loop: {err:#}");
            println!("Critical error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(args: &Args) -> anyhow::Result<()> {
    let webhook = DiscordWebhook::new(&args.webhook_url, Duration::from_secs(args.webhook_timeout))?;

    let device_config = args.device_config();
    let client = tokio::select! {
        client = RenogyClient::new(&device_config) => client?,
        _ = stopped_by_user() => return Ok(()),
    };

    let mut monitor = Monitor::new(webhook);
    monitor
        .run_until(client, Duration::from_secs(args.poll_interval), stopped_by_user())
        .await
}

async fn stopped_by_user() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        log::error!("failed to listen for Ctrl-C: {err}");
        std::future::pending::<()>().await;
    }
    log::info!("Script stopped by user (KeyboardInterrupt).");
    println!("Script stopped by user.");
}
