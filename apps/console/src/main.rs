use std::{io, sync::Arc};

use anyhow::{bail, Context, Result};
use clap::Parser;
use client_core::{DeviceSession, HttpDevice, SyncUpdate};
use shared::{
    command::Command,
    protocol::{ButtonState, LogLevel},
};
use tokio::{
    io::{AsyncBufReadExt, BufReader},
    sync::broadcast::error::RecvError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

mod cli;
mod config;

use cli::{Action, Args};
use config::{load_settings, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();
    let mut settings = load_settings(args.config.as_deref())?;
    if let Some(device_url) = args.device_url.clone() {
        settings.device_url = device_url;
    }
    init_tracing(args.log.as_deref(), &settings)?;

    let action = args.command.into_action(&settings)?;
    let device = HttpDevice::new(&settings.device_url)
        .with_context(|| format!("invalid device url '{}'", settings.device_url))?
        .with_request_timeout(settings.request_timeout());
    let session = DeviceSession::new(Arc::new(device.clone()), settings.session_options());

    match action {
        Action::Submit(command) => {
            let ack = session.submit(command).await?;
            println!("{}", ack.trim_end_matches(['\r', '\n']));
        }
        Action::Count => match session.poll_now().await {
            Some(button) => print_button(&button),
            None => bail!("counter request to {} failed", device.base_url()),
        },
        Action::Watch => watch(&session, &device, &settings).await?,
    }
    Ok(())
}

fn init_tracing(cli_filter: Option<&str>, settings: &Settings) -> Result<()> {
    let filter = match cli_filter {
        Some(directives) => EnvFilter::try_new(directives)?,
        None => EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new(&settings.log_filter))?,
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(io::stderr)
        .init();
    Ok(())
}

fn print_button(button: &ButtonState) {
    let status = if button.enabled { "ready" } else { "busy" };
    println!("[{}] {status}", button.label);
}

async fn watch(session: &DeviceSession, device: &HttpDevice, settings: &Settings) -> Result<()> {
    let mut updates = session.synchronizer().subscribe();
    session
        .start_events(device.event_stream(settings.reconnect_policy()))
        .await;
    session.start_polling().await;
    info!(device = %device.base_url(), "watch: session running, ctrl-c to quit");

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;
    let mut last_button: Option<ButtonState> = None;

    loop {
        tokio::select! {
            update = updates.recv() => match update {
                Ok(SyncUpdate::Log(entry)) => match entry.level {
                    LogLevel::Info => println!("{entry}"),
                    LogLevel::Error => eprintln!("{entry}"),
                },
                Ok(SyncUpdate::Button(button)) => {
                    if last_button.as_ref() != Some(&button) {
                        print_button(&button);
                        last_button = Some(button);
                    }
                }
                Ok(SyncUpdate::Connection(_)) => {}
                Err(RecvError::Lagged(skipped)) => {
                    warn!(skipped, "watch: display fell behind, updates dropped");
                }
                Err(RecvError::Closed) => break,
            },
            line = stdin.next_line(), if stdin_open => match line {
                Ok(Some(line)) => {
                    session.send_command(Command::raw(line));
                }
                Ok(None) => stdin_open = false,
                Err(error) => {
                    warn!(%error, "watch: stdin unreadable, no longer forwarding commands");
                    stdin_open = false;
                }
            },
            signal = tokio::signal::ctrl_c() => {
                signal.context("failed to listen for ctrl-c")?;
                break;
            }
        }
    }

    session.shutdown().await;
    info!("watch: stopped");
    Ok(())
}
