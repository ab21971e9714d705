//! Command handlers for the gattlink CLI

use std::sync::Arc;
use std::time::Duration;

use gattlink_ble::BtleplugBackend;
use gattlink_core::{
    uuid_from_u16, Characteristic, GattSession, GattResult, NativeBackend, Uuid,
};
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, info, warn};

use crate::cli::{Cli, Commands};
use crate::config::CliConfig;
use crate::error::{CliError, Result};

/// Device information service
pub const DEVICE_INFORMATION: Uuid = uuid_from_u16(0x180a);

/// Battery service and level characteristic
pub const BATTERY_SERVICE: Uuid = uuid_from_u16(0x180f);
pub const BATTERY_LEVEL: Uuid = uuid_from_u16(0x2a19);

/// Device information characteristics printed by `info`
pub const DEVICE_INFO_FIELDS: [(&str, u16); 6] = [
    ("Manufacturer", 0x2a29),
    ("Model", 0x2a24),
    ("Serial", 0x2a25),
    ("Hardware", 0x2a27),
    ("Firmware", 0x2a26),
    ("Software", 0x2a28),
];

/// Command dispatcher for handling CLI commands
pub struct CommandDispatcher;

impl CommandDispatcher {
    /// Execute a CLI command against the configured device
    pub async fn execute(cli: Cli, config: CliConfig) -> Result<()> {
        let backend = BtleplugBackend::new(config.ble.clone()).await?;
        Self::execute_with(Arc::new(backend), cli, config).await
    }

    /// Execute a CLI command using `backend`
    pub async fn execute_with(
        backend: Arc<dyn NativeBackend>,
        cli: Cli,
        config: CliConfig,
    ) -> Result<()> {
        let session = GattSession::from_pairs(backend, config.session_options(&cli)?)?;
        session.on_disconnect(|reason| {
            if reason.is_requested() {
                debug!("Session closed");
            } else {
                warn!("Device disconnected (status = {})", reason.status());
            }
        });

        session.connect().await?;
        let result = match cli.command {
            Commands::Info => Self::handle_info_command(&session).await,
            Commands::Services => Self::handle_services_command(&session),
            Commands::Read {
                service,
                characteristic,
            } => Self::handle_read_command(&session, service, characteristic).await,
            Commands::Write {
                service,
                characteristic,
                value,
                no_response,
            } => {
                Self::handle_write_command(&session, service, characteristic, &value, no_response)
                    .await
            }
            Commands::Notify {
                service,
                characteristic,
                count,
                duration,
            } => {
                Self::handle_notify_command(
                    &session,
                    service,
                    characteristic,
                    count,
                    duration.map(Duration::from_secs),
                )
                .await
            }
        };
        session.disconnect();
        result
    }

    /// Handle the info command
    ///
    /// Uses the callback API: each field is looked up and read through
    /// completions, bridged back with a oneshot channel.
    async fn handle_info_command(session: &GattSession) -> Result<()> {
        println!("Device {} ({})", session.address(), session.address_type());
        for (label, short) in DEVICE_INFO_FIELDS {
            match Self::read_with_callbacks(session, DEVICE_INFORMATION, uuid_from_u16(short))
                .await
            {
                Some(Ok(value)) => println!("  {:<13}{}", label, String::from_utf8_lossy(&value)),
                Some(Err(e)) => println!("  {:<13}<{}>", label, e),
                None => debug!("{} not exposed by device", label),
            }
        }

        if let Some(Ok(level)) =
            Self::read_with_callbacks(session, BATTERY_SERVICE, BATTERY_LEVEL).await
        {
            if let Some(percent) = level.first() {
                println!("  {:<13}{}%", "Battery", percent);
            }
        }
        Ok(())
    }

    async fn read_with_callbacks(
        session: &GattSession,
        service: Uuid,
        characteristic: Uuid,
    ) -> Option<GattResult<Vec<u8>>> {
        let (tx, rx) = oneshot::channel();
        session.find_characteristic_async(service, characteristic, move |found| match found {
            Some(characteristic) => characteristic.read_async(move |result| {
                let _ = tx.send(Some(result));
            }),
            None => {
                let _ = tx.send(None);
            }
        });
        rx.await.ok().flatten()
    }

    /// Handle the services command
    fn handle_services_command(session: &GattSession) -> Result<()> {
        for service in session.services() {
            println!("{}", service);
            for characteristic in session.service_characteristics(&service) {
                println!("  {}", characteristic.uuid());
            }
        }
        Ok(())
    }

    /// Handle the read command
    async fn handle_read_command(
        session: &GattSession,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<()> {
        let characteristic = Self::resolve(session, service, characteristic).await?;
        let value = characteristic.read().await?;
        println!("{}  {:?}", hex::encode(&value), String::from_utf8_lossy(&value));
        Ok(())
    }

    /// Handle the write command
    async fn handle_write_command(
        session: &GattSession,
        service: Uuid,
        characteristic: Uuid,
        value: &str,
        no_response: bool,
    ) -> Result<()> {
        let bytes = hex::decode(value.trim_start_matches("0x"))?;
        let characteristic = Self::resolve(session, service, characteristic).await?;
        if no_response {
            characteristic.write_without_response(&bytes).await?;
        } else {
            characteristic.write(&bytes).await?;
        }
        info!("Wrote {} bytes to {}", bytes.len(), characteristic.uuid());
        Ok(())
    }

    /// Handle the notify command
    async fn handle_notify_command(
        session: &GattSession,
        service: Uuid,
        characteristic: Uuid,
        count: Option<usize>,
        duration: Option<Duration>,
    ) -> Result<()> {
        let characteristic = Self::resolve(session, service, characteristic).await?;

        let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
        characteristic.on_notification_received(move |value| {
            let _ = tx.send(value.to_vec());
        })?;
        characteristic.enable_notifications().await?;
        info!("Listening on {}... Press Ctrl+C to stop", characteristic.uuid());

        let deadline = duration.map(|d| tokio::time::Instant::now() + d);
        let mut received = 0usize;
        loop {
            let sleep_until = async {
                match deadline {
                    Some(at) => tokio::time::sleep_until(at).await,
                    None => std::future::pending::<()>().await,
                }
            };
            tokio::select! {
                value = rx.recv() => {
                    let Some(value) = value else { break };
                    println!("{}", hex::encode(&value));
                    received += 1;
                    if count.is_some_and(|limit| received >= limit) {
                        break;
                    }
                }
                _ = sleep_until => break,
                _ = tokio::signal::ctrl_c() => break,
            }
            if !session.is_connected() {
                break;
            }
        }

        if session.is_connected() {
            characteristic.disable_notifications().await?;
        }
        debug!("Received {} notifications", received);
        Ok(())
    }

    async fn resolve(
        session: &GattSession,
        service: Uuid,
        characteristic: Uuid,
    ) -> Result<Characteristic> {
        session
            .lookup_characteristic(service, characteristic)
            .await?
            .ok_or(CliError::CharacteristicNotFound {
                service,
                characteristic,
            })
    }
}
