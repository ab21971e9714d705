//! Adapter selection and device lookup
//!
//! The backend resolves a device address to a btleplug peripheral. Devices
//! already known to the adapter are used directly; otherwise the adapter
//! scans until the address shows up or the scan timeout expires.

use std::sync::Arc;

use async_trait::async_trait;
use btleplug::api::{BDAddr, Central, Manager as _, Peripheral as _, ScanFilter};
use btleplug::platform::{Adapter, Manager, Peripheral};
use gattlink_core::{AddressType, NativeBackend, NativeError, NativeLink};
use tokio::runtime::Handle;
use tokio::time::{sleep, timeout, Instant};
use tracing::{debug, info, warn};

use crate::config::BleBackendConfig;
use crate::error::{BleBackendError, Result};
use crate::link::BtleplugLink;

// ----------------------------------------------------------------------------
// Backend Implementation
// ----------------------------------------------------------------------------

/// Native backend driving the host Bluetooth stack through btleplug
pub struct BtleplugBackend {
    config: BleBackendConfig,
    adapter: Adapter,
}

impl BtleplugBackend {
    /// Open the adapter selected by `config`
    pub async fn new(config: BleBackendConfig) -> Result<Self> {
        let manager = Manager::new().await?;
        let adapters = manager.adapters().await?;

        if adapters.is_empty() {
            return Err(BleBackendError::AdapterNotAvailable);
        }
        let count = adapters.len();
        let adapter = adapters
            .into_iter()
            .nth(config.adapter_index)
            .ok_or(BleBackendError::AdapterIndexOutOfRange {
                index: config.adapter_index,
                count,
            })?;

        match adapter.adapter_info().await {
            Ok(info_text) => info!("BLE adapter initialized: {}", info_text),
            Err(e) => debug!("BLE adapter initialized (no info: {})", e),
        }
        Ok(Self::with_adapter(adapter, config))
    }

    /// Use an already opened adapter
    pub fn with_adapter(adapter: Adapter, config: BleBackendConfig) -> Self {
        Self { config, adapter }
    }

    pub fn config(&self) -> &BleBackendConfig {
        &self.config
    }

    /// Find a peripheral by address among the adapter's known devices
    async fn known_peripheral(&self, address: BDAddr) -> Result<Option<Peripheral>> {
        for peripheral in self.adapter.peripherals().await? {
            if let Ok(Some(properties)) = peripheral.properties().await {
                if properties.address == address {
                    return Ok(Some(peripheral));
                }
            }
        }
        Ok(None)
    }

    /// Scan until `address` is seen or the scan timeout expires
    async fn find_peripheral(&self, address: BDAddr) -> Result<Peripheral> {
        if let Some(peripheral) = self.known_peripheral(address).await? {
            return Ok(peripheral);
        }

        info!("Scanning for {}", address);
        self.adapter.start_scan(ScanFilter::default()).await?;

        let deadline = Instant::now() + self.config.scan_timeout;
        let found = loop {
            match self.known_peripheral(address).await {
                Ok(Some(peripheral)) => break Ok(peripheral),
                Ok(None) if Instant::now() >= deadline => {
                    break Err(BleBackendError::PeerNotFound {
                        address: address.to_string(),
                    })
                }
                Ok(None) => sleep(self.config.scan_poll_interval).await,
                Err(e) => break Err(e),
            }
        };

        if let Err(e) = self.adapter.stop_scan().await {
            warn!("Failed to stop BLE scan: {}", e);
        }
        found
    }

    async fn connect(&self, address: &str, address_type: AddressType) -> Result<BtleplugLink> {
        let bd_addr: BDAddr = address
            .parse()
            .map_err(|_| BleBackendError::InvalidAddress(address.to_string()))?;
        // btleplug resolves the address type itself
        debug!("Ignoring address type {} for {}", address_type, bd_addr);

        let peripheral = self.find_peripheral(bd_addr).await?;

        // Subscribe before connecting so an early drop of the link is seen
        let events = self.adapter.events().await?;

        if !peripheral.is_connected().await? {
            match timeout(self.config.connection_timeout, peripheral.connect()).await {
                Ok(result) => result?,
                Err(_) => {
                    return Err(BleBackendError::Timeout {
                        operation: "connect",
                        after: self.config.connection_timeout,
                    })
                }
            }
        }
        info!("Connected to peripheral {}", bd_addr);

        let notifications = peripheral.notifications().await?;
        Ok(BtleplugLink::new(
            peripheral,
            events,
            notifications,
            &Handle::current(),
            self.config.operation_timeout,
        ))
    }
}

#[async_trait]
impl NativeBackend for BtleplugBackend {
    fn name(&self) -> &str {
        "btleplug"
    }

    async fn connect_by_address(
        &self,
        address: &str,
        address_type: AddressType,
    ) -> std::result::Result<Arc<dyn NativeLink>, NativeError> {
        let link = self.connect(address, address_type).await?;
        Ok(Arc::new(link))
    }
}
