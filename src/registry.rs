use std::collections::HashMap;

use tokio::sync::RwLock;
use tracing::{debug, info};

use crate::client::DeviceClient;
use crate::config::{DeviceConfig, DeviceOptions};
use crate::coordinator::Coordinator;
use crate::{Error, Result};

/// Process-wide set of active devices, one [`Coordinator`] per device id.
///
/// All devices share one HTTP connection pool. Entries are independent:
/// nothing mutable is shared between coordinators.
pub struct DeviceRegistry {
    http: reqwest::Client,
    devices: RwLock<HashMap<String, Coordinator>>,
}

impl DeviceRegistry {
    pub fn new() -> Result<Self> {
        Ok(Self::with_http_client(reqwest::Client::builder().build()?))
    }

    pub fn with_http_client(http: reqwest::Client) -> Self {
        Self {
            http,
            devices: RwLock::new(HashMap::new()),
        }
    }

    /// Validate, build and start a coordinator. The device is only
    /// registered once its first refresh has succeeded.
    pub async fn setup(&self, config: DeviceConfig) -> Result<Coordinator> {
        config.validate()?;
        if self.contains(&config.device_id).await {
            return Err(Error::AlreadyRegistered(config.device_id));
        }

        let client = DeviceClient::builder(&config.base_url)
            .http_client(self.http.clone())
            .build()?;
        let coordinator = Coordinator::builder(client, config.credentials(), &config.device_id)
            .interval(config.interval())
            .start()
            .await?;

        let mut devices = self.devices.write().await;
        if devices.contains_key(&config.device_id) {
            // Lost a race with a concurrent setup of the same device.
            coordinator.shutdown();
            return Err(Error::AlreadyRegistered(config.device_id));
        }
        devices.insert(config.device_id.clone(), coordinator.clone());
        info!(device = %config.device_id, "device registered");
        Ok(coordinator)
    }

    pub async fn get(&self, device_id: &str) -> Option<Coordinator> {
        self.devices.read().await.get(device_id).cloned()
    }

    pub async fn contains(&self, device_id: &str) -> bool {
        self.devices.read().await.contains_key(device_id)
    }

    pub async fn device_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.devices.read().await.keys().cloned().collect();
        ids.sort();
        ids
    }

    pub async fn len(&self) -> usize {
        self.devices.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.devices.read().await.is_empty()
    }

    /// Options-changed hook: retime the device's poll loop and refresh.
    pub async fn update_options(&self, device_id: &str, options: &DeviceOptions) -> Result<()> {
        let coordinator = self
            .get(device_id)
            .await
            .ok_or_else(|| Error::NotRegistered(device_id.to_string()))?;
        match options.interval() {
            Some(interval) => coordinator.update_interval(interval).await,
            None => {
                coordinator.request_refresh().await;
                Ok(())
            }
        }
    }

    /// Stop and forget a device. Returns `false` if it was not registered.
    pub async fn remove(&self, device_id: &str) -> bool {
        let removed = self.devices.write().await.remove(device_id);
        match removed {
            Some(coordinator) => {
                coordinator.shutdown();
                debug!(device = %device_id, "device removed");
                true
            }
            None => false,
        }
    }

    pub async fn shutdown_all(&self) {
        let drained: Vec<Coordinator> = self.devices.write().await.drain().map(|(_, c)| c).collect();
        for coordinator in drained {
            coordinator.shutdown();
        }
    }
}
