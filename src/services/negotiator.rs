//! Camera negotiation - device enumeration, preference and constraint fallback
//!
//! Some platforms reject `exact` device constraints or unsupported resolutions, so
//! capture is started from an ordered list of progressively looser constraint sets.

use crate::domain::error::DeviceEnumerationError;
use crate::domain::types::{
    CaptureDevice, ConstraintSet, ConstraintTiers, DeviceId, DeviceInfo, FacingMode, Resolution,
};
use async_trait::async_trait;
use std::sync::Arc;
use tracing::{info, warn};

/// Platform capability listing capture hardware
#[async_trait]
pub trait MediaPlatform: Send + Sync {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceEnumerationError>;
}

pub struct CameraNegotiator {
    platform: Arc<dyn MediaPlatform>,
    rear_keywords: Vec<String>,
    preferred_resolution: Resolution,
}

impl CameraNegotiator {
    pub fn new(
        platform: Arc<dyn MediaPlatform>,
        rear_keywords: &[String],
        preferred_resolution: Resolution,
    ) -> Self {
        Self {
            platform,
            rear_keywords: rear_keywords.iter().map(|kw| kw.to_lowercase()).collect(),
            preferred_resolution,
        }
    }

    /// Enumerate and classify capture devices. An empty list is an error.
    pub async fn list_devices(&self) -> Result<Vec<CaptureDevice>, DeviceEnumerationError> {
        let infos = self.platform.enumerate().await?;
        if infos.is_empty() {
            return Err(DeviceEnumerationError::NoHardware);
        }

        let devices: Vec<CaptureDevice> = infos
            .into_iter()
            .map(|info| CaptureDevice::classify(info, &self.rear_keywords))
            .collect();

        for device in &devices {
            info!(
                device_id = %device.id,
                label = %device.label,
                rear = %device.is_rear_facing,
                "camera_device_found"
            );
        }
        Ok(devices)
    }

    /// First rear-facing device, if any. `None` means "use the platform default".
    pub fn select_preferred<'a>(&self, devices: &'a [CaptureDevice]) -> Option<&'a CaptureDevice> {
        devices.iter().find(|d| d.is_rear_facing)
    }

    /// Ordered constraint tiers, most specific first
    pub fn build_constraint_tiers(&self, selected: Option<&CaptureDevice>) -> ConstraintTiers {
        let resolution = Some(self.preferred_resolution);
        match selected {
            Some(device) => {
                let facing =
                    if device.is_rear_facing { FacingMode::Environment } else { FacingMode::User };
                ConstraintTiers::new([
                    ConstraintSet {
                        name: "exact_device_hd",
                        device: Some(device.id.clone()),
                        facing: None,
                        facing_device: None,
                        resolution,
                    },
                    ConstraintSet {
                        name: "facing_only",
                        device: None,
                        facing: Some(facing),
                        facing_device: Some(device.id.clone()),
                        resolution: None,
                    },
                    ConstraintSet::unconstrained(),
                ])
            }
            None => ConstraintTiers::new([
                ConstraintSet {
                    name: "rear_hd",
                    device: None,
                    facing: Some(FacingMode::Environment),
                    facing_device: None,
                    resolution,
                },
                ConstraintSet {
                    name: "facing_only",
                    device: None,
                    facing: Some(FacingMode::Environment),
                    facing_device: None,
                    resolution: None,
                },
                ConstraintSet::unconstrained(),
            ]),
        }
    }

    /// Build the device selector, pre-selecting the rear-facing match
    pub fn selector(&self, devices: Vec<CaptureDevice>) -> DeviceSelector {
        let selected = self.select_preferred(&devices).map(|d| d.id.clone());
        DeviceSelector::new(devices, selected)
    }
}

/// Operator-facing device choice. Only shown when there is an actual choice.
#[derive(Debug, Clone)]
pub struct DeviceSelector {
    options: Vec<CaptureDevice>,
    selected: Option<DeviceId>,
}

impl DeviceSelector {
    pub fn new(options: Vec<CaptureDevice>, selected: Option<DeviceId>) -> Self {
        Self { options, selected }
    }

    pub fn is_visible(&self) -> bool {
        self.options.len() > 1
    }

    pub fn options(&self) -> &[CaptureDevice] {
        &self.options
    }

    pub fn selected(&self) -> Option<&CaptureDevice> {
        let id = self.selected.as_ref()?;
        self.options.iter().find(|d| &d.id == id)
    }

    /// Select by device id, or by 1-based position in the option list
    pub fn select(&mut self, key: &str) -> Option<&CaptureDevice> {
        let found = self
            .options
            .iter()
            .position(|d| d.id.as_str() == key)
            .or_else(|| {
                key.parse::<usize>().ok().filter(|n| *n >= 1 && *n <= self.options.len()).map(|n| n - 1)
            });

        match found {
            Some(idx) => {
                self.selected = Some(self.options[idx].id.clone());
                self.options.get(idx)
            }
            None => {
                warn!(key = %key, "camera_selection_unknown_device");
                None
            }
        }
    }
}
