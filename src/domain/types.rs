//! Shared capture types: devices and constraint tiers

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Newtype wrapper for capture device IDs (device node path or platform handle)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceId(pub String);

impl DeviceId {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for DeviceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A device as reported by the platform, before any classification
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub label: String,
}

/// Capture device enumerated once per session
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureDevice {
    pub id: DeviceId,
    pub label: String,
    /// Derived from label keywords, see `CaptureDevice::classify`
    pub is_rear_facing: bool,
}

impl CaptureDevice {
    /// Classify a platform device. `rear_keywords` must already be lowercase.
    pub fn classify(info: DeviceInfo, rear_keywords: &[String]) -> Self {
        let label = info.label.to_lowercase();
        let is_rear_facing = rear_keywords.iter().any(|kw| label.contains(kw.as_str()));
        Self { id: info.id, label: info.label, is_rear_facing }
    }
}

/// Which way the camera should face
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FacingMode {
    /// Rear camera, pointing away from the operator
    Environment,
    /// Front camera
    User,
}

impl FacingMode {
    pub fn as_str(&self) -> &'static str {
        match self {
            FacingMode::Environment => "environment",
            FacingMode::User => "user",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl std::fmt::Display for Resolution {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

/// One candidate set of capture constraints
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintSet {
    /// Short tier name used in logs and error reports
    pub name: &'static str,
    /// Exact device requirement
    pub device: Option<DeviceId>,
    pub facing: Option<FacingMode>,
    /// Device known to face `facing`. Platforms without a facing-mode control open
    /// this device instead.
    pub facing_device: Option<DeviceId>,
    pub resolution: Option<Resolution>,
}

impl ConstraintSet {
    pub fn unconstrained() -> Self {
        Self { name: "unconstrained", device: None, facing: None, facing_device: None, resolution: None }
    }

    pub fn is_unconstrained(&self) -> bool {
        self.device.is_none()
            && self.facing.is_none()
            && self.facing_device.is_none()
            && self.resolution.is_none()
    }
}

/// Ordered constraint fallback list, most specific first
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConstraintTiers(SmallVec<[ConstraintSet; 4]>);

impl ConstraintTiers {
    pub fn new(tiers: impl IntoIterator<Item = ConstraintSet>) -> Self {
        Self(tiers.into_iter().collect())
    }

    pub fn iter(&self) -> impl Iterator<Item = &ConstraintSet> {
        self.0.iter()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn names(&self) -> Vec<&'static str> {
        self.0.iter().map(|t| t.name).collect()
    }
}
