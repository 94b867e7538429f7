//! Video4Linux device enumeration through sysfs
//!
//! Every `/sys/class/video4linux/videoN` entry with `index == 0` is a capture node
//! (higher indices are metadata nodes of the same camera). The `name` attribute is
//! the human-readable label used for rear-camera classification.

use crate::domain::error::DeviceEnumerationError;
use crate::domain::types::{DeviceId, DeviceInfo};
use crate::services::negotiator::MediaPlatform;
use async_trait::async_trait;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use tracing::debug;

pub struct SysfsMediaPlatform {
    sysfs_dir: PathBuf,
    dev_dir: PathBuf,
}

impl SysfsMediaPlatform {
    pub fn new(sysfs_dir: impl Into<PathBuf>, dev_dir: impl Into<PathBuf>) -> Self {
        Self { sysfs_dir: sysfs_dir.into(), dev_dir: dev_dir.into() }
    }
}

fn map_io_error(path: &Path, e: std::io::Error) -> DeviceEnumerationError {
    match e.kind() {
        ErrorKind::NotFound => DeviceEnumerationError::NoHardware,
        ErrorKind::PermissionDenied => {
            DeviceEnumerationError::PermissionDenied { path: path.to_path_buf() }
        }
        _ => DeviceEnumerationError::Io { path: path.to_path_buf(), source: e },
    }
}

/// `video12` -> 12
fn node_number(name: &str) -> Option<u32> {
    name.strip_prefix("video")?.parse().ok()
}

async fn read_attr(path: &Path) -> Option<String> {
    tokio::fs::read_to_string(path).await.ok().map(|s| s.trim().to_string())
}

#[async_trait]
impl MediaPlatform for SysfsMediaPlatform {
    async fn enumerate(&self) -> Result<Vec<DeviceInfo>, DeviceEnumerationError> {
        let mut entries = tokio::fs::read_dir(&self.sysfs_dir)
            .await
            .map_err(|e| map_io_error(&self.sysfs_dir, e))?;

        let mut nodes = Vec::new();
        while let Some(entry) =
            entries.next_entry().await.map_err(|e| map_io_error(&self.sysfs_dir, e))?
        {
            let file_name = entry.file_name();
            let Some(name) = file_name.to_str() else { continue };
            let Some(number) = node_number(name) else { continue };

            let class_dir = entry.path();
            if let Some(index) = read_attr(&class_dir.join("index")).await {
                if index != "0" {
                    debug!(node = %name, index = %index, "camera_node_skipped_metadata");
                    continue;
                }
            }

            let dev_path = self.dev_dir.join(name);
            match tokio::fs::OpenOptions::new().read(true).open(&dev_path).await {
                Ok(_) => {}
                Err(e) if e.kind() == ErrorKind::NotFound => {
                    debug!(node = %dev_path.display(), "camera_node_missing");
                    continue;
                }
                Err(e) => return Err(map_io_error(&dev_path, e)),
            }

            let label = read_attr(&class_dir.join("name")).await.unwrap_or_else(|| name.to_string());
            nodes.push((number, DeviceInfo { id: DeviceId(dev_path.display().to_string()), label }));
        }

        nodes.sort_by_key(|(number, _)| *number);
        Ok(nodes.into_iter().map(|(_, info)| info).collect())
    }
}
