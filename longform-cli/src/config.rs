//! Configuration for the longform command line.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use longform_core::{CaptureConfig, EmulatorConfig, TransferConfig};

/// Top-level configuration loaded from a TOML file.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct LongformConfig {
    /// Scroll-and-reconverge loop.
    pub capture: CaptureSettings,
    /// Sending to a peer.
    pub transfer: TransferSettings,
    /// Peer emulation for `listen`.
    pub listen: ListenSettings,
    /// Logging settings.
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CaptureSettings {
    /// Delay between capture ticks in milliseconds.
    pub tick_interval_ms: u64,
    /// Ticks without new content before the capture converges.
    pub max_unproductive_ticks: u32,
    /// Hard cap on ticks; 0 disables it.
    pub max_ticks: u32,
    /// Directory captured articles are written to.
    pub output_dir: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct TransferSettings {
    /// Seconds to wait for any peer event before giving up.
    pub peer_timeout_secs: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ListenSettings {
    /// Address the emulated peer listens on.
    pub bind: String,
    /// Largest MTU the emulated peer agrees to; 0 refuses negotiation.
    pub mtu: u16,
    /// Directory received files are written to.
    pub output_dir: PathBuf,
}

/// Logging settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level: "trace", "debug", "info", "warn", "error".
    pub level: String,
}

// ── Defaults ─────────────────────────────────────────────────────

impl Default for CaptureSettings {
    fn default() -> Self {
        let core = CaptureConfig::default();
        Self {
            tick_interval_ms: core.tick_interval.as_millis() as u64,
            max_unproductive_ticks: core.max_unproductive_ticks,
            max_ticks: core.max_ticks.unwrap_or(0),
            output_dir: PathBuf::from("."),
        }
    }
}

impl Default for TransferSettings {
    fn default() -> Self {
        Self {
            peer_timeout_secs: TransferConfig::default().peer_timeout.as_secs(),
        }
    }
}

impl Default for ListenSettings {
    fn default() -> Self {
        Self {
            bind: "127.0.0.1:7340".into(),
            mtu: EmulatorConfig::default().mtu.unwrap_or(0),
            output_dir: PathBuf::from("received"),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".into(),
        }
    }
}

// ── Loading ──────────────────────────────────────────────────────

impl LongformConfig {
    /// Load configuration from a TOML file, falling back to defaults.
    pub fn load(path: &Path) -> Self {
        match std::fs::read_to_string(path) {
            Ok(contents) => toml::from_str(&contents).unwrap_or_else(|e| {
                tracing::warn!("invalid config {}: {e}; using defaults", path.display());
                Self::default()
            }),
            Err(_) => {
                tracing::info!("no config at {}; using defaults", path.display());
                Self::default()
            }
        }
    }

    pub fn to_capture_config(&self) -> CaptureConfig {
        CaptureConfig {
            tick_interval: Duration::from_millis(self.capture.tick_interval_ms.max(1)),
            max_unproductive_ticks: self.capture.max_unproductive_ticks.max(1),
            max_ticks: (self.capture.max_ticks > 0).then_some(self.capture.max_ticks),
        }
    }

    pub fn to_transfer_config(&self) -> TransferConfig {
        TransferConfig {
            peer_timeout: Duration::from_secs(self.transfer.peer_timeout_secs.max(1)),
        }
    }

    pub fn to_emulator_config(&self) -> EmulatorConfig {
        EmulatorConfig {
            mtu: (self.listen.mtu > 0).then_some(self.listen.mtu),
            ..Default::default()
        }
    }
}

// ── Tests ────────────────────────────────────────────────────────
