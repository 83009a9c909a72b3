//! Persisted pairing identities.
//!
//! The driver needs two things to survive across connections: the host's
//! own Noise static keypair, and the set of device static keys whose pairing
//! code the user already confirmed. [`ConfigStore`] is the boundary; this
//! module ships an in-memory store and a TOML file store.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{info, warn};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::channel::NoiseKeypair;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
    #[error("Config lock poisoned")]
    Poisoned,
}

/// Storage for pairing identities.
pub trait ConfigStore: Send + Sync {
    /// True if the user already confirmed pairing with this device key.
    fn contains_device_static_pubkey(&self, pubkey: &[u8]) -> bool;

    /// Remember a device key after the user confirmed the pairing code.
    fn add_device_static_pubkey(&self, pubkey: &[u8]) -> Result<(), StoreError>;

    /// The host's static keypair, if one was stored before.
    fn app_noise_static_keypair(&self) -> Option<NoiseKeypair>;

    fn set_app_noise_static_keypair(&self, keypair: &NoiseKeypair) -> Result<(), StoreError>;
}

impl<C: ConfigStore + ?Sized> ConfigStore for Arc<C> {
    fn contains_device_static_pubkey(&self, pubkey: &[u8]) -> bool {
        (**self).contains_device_static_pubkey(pubkey)
    }

    fn add_device_static_pubkey(&self, pubkey: &[u8]) -> Result<(), StoreError> {
        (**self).add_device_static_pubkey(pubkey)
    }

    fn app_noise_static_keypair(&self) -> Option<NoiseKeypair> {
        (**self).app_noise_static_keypair()
    }

    fn set_app_noise_static_keypair(&self, keypair: &NoiseKeypair) -> Result<(), StoreError> {
        (**self).set_app_noise_static_keypair(keypair)
    }
}

/// Hex-encoded keypair as stored on disk.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
pub struct KeypairEntry {
    pub private: String,
    pub public: String,
}

impl fmt::Debug for KeypairEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeypairEntry")
            .field("public", &self.public)
            .finish_non_exhaustive()
    }
}

/// Serialized pairing state.
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PairingConfig {
    /// Hex-encoded static pubkeys of devices paired with this host.
    #[serde(default)]
    pub device_noise_static_pubkeys: Vec<String>,
    /// This host's static keypair.
    #[serde(default)]
    pub app_noise_static_keypair: Option<KeypairEntry>,
}

impl PairingConfig {
    /// Load configuration from a TOML file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let content = std::fs::read_to_string(path)?;
        let config: PairingConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<(), StoreError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn contains_device_static_pubkey(&self, pubkey: &[u8]) -> bool {
        let needle = hex::encode(pubkey);
        self.device_noise_static_pubkeys
            .iter()
            .any(|k| k.eq_ignore_ascii_case(&needle))
    }

    /// Returns false if the key was already present.
    pub fn add_device_static_pubkey(&mut self, pubkey: &[u8]) -> bool {
        if self.contains_device_static_pubkey(pubkey) {
            return false;
        }
        self.device_noise_static_pubkeys.push(hex::encode(pubkey));
        true
    }

    pub fn app_noise_static_keypair(&self) -> Option<NoiseKeypair> {
        let entry = self.app_noise_static_keypair.as_ref()?;
        match (hex::decode(&entry.private), hex::decode(&entry.public)) {
            (Ok(private), Ok(public)) => Some(NoiseKeypair { private, public }),
            _ => {
                warn!("Stored app keypair is not valid hex, ignoring it");
                None
            }
        }
    }

    pub fn set_app_noise_static_keypair(&mut self, keypair: &NoiseKeypair) {
        self.app_noise_static_keypair = Some(KeypairEntry {
            private: hex::encode(&keypair.private),
            public: hex::encode(&keypair.public),
        });
    }
}

/// Store kept in memory only; pairings are forgotten on drop.
#[derive(Debug, Default)]
pub struct MemoryConfig {
    data: Mutex<PairingConfig>,
}

impl MemoryConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: PairingConfig) -> Self {
        Self {
            data: Mutex::new(config),
        }
    }

    /// Copy of the current state.
    pub fn snapshot(&self) -> PairingConfig {
        self.data
            .lock()
            .map(|d| d.clone())
            .unwrap_or_default()
    }
}

impl ConfigStore for MemoryConfig {
    fn contains_device_static_pubkey(&self, pubkey: &[u8]) -> bool {
        self.data
            .lock()
            .map(|d| d.contains_device_static_pubkey(pubkey))
            .unwrap_or(false)
    }

    fn add_device_static_pubkey(&self, pubkey: &[u8]) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.add_device_static_pubkey(pubkey);
        Ok(())
    }

    fn app_noise_static_keypair(&self) -> Option<NoiseKeypair> {
        self.data.lock().ok()?.app_noise_static_keypair()
    }

    fn set_app_noise_static_keypair(&self, keypair: &NoiseKeypair) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        data.set_app_noise_static_keypair(keypair);
        Ok(())
    }
}

/// Store backed by a TOML file, written through on every change.
#[derive(Debug)]
pub struct FileConfig {
    path: PathBuf,
    data: Mutex<PairingConfig>,
}

impl FileConfig {
    /// Open `path`, starting empty if the file does not exist yet.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, StoreError> {
        let path = path.as_ref().to_path_buf();
        let data = if path.exists() {
            PairingConfig::load_from_file(&path)?
        } else {
            info!(path = %path.display(), "No pairing config yet, starting empty");
            PairingConfig::default()
        };
        Ok(Self {
            path,
            data: Mutex::new(data),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn update(&self, f: impl FnOnce(&mut PairingConfig) -> bool) -> Result<(), StoreError> {
        let mut data = self.data.lock().map_err(|_| StoreError::Poisoned)?;
        if f(&mut data) {
            if let Some(parent) = self.path.parent()
                && !parent.as_os_str().is_empty()
            {
                std::fs::create_dir_all(parent)?;
            }
            data.save_to_file(&self.path)?;
        }
        Ok(())
    }
}

impl ConfigStore for FileConfig {
    fn contains_device_static_pubkey(&self, pubkey: &[u8]) -> bool {
        self.data
            .lock()
            .map(|d| d.contains_device_static_pubkey(pubkey))
            .unwrap_or(false)
    }

    fn add_device_static_pubkey(&self, pubkey: &[u8]) -> Result<(), StoreError> {
        self.update(|d| d.add_device_static_pubkey(pubkey))
    }

    fn app_noise_static_keypair(&self) -> Option<NoiseKeypair> {
        self.data.lock().ok()?.app_noise_static_keypair()
    }

    fn set_app_noise_static_keypair(&self, keypair: &NoiseKeypair) -> Result<(), StoreError> {
        self.update(|d| {
            d.set_app_noise_static_keypair(keypair);
            true
        })
    }
}
