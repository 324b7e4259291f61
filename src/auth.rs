//! Calendar access-token handling
//!
//! Sign-in happens outside this program (the identity provider mints an
//! OAuth access token scoped to calendar read/write). We keep exactly one
//! token string: an environment override for scripted use, otherwise a
//! small file under the config directory so a login survives restarts.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use log::debug;
use secrecy::{ExposeSecret, SecretString};
use std::fs;
use std::path::PathBuf;
use std::sync::RwLock;

const TOKEN_ENV: &str = "GOOGLE_ACCESS_TOKEN";
const TOKEN_FILE: &str = "calendar_token";

pub struct TokenStore {
    path: PathBuf,
    token: RwLock<Option<SecretString>>,
}

impl TokenStore {
    pub fn new() -> Result<Self> {
        let proj_dirs = ProjectDirs::from("com", "fig", "fig")
            .context("Failed to determine config directory")?;
        Ok(Self::with_path(proj_dirs.config_dir().join(TOKEN_FILE)))
    }

    pub fn with_path(path: PathBuf) -> Self {
        let store = Self { path, token: RwLock::new(None) };
        store.load();
        store
    }

    /// Environment wins over the persisted file.
    fn load(&self) {
        let loaded = match std::env::var(TOKEN_ENV) {
            Ok(value) if !value.trim().is_empty() => {
                debug!("Using calendar token from {}", TOKEN_ENV);
                Some(SecretString::from(value.trim().to_string()))
            }
            _ => match fs::read_to_string(&self.path) {
                Ok(contents) if !contents.trim().is_empty() => {
                    debug!("Loaded calendar token from {}", self.path.display());
                    Some(SecretString::from(contents.trim().to_string()))
                }
                _ => None,
            },
        };
        if let Ok(mut guard) = self.token.write() {
            *guard = loaded;
        }
    }

    /// Store a freshly minted token and persist it for the next session.
    pub fn set(&self, token: SecretString) -> Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&self.path, token.expose_secret())
            .with_context(|| format!("Failed to persist token to {}", self.path.display()))?;
        if let Ok(mut guard) = self.token.write() {
            *guard = Some(token);
        }
        Ok(())
    }

    pub fn get(&self) -> Option<SecretString> {
        self.token.read().ok().and_then(|guard| guard.clone())
    }

    pub fn is_signed_in(&self) -> bool {
        self.token.read().map(|guard| guard.is_some()).unwrap_or(false)
    }

    pub fn clear(&self) -> Result<()> {
        if self.path.exists() {
            fs::remove_file(&self.path)?;
        }
        if let Ok(mut guard) = self.token.write() {
            *guard = None;
        }
        Ok(())
    }
}
