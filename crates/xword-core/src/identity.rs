//! Local player identity
//!
//! Each install gets a stable user id, generated on first use and kept in
//! `<data_dir>/user_id`. The id is what every outgoing event speaks for and
//! what the engine compares against to recognize its own echoes.

use std::fs;
use std::path::PathBuf;

use anyhow::{Context, Result};
use uuid::Uuid;

use crate::config::Config;
use crate::models::Player;

/// Who this client plays as
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Identity {
    pub user_id: String,
    pub display_name: String,
    pub color: String,
}

impl Identity {
    /// Resolve the identity from configuration, creating the user id if needed
    pub fn load(config: &Config) -> Result<Self> {
        let user_id = load_or_create_user_id(&config.user_id_path())?;
        Ok(Self::with_user_id(config, user_id))
    }

    /// Build an identity for a known user id
    pub fn with_user_id(config: &Config, user_id: impl Into<String>) -> Self {
        let user_id = user_id.into();
        let display_name = config
            .display_name
            .clone()
            .unwrap_or_else(|| format!("Player {}", user_id.chars().take(4).collect::<String>()));
        let color = config
            .color
            .clone()
            .unwrap_or_else(|| Player::default_color(&user_id));
        Self {
            user_id,
            display_name,
            color,
        }
    }

    /// Our own entry for the player map
    pub fn player(&self) -> Player {
        Player {
            user_id: self.user_id.clone(),
            display_name: Some(self.display_name.clone()),
            color: Some(self.color.clone()),
        }
    }
}

/// Read the user id file, writing a fresh uuid if it does not exist yet
pub fn load_or_create_user_id(path: &PathBuf) -> Result<String> {
    if path.exists() {
        let content = fs::read_to_string(path)
            .with_context(|| format!("Failed to read user id from {:?}", path))?;
        let id = content.trim();
        if !id.is_empty() {
            return Ok(id.to_string());
        }
    }

    let id = Uuid::new_v4().to_string();
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create directory {:?}", parent))?;
    }
    fs::write(path, &id).with_context(|| format!("Failed to save user id to {:?}", path))?;
    Ok(id)
}
