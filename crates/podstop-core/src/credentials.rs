//! Credential materialization
//!
//! The introspector publishes the management credentials base64-encoded.
//! They are decoded once, before any connection, into a scratch file that
//! both management channels then read.

use std::io::Write;
use std::path::Path;

use anyhow::{Context, Result, bail};
use base64::Engine;
use base64::engine::general_purpose::STANDARD;

/// Decode the base64 `secret` file into `dest` (mode 0600 on unix).
pub fn materialize_key(secret: &Path, dest: &Path) -> Result<()> {
    let encoded = std::fs::read_to_string(secret)
        .with_context(|| format!("Failed to read secret file: {}", secret.display()))?;

    // Encoders wrap lines; the alphabet never contains whitespace
    let compact: String = encoded.split_whitespace().collect();
    let decoded = STANDARD
        .decode(compact.as_bytes())
        .with_context(|| format!("Secret file is not valid base64: {}", secret.display()))?;

    if let Some(parent) = dest.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create {}", parent.display()))?;
    }

    let mut options = std::fs::OpenOptions::new();
    options.write(true).create(true).truncate(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options
        .open(dest)
        .with_context(|| format!("Failed to create key file: {}", dest.display()))?;
    file.write_all(&decoded)
        .with_context(|| format!("Failed to write key file: {}", dest.display()))?;

    log::debug!(
        "Materialized {} byte key from {} into {}",
        decoded.len(),
        secret.display(),
        dest.display()
    );
    Ok(())
}

/// Username and password for both management channels
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Load from a materialized key file.
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read key file: {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("Invalid key file: {}", path.display()))
    }

    /// Parse `key=value` lines; `#` starts a comment line.
    pub fn parse(text: &str) -> Result<Self> {
        let mut username = None;
        let mut password = None;

        for line in text.lines().map(str::trim) {
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let Some((key, value)) = line.split_once('=') else {
                bail!("expected key=value, got {line:?}");
            };
            match key.trim() {
                "username" => username = Some(value.trim().to_string()),
                "password" => password = Some(value.trim().to_string()),
                other => log::debug!("Ignoring key file entry {other}"),
            }
        }

        match (username, password) {
            (Some(username), Some(password)) if !username.is_empty() => Ok(Self {
                username,
                password,
            }),
            _ => bail!("username and password are required"),
        }
    }
}
