//! Player handoff
//!
//! Hands a magnet link to an external torrent streaming toolchain
//! (webtorrent, peerflix, or a user-supplied command). Playback itself
//! happens entirely in the child process.

use std::process::{ExitStatus, Stdio};
use thiserror::Error;
use tokio::process::{Child, Command};
use tracing::info;

use crate::models::magnet_from_hash;

const MAGNET_PLACEHOLDER: &str = "{magnet}";

/// Errors from launching the player toolchain
#[derive(Debug, Error)]
pub enum HandoffError {
    #[error("Player '{0}' not found. Install it first.")]
    NotFound(String),
    #[error("No player found (tried {0})")]
    NoPlayer(String),
    #[error("Player command is empty")]
    EmptyTemplate,
    #[error("Not a magnet link or info hash: {0}")]
    InvalidMagnet(String),
    #[error("Failed to start player: {0}")]
    StartFailed(#[from] std::io::Error),
}

/// A player command line with a `{magnet}` slot
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlayerCommand {
    program: String,
    args: Vec<String>,
}

impl PlayerCommand {
    /// Parse a template such as `webtorrent {magnet} --mpv`.
    ///
    /// Without a placeholder the magnet is appended as the last argument.
    pub fn parse(template: &str) -> Result<Self, HandoffError> {
        let mut parts = template.split_whitespace().map(String::from);
        let program = parts.next().ok_or(HandoffError::EmptyTemplate)?;
        let mut args: Vec<String> = parts.collect();
        if !args.iter().any(|a| a.contains(MAGNET_PLACEHOLDER)) {
            args.push(MAGNET_PLACEHOLDER.to_string());
        }
        Ok(Self { program, args })
    }

    pub fn webtorrent() -> Self {
        Self {
            program: "webtorrent".into(),
            args: vec![MAGNET_PLACEHOLDER.into(), "--mpv".into()],
        }
    }

    pub fn peerflix() -> Self {
        Self {
            program: "peerflix".into(),
            args: vec![MAGNET_PLACEHOLDER.into(), "--vlc".into()],
        }
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    /// Arguments with the placeholder filled in
    pub fn args_for(&self, magnet: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|a| a.replace(MAGNET_PLACEHOLDER, magnet))
            .collect()
    }

    /// Check if the program is available on the system
    pub async fn is_available(&self) -> bool {
        if self.program.contains('/') {
            return std::path::Path::new(&self.program).exists();
        }

        Command::new("which")
            .arg(&self.program)
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
            .map(|s| s.success())
            .unwrap_or(false)
    }

    /// Spawn the player for `link` (magnet URI or bare info hash)
    pub async fn launch(&self, link: &str) -> Result<Child, HandoffError> {
        let magnet = normalize_link(link)?;
        info!(program = %self.program, "Handing off to player");

        let mut cmd = Command::new(&self.program);
        cmd.args(self.args_for(&magnet));
        cmd.stdin(Stdio::null());

        cmd.spawn().map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                HandoffError::NotFound(self.program.clone())
            } else {
                HandoffError::StartFailed(e)
            }
        })
    }

    /// Launch and wait for the player to exit
    pub async fn launch_and_wait(&self, link: &str) -> Result<ExitStatus, HandoffError> {
        let mut child = self.launch(link).await?;
        Ok(child.wait().await?)
    }
}

/// Configured template if any, otherwise the first installed default
pub async fn resolve_player(template: Option<&str>) -> Result<PlayerCommand, HandoffError> {
    if let Some(template) = template {
        return PlayerCommand::parse(template);
    }

    let candidates = [PlayerCommand::webtorrent(), PlayerCommand::peerflix()];
    for candidate in &candidates {
        if candidate.is_available().await {
            return Ok(candidate.clone());
        }
    }
    Err(HandoffError::NoPlayer(
        candidates
            .iter()
            .map(|c| c.program.as_str())
            .collect::<Vec<_>>()
            .join(", "),
    ))
}

/// Accept a magnet URI or a bare 40-char hex / 32-char base32 info hash
pub fn normalize_link(link: &str) -> Result<String, HandoffError> {
    let link = link.trim();
    if link.starts_with("magnet:?") {
        return Ok(link.to_string());
    }
    let is_hex = link.len() == 40 && link.chars().all(|c| c.is_ascii_hexdigit());
    let is_base32 = link.len() == 32 && link.chars().all(|c| c.is_ascii_alphanumeric());
    if is_hex || is_base32 {
        return Ok(magnet_from_hash(link, link));
    }
    Err(HandoffError::InvalidMagnet(link.to_string()))
}
