use chrono::Duration;
use serde::{Deserialize, Serialize};
use std::fs;
use std::io::Write;
use std::path::Path;
use tempfile::NamedTempFile;

pub const DAY_SECS: u64 = 24 * 60 * 60;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionPolicy {
    /// Longest gap allowed since `lastActive`.
    pub inactivity_timeout_secs: u64,
    /// Longest lifetime allowed since `createdAt`, regardless of activity.
    pub max_session_age_secs: u64,
}

impl SessionPolicy {
    pub fn inactivity_timeout(&self) -> Duration {
        secs_to_duration(self.inactivity_timeout_secs)
    }

    pub fn max_session_age(&self) -> Duration {
        secs_to_duration(self.max_session_age_secs)
    }
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            inactivity_timeout_secs: 7 * DAY_SECS,
            max_session_age_secs: 21 * DAY_SECS,
        }
    }
}

/// Argon2id cost parameters for password stretching.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KdfSettings {
    pub memory_cost_kib: u32,
    pub time_cost: u32,
    pub parallelism: u32,
}

impl Default for KdfSettings {
    fn default() -> Self {
        Self {
            memory_cost_kib: 64 * 1024,
            time_cost: 3,
            parallelism: 1,
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthSettings {
    #[serde(default)]
    pub session: SessionPolicy,
    #[serde(default)]
    pub kdf: KdfSettings,
}

pub fn load_settings<P: AsRef<Path>>(path: P) -> anyhow::Result<AuthSettings> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(AuthSettings::default());
    }
    let bytes = fs::read(path)?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Replaces the settings file atomically; readers never see a partial write.
pub fn save_settings<P: AsRef<Path>>(path: P, settings: &AuthSettings) -> anyhow::Result<()> {
    let path = path.as_ref();
    let dir = match path.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir)?;
    let mut tmp = NamedTempFile::new_in(dir)?;
    tmp.write_all(&serde_json::to_vec_pretty(settings)?)?;
    tmp.flush()?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| e.error)?;
    Ok(())
}

fn secs_to_duration(secs: u64) -> Duration {
    let millis = i64::try_from(secs.saturating_mul(1000)).unwrap_or(i64::MAX);
    Duration::milliseconds(millis)
}
