//! Workspace configuration stored as JSON sections in the `settings` table.
//!
//! Compiled-in defaults are merged under whatever was saved, so a section can
//! gain fields without a migration.

use crate::credentials::{CredentialGenerator, DEFAULT_FALLBACK_PREFIX, DEFAULT_PASSWORD_LENGTH};
use crate::db;
use rusqlite::Connection;
use serde_json::{json, Map, Value};
use std::time::Duration;

pub const PASSWORD_LENGTH_MIN: i64 = 8;
pub const PASSWORD_LENGTH_MAX: i64 = 64;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigSection {
    Provisioning,
    Security,
}

impl ConfigSection {
    pub const ALL: [ConfigSection; 2] = [Self::Provisioning, Self::Security];

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "provisioning" => Some(Self::Provisioning),
            "security" => Some(Self::Security),
            _ => None,
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Provisioning => "provisioning",
            Self::Security => "security",
        }
    }

    fn key(self) -> &'static str {
        match self {
            Self::Provisioning => "setup.provisioning",
            Self::Security => "setup.security",
        }
    }
}

fn default_section(section: ConfigSection) -> Value {
    match section {
        ConfigSection::Provisioning => json!({
            "passwordLength": DEFAULT_PASSWORD_LENGTH,
            "usernameFallbackPrefix": DEFAULT_FALLBACK_PREFIX,
            "maxUsernameAttempts": 5
        }),
        ConfigSection::Security => json!({
            "storeTimeoutMs": 5000
        }),
    }
}

fn parse_i64_range(v: &Value, key: &str, min: i64, max: i64) -> Result<i64, String> {
    let n = v
        .as_i64()
        .ok_or_else(|| format!("{} must be integer", key))?;
    if !(min..=max).contains(&n) {
        return Err(format!("{} must be in {}..={}", key, min, max));
    }
    Ok(n)
}

fn parse_prefix(v: &Value, key: &str) -> Result<String, String> {
    let s = v
        .as_str()
        .ok_or_else(|| format!("{} must be string", key))?
        .trim()
        .to_ascii_lowercase();
    if s.is_empty() || s.len() > 8 {
        return Err(format!("{} length must be in 1..=8", key));
    }
    if !s.chars().all(|c| c.is_ascii_alphanumeric()) {
        return Err(format!("{} must be alphanumeric", key));
    }
    Ok(s)
}

pub fn merge_section_patch(
    section: ConfigSection,
    current: &mut Value,
    patch: &Map<String, Value>,
) -> Result<(), String> {
    let obj = current
        .as_object_mut()
        .ok_or_else(|| "internal config section must be a JSON object".to_string())?;
    for (k, v) in patch {
        match section {
            ConfigSection::Provisioning => match k.as_str() {
                "passwordLength" => {
                    let n = parse_i64_range(v, k, PASSWORD_LENGTH_MIN, PASSWORD_LENGTH_MAX)?;
                    obj.insert(k.clone(), Value::from(n));
                }
                "usernameFallbackPrefix" => {
                    obj.insert(k.clone(), Value::String(parse_prefix(v, k)?));
                }
                "maxUsernameAttempts" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 1, 20)?));
                }
                _ => return Err(format!("unknown provisioning field: {}", k)),
            },
            ConfigSection::Security => match k.as_str() {
                "storeTimeoutMs" => {
                    obj.insert(k.clone(), Value::from(parse_i64_range(v, k, 100, 60_000)?));
                }
                _ => return Err(format!("unknown security field: {}", k)),
            },
        }
    }
    Ok(())
}

pub fn load_section(conn: &Connection, section: ConfigSection) -> anyhow::Result<Value> {
    let mut current = default_section(section);
    if let Some(saved) = db::settings_get_json(conn, section.key())? {
        if let Some(saved_obj) = saved.as_object() {
            // Malformed historical values fall back to defaults field by field.
            for (k, v) in saved_obj {
                let mut single = Map::new();
                single.insert(k.clone(), v.clone());
                let _ = merge_section_patch(section, &mut current, &single);
            }
        }
    }
    Ok(current)
}

/// Validates `patch` against the saved section and persists the merged result.
pub fn update_section(
    conn: &Connection,
    section: ConfigSection,
    patch: &Map<String, Value>,
) -> anyhow::Result<Result<Value, String>> {
    let mut current = load_section(conn, section)?;
    if let Err(msg) = merge_section_patch(section, &mut current, patch) {
        return Ok(Err(msg));
    }
    db::settings_set_json(conn, section.key(), &current)?;
    Ok(Ok(current))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProvisioningConfig {
    pub password_length: usize,
    pub username_fallback_prefix: String,
    pub max_username_attempts: u32,
}

impl Default for ProvisioningConfig {
    fn default() -> Self {
        Self {
            password_length: DEFAULT_PASSWORD_LENGTH,
            username_fallback_prefix: DEFAULT_FALLBACK_PREFIX.to_string(),
            max_username_attempts: 5,
        }
    }
}

impl ProvisioningConfig {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let v = load_section(conn, ConfigSection::Provisioning)?;
        let d = Self::default();
        Ok(Self {
            password_length: v["passwordLength"]
                .as_u64()
                .and_then(|n| usize::try_from(n).ok())
                .unwrap_or(d.password_length),
            username_fallback_prefix: v["usernameFallbackPrefix"]
                .as_str()
                .map(str::to_string)
                .unwrap_or(d.username_fallback_prefix),
            max_username_attempts: v["maxUsernameAttempts"]
                .as_u64()
                .and_then(|n| u32::try_from(n).ok())
                .unwrap_or(d.max_username_attempts),
        })
    }

    pub fn generator(&self) -> CredentialGenerator {
        CredentialGenerator::new(self.password_length, self.username_fallback_prefix.clone())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SecurityConfig {
    pub store_timeout: Duration,
}

impl SecurityConfig {
    pub fn load(conn: &Connection) -> anyhow::Result<Self> {
        let v = load_section(conn, ConfigSection::Security)?;
        Ok(Self {
            store_timeout: Duration::from_millis(v["storeTimeoutMs"].as_u64().unwrap_or(5000)),
        })
    }
}
