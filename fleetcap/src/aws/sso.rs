//! AWS SSO session checks and the profile list, read from the files the aws cli maintains.
use std::path::{Path, PathBuf};
use anyhow::{bail, Context};
use chrono::{DateTime, NaiveDateTime, TimeZone, Utc};
use serde::Deserialize;
use tokio::process::Command;
use crate::aws::AWS_BINARY;

#[derive(Deserialize, Debug)]
#[serde(rename_all = "camelCase")]
struct SsoCacheEntry {
    start_url: Option<String>,
    expires_at: Option<String>,
}

fn home_dir() -> Option<PathBuf> {
    std::env::var_os("HOME").map(PathBuf::from)
}

pub fn default_sso_cache_dir() -> Option<PathBuf> {
    home_dir().map(|h| h.join(".aws").join("sso").join("cache"))
}

pub fn default_aws_config_file() -> Option<PathBuf> {
    std::env::var_os("AWS_CONFIG_FILE")
        .map(PathBuf::from)
        .or_else(|| home_dir().map(|h| h.join(".aws").join("config")))
}

/// The cli has written both `2024-03-09T15:04:05Z` and `2024-03-09T15:04:05UTC` over the years
fn parse_expiry(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    NaiveDateTime::parse_from_str(value, "%Y-%m-%dT%H:%M:%SUTC")
        .ok()
        .map(|naive| Utc.from_utc_datetime(&naive))
}

/// When the newest SSO login in `cache_dir` expires. `None` if there is no login token there,
/// client registrations in the same folder have no `startUrl` and don't count.
pub async fn session_expiry(cache_dir: &Path) -> anyhow::Result<Option<DateTime<Utc>>> {
    let mut entries = match tokio::fs::read_dir(cache_dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err).with_context(|| format!("reading {}", cache_dir.display())),
    };

    let mut newest: Option<(std::time::SystemTime, PathBuf)> = None;
    while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) != Some("json") {
            continue;
        }
        let modified = entry.metadata().await?.modified()?;
        if newest.as_ref().map_or(true, |(t, _)| modified > *t) {
            newest = Some((modified, path));
        }
    }
    let Some((_, path)) = newest else { return Ok(None) };

    let text = tokio::fs::read_to_string(&path).await?;
    let entry: SsoCacheEntry = match serde_json::from_str(&text) {
        Ok(entry) => entry,
        Err(err) => {
            tracing::debug!("ignoring unreadable sso cache file {}: {err}", path.display());
            return Ok(None);
        }
    };
    if entry.start_url.is_none() {
        return Ok(None);
    }
    Ok(entry.expires_at.as_deref().and_then(parse_expiry))
}

pub async fn is_session_valid(cache_dir: &Path, now: DateTime<Utc>) -> anyhow::Result<bool> {
    let expiry = session_expiry(cache_dir).await?;
    tracing::debug!("sso session expires at {expiry:?}");
    Ok(expiry.map_or(false, |e| e > now))
}

/// `aws sso login`, which opens a browser and waits for the operator, so it inherits the terminal
pub async fn login(profile: &str) -> anyhow::Result<()> {
    tracing::info!("logging in to AWS SSO with profile {profile}");
    let status = Command::new(AWS_BINARY)
        .args(["sso", "login", "--profile", profile])
        .status()
        .await
        .context("running aws sso login")?;
    if !status.success() {
        bail!("aws sso login for {profile} exited with {status}");
    }
    Ok(())
}

/// Profile names from an aws config file, `[default]` and `[profile name]` sections
pub fn parse_profiles(config: &str) -> Vec<String> {
    let mut profiles = Vec::new();
    for line in config.lines() {
        let line = line.trim();
        let Some(section) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) else { continue };
        let section = section.trim();
        let name = if section == "default" {
            section
        } else if let Some(name) = section.strip_prefix("profile ") {
            name.trim()
        } else {
            continue;
        };
        if !name.is_empty() && !profiles.iter().any(|p| p == name) {
            profiles.push(name.to_string());
        }
    }
    profiles
}

pub async fn list_profiles(config_file: &Path) -> anyhow::Result<Vec<String>> {
    let text = tokio::fs::read_to_string(config_file).await
        .with_context(|| format!("reading aws config {}", config_file.display()))?;
    Ok(parse_profiles(&text))
}
