use std::path::{Path, PathBuf};

use crate::scheduler::types::IsolationMode;

use super::types::AppConfig;

/// Get the default shotrun data directory: ~/.shotrun
pub fn get_shotrun_data_dir() -> anyhow::Result<PathBuf> {
    let home = std::env::var("HOME")
        .or_else(|_| std::env::var("USERPROFILE"))
        .map_err(|_| anyhow::anyhow!("Cannot determine home directory"))?;
    Ok(PathBuf::from(home).join(".shotrun"))
}

pub fn load_default() -> anyhow::Result<AppConfig> {
    // Priority 1: ~/.shotrun/config.toml (highest)
    let data_dir = get_shotrun_data_dir()?;
    let user_config = data_dir.join("config.toml");

    // Priority 2: ./shotrun.toml (current directory)
    let local_config = Path::new("shotrun.toml");

    let mut cfg = if user_config.exists() {
        load_file(&user_config)?
    } else if local_config.exists() {
        load_file(local_config)?
    } else {
        AppConfig::default()
    };

    // Log files go under the data directory unless configured
    if cfg.logging.file
        && cfg
            .logging
            .directory
            .as_deref()
            .map(|s| s.trim().is_empty())
            .unwrap_or(true)
    {
        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)?;
        cfg.logging.directory = Some(logs_dir.to_string_lossy().to_string());
    }

    // Environment variable overrides (Priority 0: highest)
    apply_env_overrides(&mut cfg, |key| std::env::var(key).ok())?;

    Ok(cfg)
}

pub fn load_file(path: &Path) -> anyhow::Result<AppConfig> {
    let s = std::fs::read_to_string(path)?;
    toml::from_str::<AppConfig>(&s)
        .map_err(|e| anyhow::anyhow!("invalid config {}: {e}", path.display()))
}

/// Apply `SHOTRUN_*` overrides. Blank values are ignored.
pub fn apply_env_overrides<F>(cfg: &mut AppConfig, lookup: F) -> anyhow::Result<()>
where
    F: Fn(&str) -> Option<String>,
{
    let var = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(v) = var("SHOTRUN_WORKERS") {
        let n: i64 = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("SHOTRUN_WORKERS must be an integer, got {v:?}"))?;
        cfg.scheduler.workers = Some(n);
    }
    if let Some(v) = var("SHOTRUN_ISOLATION") {
        cfg.scheduler.isolation = v.parse::<IsolationMode>()?;
    }
    if let Some(v) = var("SHOTRUN_MAX_RETRIES") {
        cfg.scheduler.max_retries = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("SHOTRUN_MAX_RETRIES must be >= 0, got {v:?}"))?;
    }
    if let Some(v) = var("SHOTRUN_RECYCLE_EVERY") {
        cfg.scheduler.recycle_every = v
            .trim()
            .parse()
            .map_err(|_| anyhow::anyhow!("SHOTRUN_RECYCLE_EVERY must be >= 0, got {v:?}"))?;
    }
    if let Some(v) = var("SHOTRUN_METRICS_PATH") {
        cfg.scheduler.metrics_path = Some(v);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn env_overrides_scheduler_section() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(
            &mut cfg,
            env(&[
                ("SHOTRUN_WORKERS", "3"),
                ("SHOTRUN_ISOLATION", "strict"),
                ("SHOTRUN_MAX_RETRIES", "0"),
                ("SHOTRUN_RECYCLE_EVERY", "10"),
                ("SHOTRUN_METRICS_PATH", "/tmp/m.json"),
            ]),
        )
        .unwrap();

        assert_eq!(cfg.scheduler.workers, Some(3));
        assert_eq!(cfg.scheduler.isolation, IsolationMode::Strict);
        assert_eq!(cfg.scheduler.max_retries, 0);
        assert_eq!(cfg.scheduler.recycle_every, 10);
        assert_eq!(cfg.scheduler.metrics_path.as_deref(), Some("/tmp/m.json"));
    }

    #[test]
    fn blank_env_values_are_ignored() {
        let mut cfg = AppConfig::default();
        apply_env_overrides(&mut cfg, env(&[("SHOTRUN_WORKERS", "  ")])).unwrap();
        assert_eq!(cfg.scheduler.workers, None);
    }

    #[test]
    fn malformed_env_values_are_errors() {
        let mut cfg = AppConfig::default();
        assert!(apply_env_overrides(&mut cfg, env(&[("SHOTRUN_WORKERS", "many")])).is_err());
        assert!(apply_env_overrides(&mut cfg, env(&[("SHOTRUN_ISOLATION", "loose")])).is_err());
        assert!(apply_env_overrides(&mut cfg, env(&[("SHOTRUN_MAX_RETRIES", "-1")])).is_err());
    }

    #[test]
    fn load_file_reports_path_on_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("shotrun.toml");
        std::fs::write(&path, "[scheduler]\nmax_retries = \"two\"").unwrap();

        let err = load_file(&path).unwrap_err().to_string();
        assert!(err.contains("shotrun.toml"), "{err}");
    }
}
