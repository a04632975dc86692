use std::{env, fs, path::Path, path::PathBuf};

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;
use serde_json::Value;
use url::Url;

/// Where the Budget Manager server runs unless configured otherwise.
pub const DEFAULT_BASE_URL: &str = "http://localhost:8080/";

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Base URL of the Budget Manager web app. Entry targets are resolved
    /// relative to this.
    #[serde(default)]
    pub base_url: Option<String>,

    /// If set, the tray app will add/remove itself from user startup accordingly.
    #[serde(default)]
    pub start_at_login: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub base_url: Url,
}

pub fn load_optional() -> Result<Option<Config>> {
    let Some(path) = resolve_config_path() else {
        return Ok(None);
    };
    if !path.exists() {
        return Ok(None);
    }
    let bytes = fs::read(&path).with_context(|| format!("reading config {}", path.display()))?;
    let cfg: Config =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(Some(cfg))
}

pub fn resolve_config_path() -> Option<PathBuf> {
    if let Ok(p) = env::var("BUDGETNAV_CONFIG") {
        if !p.trim().is_empty() {
            return Some(PathBuf::from(p));
        }
    }

    let local = PathBuf::from("budgetnav.json");
    if local.exists() {
        return Some(local);
    }

    if let Some(appdata) = env::var_os("APPDATA") {
        return Some(PathBuf::from(appdata).join("budgetnav").join("config.json"));
    }

    if let Some(home) = env::var_os("HOME") {
        return Some(
            PathBuf::from(home)
                .join(".config")
                .join("budgetnav")
                .join("config.json"),
        );
    }

    None
}

pub fn ensure_config_file_exists() -> Result<PathBuf> {
    let Some(path) = resolve_config_path() else {
        return Err(anyhow!(
            "No config path available (set BUDGETNAV_CONFIG or ensure APPDATA/HOME is present)"
        ));
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }

    if !path.exists() {
        let template = serde_json::json!({
            "base_url": DEFAULT_BASE_URL,
            "start_at_login": false
        });
        let mut s = serde_json::to_string_pretty(&template).context("serialize config template")?;
        s.push('\n');
        fs::write(&path, s.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    }

    Ok(path)
}

pub fn patch_start_at_login(enabled: bool) -> Result<PathBuf> {
    let Some(path) = resolve_config_path() else {
        return Err(anyhow!(
            "No config path available (set BUDGETNAV_CONFIG or ensure APPDATA/HOME is present)"
        ));
    };

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("create config dir {}", parent.display()))?;
    }

    let mut root = read_json_or_empty_object(&path)?;
    let obj = root
        .as_object_mut()
        .ok_or_else(|| anyhow!("config root must be a JSON object"))?;

    obj.insert("start_at_login".to_string(), Value::Bool(enabled));

    let mut s = serde_json::to_string_pretty(&root).context("serialize config")?;
    s.push('\n');
    fs::write(&path, s.as_bytes()).with_context(|| format!("write {}", path.display()))?;
    Ok(path)
}

fn read_json_or_empty_object(path: &Path) -> Result<Value> {
    if !path.exists() {
        return Ok(Value::Object(Default::default()));
    }

    let bytes = fs::read(path).with_context(|| format!("reading config {}", path.display()))?;
    let v: Value =
        serde_json::from_slice(&bytes).with_context(|| format!("parsing {}", path.display()))?;
    Ok(v)
}

/// Resolves the base URL. Precedence: explicit argument, then config, then
/// the default localhost server.
pub fn resolve(config: Option<&Config>, base_arg: Option<&str>) -> Result<ResolvedConfig> {
    let base = base_arg
        .map(|s| s.to_string())
        .or_else(|| config.and_then(|c| c.base_url.clone()))
        .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

    Ok(ResolvedConfig {
        base_url: parse_base(&base)?,
    })
}

/// Parses a base URL, normalizing it to end with '/' so that joining a
/// relative target appends a segment instead of replacing the last one.
pub fn parse_base(base: &str) -> Result<Url> {
    let normalized = if base.ends_with('/') {
        base.to_string()
    } else {
        format!("{base}/")
    };
    let url = Url::parse(&normalized).with_context(|| format!("invalid base URL '{base}'"))?;
    if !matches!(url.scheme(), "http" | "https") {
        return Err(anyhow!("base URL '{base}' must be http or https"));
    }
    Ok(url)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_config_fields() {
        let cfg: Config = serde_json::from_str(
            r#"{ "base_url": "http://budget.local:9090", "start_at_login": true }"#,
        )
        .unwrap();
        assert_eq!(cfg.base_url.as_deref(), Some("http://budget.local:9090"));
        assert_eq!(cfg.start_at_login, Some(true));
    }

    #[test]
    fn missing_fields_default_to_none() {
        let cfg: Config = serde_json::from_str("{}").unwrap();
        assert!(cfg.base_url.is_none());
        assert!(cfg.start_at_login.is_none());
    }

    #[test]
    fn resolve_defaults_to_localhost() {
        let resolved = resolve(None, None).unwrap();
        assert_eq!(resolved.base_url.as_str(), DEFAULT_BASE_URL);
    }

    #[test]
    fn resolve_prefers_argument_over_config() {
        let cfg: Config = serde_json::from_str(r#"{ "base_url": "http://a/" }"#).unwrap();
        let resolved = resolve(Some(&cfg), Some("http://b/")).unwrap();
        assert_eq!(resolved.base_url.as_str(), "http://b/");
    }

    #[test]
    fn parse_base_normalizes_trailing_slash() {
        let url = parse_base("http://budget.local:9090/app").unwrap();
        assert_eq!(url.as_str(), "http://budget.local:9090/app/");
    }

    #[test]
    fn parse_base_rejects_garbage() {
        assert!(parse_base("not a url").is_err());
        assert!(parse_base("file:///etc/passwd").is_err());
    }

    #[test]
    fn config_file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.json");
        env::set_var("BUDGETNAV_CONFIG", &path);

        let created = ensure_config_file_exists().unwrap();
        assert_eq!(created, path);
        let cfg = load_optional().unwrap().unwrap();
        assert_eq!(cfg.base_url.as_deref(), Some(DEFAULT_BASE_URL));
        assert_eq!(cfg.start_at_login, Some(false));

        patch_start_at_login(true).unwrap();
        let cfg = load_optional().unwrap().unwrap();
        assert_eq!(cfg.start_at_login, Some(true));
        // The patch must not clobber unrelated keys.
        assert_eq!(cfg.base_url.as_deref(), Some(DEFAULT_BASE_URL));

        env::remove_var("BUDGETNAV_CONFIG");
    }
}
