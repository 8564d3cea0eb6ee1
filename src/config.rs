use crate::bracket::BracketFormat;
use crate::types::*;
use std::{
  env,
  fs,
  path::{Path, PathBuf},
  time::{SystemTime, UNIX_EPOCH},
};

const DEFAULT_STORE_FILE: &str = "data/bracket_store.json";
const DOUBLE_ELIMINATION_ALLIANCES: u32 = 8;

pub fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR"))
}

pub fn resolve_repo_path(raw: &str) -> PathBuf {
  let path = PathBuf::from(raw);
  if path.is_absolute() {
    path
  } else {
    repo_root().join(path)
  }
}

pub fn config_path() -> PathBuf {
  match env_default("BRACKET_CONFIG_PATH") {
    Some(raw) => resolve_repo_path(&raw),
    None => repo_root().join("config.json"),
  }
}

pub fn logs_dir() -> PathBuf {
  repo_root().join("logs")
}

pub fn env_default(key: &str) -> Option<String> {
  env::var(key)
    .ok()
    .map(|value| value.trim().to_string())
    .filter(|value| !value.is_empty())
}

pub fn apply_env_defaults(mut config: AppConfig) -> AppConfig {
  if config.store_path.trim().is_empty() {
    config.store_path = env_default("BRACKET_STORE_PATH").unwrap_or_else(|| DEFAULT_STORE_FILE.to_string());
  }
  if config.listen_addr.trim().is_empty() {
    config.listen_addr = env_default("BRACKET_LISTEN_ADDR").unwrap_or_else(|| DEFAULT_LISTEN_ADDR.to_string());
  }
  config
}

/// Double elimination only has a layout for eight alliances, so any other
/// size is moved to eight unless a custom topology file is configured.
pub fn normalize_config(mut config: AppConfig) -> AppConfig {
  let builtin_double = config.format == BracketFormat::DoubleElimination && config.topology_path.trim().is_empty();
  if builtin_double && config.alliance_count != DOUBLE_ELIMINATION_ALLIANCES {
    tracing::warn!(
      "double elimination needs {DOUBLE_ELIMINATION_ALLIANCES} alliances; using {DOUBLE_ELIMINATION_ALLIANCES} instead of {}",
      config.alliance_count
    );
    config.alliance_count = DOUBLE_ELIMINATION_ALLIANCES;
  }
  config
}

pub fn load_config() -> Result<AppConfig, String> {
  load_config_from(&config_path())
}

pub fn load_config_from(path: &Path) -> Result<AppConfig, String> {
  if !path.is_file() {
    return Ok(normalize_config(apply_env_defaults(AppConfig::default())));
  }
  let data = fs::read_to_string(path).map_err(|e| format!("read config {}: {e}", path.display()))?;
  let config =
    serde_json::from_str::<AppConfig>(&data).map_err(|e| format!("parse config {}: {e}", path.display()))?;
  Ok(normalize_config(apply_env_defaults(config)))
}

pub fn match_spacing_ms(config: &AppConfig) -> u64 {
  config.match_spacing_sec.saturating_mul(1000)
}

pub fn store_path(config: &AppConfig) -> PathBuf {
  resolve_repo_path(config.store_path.trim())
}

pub fn topology_path(config: &AppConfig) -> Option<PathBuf> {
  let trimmed = config.topology_path.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(resolve_repo_path(trimmed))
}

pub fn static_dir(config: &AppConfig) -> Option<PathBuf> {
  let trimmed = config.static_dir.trim();
  if trimmed.is_empty() {
    return None;
  }
  Some(resolve_repo_path(trimmed))
}

pub fn load_env_file() {
  let env_path = repo_root().join(".env");
  if !env_path.is_file() {
    return;
  }
  let contents = match fs::read_to_string(&env_path) {
    Ok(data) => data,
    Err(_) => return,
  };
  for line in contents.lines() {
    if let Some((key, value)) = parse_env_line(line) {
      if env::var_os(&key).is_none() {
        env::set_var(key, value);
      }
    }
  }
}

pub fn parse_env_line(line: &str) -> Option<(String, String)> {
  let trimmed = line.trim();
  if trimmed.is_empty() || trimmed.starts_with('#') {
    return None;
  }
  let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
  let (key, raw_value) = trimmed.split_once('=')?;
  let key = key.trim();
  if key.is_empty() {
    return None;
  }
  let mut value = raw_value.trim();
  if value.starts_with('"') && value.ends_with('"') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if value.starts_with('\'') && value.ends_with('\'') && value.len() >= 2 {
    value = &value[1..value.len() - 1];
  } else if let Some(idx) = value.find('#') {
    value = value[..idx].trim_end();
  }
  Some((key.to_string(), value.to_string()))
}

pub fn now_ms() -> u64 {
  SystemTime::now()
    .duration_since(UNIX_EPOCH)
    .unwrap_or_default()
    .as_millis() as u64
}

/// Problems that will not stop startup but will stall the bracket later.
pub fn config_warnings(config: &AppConfig) -> Vec<String> {
  let mut warnings = Vec::new();
  for seed in 1..=config.alliance_count {
    if !config.alliances.iter().any(|alliance| alliance.id == seed) {
      warnings.push(format!("alliance {seed} missing from config; matchups it is seeded into will not be created"));
    }
  }
  if let Some(dir) = static_dir(config) {
    if !dir.is_dir() {
      warnings.push(format!("static dir {} does not exist; only the JSON routes will be served", dir.display()));
    }
  }
  if config.match_spacing_sec == 0 {
    warnings.push("matchSpacingSec is 0; every game of a series shares one scheduled time".to_string());
  }
  warnings
}

pub fn log_env_warnings(config: &AppConfig) {
  for msg in config_warnings(config) {
    tracing::warn!("{}", msg);
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  fn alliance(id: AllianceId) -> Alliance {
    Alliance { id, lineup: [id * 100 + 1, id * 100 + 2, id * 100 + 3] }
  }

  #[test]
  fn test_parse_env_line() {
    assert_eq!(parse_env_line("# comment"), None);
    assert_eq!(parse_env_line("   "), None);
    assert_eq!(parse_env_line("=value"), None);
    assert_eq!(
      parse_env_line("export BRACKET_LISTEN_ADDR=0.0.0.0:9000"),
      Some(("BRACKET_LISTEN_ADDR".to_string(), "0.0.0.0:9000".to_string()))
    );
    assert_eq!(
      parse_env_line("BRACKET_STORE_PATH=\"/tmp/store.json\""),
      Some(("BRACKET_STORE_PATH".to_string(), "/tmp/store.json".to_string()))
    );
    assert_eq!(
      parse_env_line("KEY='a # b'"),
      Some(("KEY".to_string(), "a # b".to_string()))
    );
    assert_eq!(
      parse_env_line("KEY=value # trailing"),
      Some(("KEY".to_string(), "value".to_string()))
    );
  }

  #[test]
  fn test_resolve_repo_path() {
    assert_eq!(resolve_repo_path("/abs/store.json"), PathBuf::from("/abs/store.json"));
    assert_eq!(resolve_repo_path("data/store.json"), repo_root().join("data/store.json"));
  }

  #[test]
  fn test_explicit_values_win_over_env_defaults() {
    let config = AppConfig {
      store_path: "custom.json".to_string(),
      listen_addr: "0.0.0.0:1".to_string(),
      ..AppConfig::default()
    };
    let config = apply_env_defaults(config);
    assert_eq!(config.store_path, "custom.json");
    assert_eq!(config.listen_addr, "0.0.0.0:1");
    assert_eq!(store_path(&config), repo_root().join("custom.json"));
  }

  #[test]
  fn test_load_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(
      &path,
      r#"{
        "format": "singleElimination",
        "allianceCount": 4,
        "alliances": [{ "id": 1, "lineup": [101, 102, 103] }],
        "storePath": "s.json",
        "listenAddr": "127.0.0.1:1"
      }"#,
    )
    .unwrap();

    let config = load_config_from(&path).unwrap();
    assert_eq!(config.format, BracketFormat::SingleElimination);
    assert_eq!(config.alliance_count, 4);
    assert_eq!(config.alliances, vec![alliance(1)]);
    assert_eq!(config.match_spacing_sec, DEFAULT_MATCH_SPACING_SEC);
    assert_eq!(match_spacing_ms(&config), DEFAULT_MATCH_SPACING_SEC * 1000);
    assert_eq!(topology_path(&config), None);
  }

  #[test]
  fn test_double_elimination_size_is_coerced_to_eight() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, r#"{ "format": "doubleElimination", "allianceCount": 3 }"#).unwrap();
    assert_eq!(load_config_from(&path).unwrap().alliance_count, 8);

    let custom = AppConfig { alliance_count: 6, topology_path: "six.json".to_string(), ..AppConfig::default() };
    assert_eq!(normalize_config(custom).alliance_count, 6);
    let single = AppConfig { format: BracketFormat::SingleElimination, alliance_count: 16, ..AppConfig::default() };
    assert_eq!(normalize_config(single).alliance_count, 16);
  }

  #[test]
  fn test_huge_match_spacing_saturates() {
    let config = AppConfig { match_spacing_sec: u64::MAX / 10, ..AppConfig::default() };
    assert_eq!(match_spacing_ms(&config), u64::MAX);
  }

  #[test]
  fn test_parse_error_names_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.json");
    fs::write(&path, "{ nope").unwrap();
    let err = load_config_from(&path).unwrap_err();
    assert!(err.starts_with("parse config"), "{err}");
  }

  #[test]
  fn test_config_warnings_list_missing_alliances() {
    let config = AppConfig {
      alliance_count: 3,
      alliances: vec![alliance(1), alliance(3)],
      ..AppConfig::default()
    };
    let warnings = config_warnings(&config);
    assert_eq!(warnings.len(), 1);
    assert!(warnings[0].starts_with("alliance 2 missing"));
  }
}
