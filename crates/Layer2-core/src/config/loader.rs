//! Configuration Loader
//!
//! ModHost 설정 로더 (`.modhost` 폴더)
//!
//! ## 검색 우선순위
//!
//! 1. User-level: `~/.modhost/settings.json`
//! 2. Project-level: `.modhost/settings.json`
//! 3. Local (gitignored): `.modhost/settings.local.json`
//!
//! 각 레벨의 스칼라 설정은 이전 레벨을 오버라이드하고, 목록은 이어 붙입니다.

use super::types::HostConfig;
use modhost_foundation::{Error, Result};
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

/// 설정 폴더 이름
pub const CONFIG_DIR_NAME: &str = ".modhost";

// ============================================================================
// ConfigLoader - 설정 로더
// ============================================================================

/// 설정 로더
pub struct ConfigLoader {
    /// 검색 경로 (우선순위 오름차순)
    search_paths: Vec<ConfigPath>,
}

#[derive(Debug, Clone)]
struct ConfigPath {
    path: PathBuf,
    priority: u8,
    description: &'static str,
}

impl ConfigLoader {
    /// 새 로더 생성 (기본 검색 경로)
    pub fn new(working_dir: &Path) -> Self {
        let mut paths = Vec::new();

        if let Some(home) = dirs::home_dir() {
            paths.push(ConfigPath {
                path: home.join(CONFIG_DIR_NAME).join("settings.json"),
                priority: 10,
                description: "User settings",
            });
        }

        paths.push(ConfigPath {
            path: working_dir.join(CONFIG_DIR_NAME).join("settings.json"),
            priority: 20,
            description: "Project settings",
        });

        paths.push(ConfigPath {
            path: working_dir.join(CONFIG_DIR_NAME).join("settings.local.json"),
            priority: 30,
            description: "Local settings",
        });

        paths.sort_by_key(|p| p.priority);

        Self { search_paths: paths }
    }

    /// 커스텀 검색 경로로 생성 (앞쪽이 낮은 우선순위)
    pub fn with_paths(paths: Vec<PathBuf>) -> Self {
        let search_paths = paths
            .into_iter()
            .enumerate()
            .map(|(i, path)| ConfigPath {
                path,
                priority: i.min(u8::MAX as usize) as u8,
                description: "Custom",
            })
            .collect();

        Self { search_paths }
    }

    /// 검색 경로 추가
    pub fn add_path(&mut self, path: PathBuf, priority: u8) {
        self.search_paths.push(ConfigPath {
            path,
            priority,
            description: "Added",
        });
        self.search_paths.sort_by_key(|p| p.priority);
    }

    /// 모든 경로에서 설정 로드하여 병합
    ///
    /// 깨진 파일은 경고만 남기고 건너뜁니다.
    pub fn load_all(&self) -> Result<HostConfig> {
        let mut merged = HostConfig::new();

        for config_path in &self.search_paths {
            if !config_path.path.exists() {
                continue;
            }

            match load_config_from_file(&config_path.path) {
                Ok(config) => {
                    info!(
                        "Loaded {} from: {}",
                        config_path.description,
                        config_path.path.display()
                    );
                    merged = merge_configs(merged, config);
                }
                Err(e) => {
                    warn!(
                        "Failed to load settings from {}: {}",
                        config_path.path.display(),
                        e
                    );
                }
            }
        }

        Ok(merged)
    }

    /// 존재하는 설정 파일 목록
    pub fn existing_files(&self) -> Vec<PathBuf> {
        self.search_paths
            .iter()
            .filter(|p| p.path.exists())
            .map(|p| p.path.clone())
            .collect()
    }
}

// ============================================================================
// 유틸리티 함수
// ============================================================================

/// 파일에서 설정 로드
pub fn load_config_from_file(path: &Path) -> Result<HostConfig> {
    let content = std::fs::read_to_string(path)?;
    let content = strip_json_comments(&content);

    let config: HostConfig = serde_json::from_str(&content).map_err(|e| {
        Error::Config(format!("Invalid settings.json at {}: {}", path.display(), e))
    })?;

    debug!(
        "Loaded config from {}: {} search dirs, {} auto-load",
        path.display(),
        config.search_dirs.len(),
        config.auto_load.len()
    );

    Ok(config)
}

/// 두 설정 병합 (later가 earlier를 오버라이드)
pub fn merge_configs(earlier: HostConfig, later: HostConfig) -> HostConfig {
    HostConfig {
        search_dirs: concat_dedup(earlier.search_dirs, later.search_dirs),
        base_prefix: later.base_prefix.or(earlier.base_prefix),
        event_history: later.event_history.or(earlier.event_history),
        auto_load: concat_dedup(earlier.auto_load, later.auto_load),
        extra: {
            let mut merged = earlier.extra;
            merged.extend(later.extra);
            merged
        },
    }
}

fn concat_dedup<T: PartialEq>(mut earlier: Vec<T>, later: Vec<T>) -> Vec<T> {
    for item in later {
        if !earlier.contains(&item) {
            earlier.push(item);
        }
    }
    earlier
}

/// JSON 주석 제거 (// 및 /* */)
///
/// 문자열 리터럴 안의 `//`는 보존합니다.
pub fn strip_json_comments(input: &str) -> String {
    let mut output = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();
    let mut in_string = false;

    while let Some(c) = chars.next() {
        if in_string {
            output.push(c);
            match c {
                '\\' => {
                    if let Some(escaped) = chars.next() {
                        output.push(escaped);
                    }
                }
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }

        match (c, chars.peek().copied()) {
            ('"', _) => {
                in_string = true;
                output.push(c);
            }
            ('/', Some('/')) => {
                // 라인 주석: 개행은 유지
                for skipped in chars.by_ref() {
                    if skipped == '\n' {
                        output.push('\n');
                        break;
                    }
                }
            }
            ('/', Some('*')) => {
                chars.next();
                let mut prev = '\0';
                for skipped in chars.by_ref() {
                    if prev == '*' && skipped == '/' {
                        break;
                    }
                    prev = skipped;
                }
            }
            _ => output.push(c),
        }
    }

    output
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    #[test]
    fn test_config_loader_new() {
        let loader = ConfigLoader::new(Path::new("."));
        assert!(loader.search_paths.len() >= 2);
    }

    #[test]
    fn test_load_config_from_file() {
        let dir = tempdir().unwrap();
        let config_file = dir.path().join("settings.json");

        fs::write(
            &config_file,
            r#"{
                // 로컬 모듈 디렉토리
                "searchDirs": ["mods"],
                "basePrefix": "lib."
            }"#,
        )
        .unwrap();

        let config = load_config_from_file(&config_file).unwrap();
        assert_eq!(config.search_dirs, vec![PathBuf::from("mods")]);
        assert_eq!(config.base_prefix(), "lib.");
    }

    #[test]
    fn test_invalid_config_is_config_error() {
        let dir = tempdir().unwrap();
        let config_file = dir.path().join("settings.json");
        fs::write(&config_file, "{ not json").unwrap();

        let err = load_config_from_file(&config_file).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_merge_configs() {
        let earlier = HostConfig {
            search_dirs: vec![PathBuf::from("a"), PathBuf::from("b")],
            base_prefix: Some("early.".to_string()),
            event_history: Some(10),
            ..Default::default()
        };

        let later = HostConfig {
            search_dirs: vec![PathBuf::from("b"), PathBuf::from("c")],
            event_history: Some(99),
            ..Default::default()
        };

        let merged = merge_configs(earlier, later);

        assert_eq!(
            merged.search_dirs,
            vec![PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
        // later의 base_prefix가 None이므로 earlier 유지
        assert_eq!(merged.base_prefix(), "early.");
        assert_eq!(merged.event_history(), 99);
    }

    #[test]
    fn test_strip_json_comments() {
        let input = r#"{
            // This is a comment
            "key": "value", /* inline comment */
            "url": "http://example.com/path"
        }"#;

        let output = strip_json_comments(input);
        assert!(!output.contains("comment"));
        assert!(output.contains("\"key\""));
        assert!(output.contains("http://example.com/path"));

        let parsed: serde_json::Value = serde_json::from_str(&output).unwrap();
        assert_eq!(parsed["key"], "value");
    }

    #[test]
    fn test_loader_load_all() {
        let dir = tempdir().unwrap();
        let config_dir = dir.path().join(CONFIG_DIR_NAME);
        fs::create_dir_all(&config_dir).unwrap();

        fs::write(
            config_dir.join("settings.json"),
            r#"{"searchDirs": ["mods"], "autoLoad": ["chat"]}"#,
        )
        .unwrap();
        fs::write(
            config_dir.join("settings.local.json"),
            r#"{"autoLoad": ["chat", "games"], "basePrefix": "local."}"#,
        )
        .unwrap();

        let loader = ConfigLoader::with_paths(vec![
            config_dir.join("settings.json"),
            config_dir.join("settings.local.json"),
        ]);
        let config = loader.load_all().unwrap();

        assert_eq!(config.auto_load, vec!["chat".to_string(), "games".to_string()]);
        assert_eq!(config.base_prefix(), "local.");
        assert_eq!(loader.existing_files().len(), 2);
    }

    #[test]
    fn test_broken_file_is_skipped() {
        let dir = tempdir().unwrap();
        let good = dir.path().join("good.json");
        let broken = dir.path().join("broken.json");
        fs::write(&good, r#"{"eventHistory": 8}"#).unwrap();
        fs::write(&broken, "[").unwrap();

        let loader = ConfigLoader::with_paths(vec![good, broken]);
        let config = loader.load_all().unwrap();
        assert_eq!(config.event_history(), 8);
    }
}
