//! Configuration 타입 정의
//!
//! `settings.json` 스키마 (camelCase)

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// 기본 base 의존성 접두사
pub const DEFAULT_BASE_PREFIX: &str = "base.";

/// 기본 알림 히스토리 크기
pub const DEFAULT_EVENT_HISTORY: usize = 256;

// ============================================================================
// HostConfig - 통합 설정
// ============================================================================

/// ModHost 통합 설정
///
/// 스칼라 값은 `Option`으로 두어 병합 시 "지정되지 않음"과 기본값을 구분합니다.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct HostConfig {
    // ========================================================================
    // 모듈 검색
    // ========================================================================
    /// 모듈 검색 디렉토리 (순서대로 시도)
    #[serde(default)]
    pub search_dirs: Vec<PathBuf>,

    /// base 의존성 이름 접두사
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_prefix: Option<String>,

    // ========================================================================
    // 알림
    // ========================================================================
    /// 알림 히스토리 크기
    #[serde(skip_serializing_if = "Option::is_none")]
    pub event_history: Option<usize>,

    // ========================================================================
    // 시작 시 로드
    // ========================================================================
    /// CLI가 시작할 때 로드할 모듈들
    #[serde(default)]
    pub auto_load: Vec<String>,

    // ========================================================================
    // 확장 설정 (임의의 키-값)
    // ========================================================================
    /// 확장 설정
    #[serde(flatten)]
    pub extra: HashMap<String, serde_json::Value>,
}

impl HostConfig {
    /// 새 설정 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 패턴: 검색 디렉토리 추가
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.search_dirs.push(dir.into());
        self
    }

    /// 빌더 패턴: base 접두사 설정
    pub fn with_base_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.base_prefix = Some(prefix.into());
        self
    }

    /// 빌더 패턴: 알림 히스토리 크기 설정
    pub fn with_event_history(mut self, size: usize) -> Self {
        self.event_history = Some(size);
        self
    }

    /// base 접두사 (기본값 포함)
    pub fn base_prefix(&self) -> &str {
        self.base_prefix.as_deref().unwrap_or(DEFAULT_BASE_PREFIX)
    }

    /// 알림 히스토리 크기 (기본값 포함)
    pub fn event_history(&self) -> usize {
        self.event_history.unwrap_or(DEFAULT_EVENT_HISTORY)
    }

    /// 상대 경로를 `working_dir` 기준으로 풀어낸 검색 디렉토리
    pub fn resolved_search_dirs(&self, working_dir: &Path) -> Vec<PathBuf> {
        self.search_dirs
            .iter()
            .map(|dir| {
                if dir.is_absolute() {
                    dir.clone()
                } else {
                    working_dir.join(dir)
                }
            })
            .collect()
    }
}
