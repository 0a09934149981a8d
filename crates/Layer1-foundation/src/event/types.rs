//! Event Types - 호스트 알림 이벤트 정의
//!
//! 모듈 라이프사이클과 컴패니언 스케줄링에서 발생하는 알림을 정의합니다.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::HashMap;

// ============================================================================
// Event ID
// ============================================================================

/// 이벤트 고유 ID
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EventId(pub String);

impl EventId {
    /// 새 이벤트 ID 생성
    pub fn new() -> Self {
        Self(uuid::Uuid::new_v4().to_string())
    }
}

impl Default for EventId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for EventId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// ============================================================================
// Event Category
// ============================================================================

/// 이벤트 카테고리
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventCategory {
    /// 호스트 자체 (시작, 설정 변경)
    System,
    /// 모듈 로드/언로드
    Lifecycle,
    /// 컴패니언 서브모듈 스케줄링
    Companion,
    /// 이벤트 구독 추적
    Subscription,
    /// 에러 이벤트
    Error,
}

impl EventCategory {
    /// 카테고리 문자열 반환
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::Lifecycle => "lifecycle",
            Self::Companion => "companion",
            Self::Subscription => "subscription",
            Self::Error => "error",
        }
    }
}

// ============================================================================
// Event Severity
// ============================================================================

/// 이벤트 심각도
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSeverity {
    Debug,
    Info,
    Warning,
    Error,
}

impl Default for EventSeverity {
    fn default() -> Self {
        Self::Info
    }
}

// ============================================================================
// HostEvent - 핵심 이벤트 타입
// ============================================================================

/// 호스트 알림 이벤트
///
/// 알림은 정보 전달용입니다. 리스너의 실패는 관찰 중인 로드/언로드를
/// 중단시키지 않습니다.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HostEvent {
    /// 이벤트 ID
    pub id: EventId,

    /// 이벤트 타입 (예: "module.loaded", "companion.deferred")
    pub event_type: String,

    /// 이벤트 카테고리
    pub category: EventCategory,

    /// 심각도
    pub severity: EventSeverity,

    /// 이벤트 발생 시간
    pub timestamp: DateTime<Utc>,

    /// 이벤트 소스
    pub source: String,

    /// 관련 모듈 전체 이름 (있는 경우)
    pub module: Option<String>,

    /// 이벤트 데이터
    pub data: Value,

    /// 추가 메타데이터
    pub metadata: HashMap<String, Value>,
}

impl HostEvent {
    /// 새 이벤트 생성
    pub fn new(event_type: impl Into<String>, category: EventCategory) -> Self {
        Self {
            id: EventId::new(),
            event_type: event_type.into(),
            category,
            severity: EventSeverity::Info,
            timestamp: Utc::now(),
            source: String::new(),
            module: None,
            data: Value::Null,
            metadata: HashMap::new(),
        }
    }

    /// 심각도 설정
    pub fn with_severity(mut self, severity: EventSeverity) -> Self {
        self.severity = severity;
        self
    }

    /// 소스 설정
    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }

    /// 모듈 설정
    pub fn with_module(mut self, module: impl Into<String>) -> Self {
        self.module = Some(module.into());
        self
    }

    /// 데이터 설정
    pub fn with_data(mut self, data: Value) -> Self {
        self.data = data;
        self
    }

    /// 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    /// 관련 모듈 이름이 일치하는지 확인
    pub fn is_for(&self, module: &str) -> bool {
        self.module.as_deref() == Some(module)
    }
}

// ============================================================================
// 사전 정의된 이벤트 타입들
// ============================================================================

/// 시스템 이벤트
pub mod system {
    use super::*;

    /// 호스트 시작 이벤트
    pub fn started(version: &str) -> HostEvent {
        HostEvent::new("system.started", EventCategory::System)
            .with_source("host")
            .with_data(serde_json::json!({
                "version": version,
            }))
    }
}

/// 모듈 라이프사이클 이벤트
pub mod lifecycle {
    use super::*;

    /// 초기화 시작 (의존성이 모두 Loaded 된 뒤)
    pub fn initializing(module: &str, dependencies: &[String]) -> HostEvent {
        HostEvent::new("module.initializing", EventCategory::Lifecycle)
            .with_source("lifecycle")
            .with_module(module)
            .with_data(serde_json::json!({
                "dependencies": dependencies,
            }))
    }

    /// 로드 완료
    pub fn loaded(module: &str, version: &str) -> HostEvent {
        HostEvent::new("module.loaded", EventCategory::Lifecycle)
            .with_source("lifecycle")
            .with_module(module)
            .with_data(serde_json::json!({
                "version": version,
            }))
    }

    /// 초기화 취소
    pub fn init_canceled(module: &str, step: &str) -> HostEvent {
        HostEvent::new("module.init_canceled", EventCategory::Lifecycle)
            .with_severity(EventSeverity::Warning)
            .with_source("lifecycle")
            .with_module(module)
            .with_data(serde_json::json!({
                "step": step,
            }))
    }

    /// void 시작
    pub fn voiding(module: &str) -> HostEvent {
        HostEvent::new("module.voiding", EventCategory::Lifecycle)
            .with_source("lifecycle")
            .with_module(module)
    }

    /// void 취소
    pub fn void_canceled(module: &str, step: &str) -> HostEvent {
        HostEvent::new("module.void_canceled", EventCategory::Lifecycle)
            .with_severity(EventSeverity::Warning)
            .with_source("lifecycle")
            .with_module(module)
            .with_data(serde_json::json!({
                "step": step,
            }))
    }

    /// 언로드 완료
    pub fn unloaded(module: &str, reloading: bool) -> HostEvent {
        HostEvent::new("module.unloaded", EventCategory::Lifecycle)
            .with_source("lifecycle")
            .with_module(module)
            .with_data(serde_json::json!({
                "reloading": reloading,
            }))
    }

    /// 리로드 완료
    pub fn reloaded(requested: &[String], reactivated: usize) -> HostEvent {
        HostEvent::new("module.reloaded", EventCategory::Lifecycle)
            .with_source("lifecycle")
            .with_data(serde_json::json!({
                "requested": requested,
                "reactivated": reactivated,
            }))
    }
}

/// 컴패니언 이벤트
pub mod companion {
    use super::*;

    /// 부모 로드 대기 등록
    pub fn deferred(parent: &str, child: &str, requester: &str) -> HostEvent {
        HostEvent::new("companion.deferred", EventCategory::Companion)
            .with_source("companion")
            .with_module(requester)
            .with_data(serde_json::json!({
                "parent": parent,
                "child": child,
            }))
    }

    /// 컴패니언 서브모듈 로드 및 언로드 훅 부착
    pub fn attached(parent: &str, child: &str, requester: &str) -> HostEvent {
        HostEvent::new("companion.attached", EventCategory::Companion)
            .with_source("companion")
            .with_module(requester)
            .with_data(serde_json::json!({
                "parent": parent,
                "child": child,
            }))
    }
}

// ============================================================================
// 테스트
// ============================================================================
