//! Event Bus - 호스트 알림 브로드캐스트
//!
//! 동기식 발행/구독 시스템. 호스트는 단일 호출 스택 안에서 알림을 발행하므로
//! 리스너도 같은 스레드에서 순서대로 호출됩니다.

use super::types::{EventCategory, EventSeverity, HostEvent};
use crate::Result;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, trace, warn};

// ============================================================================
// EventListener Trait
// ============================================================================

/// 이벤트 리스너 ID
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl ListenerId {
    fn new(id: u64) -> Self {
        Self(id)
    }
}

impl std::fmt::Display for ListenerId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// 이벤트 리스너 trait
pub trait EventListener: Send + Sync {
    /// 리스너 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 관심 있는 이벤트 카테고리 (None이면 모든 이벤트)
    fn categories(&self) -> Option<Vec<EventCategory>> {
        None
    }

    /// 이벤트 처리
    ///
    /// 에러를 반환해도 발행은 계속됩니다. 에러는 로그로만 남습니다.
    fn on_event(&self, event: &HostEvent) -> Result<()>;
}

// ============================================================================
// EventFilter
// ============================================================================

/// 이벤트 필터
#[derive(Debug, Clone, Default)]
pub struct EventFilter {
    /// 카테고리 필터
    pub categories: Option<Vec<EventCategory>>,

    /// 이벤트 타입 패턴 (prefix 매칭)
    pub event_types: Option<Vec<String>>,

    /// 모듈 필터
    pub modules: Option<Vec<String>>,

    /// 최소 심각도
    pub min_severity: Option<EventSeverity>,
}

impl EventFilter {
    /// 새 필터 생성
    pub fn new() -> Self {
        Self::default()
    }

    /// 카테고리 필터 추가
    pub fn with_categories(mut self, categories: Vec<EventCategory>) -> Self {
        self.categories = Some(categories);
        self
    }

    /// 이벤트 타입 필터 추가
    pub fn with_event_types(mut self, types: Vec<String>) -> Self {
        self.event_types = Some(types);
        self
    }

    /// 모듈 필터 추가
    pub fn with_modules(mut self, modules: Vec<String>) -> Self {
        self.modules = Some(modules);
        self
    }

    /// 최소 심각도 설정
    pub fn with_min_severity(mut self, severity: EventSeverity) -> Self {
        self.min_severity = Some(severity);
        self
    }

    /// 이벤트가 필터를 통과하는지 확인
    pub fn matches(&self, event: &HostEvent) -> bool {
        if let Some(ref cats) = self.categories {
            if !cats.contains(&event.category) {
                return false;
            }
        }

        // prefix 매칭
        if let Some(ref types) = self.event_types {
            if !types.iter().any(|t| event.event_type.starts_with(t)) {
                return false;
            }
        }

        if let Some(ref modules) = self.modules {
            match &event.module {
                Some(module) if modules.contains(module) => {}
                _ => return false,
            }
        }

        if let Some(min_sev) = self.min_severity {
            if event.severity < min_sev {
                return false;
            }
        }

        true
    }
}

// ============================================================================
// EventBus
// ============================================================================

/// 이벤트 버스 설정
#[derive(Debug, Clone)]
pub struct EventBusConfig {
    /// 이벤트 히스토리 보관 개수
    pub history_size: usize,

    /// 디버그 모드 (모든 이벤트 로깅)
    pub debug_mode: bool,
}

impl Default for EventBusConfig {
    fn default() -> Self {
        Self {
            history_size: 256,
            debug_mode: false,
        }
    }
}

/// 등록된 리스너 정보
#[derive(Clone)]
struct RegisteredListener {
    listener: Arc<dyn EventListener>,
    filter: Option<EventFilter>,
}

impl RegisteredListener {
    fn wants(&self, event: &HostEvent) -> bool {
        match &self.filter {
            Some(filter) => filter.matches(event),
            None => match self.listener.categories() {
                Some(cats) => cats.contains(&event.category),
                None => true,
            },
        }
    }
}

/// 이벤트 버스
///
/// ## 사용법
///
/// ```ignore
/// use modhost_foundation::event::{EventBus, HostEvent, EventCategory};
///
/// let bus = EventBus::new();
/// let id = bus.subscribe(my_listener);
/// bus.publish(HostEvent::new("test.event", EventCategory::System));
/// bus.unsubscribe(id);
/// ```
pub struct EventBus {
    /// 설정
    config: EventBusConfig,

    /// 등록된 리스너
    listeners: RwLock<HashMap<ListenerId, RegisteredListener>>,

    /// 리스너 ID 카운터
    listener_counter: AtomicU64,

    /// 이벤트 히스토리
    history: RwLock<Vec<HostEvent>>,

    /// 발행된 이벤트 수
    event_count: AtomicU64,
}

impl EventBus {
    /// 기본 설정으로 이벤트 버스 생성
    pub fn new() -> Self {
        Self::with_config(EventBusConfig::default())
    }

    /// 커스텀 설정으로 이벤트 버스 생성
    pub fn with_config(config: EventBusConfig) -> Self {
        Self {
            config,
            listeners: RwLock::new(HashMap::new()),
            listener_counter: AtomicU64::new(0),
            history: RwLock::new(Vec::new()),
            event_count: AtomicU64::new(0),
        }
    }

    /// 리스너 등록
    pub fn subscribe(&self, listener: Arc<dyn EventListener>) -> ListenerId {
        self.subscribe_with_filter(listener, None)
    }

    /// 필터와 함께 리스너 등록
    pub fn subscribe_with_filter(
        &self,
        listener: Arc<dyn EventListener>,
        filter: Option<EventFilter>,
    ) -> ListenerId {
        let id = ListenerId::new(self.listener_counter.fetch_add(1, Ordering::SeqCst));

        debug!(
            listener_name = listener.name(),
            listener_id = %id,
            "Registering event listener"
        );

        self.listeners
            .write()
            .insert(id, RegisteredListener { listener, filter });

        id
    }

    /// 리스너 해제
    pub fn unsubscribe(&self, id: ListenerId) -> bool {
        let removed = self.listeners.write().remove(&id).is_some();

        if removed {
            debug!(listener_id = %id, "Unregistered event listener");
        }

        removed
    }

    /// 이벤트 발행
    pub fn publish(&self, event: HostEvent) {
        let event_count = self.event_count.fetch_add(1, Ordering::SeqCst);

        if self.config.debug_mode {
            trace!(
                event_id = %event.id,
                event_type = %event.event_type,
                category = ?event.category,
                "Publishing event #{}", event_count + 1
            );
        }

        {
            let mut history = self.history.write();
            history.push(event.clone());

            if history.len() > self.config.history_size {
                let overflow = history.len() - self.config.history_size;
                history.drain(..overflow);
            }
        }

        // 리스너가 버스를 다시 호출할 수 있으므로 스냅샷 후 잠금 해제
        let listeners: Vec<(ListenerId, RegisteredListener)> = self
            .listeners
            .read()
            .iter()
            .map(|(id, registered)| (*id, registered.clone()))
            .collect();

        for (id, registered) in listeners {
            if !registered.wants(&event) {
                continue;
            }

            trace!(
                listener_id = %id,
                listener_name = registered.listener.name(),
                event_type = %event.event_type,
                "Delivering event to listener"
            );

            if let Err(e) = registered.listener.on_event(&event) {
                warn!(
                    listener_name = registered.listener.name(),
                    event_type = %event.event_type,
                    "Event listener failed: {}", e
                );
            }
        }
    }

    /// 최근 이벤트 히스토리 조회 (최신 순)
    pub fn history(&self, limit: Option<usize>) -> Vec<HostEvent> {
        let history = self.history.read();
        let limit = limit.unwrap_or(history.len());
        history.iter().rev().take(limit).cloned().collect()
    }

    /// 필터로 히스토리 검색 (발행 순)
    pub fn search_history(&self, filter: &EventFilter) -> Vec<HostEvent> {
        self.history
            .read()
            .iter()
            .filter(|e| filter.matches(e))
            .cloned()
            .collect()
    }

    /// 등록된 리스너 수
    pub fn listener_count(&self) -> usize {
        self.listeners.read().len()
    }

    /// 총 발행된 이벤트 수
    pub fn event_count(&self) -> u64 {
        self.event_count.load(Ordering::SeqCst)
    }

    /// 히스토리 클리어
    pub fn clear_history(&self) {
        self.history.write().clear();
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// 테스트
// ============================================================================
