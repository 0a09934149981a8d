//! # modhost-foundation
//!
//! Foundation layer for ModHost:
//! - Error: 레이어 공통 에러 타입
//! - Event: 호스트 알림 버스 (EventBus) + 취소 가능한 구독 소스 (EventEmitter)
//!
//! ## 아키텍처
//!
//! ```text
//! ┌─────────────────────────────────────────────────────────┐
//! │  modhost-core (Lifecycle Manager)                       │
//! │     │ publish(HostEvent)        │ observe(Subscription) │
//! │     ▼                           ▼                       │
//! │  EventBus ── listeners      EventEmitter ── callbacks   │
//! │                                                         │
//! │  Error / Result (thiserror)                             │
//! └─────────────────────────────────────────────────────────┘
//! ```

pub mod error;
pub mod event;

// ============================================================================
// Error
// ============================================================================
pub use error::{Error, Result};

// ============================================================================
// Event (이벤트 시스템)
// ============================================================================
pub use event::{
    // Bus
    EventBus,
    EventBusConfig,
    // Types
    EventCategory,
    EventFilter,
    EventId,
    EventListener,
    EventSeverity,
    HostEvent,
    ListenerId,
    // Source
    CallbackId,
    EventCallback,
    EventEmitter,
    EventSource,
    SourceId,
    SubscriptionNotice,
    SubscriptionObserver,
};
