//! Event System - 알림 버스와 구독 소스
//!
//! 두 가지 이벤트 개념을 제공합니다.
//!
//! - [`EventBus`]: 호스트가 발행하는 정보성 알림 (`module.loaded` 등)
//! - [`EventEmitter`]: 모듈 코드가 콜백을 등록하는 취소 가능한 토픽 소스
//!
//! ## 아키텍처
//!
//! ```text
//! ┌──────────────────────────────┐      ┌──────────────────────────────┐
//! │          EventBus            │      │        EventEmitter          │
//! │  publish(HostEvent) ───┐     │      │  subscribe(topic, cb) ──┐    │
//! │                        ▼     │      │                         ▼    │
//! │  ┌──────────┐ ┌──────────┐   │      │  SubscriptionObserver (추적) │
//! │  │Listener 1│ │Listener N│   │      │  Subscribed / Unsubscribed / │
//! │  └──────────┘ └──────────┘   │      │  TopicCleared                │
//! └──────────────────────────────┘      └──────────────────────────────┘
//! ```
//!
//! ## 사용법
//!
//! ```ignore
//! use modhost_foundation::event::{EventBus, EventEmitter, HostEvent, EventCategory};
//!
//! let bus = EventBus::new();
//! bus.subscribe(Arc::new(MyListener));
//! bus.publish(HostEvent::new("system.started", EventCategory::System));
//!
//! let chat = EventEmitter::new("chat");
//! let id = chat.subscribe("message", Arc::new(|payload| { /* ... */ }));
//! chat.unsubscribe("message", id);
//! ```

pub mod bus;
pub mod source;
pub mod types;

pub use bus::{EventBus, EventBusConfig, EventFilter, EventListener, ListenerId};

pub use source::{
    CallbackId, EventCallback, EventEmitter, EventSource, SourceId, SubscriptionNotice,
    SubscriptionObserver,
};

pub use types::{
    // Event constructors
    companion,
    lifecycle,
    system,
    // Core types
    EventCategory,
    EventId,
    EventSeverity,
    HostEvent,
};
