//! modhost-core: Core Runtime for ModHost
//!
//! Layer2 - 모듈 라이프사이클 레이어
//!
//! # 주요 모듈
//!
//! - `module`: 모듈 호스트 (로드/언로드/리로드, 의존성 인덱스, 구독 추적, 컴패니언)
//! - `config`: 설정 시스템 (검색 경로, base prefix, 자동 로드 목록)
//!
//! # 사용 예시
//!
//! ```ignore
//! use modhost_core::{ConfigLoader, ModuleHost, UnloadOptions};
//!
//! let config = ConfigLoader::new(Path::new(".")).load_all()?;
//! let host = ModuleHost::builder().with_config(config).build();
//!
//! // 이벤트 소스 관찰 (모듈이 등록한 콜백은 언로드 시 자동 해제)
//! host.observe(&chat_events);
//!
//! let chat = host.load("chat")?;
//! chat.store("greeting", json!("hello"));
//!
//! // 의존 모듈까지 내리고 다시 올림
//! let reactivated = host.reload("core")?;
//!
//! host.unload("chat", UnloadOptions::new().with_dependents())?;
//! ```

pub mod config;
pub mod module;

// Re-exports: Config
pub use config::{ConfigLoader, HostConfig, CONFIG_DIR_NAME};

// Re-exports: Module
pub use module::{
    // Host
    HostBuilder,
    ModuleHost,
    ModuleTarget,
    UnloadOptions,
    // Instance
    ModuleInstance,
    ModuleState,
    // Descriptor / resolution
    JsonManifestResolver,
    ManifestResolver,
    ModuleDescriptor,
    ModuleVersion,
    StaticManifestResolver,
    // Binding
    BindingHost,
    ModuleCode,
    RegistryBindingHost,
    // Hooks
    HookOutcome,
    PRIORITY_FIRST,
    PRIORITY_LAST,
    PRIORITY_MODULE,
    // Errors
    ModuleError,
};

/// Layer1 재노출
pub use modhost_foundation::{
    EventBus, EventCategory, EventEmitter, EventListener, EventSource, HostEvent,
};
