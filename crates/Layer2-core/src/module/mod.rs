//! # Module System
//!
//! 이름으로 모듈을 로드/언로드/리로드하는 확장 호스트입니다.
//!
//! ## 구성 요소
//!
//! | 구성 요소 | 역할 |
//! |-----------|------|
//! | [`ModuleHost`] | 라이프사이클 관리 (load / unload / reload) |
//! | [`DependencyIndex`] | 이름 → 인스턴스, 역방향 의존 조회 |
//! | [`SubscriptionTracker`] | 모듈 실행 중 등록된 콜백 기록, 언로드 시 해제 |
//! | [`CompanionScheduler`] | "P가 로드되면 S를 로드" 대기 |
//! | [`ManifestResolver`] | 이름 + 검색 경로 → [`ModuleDescriptor`] |
//! | [`BindingHost`] | 디스크립터 → 실행 가능한 코드 ([`ModuleCode`]) |
//!
//! ## 라이프사이클
//!
//! ```text
//! Unloaded → ResolvingDeps → Activated → Initializing → Loaded
//!                                            │              │
//!                                   (init 취소: 롤백)    Voiding → Deactivated → Unloaded
//!                                                           │
//!                                                  (void 취소: Loaded 유지)
//! ```

mod binding;
mod companion;
mod descriptor;
mod error;
mod hooks;
mod index;
mod instance;
mod load;
mod manager;
mod resolver;
mod tracker;
mod unload;

pub use binding::{
    BindingHandle, BindingHost, CodeFactory, ModuleCode, PassiveCode, RegistryBindingHost,
};
pub use companion::{CompanionScheduler, CompanionWait};
pub use descriptor::{DescriptorFlags, ModuleDescriptor, ModuleVersion, SUBMODULE_SEPARATOR};
pub use error::{ModuleError, Result};
pub use hooks::{
    run_steps, ChainResult, HookChain, HookFn, HookOutcome, HookStep, PRIORITY_FIRST,
    PRIORITY_LAST, PRIORITY_MODULE,
};
pub use index::DependencyIndex;
pub use instance::{ModuleInstance, ModuleState};
pub use manager::{HostBuilder, ModuleHost, ModuleTarget, UnloadOptions};
pub use resolver::{
    dependency_plan, JsonManifestResolver, ManifestResolver, StaticManifestResolver,
    MANIFEST_FILE,
};
pub use tracker::{ExecGuard, SubscriptionRecord, SubscriptionTracker, TRACKER_OBSERVER_NAME};
