//! Module Host - 모듈 라이프사이클 관리
//!
//! 의존성 해석, 인스턴스 상태 전이, 언로드 제약(의존 모듈, 서브모듈),
//! 리로드(언로드+재로드 쌍)를 조율합니다.
//!
//! ## 사용 예시
//!
//! ```ignore
//! let host = ModuleHost::builder()
//!     .with_search_dir("mods")
//!     .with_bindings(Arc::new(bindings))
//!     .build();
//!
//! host.observe(&chat_events);
//! let chat = host.load("chat")?;
//! host.unload("chat", UnloadOptions::default())?;
//! ```
//!
//! 모든 공개 진입점은 재진입 가능한 전역 락을 잡습니다. 같은 스레드의
//! 재귀 호출(init 안에서 `load_submodule` 등)은 통과하고, 다른 스레드는 직렬화됩니다.

use super::binding::{BindingHost, RegistryBindingHost};
use super::companion::CompanionScheduler;
use super::descriptor::ModuleDescriptor;
use super::error::{ModuleError, Result};
use super::hooks::{HookChain, HookFn, HookOutcome, HookStep};
use super::index::DependencyIndex;
use super::instance::ModuleInstance;
use super::resolver::{dependency_plan, JsonManifestResolver, ManifestResolver};
use super::tracker::SubscriptionTracker;
use crate::config::HostConfig;
use modhost_foundation::{EventBus, EventBusConfig, EventEmitter, EventSource};
use parking_lot::{Mutex, ReentrantMutex};
use std::collections::HashSet;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{info, warn};

// ============================================================================
// 옵션 / 대상
// ============================================================================

/// 언로드 옵션
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct UnloadOptions {
    /// 의존 모듈을 먼저 언로드
    pub unload_dependents: bool,
    /// 서브모듈이면 부모를 대신 언로드
    pub force: bool,
}

impl UnloadOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 패턴: 의존 모듈 연쇄 언로드
    pub fn with_dependents(mut self) -> Self {
        self.unload_dependents = true;
        self
    }

    /// 빌더 패턴: 강제
    pub fn forced(mut self) -> Self {
        self.force = true;
        self
    }
}

/// 언로드/리로드 대상 (이름 또는 인스턴스)
#[derive(Debug, Clone)]
pub enum ModuleTarget {
    Name(String),
    Instance(Arc<ModuleInstance>),
}

impl From<&str> for ModuleTarget {
    fn from(name: &str) -> Self {
        Self::Name(name.to_string())
    }
}

impl From<String> for ModuleTarget {
    fn from(name: String) -> Self {
        Self::Name(name)
    }
}

impl From<&String> for ModuleTarget {
    fn from(name: &String) -> Self {
        Self::Name(name.clone())
    }
}

impl From<Arc<ModuleInstance>> for ModuleTarget {
    fn from(instance: Arc<ModuleInstance>) -> Self {
        Self::Instance(instance)
    }
}

impl From<&Arc<ModuleInstance>> for ModuleTarget {
    fn from(instance: &Arc<ModuleInstance>) -> Self {
        Self::Instance(Arc::clone(instance))
    }
}

/// 내부 언로드 호출 플래그
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct UnloadCall {
    pub unload_dependents: bool,
    pub force: bool,
    /// 부모의 언로드에서 온 호출 (void 거부 불가)
    pub unloading_submodule: bool,
    pub reloading: bool,
}

impl From<UnloadOptions> for UnloadCall {
    fn from(opts: UnloadOptions) -> Self {
        Self {
            unload_dependents: opts.unload_dependents,
            force: opts.force,
            unloading_submodule: false,
            reloading: false,
        }
    }
}

/// 리로드 중 언로드된 최상위 모듈 (언로드 순)
#[derive(Debug, Clone)]
pub(crate) struct ReloadEntry {
    pub name: String,
    pub search_dir: PathBuf,
}

// ============================================================================
// HostInner
// ============================================================================

pub(crate) struct HostInner {
    pub config: HostConfig,
    pub search_dirs: Vec<PathBuf>,
    pub resolver: Arc<dyn ManifestResolver>,
    pub bindings: Arc<dyn BindingHost>,
    pub index: DependencyIndex,
    pub companions: CompanionScheduler,
    pub tracker: Arc<SubscriptionTracker>,
    pub events: Arc<EventBus>,
    pub op_lock: ReentrantMutex<()>,
    /// 의존성 해석 중인 이름 (순환 검출)
    pub in_flight: Mutex<HashSet<String>>,
    /// `load_all` 배치에서 시도한 이름
    pub batch: Mutex<Option<HashSet<String>>>,
    pub global_init: Mutex<HookChain>,
    pub global_void: Mutex<HookChain>,
    pub self_ref: Weak<HostInner>,
}

impl HostInner {
    /// 전역 단계 + 인스턴스 단계 (priority 순, 같으면 전역 먼저)
    pub(crate) fn merged_steps(global: &Mutex<HookChain>, local: &Mutex<HookChain>) -> Vec<HookStep> {
        let mut steps = global.lock().snapshot();
        steps.extend(local.lock().snapshot());
        steps.sort_by_key(|s| s.priority);
        steps
    }

    /// 리로드 재로드용 검색 경로: 원래 디렉토리 먼저
    pub(crate) fn dirs_with(&self, first: &PathBuf) -> Vec<PathBuf> {
        let mut dirs = vec![first.clone()];
        for dir in &self.search_dirs {
            if dir != first {
                dirs.push(dir.clone());
            }
        }
        dirs
    }
}

// ============================================================================
// HostBuilder
// ============================================================================

/// ModuleHost 빌더
#[derive(Default)]
pub struct HostBuilder {
    config: HostConfig,
    extra_dirs: Vec<PathBuf>,
    resolver: Option<Arc<dyn ManifestResolver>>,
    bindings: Option<Arc<dyn BindingHost>>,
    events: Option<Arc<EventBus>>,
}

impl HostBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// 설정 적용 (검색 경로, base 접두사, 히스토리 크기)
    pub fn with_config(mut self, config: HostConfig) -> Self {
        self.config = config;
        self
    }

    /// 검색 디렉토리 추가 (설정의 디렉토리 뒤에 붙음)
    pub fn with_search_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.extra_dirs.push(dir.into());
        self
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn ManifestResolver>) -> Self {
        self.resolver = Some(resolver);
        self
    }

    pub fn with_bindings(mut self, bindings: Arc<dyn BindingHost>) -> Self {
        self.bindings = Some(bindings);
        self
    }

    /// 외부 이벤트 버스 공유
    pub fn with_event_bus(mut self, events: Arc<EventBus>) -> Self {
        self.events = Some(events);
        self
    }

    pub fn build(self) -> ModuleHost {
        let mut search_dirs = self.config.search_dirs.clone();
        for dir in self.extra_dirs {
            if !search_dirs.contains(&dir) {
                search_dirs.push(dir);
            }
        }

        let events = self.events.unwrap_or_else(|| {
            Arc::new(EventBus::with_config(EventBusConfig {
                history_size: self.config.event_history(),
                ..Default::default()
            }))
        });

        let resolver = self
            .resolver
            .unwrap_or_else(|| Arc::new(JsonManifestResolver::new()));
        let bindings = self
            .bindings
            .unwrap_or_else(|| Arc::new(RegistryBindingHost::passive()));
        let config = self.config;

        let inner = Arc::new_cyclic(|self_ref| HostInner {
            config,
            search_dirs,
            resolver,
            bindings,
            index: DependencyIndex::new(),
            companions: CompanionScheduler::new(),
            tracker: Arc::new(SubscriptionTracker::new()),
            events,
            op_lock: ReentrantMutex::new(()),
            in_flight: Mutex::new(HashSet::new()),
            batch: Mutex::new(None),
            global_init: Mutex::new(HookChain::new()),
            global_void: Mutex::new(HookChain::new()),
            self_ref: self_ref.clone(),
        });

        info!(
            "Module host ready ({} search dirs)",
            inner.search_dirs.len()
        );

        ModuleHost { inner }
    }
}

// ============================================================================
// ModuleHost
// ============================================================================

/// 모듈 호스트
#[derive(Clone)]
pub struct ModuleHost {
    inner: Arc<HostInner>,
}

impl ModuleHost {
    pub fn builder() -> HostBuilder {
        HostBuilder::new()
    }

    /// 해석기/바인딩 호스트로 바로 생성
    pub fn new(resolver: Arc<dyn ManifestResolver>, bindings: Arc<dyn BindingHost>) -> Self {
        Self::builder()
            .with_resolver(resolver)
            .with_bindings(bindings)
            .build()
    }

    // ========================================================================
    // 로드
    // ========================================================================

    /// 설정된 검색 경로에서 모듈 로드
    pub fn load(&self, name: &str) -> Result<Arc<ModuleInstance>> {
        let _op = self.inner.op_lock.lock();
        let dirs = self.inner.search_dirs.clone();
        self.inner.load_top_level(name, &dirs, 0)
    }

    /// 지정한 디렉토리에서 모듈 로드
    pub fn load_from(&self, name: &str, dirs: &[PathBuf]) -> Result<Arc<ModuleInstance>> {
        let _op = self.inner.op_lock.lock();
        self.inner.load_top_level(name, dirs, 0)
    }

    /// 배치 로드. 실패는 로그로 남기고 성공한 인스턴스만 반환
    ///
    /// 배치 안에서 이미 시도한 이름(의존성 포함)은 건너뜁니다.
    pub fn load_all<S: AsRef<str>>(&self, names: &[S]) -> Vec<Arc<ModuleInstance>> {
        let _op = self.inner.op_lock.lock();
        let previous = self.inner.batch.lock().replace(HashSet::new());
        let dirs = self.inner.search_dirs.clone();
        let mut loaded = Vec::new();

        for name in names {
            let name = name.as_ref();
            let attempted = self
                .inner
                .batch
                .lock()
                .as_ref()
                .is_some_and(|batch| batch.contains(name));
            if attempted {
                continue;
            }

            match self.inner.load_top_level(name, &dirs, 0) {
                Ok(instance) => loaded.push(instance),
                Err(e) => warn!(module = name, "Batch load failed: {}", e),
            }
        }

        *self.inner.batch.lock() = previous;
        loaded
    }

    // ========================================================================
    // 언로드 / 리로드
    // ========================================================================

    /// 모듈 언로드. 언로드된 이름 반환
    ///
    /// 서브모듈에 `force`를 주면 부모가 대신 언로드되고 부모 이름이 반환됩니다.
    pub fn unload(&self, target: impl Into<ModuleTarget>, opts: UnloadOptions) -> Result<String> {
        let _op = self.inner.op_lock.lock();
        let instance = self.inner.resolve_target(target.into())?;
        let mut scratch = Vec::new();
        self.inner
            .unload_instance(&instance, opts.into(), 0, &mut scratch)
    }

    /// 모듈 하나 리로드. 다시 활성화된 모듈 수 반환
    pub fn reload(&self, target: impl Into<ModuleTarget>) -> Result<usize> {
        self.reload_many(vec![target.into()])
    }

    /// 여러 모듈 리로드
    ///
    /// 언로드 단계는 전부 아니면 전무, 재로드 단계는 최선 노력입니다.
    pub fn reload_many<T: Into<ModuleTarget>>(&self, targets: Vec<T>) -> Result<usize> {
        let _op = self.inner.op_lock.lock();
        let targets: Vec<ModuleTarget> = targets.into_iter().map(Into::into).collect();
        self.inner.reload(targets)
    }

    /// 모든 최상위 모듈 언로드 (역로드 순). 언로드된 이름 반환
    pub fn unload_all(&self) -> Vec<String> {
        let _op = self.inner.op_lock.lock();
        let mut unloaded = Vec::new();

        for instance in self.inner.index.instances().into_iter().rev() {
            if !self.inner.index.contains_instance(&instance) || instance.parent().is_some() {
                continue;
            }
            let mut scratch = Vec::new();
            let call = UnloadCall {
                unload_dependents: true,
                force: true,
                ..Default::default()
            };
            match self.inner.unload_instance(&instance, call, 0, &mut scratch) {
                Ok(name) => unloaded.push(name),
                Err(e) => warn!(module = %instance.name(), "Unload failed: {}", e),
            }
        }

        unloaded
    }

    // ========================================================================
    // 조회
    // ========================================================================

    pub fn get(&self, name: &str) -> Option<Arc<ModuleInstance>> {
        self.inner.index.get(name)
    }

    pub fn is_loaded(&self, name: &str) -> bool {
        self.inner.index.get(name).is_some_and(|i| i.is_loaded())
    }

    /// 로드 순서의 모듈 이름 (서브모듈 포함)
    pub fn loaded_names(&self) -> Vec<String> {
        self.inner.index.names()
    }

    pub fn dependents_of(&self, name: &str) -> Result<Vec<String>> {
        let instance = self
            .inner
            .index
            .get(name)
            .ok_or_else(|| ModuleError::NotLoaded(name.to_string()))?;
        Ok(self
            .inner
            .index
            .dependents_of(&instance)
            .iter()
            .map(|i| i.name().to_string())
            .collect())
    }

    /// 부모 이름에 걸린 컴패니언 대기 수
    pub fn pending_companions(&self, parent: &str) -> usize {
        self.inner.companions.pending_for(parent)
    }

    /// 의존성 우선 로드 순서 미리보기
    pub fn plan(&self, name: &str) -> Result<Vec<String>> {
        dependency_plan(
            self.inner.resolver.as_ref(),
            name,
            &self.inner.search_dirs,
            self.inner.config.base_prefix(),
        )
    }

    /// 검색 경로의 모든 디스크립터
    pub fn discover(&self) -> Vec<(ModuleDescriptor, PathBuf)> {
        self.inner.resolver.discover(&self.inner.search_dirs)
    }

    // ========================================================================
    // 훅 / 이벤트
    // ========================================================================

    /// 모든 모듈의 init 체인에 들어갈 단계
    pub fn add_init_step<F>(&self, name: impl Into<String>, priority: i32, step: F)
    where
        F: Fn(&Arc<ModuleInstance>) -> HookOutcome + Send + Sync + 'static,
    {
        let step: HookFn = Arc::new(step);
        self.inner.global_init.lock().add(name, priority, step);
    }

    /// 모든 모듈의 void 체인에 들어갈 단계
    pub fn add_void_step<F>(&self, name: impl Into<String>, priority: i32, step: F)
    where
        F: Fn(&Arc<ModuleInstance>) -> HookOutcome + Send + Sync + 'static,
    {
        let step: HookFn = Arc::new(step);
        self.inner.global_void.lock().add(name, priority, step);
    }

    /// 이벤트 소스에 구독 추적기 연결
    pub fn observe(&self, source: &Arc<EventEmitter>) -> bool {
        let attached = source.add_observer(self.inner.tracker.clone());
        if !attached {
            warn!(source = %source.name(), "Source is already observed by this host");
        }
        attached
    }

    /// 구독 추적기 연결 해제
    pub fn unobserve(&self, source: &Arc<EventEmitter>) -> bool {
        source.remove_observer(self.inner.tracker.observer_name())
    }

    /// 호스트 알림 버스
    pub fn events(&self) -> &Arc<EventBus> {
        &self.inner.events
    }

    pub fn config(&self) -> &HostConfig {
        &self.inner.config
    }

    pub fn search_dirs(&self) -> &[PathBuf] {
        &self.inner.search_dirs
    }
}

impl std::fmt::Debug for ModuleHost {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleHost")
            .field("search_dirs", &self.inner.search_dirs)
            .field("loaded", &self.inner.index.names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::resolver::StaticManifestResolver;

    fn host_with(resolver: StaticManifestResolver) -> ModuleHost {
        ModuleHost::builder()
            .with_search_dir("mods")
            .with_resolver(Arc::new(resolver))
            .build()
    }

    #[test]
    fn test_builder_merges_search_dirs() {
        let config = HostConfig::new().with_search_dir("a").with_search_dir("b");
        let host = ModuleHost::builder()
            .with_config(config)
            .with_search_dir("b")
            .with_search_dir("c")
            .build();

        assert_eq!(
            host.search_dirs(),
            &[PathBuf::from("a"), PathBuf::from("b"), PathBuf::from("c")]
        );
    }

    #[test]
    fn test_load_and_query() {
        let host = host_with(
            StaticManifestResolver::new()
                .with_module("mods", ModuleDescriptor::new("core"))
                .with_module("mods", ModuleDescriptor::new("chat").with_dependency("core")),
        );

        host.load("chat").unwrap();
        assert!(host.is_loaded("core"));
        assert_eq!(host.loaded_names(), vec!["core", "chat"]);
        assert_eq!(host.dependents_of("core").unwrap(), vec!["chat"]);
        assert!(host.dependents_of("ghost").unwrap_err().is_not_loaded());
        assert_eq!(host.plan("chat").unwrap(), vec!["core", "chat"]);
    }

    #[test]
    fn test_unload_all_reverse_order() {
        let host = host_with(
            StaticManifestResolver::new()
                .with_module("mods", ModuleDescriptor::new("core"))
                .with_module("mods", ModuleDescriptor::new("chat").with_dependency("core")),
        );

        host.load("chat").unwrap();
        assert_eq!(host.unload_all(), vec!["chat", "core"]);
        assert!(host.loaded_names().is_empty());
    }

    #[test]
    fn test_unload_options_builder() {
        let opts = UnloadOptions::new().with_dependents().forced();
        assert!(opts.unload_dependents && opts.force);
        let call: UnloadCall = opts.into();
        assert!(!call.unloading_submodule && !call.reloading);
    }
}
