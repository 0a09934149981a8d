//! Module Instance - 로드된 모듈의 런타임 상태
//!
//! ## 소유 관계
//!
//! ```text
//! parent ──strong──▶ submodules ──weak──▶ parent
//! instance ──strong──▶ dependencies
//! instance ──weak──▶ companions, subscription sources, host
//! ```
//!
//! 인스턴스는 로드마다 새로 만들어집니다. 리로드 후 `store`는 비어 있습니다.

use super::binding::BindingHandle;
use super::descriptor::ModuleDescriptor;
use super::error::{ModuleError, Result};
use super::hooks::{HookChain, HookFn, HookOutcome};
use super::manager::HostInner;
use super::tracker::SubscriptionRecord;
use chrono::{DateTime, Utc};
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Weak};

// ============================================================================
// ModuleState
// ============================================================================

/// 인스턴스 라이프사이클 상태
///
/// `Unloaded → ResolvingDeps → Activated → Initializing → Loaded → Voiding → Deactivated → Unloaded`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ModuleState {
    Unloaded,
    ResolvingDeps,
    Activated,
    Initializing,
    Loaded,
    Voiding,
    Deactivated,
}

impl std::fmt::Display for ModuleState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Unloaded => "unloaded",
            Self::ResolvingDeps => "resolving_deps",
            Self::Activated => "activated",
            Self::Initializing => "initializing",
            Self::Loaded => "loaded",
            Self::Voiding => "voiding",
            Self::Deactivated => "deactivated",
        };
        write!(f, "{}", s)
    }
}

// ============================================================================
// ModuleInstance
// ============================================================================

/// 로드된 모듈
pub struct ModuleInstance {
    descriptor: ModuleDescriptor,
    search_dir: PathBuf,
    state: RwLock<ModuleState>,

    /// 선언된 의존성 (로드 시 한 번 해석)
    dependencies: RwLock<Vec<Arc<ModuleInstance>>>,

    parent: RwLock<Weak<ModuleInstance>>,
    submodules: RwLock<Vec<Arc<ModuleInstance>>>,

    /// 모듈 전용 키/값 저장소
    store: RwLock<HashMap<String, Value>>,
    lists: RwLock<HashMap<String, Vec<Value>>>,

    /// 이 인스턴스가 요청한 컴패니언 서브모듈
    companions: RwLock<Vec<Weak<ModuleInstance>>>,

    init_hooks: Mutex<HookChain>,
    void_hooks: Mutex<HookChain>,

    subscriptions: Mutex<Vec<SubscriptionRecord>>,
    binding: Mutex<Option<BindingHandle>>,
    loaded_at: RwLock<Option<DateTime<Utc>>>,

    host: Weak<HostInner>,
}

impl ModuleInstance {
    pub(crate) fn new(
        descriptor: ModuleDescriptor,
        search_dir: PathBuf,
        parent: Option<&Arc<ModuleInstance>>,
        host: Weak<HostInner>,
    ) -> Self {
        Self {
            descriptor,
            search_dir,
            state: RwLock::new(ModuleState::Activated),
            dependencies: RwLock::new(Vec::new()),
            parent: RwLock::new(parent.map(Arc::downgrade).unwrap_or_default()),
            submodules: RwLock::new(Vec::new()),
            store: RwLock::new(HashMap::new()),
            lists: RwLock::new(HashMap::new()),
            companions: RwLock::new(Vec::new()),
            init_hooks: Mutex::new(HookChain::new()),
            void_hooks: Mutex::new(HookChain::new()),
            subscriptions: Mutex::new(Vec::new()),
            binding: Mutex::new(None),
            loaded_at: RwLock::new(None),
            host,
        }
    }

    // ========================================================================
    // Identity
    // ========================================================================

    /// 전체 이름
    pub fn name(&self) -> &str {
        &self.descriptor.name
    }

    pub fn local_name(&self) -> &str {
        &self.descriptor.local_name
    }

    pub fn descriptor(&self) -> &ModuleDescriptor {
        &self.descriptor
    }

    /// 디스크립터를 찾은 검색 디렉토리
    pub fn search_dir(&self) -> &Path {
        &self.search_dir
    }

    pub fn state(&self) -> ModuleState {
        *self.state.read()
    }

    pub fn is_loaded(&self) -> bool {
        self.state() == ModuleState::Loaded
    }

    pub fn loaded_at(&self) -> Option<DateTime<Utc>> {
        *self.loaded_at.read()
    }

    /// 활성 바인딩의 네임스페이스
    pub fn binding_namespace(&self) -> Option<String> {
        self.binding.lock().as_ref().map(|h| h.namespace.clone())
    }

    // ========================================================================
    // Store
    // ========================================================================

    /// 값 저장 (이전 값 반환)
    pub fn store(&self, key: impl Into<String>, value: Value) -> Option<Value> {
        self.store.write().insert(key.into(), value)
    }

    pub fn retrieve(&self, key: &str) -> Option<Value> {
        self.store.read().get(key).cloned()
    }

    pub fn forget(&self, key: &str) -> Option<Value> {
        self.store.write().remove(key)
    }

    /// 목록 저장소에 항목 추가
    pub fn list_add(&self, key: impl Into<String>, value: Value) {
        self.lists.write().entry(key.into()).or_default().push(value);
    }

    /// 목록 저장소 항목 (추가 순)
    pub fn list_items(&self, key: &str) -> Vec<Value> {
        self.lists.read().get(key).cloned().unwrap_or_default()
    }

    // ========================================================================
    // Graph
    // ========================================================================

    /// 선언된 의존성 인스턴스
    pub fn dependencies(&self) -> Vec<Arc<ModuleInstance>> {
        self.dependencies.read().clone()
    }

    /// 이 인스턴스에 의존하는 로드된 모듈 (로드 순)
    pub fn dependents(self: &Arc<Self>) -> Vec<Arc<ModuleInstance>> {
        match self.host.upgrade() {
            Some(host) => host.index.dependents_of(self),
            None => Vec::new(),
        }
    }

    pub fn depends_on(&self, other: &Arc<ModuleInstance>) -> bool {
        self.dependencies
            .read()
            .iter()
            .any(|dep| Arc::ptr_eq(dep, other))
    }

    pub fn parent(&self) -> Option<Arc<ModuleInstance>> {
        self.parent.read().upgrade()
    }

    pub fn is_submodule(&self) -> bool {
        self.parent().is_some()
    }

    pub fn submodules(&self) -> Vec<Arc<ModuleInstance>> {
        self.submodules.read().clone()
    }

    /// 짧은 이름으로 서브모듈 조회
    pub fn submodule(&self, local_name: &str) -> Option<Arc<ModuleInstance>> {
        self.submodules
            .read()
            .iter()
            .find(|child| child.local_name() == local_name)
            .cloned()
    }

    /// 살아 있는 컴패니언 서브모듈
    pub fn companions(&self) -> Vec<Arc<ModuleInstance>> {
        self.companions
            .read()
            .iter()
            .filter_map(Weak::upgrade)
            .collect()
    }

    // ========================================================================
    // Module-side operations
    // ========================================================================

    /// 서브모듈 로드 (이미 있으면 기존 인스턴스)
    pub fn load_submodule(self: &Arc<Self>, name: &str) -> Result<Arc<ModuleInstance>> {
        let host = self.host()?;
        let _op = host.op_lock.lock();
        let depth = host.tracker.depth();
        host.load_submodule(self, name, depth)
    }

    /// 부모 모듈이 로드되면 이 인스턴스 아래에 `child` 서브모듈 로드
    ///
    /// 부모가 이미 로드돼 있으면 바로 로드해서 돌려주고, 아니면 대기 후 `None`.
    pub fn request_companion(
        self: &Arc<Self>,
        parent: &str,
        child: &str,
    ) -> Result<Option<Arc<ModuleInstance>>> {
        let host = self.host()?;
        let _op = host.op_lock.lock();
        host.request_companion(self, parent, child)
    }

    /// init 단계 추가 (다음 로드 패스부터 적용)
    pub fn on_init<F>(&self, name: impl Into<String>, priority: i32, step: F)
    where
        F: Fn(&Arc<ModuleInstance>) -> HookOutcome + Send + Sync + 'static,
    {
        self.add_init_step(name, priority, Arc::new(step));
    }

    /// void 단계 추가
    pub fn on_void<F>(&self, name: impl Into<String>, priority: i32, step: F)
    where
        F: Fn(&Arc<ModuleInstance>) -> HookOutcome + Send + Sync + 'static,
    {
        self.add_void_step(name, priority, Arc::new(step));
    }

    pub fn remove_void_step(&self, name: &str) -> bool {
        self.void_hooks.lock().remove(name)
    }

    pub fn void_step_names(&self) -> Vec<String> {
        self.void_hooks.lock().names()
    }

    /// 이 모듈의 실행 컨텍스트에서 `f` 실행
    ///
    /// 안에서 관찰 중인 이벤트 소스에 한 구독은 이 모듈 소유로 기록됩니다.
    pub fn with_context<R>(self: &Arc<Self>, f: impl FnOnce(&Arc<ModuleInstance>) -> R) -> R {
        match self.host.upgrade() {
            Some(host) => {
                let _frame = host.tracker.enter(self);
                f(self)
            }
            None => f(self),
        }
    }

    /// 기록된 (해제 가능한) 구독 수
    pub fn subscription_count(&self) -> usize {
        self.subscriptions.lock().len()
    }

    // ========================================================================
    // Crate-internal bookkeeping
    // ========================================================================

    fn host(&self) -> Result<Arc<HostInner>> {
        self.host
            .upgrade()
            .ok_or_else(|| ModuleError::NotLoaded(self.name().to_string()))
    }

    pub(crate) fn set_state(&self, state: ModuleState) {
        *self.state.write() = state;
    }

    pub(crate) fn mark_loaded(&self) {
        *self.loaded_at.write() = Some(Utc::now());
        self.set_state(ModuleState::Loaded);
    }

    pub(crate) fn set_dependencies(&self, dependencies: Vec<Arc<ModuleInstance>>) {
        *self.dependencies.write() = dependencies;
    }

    pub(crate) fn clear_dependencies(&self) {
        self.dependencies.write().clear();
    }

    pub(crate) fn attach_child(&self, child: Arc<ModuleInstance>) {
        let mut submodules = self.submodules.write();
        if !submodules.iter().any(|c| Arc::ptr_eq(c, &child)) {
            submodules.push(child);
        }
    }

    pub(crate) fn detach_child(&self, child: &Arc<ModuleInstance>) -> bool {
        let mut submodules = self.submodules.write();
        let before = submodules.len();
        submodules.retain(|c| !Arc::ptr_eq(c, child));
        before != submodules.len()
    }

    pub(crate) fn clear_parent(&self) {
        *self.parent.write() = Weak::new();
    }

    pub(crate) fn push_companion(&self, companion: &Arc<ModuleInstance>) {
        let mut companions = self.companions.write();
        companions.retain(|c| c.strong_count() > 0);
        if !companions
            .iter()
            .any(|c| c.upgrade().is_some_and(|c| Arc::ptr_eq(&c, companion)))
        {
            companions.push(Arc::downgrade(companion));
        }
    }

    pub(crate) fn add_init_step(&self, name: impl Into<String>, priority: i32, step: HookFn) {
        self.init_hooks.lock().add(name, priority, step);
    }

    pub(crate) fn add_void_step(&self, name: impl Into<String>, priority: i32, step: HookFn) {
        self.void_hooks.lock().add(name, priority, step);
    }

    pub(crate) fn init_chain(&self) -> &Mutex<HookChain> {
        &self.init_hooks
    }

    pub(crate) fn void_chain(&self) -> &Mutex<HookChain> {
        &self.void_hooks
    }

    pub(crate) fn subscriptions(&self) -> &Mutex<Vec<SubscriptionRecord>> {
        &self.subscriptions
    }

    pub(crate) fn set_binding(&self, handle: BindingHandle) {
        *self.binding.lock() = Some(handle);
    }

    pub(crate) fn take_binding(&self) -> Option<BindingHandle> {
        self.binding.lock().take()
    }
}

impl std::fmt::Debug for ModuleInstance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModuleInstance")
            .field("name", &self.name())
            .field("state", &self.state())
            .field("search_dir", &self.search_dir)
            .field("submodules", &self.submodules.read().len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn detached(name: &str) -> Arc<ModuleInstance> {
        Arc::new(ModuleInstance::new(
            ModuleDescriptor::new(name),
            PathBuf::from("mods"),
            None,
            Weak::new(),
        ))
    }

    #[test]
    fn test_store_and_lists() {
        let instance = detached("chat");

        assert!(instance.store("greeting", json!("hi")).is_none());
        assert_eq!(instance.retrieve("greeting"), Some(json!("hi")));
        assert_eq!(instance.forget("greeting"), Some(json!("hi")));
        assert!(instance.retrieve("greeting").is_none());

        instance.list_add("commands", json!("say"));
        instance.list_add("commands", json!("me"));
        assert_eq!(instance.list_items("commands"), vec![json!("say"), json!("me")]);
        assert!(instance.list_items("missing").is_empty());
    }

    #[test]
    fn test_parent_child_links() {
        let parent = detached("ui");
        let child = Arc::new(ModuleInstance::new(
            ModuleDescriptor::new("widget").into_submodule("ui"),
            PathBuf::from("mods"),
            Some(&parent),
            Weak::new(),
        ));

        parent.attach_child(Arc::clone(&child));
        parent.attach_child(Arc::clone(&child));
        assert_eq!(parent.submodules().len(), 1);
        assert!(child.is_submodule());
        assert_eq!(parent.submodule("widget").map(|c| c.name().to_string()), Some("ui/widget".into()));

        assert!(parent.detach_child(&child));
        child.clear_parent();
        assert!(!child.is_submodule());
    }

    #[test]
    fn test_detached_instance_operations_fail_cleanly() {
        let instance = detached("orphan");
        let err = instance.load_submodule("x").unwrap_err();
        assert!(err.is_not_loaded());
        assert!(instance.dependents().is_empty());
        assert_eq!(instance.with_context(|i| i.name().to_string()), "orphan");
    }

    #[test]
    fn test_state_display() {
        assert_eq!(ModuleState::ResolvingDeps.to_string(), "resolving_deps");
        let instance = detached("a");
        assert_eq!(instance.state(), ModuleState::Activated);
        instance.mark_loaded();
        assert!(instance.is_loaded());
        assert!(instance.loaded_at().is_some());
    }
}
