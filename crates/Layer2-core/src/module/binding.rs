//! Binding Host - 코드 유닛 활성화/비활성화
//!
//! 라이프사이클 매니저는 바인딩을 직접 들여다보지 않습니다. `activate`가
//! 돌려준 [`BindingHandle`]을 보관했다가 언로드 시 `deactivate`로 돌려줄 뿐입니다.
//!
//! [`RegistryBindingHost`]는 코드 유닛 ID → 팩토리 테이블로 정적 링크된
//! 모듈 코드를 제공합니다.

use super::descriptor::ModuleDescriptor;
use super::hooks::HookOutcome;
use super::instance::ModuleInstance;
use modhost_foundation::{Error, Result};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, trace};

// ============================================================================
// ModuleCode - 모듈 자체 init/void
// ============================================================================

/// 활성화된 모듈 코드
///
/// `init`/`void`는 훅 체인의 priority 0 단계로 실행됩니다.
pub trait ModuleCode: Send + Sync {
    /// 초기화. `Stop`을 돌려주면 로드가 취소됨
    fn init(&self, _instance: &Arc<ModuleInstance>) -> HookOutcome {
        HookOutcome::Continue
    }

    /// 정리. `Stop`을 돌려주면 언로드가 거부됨 (부모가 강제하는 경우 제외)
    fn void(&self, _instance: &Arc<ModuleInstance>) -> HookOutcome {
        HookOutcome::Continue
    }
}

/// 아무 것도 하지 않는 코드 (드라이런, 데이터 전용 모듈)
#[derive(Debug, Default, Clone, Copy)]
pub struct PassiveCode;

impl ModuleCode for PassiveCode {}

// ============================================================================
// BindingHandle
// ============================================================================

/// 활성화된 바인딩 핸들
#[derive(Clone)]
pub struct BindingHandle {
    /// 바인딩 네임스페이스
    pub namespace: String,

    /// 코드 유닛 ID
    pub code_unit: String,

    /// 모듈 코드
    pub code: Arc<dyn ModuleCode>,

    /// 보존된 바인딩을 재사용했는지
    pub reused: bool,
}

impl std::fmt::Debug for BindingHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BindingHandle")
            .field("namespace", &self.namespace)
            .field("code_unit", &self.code_unit)
            .field("reused", &self.reused)
            .finish()
    }
}

// ============================================================================
// BindingHost trait
// ============================================================================

/// 바인딩 호스트
pub trait BindingHost: Send + Sync {
    /// 디스크립터의 코드 유닛 활성화
    fn activate(&self, descriptor: &ModuleDescriptor) -> Result<BindingHandle>;

    /// 바인딩 해제. `preserve`면 다음 활성화를 위해 보존
    fn deactivate(&self, handle: BindingHandle, preserve: bool);
}

// ============================================================================
// RegistryBindingHost
// ============================================================================

/// 코드 팩토리
pub type CodeFactory = Arc<dyn Fn(&ModuleDescriptor) -> Arc<dyn ModuleCode> + Send + Sync>;

/// 팩토리 테이블 기반 바인딩 호스트
///
/// ```ignore
/// let bindings = RegistryBindingHost::new()
///     .with_code("chat", |_| Arc::new(ChatModule::default()) as Arc<dyn ModuleCode>);
/// ```
#[derive(Default)]
pub struct RegistryBindingHost {
    /// 코드 유닛 ID → 팩토리
    factories: RwLock<HashMap<String, CodeFactory>>,

    /// 알 수 없는 코드 유닛용
    fallback: RwLock<Option<CodeFactory>>,

    /// 활성 네임스페이스 → 코드 유닛
    active: RwLock<HashMap<String, String>>,

    /// 보존된 바인딩 (네임스페이스 → 코드)
    parked: Mutex<HashMap<String, Arc<dyn ModuleCode>>>,

    /// 코드 유닛별 팩토리 호출 횟수
    instantiations: RwLock<HashMap<String, usize>>,
}

impl RegistryBindingHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 패턴: 코드 유닛 팩토리 등록
    pub fn with_code<F>(self, code_unit: impl Into<String>, factory: F) -> Self
    where
        F: Fn(&ModuleDescriptor) -> Arc<dyn ModuleCode> + Send + Sync + 'static,
    {
        self.register(code_unit, Arc::new(factory));
        self
    }

    /// 빌더 패턴: 폴백 팩토리 설정
    pub fn with_fallback<F>(self, factory: F) -> Self
    where
        F: Fn(&ModuleDescriptor) -> Arc<dyn ModuleCode> + Send + Sync + 'static,
    {
        *self.fallback.write() = Some(Arc::new(factory));
        self
    }

    /// 모든 코드 유닛을 [`PassiveCode`]로 활성화하는 호스트
    pub fn passive() -> Self {
        Self::new().with_fallback(|_| Arc::new(PassiveCode) as Arc<dyn ModuleCode>)
    }

    /// 팩토리 등록 (같은 ID는 교체)
    pub fn register(&self, code_unit: impl Into<String>, factory: CodeFactory) {
        let code_unit = code_unit.into();
        debug!("Registered code unit: {}", code_unit);
        self.factories.write().insert(code_unit, factory);
    }

    /// 팩토리 호출 횟수
    pub fn instantiation_count(&self, code_unit: &str) -> usize {
        self.instantiations.read().get(code_unit).copied().unwrap_or(0)
    }

    /// 네임스페이스가 활성 상태인지
    pub fn is_active(&self, namespace: &str) -> bool {
        self.active.read().contains_key(namespace)
    }

    /// 활성 네임스페이스 목록 (정렬)
    pub fn active_namespaces(&self) -> Vec<String> {
        let mut names: Vec<String> = self.active.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// 보존된 바인딩 수
    pub fn parked_count(&self) -> usize {
        self.parked.lock().len()
    }

    fn namespace_for(descriptor: &ModuleDescriptor) -> String {
        if descriptor.flags.no_bind {
            descriptor.code_unit.clone()
        } else {
            descriptor.name.clone()
        }
    }

    fn factory_for(&self, code_unit: &str) -> Option<CodeFactory> {
        self.factories
            .read()
            .get(code_unit)
            .cloned()
            .or_else(|| self.fallback.read().clone())
    }
}

impl BindingHost for RegistryBindingHost {
    fn activate(&self, descriptor: &ModuleDescriptor) -> Result<BindingHandle> {
        let namespace = Self::namespace_for(descriptor);

        if self.is_active(&namespace) {
            return Err(Error::Validation(format!(
                "namespace '{}' is already bound",
                namespace
            )));
        }

        let parked = self.parked.lock().remove(&namespace);
        let (code, reused) = match parked {
            Some(code) => (code, true),
            None => {
                let factory = self.factory_for(&descriptor.code_unit).ok_or_else(|| {
                    Error::NotFound(format!("code unit '{}'", descriptor.code_unit))
                })?;
                *self
                    .instantiations
                    .write()
                    .entry(descriptor.code_unit.clone())
                    .or_insert(0) += 1;
                (factory(descriptor), false)
            }
        };

        self.active
            .write()
            .insert(namespace.clone(), descriptor.code_unit.clone());

        trace!(namespace = %namespace, code_unit = %descriptor.code_unit, reused, "Activated binding");

        Ok(BindingHandle {
            namespace,
            code_unit: descriptor.code_unit.clone(),
            code,
            reused,
        })
    }

    fn deactivate(&self, handle: BindingHandle, preserve: bool) {
        self.active.write().remove(&handle.namespace);

        if preserve {
            trace!(namespace = %handle.namespace, "Parked binding");
            self.parked.lock().insert(handle.namespace, handle.code);
        } else {
            trace!(namespace = %handle.namespace, "Erased binding");
        }
    }
}
