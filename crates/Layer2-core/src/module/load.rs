//! Load path - 의존성 해석, 활성화, init 체인, 컴패니언 해소
//!
//! ```text
//! resolve ─▶ dependencies (재귀) ─▶ activate ─▶ index (safe point)
//!         ─▶ init chain ─┬─ Completed ─▶ Loaded ─▶ 컴패니언 대기 해소
//!                        └─ Stopped   ─▶ rollback (unindex, deactivate, void, 정리)
//! ```

use super::companion::CompanionWait;
use super::descriptor::{ModuleDescriptor, SUBMODULE_SEPARATOR};
use super::error::{ModuleError, Result};
use super::hooks::{run_steps, ChainResult, HookOutcome, PRIORITY_LAST, PRIORITY_MODULE};
use super::instance::{ModuleInstance, ModuleState};
use super::manager::{HostInner, UnloadCall};
use modhost_foundation::event as notify;
use std::path::PathBuf;
use std::sync::{Arc, Weak};
use tracing::{debug, info, info_span, trace, warn};

/// 의존성 해석 중 표시 (drop 시 해제)
struct InFlight<'a> {
    host: &'a HostInner,
    name: String,
}

impl<'a> InFlight<'a> {
    fn enter(host: &'a HostInner, name: &str) -> Self {
        host.in_flight.lock().insert(name.to_string());
        Self {
            host,
            name: name.to_string(),
        }
    }
}

impl Drop for InFlight<'_> {
    fn drop(&mut self) {
        self.host.in_flight.lock().remove(&self.name);
    }
}

impl HostInner {
    // ========================================================================
    // 진입점
    // ========================================================================

    pub(crate) fn load_top_level(
        &self,
        name: &str,
        dirs: &[PathBuf],
        depth: usize,
    ) -> Result<Arc<ModuleInstance>> {
        self.load_module(name, dirs, None, depth)
    }

    /// `parent` 아래 서브모듈 로드
    ///
    /// `<parentDir>/<parentLocal>/`을 먼저, 다음으로 `<parentDir>`을 검색합니다.
    pub(crate) fn load_submodule(
        &self,
        parent: &Arc<ModuleInstance>,
        name: &str,
        depth: usize,
    ) -> Result<Arc<ModuleInstance>> {
        if let Some(existing) = parent.submodule(name) {
            return Ok(existing);
        }

        let full_name = format!("{}{}{}", parent.name(), SUBMODULE_SEPARATOR, name);
        if let Some(existing) = self.index.get(&full_name) {
            return Ok(existing);
        }

        let dirs = vec![
            parent.search_dir().join(parent.local_name()),
            parent.search_dir().to_path_buf(),
        ];
        self.load_module(name, &dirs, Some(parent), depth + 1)
    }

    // ========================================================================
    // 핵심 로드
    // ========================================================================

    fn load_module(
        &self,
        name: &str,
        dirs: &[PathBuf],
        parent: Option<&Arc<ModuleInstance>>,
        depth: usize,
    ) -> Result<Arc<ModuleInstance>> {
        let full_name = match parent {
            Some(p) => format!("{}{}{}", p.name(), SUBMODULE_SEPARATOR, name),
            None => name.to_string(),
        };

        let span = info_span!("load", module = %full_name, depth);
        let _enter = span.enter();

        self.mark_attempted(&full_name);

        if parent.is_none() && self.index.contains(&full_name) {
            return Err(ModuleError::AlreadyLoaded(full_name));
        }

        let (descriptor, search_dir) = self.resolver.resolve(name, dirs)?;
        let descriptor = match parent {
            Some(p) => descriptor.into_submodule(p.name()),
            None => descriptor,
        };

        let _flight = InFlight::enter(self, &full_name);
        trace!(state = %ModuleState::ResolvingDeps, "Resolving dependencies");

        // 서브모듈의 의존성은 최상위 모듈이므로 호스트 검색 경로 사용
        let dependency_dirs: Vec<PathBuf> = match parent {
            Some(_) => self.search_dirs.clone(),
            None => dirs.to_vec(),
        };
        let dependencies = self.load_dependencies(&descriptor, &dependency_dirs, depth)?;

        let handle = self.bindings.activate(&descriptor).map_err(|e| {
            ModuleError::ActivationFailed {
                module: full_name.clone(),
                reason: e.to_string(),
            }
        })?;
        let code = Arc::clone(&handle.code);
        let version = descriptor.version.to_string();

        let instance = Arc::new(ModuleInstance::new(
            descriptor,
            search_dir,
            parent,
            self.self_ref.clone(),
        ));
        instance.set_binding(handle);

        let init_code = Arc::clone(&code);
        instance.add_init_step(
            format!("{}::init", full_name),
            PRIORITY_MODULE,
            Arc::new(move |i: &Arc<ModuleInstance>| init_code.init(i)),
        );
        instance.add_void_step(
            format!("{}::void", full_name),
            PRIORITY_MODULE,
            Arc::new(move |i: &Arc<ModuleInstance>| code.void(i)),
        );

        // safe point: 이후 단계(init)는 인덱스를 조회할 수 있음
        if !self.index.insert(Arc::clone(&instance)) {
            if let Some(handle) = instance.take_binding() {
                self.bindings.deactivate(handle, false);
            }
            return Err(ModuleError::AlreadyLoaded(full_name));
        }

        let dependency_names: Vec<String> =
            dependencies.iter().map(|d| d.name().to_string()).collect();
        instance.set_dependencies(dependencies);
        instance.set_state(ModuleState::Initializing);
        self.events
            .publish(notify::lifecycle::initializing(&full_name, &dependency_names));

        let steps = HostInner::merged_steps(&self.global_init, instance.init_chain());
        let result = {
            let _frame = self.tracker.enter(&instance);
            run_steps(&steps, &instance)
        };

        if let ChainResult::Stopped { step, reason } = result {
            warn!(module = %full_name, step = %step, "Init canceled: {}", reason);
            self.rollback_init(&instance, depth);
            self.events
                .publish(notify::lifecycle::init_canceled(&full_name, &step));
            return Err(ModuleError::InitCanceled {
                module: full_name,
                step,
            });
        }

        instance.mark_loaded();
        if let Some(p) = parent {
            p.attach_child(Arc::clone(&instance));
        }

        info!(module = %full_name, version = %version, "Module loaded");
        self.events
            .publish(notify::lifecycle::loaded(&full_name, &version));

        self.resolve_companions(&instance, depth);

        Ok(instance)
    }

    /// 선언된 의존성을 모두 `Loaded`로 만든 뒤 인스턴스 목록 반환
    ///
    /// 실패한 의존성 앞에서 이미 로드된 의존성은 되돌리지 않습니다.
    fn load_dependencies(
        &self,
        descriptor: &ModuleDescriptor,
        dirs: &[PathBuf],
        depth: usize,
    ) -> Result<Vec<Arc<ModuleInstance>>> {
        let module = descriptor.name.clone();
        let mut resolved: Vec<Arc<ModuleInstance>> = Vec::new();

        for dependency in descriptor.dependency_names(self.config.base_prefix()) {
            if dependency == module {
                debug!(module = %module, "Ignoring self-dependency");
                continue;
            }

            let instance = match self.index.get(&dependency) {
                Some(existing) if existing.is_loaded() => existing,
                Some(existing) => {
                    return Err(ModuleError::DependencyFailed {
                        module,
                        dependency,
                        reason: format!("dependency is {}", existing.state()),
                    });
                }
                None if self.in_flight.lock().contains(&dependency) => {
                    return Err(ModuleError::DependencyFailed {
                        module,
                        dependency,
                        reason: "dependency cycle".to_string(),
                    });
                }
                None => self
                    .load_module(&dependency, dirs, None, depth + 1)
                    .map_err(|e| ModuleError::DependencyFailed {
                        module: module.clone(),
                        dependency: dependency.clone(),
                        reason: e.to_string(),
                    })?,
            };

            if !resolved.iter().any(|r| Arc::ptr_eq(r, &instance)) {
                resolved.push(instance);
            }
        }

        Ok(resolved)
    }

    /// 취소된 init 되돌리기
    ///
    /// 순서: unindex → deactivate → void 체인 → 서브모듈 → 구독 → 컴패니언 대기
    fn rollback_init(&self, instance: &Arc<ModuleInstance>, depth: usize) {
        self.index.remove_instance(instance);
        if let Some(handle) = instance.take_binding() {
            self.bindings.deactivate(handle, false);
        }

        instance.set_state(ModuleState::Voiding);
        let steps = HostInner::merged_steps(&self.global_void, instance.void_chain());
        let result = {
            let _frame = self.tracker.enter(instance);
            run_steps(&steps, instance)
        };
        if let ChainResult::Stopped { step, .. } = result {
            debug!(module = %instance.name(), step = %step, "Void step stopped during rollback; ignored");
        }

        for child in instance.submodules() {
            let call = UnloadCall {
                unload_dependents: true,
                force: true,
                unloading_submodule: true,
                reloading: false,
            };
            if let Err(e) = self.unload_instance(&child, call, depth + 1, &mut Vec::new()) {
                warn!(module = %child.name(), "Failed to unload submodule during rollback: {}", e);
            }
            instance.detach_child(&child);
            child.clear_parent();
        }

        self.tracker.teardown(instance);
        self.companions.cancel_for_requester(instance);

        if let Some(parent) = instance.parent() {
            parent.detach_child(instance);
        }
        instance.clear_parent();
        instance.clear_dependencies();
        instance.set_state(ModuleState::Unloaded);
    }

    fn mark_attempted(&self, name: &str) {
        if let Some(batch) = self.batch.lock().as_mut() {
            batch.insert(name.to_string());
        }
    }

    // ========================================================================
    // 컴패니언
    // ========================================================================

    /// 부모가 로드돼 있으면 바로 붙이고, 아니면 대기
    pub(crate) fn request_companion(
        &self,
        requester: &Arc<ModuleInstance>,
        parent_name: &str,
        child_name: &str,
    ) -> Result<Option<Arc<ModuleInstance>>> {
        match self.index.get(parent_name) {
            Some(parent) if parent.is_loaded() => {
                let depth = self.tracker.depth();
                self.attach_companion(&parent, child_name, requester, depth)
                    .map(Some)
            }
            _ => {
                self.defer_companion(parent_name, child_name, requester);
                Ok(None)
            }
        }
    }

    /// 방금 로드된 모듈을 기다리던 컴패니언 로드
    fn resolve_companions(&self, parent: &Arc<ModuleInstance>, depth: usize) {
        for wait in self.companions.take_for(parent.name()) {
            let requester = match wait.requester.upgrade() {
                Some(requester) if self.index.contains_instance(&requester) => requester,
                _ => {
                    debug!(parent = %wait.parent_name, child = %wait.child_name, "Dropping companion wait of unloaded requester");
                    continue;
                }
            };

            if let Err(e) = self.attach_companion(parent, &wait.child_name, &requester, depth) {
                warn!(
                    parent = %parent.name(),
                    requester = %requester.name(),
                    "Companion {} failed to load: {}",
                    wait.child_name,
                    e
                );
            }
        }
    }

    /// 요청자 아래 서브모듈을 로드하고, 부모가 언로드될 때 되돌리는 void 단계 부착
    fn attach_companion(
        &self,
        parent: &Arc<ModuleInstance>,
        child_name: &str,
        requester: &Arc<ModuleInstance>,
        depth: usize,
    ) -> Result<Arc<ModuleInstance>> {
        let child = self.load_submodule(requester, child_name, depth)?;
        requester.push_companion(&child);

        let step_name = format!("companion:{}", child.name());
        parent.remove_void_step(&step_name);

        let host = self.self_ref.clone();
        let parent_name = parent.name().to_string();
        let local_name = child_name.to_string();
        let child_ref = Arc::downgrade(&child);
        let requester_ref = Arc::downgrade(requester);

        parent.add_void_step(
            step_name,
            PRIORITY_LAST,
            Arc::new(move |_: &Arc<ModuleInstance>| {
                if let Some(host) = host.upgrade() {
                    host.unwind_companion(&parent_name, &local_name, &child_ref, &requester_ref);
                }
                HookOutcome::Continue
            }),
        );

        self.events.publish(notify::companion::attached(
            parent.name(),
            child.name(),
            requester.name(),
        ));

        Ok(child)
    }

    /// 부모 void 중: 컴패니언 언로드, 요청자가 남아 있으면 다시 대기
    fn unwind_companion(
        &self,
        parent_name: &str,
        child_name: &str,
        child: &Weak<ModuleInstance>,
        requester: &Weak<ModuleInstance>,
    ) {
        if let Some(child) = child.upgrade() {
            if self.index.contains_instance(&child) && child.is_loaded() {
                let call = UnloadCall {
                    unload_dependents: true,
                    force: true,
                    unloading_submodule: true,
                    reloading: false,
                };
                if let Err(e) =
                    self.unload_instance(&child, call, self.tracker.depth(), &mut Vec::new())
                {
                    warn!(module = %child.name(), "Failed to unload companion: {}", e);
                }
            }
        }

        if let Some(requester) = requester.upgrade() {
            if self.index.contains_instance(&requester) && requester.is_loaded() {
                self.defer_companion(parent_name, child_name, &requester);
            }
        }
    }

    fn defer_companion(&self, parent_name: &str, child_name: &str, requester: &Arc<ModuleInstance>) {
        if self
            .companions
            .defer(CompanionWait::new(parent_name, child_name, requester))
        {
            self.events.publish(notify::companion::deferred(
                parent_name,
                child_name,
                requester.name(),
            ));
        }
    }
}
