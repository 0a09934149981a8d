//! Unload / reload path
//!
//! 언로드는 의존 모듈을 먼저 내린 뒤 자신을 void 합니다. void가 거부되면
//! 자신은 `Loaded`로 남고, 이미 내려간 의존 모듈은 다시 올라오지 않습니다.

use super::descriptor::SUBMODULE_SEPARATOR;
use super::error::{ModuleError, Result};
use super::hooks::{run_steps, ChainResult};
use super::instance::{ModuleInstance, ModuleState};
use super::manager::{HostInner, ModuleTarget, ReloadEntry, UnloadCall};
use modhost_foundation::event as notify;
use std::sync::Arc;
use tracing::{debug, info, info_span, warn};

impl HostInner {
    /// 이름/인스턴스를 인덱스에 있는 인스턴스로
    pub(crate) fn resolve_target(&self, target: ModuleTarget) -> Result<Arc<ModuleInstance>> {
        match target {
            ModuleTarget::Name(name) => self
                .index
                .get(&name)
                .ok_or(ModuleError::NotLoaded(name)),
            ModuleTarget::Instance(instance) => {
                if self.index.contains_instance(&instance) {
                    Ok(instance)
                } else {
                    Err(ModuleError::NotLoaded(instance.name().to_string()))
                }
            }
        }
    }

    /// 인스턴스 언로드. 실제로 언로드된 모듈 이름 반환
    ///
    /// `reloading`이면 언로드된 최상위 모듈을 `scratch`에 순서대로 기록합니다.
    pub(crate) fn unload_instance(
        &self,
        instance: &Arc<ModuleInstance>,
        call: UnloadCall,
        depth: usize,
        scratch: &mut Vec<ReloadEntry>,
    ) -> Result<String> {
        let name = instance.name().to_string();
        let span = info_span!("unload", module = %name, depth);
        let _enter = span.enter();

        if !self.index.contains_instance(instance) || !instance.is_loaded() {
            return Err(ModuleError::NotLoaded(name));
        }

        if let Some(parent) = instance.parent() {
            if !call.unloading_submodule {
                if !call.force {
                    return Err(ModuleError::SubmoduleCannotUnloadIndependently(name));
                }
                debug!(parent = %parent.name(), "Forced submodule unload; unloading parent instead");
                return self.unload_instance(&parent, call, depth, scratch);
            }
        }

        let dependents = self.index.dependents_of(instance);
        if !dependents.is_empty() && !call.unload_dependents {
            return Err(ModuleError::DependentsStillLoaded {
                module: name,
                dependents: dependents.iter().map(|d| d.name().to_string()).collect(),
            });
        }

        for dependent in dependents {
            // 자기 서브모듈은 아래에서 함께 내려감
            if is_descendant(&dependent, instance) {
                continue;
            }
            if !self.index.contains_instance(&dependent) || !dependent.is_loaded() {
                continue;
            }
            let cascade = UnloadCall {
                unload_dependents: true,
                force: true,
                unloading_submodule: false,
                reloading: call.reloading,
            };
            self.unload_instance(&dependent, cascade, depth + 1, scratch)?;
        }

        instance.set_state(ModuleState::Voiding);
        self.events.publish(notify::lifecycle::voiding(&name));

        let steps = HostInner::merged_steps(&self.global_void, instance.void_chain());
        let result = {
            let _frame = self.tracker.enter(instance);
            run_steps(&steps, instance)
        };

        if let ChainResult::Stopped { step, reason } = result {
            if call.unloading_submodule {
                warn!(step = %step, "Submodule void step stopped ({}); unloading anyway", reason);
            } else {
                instance.set_state(ModuleState::Loaded);
                info!(step = %step, "Unload canceled: {}", reason);
                self.events
                    .publish(notify::lifecycle::void_canceled(&name, &step));
                return Err(ModuleError::VoidCanceled { module: name, step });
            }
        }

        // safe point: 여기부터는 되돌리지 않음
        if call.reloading && instance.parent().is_none() {
            scratch.push(ReloadEntry {
                name: name.clone(),
                search_dir: instance.search_dir().to_path_buf(),
            });
        }

        for child in instance.submodules() {
            let child_call = UnloadCall {
                unload_dependents: true,
                force: true,
                unloading_submodule: true,
                reloading: call.reloading,
            };
            if self.index.contains_instance(&child) {
                if let Err(e) = self.unload_instance(&child, child_call, depth + 1, scratch) {
                    warn!(submodule = %child.name(), "Failed to unload submodule: {}", e);
                }
            }
            instance.detach_child(&child);
            child.clear_parent();
        }

        self.events
            .publish(notify::lifecycle::unloaded(&name, call.reloading));

        self.index.remove_instance(instance);
        let revoked = self.tracker.teardown(instance);
        let canceled = self.companions.cancel_for_requester(instance);

        if let Some(handle) = instance.take_binding() {
            let preserve = call.reloading && instance.descriptor().flags.preserve_bindings;
            self.bindings.deactivate(handle, preserve);
        }
        instance.set_state(ModuleState::Deactivated);

        if let Some(parent) = instance.parent() {
            parent.detach_child(instance);
        }
        instance.clear_parent();
        instance.clear_dependencies();
        instance.set_state(ModuleState::Unloaded);

        info!(
            subscriptions = revoked,
            companion_waits = canceled,
            reloading = call.reloading,
            "Module unloaded"
        );
        Ok(name)
    }

    /// 리로드: 모든 대상을 언로드한 뒤 언로드된 최상위 모듈을 역순으로 재로드
    ///
    /// 언로드 중 실패하면 이미 내려간 모듈을 다시 올리고 그 오류를 반환합니다.
    pub(crate) fn reload(&self, targets: Vec<ModuleTarget>) -> Result<usize> {
        let span = info_span!("reload", targets = targets.len());
        let _enter = span.enter();

        let mut scratch: Vec<ReloadEntry> = Vec::new();
        let mut requested: Vec<String> = Vec::new();

        for target in targets {
            let target_name = match &target {
                ModuleTarget::Name(name) => name.clone(),
                ModuleTarget::Instance(instance) => instance.name().to_string(),
            };

            // 앞선 대상의 연쇄 언로드로 이미 내려간 경우
            if scratch.iter().any(|entry| entry.name == target_name)
                && !self.index.contains(&target_name)
            {
                requested.push(target_name);
                continue;
            }

            let result = self.resolve_target(target).and_then(|instance| {
                let call = UnloadCall {
                    unload_dependents: true,
                    force: true,
                    unloading_submodule: false,
                    reloading: true,
                };
                self.unload_instance(&instance, call, 0, &mut scratch)
            });

            match result {
                Ok(unloaded) => {
                    if unloaded != target_name {
                        debug!(target = %target_name, unloaded = %unloaded, "Reload redirected to parent");
                    }
                    requested.push(unloaded);
                }
                Err(e) => {
                    warn!(target = %target_name, "Reload aborted: {}", e);
                    let restored = self.reactivate(&scratch);
                    debug!(restored, "Restored modules unloaded before the failure");
                    return Err(e);
                }
            }
        }

        let reactivated = self.reactivate(&scratch);
        info!(reactivated, "Reload complete");
        self.events
            .publish(notify::lifecycle::reloaded(&requested, reactivated));
        Ok(reactivated)
    }

    /// 기록된 모듈을 역순으로 다시 로드. 성공 수 반환
    fn reactivate(&self, scratch: &[ReloadEntry]) -> usize {
        let mut reactivated = 0;

        for entry in scratch.iter().rev() {
            if self.index.contains(&entry.name) {
                debug!(module = %entry.name, "Already loaded again; skipping");
                continue;
            }

            let dirs = self.dirs_with(&entry.search_dir);
            match self.load_top_level(&entry.name, &dirs, 0) {
                Ok(_) => reactivated += 1,
                Err(e) => warn!(module = %entry.name, "Failed to reload: {}", e),
            }
        }

        reactivated
    }
}

/// `candidate`가 `ancestor`의 (간접) 서브모듈인지
fn is_descendant(candidate: &Arc<ModuleInstance>, ancestor: &Arc<ModuleInstance>) -> bool {
    let prefix = format!("{}{}", ancestor.name(), SUBMODULE_SEPARATOR);
    if !candidate.name().starts_with(&prefix) {
        return false;
    }

    let mut current = candidate.parent();
    while let Some(parent) = current {
        if Arc::ptr_eq(&parent, ancestor) {
            return true;
        }
        current = parent.parent();
    }
    false
}
