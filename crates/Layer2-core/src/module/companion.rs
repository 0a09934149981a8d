//! Companion Scheduler - 부모 로드 대기 목록
//!
//! "P가 로드되면 requester 아래에 서브모듈 S를 로드"라는 요청을 보관합니다.
//! 요청자는 weak로 들고 있으므로, 요청자가 먼저 사라지면 대기는 무효가 됩니다.

use super::instance::ModuleInstance;
use parking_lot::Mutex;
use std::sync::{Arc, Weak};
use tracing::debug;

/// 대기 중인 컴패니언 요청
#[derive(Debug, Clone)]
pub struct CompanionWait {
    /// 기다리는 부모 모듈 전체 이름
    pub parent_name: String,
    /// 로드할 서브모듈 짧은 이름
    pub child_name: String,
    pub requester: Weak<ModuleInstance>,
}

impl CompanionWait {
    pub fn new(
        parent_name: impl Into<String>,
        child_name: impl Into<String>,
        requester: &Arc<ModuleInstance>,
    ) -> Self {
        Self {
            parent_name: parent_name.into(),
            child_name: child_name.into(),
            requester: Arc::downgrade(requester),
        }
    }

    fn is_from(&self, requester: &Arc<ModuleInstance>) -> bool {
        self.requester
            .upgrade()
            .is_some_and(|r| Arc::ptr_eq(&r, requester))
    }

    fn same_request(&self, other: &CompanionWait) -> bool {
        self.parent_name == other.parent_name
            && self.child_name == other.child_name
            && Weak::ptr_eq(&self.requester, &other.requester)
    }
}

/// 컴패니언 대기 목록
#[derive(Default)]
pub struct CompanionScheduler {
    waits: Mutex<Vec<CompanionWait>>,
}

impl CompanionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// 대기 등록 (같은 요청은 한 번만). 새로 등록되면 true
    pub fn defer(&self, wait: CompanionWait) -> bool {
        let mut waits = self.waits.lock();
        waits.retain(|w| w.requester.strong_count() > 0);

        if waits.iter().any(|w| w.same_request(&wait)) {
            return false;
        }

        debug!(parent = %wait.parent_name, child = %wait.child_name, "Deferred companion");
        waits.push(wait);
        true
    }

    /// 부모 이름에 걸린 대기 모두 꺼냄 (요청자가 살아 있는 것만, 등록 순)
    pub fn take_for(&self, parent_name: &str) -> Vec<CompanionWait> {
        let mut waits = self.waits.lock();
        let (taken, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *waits)
            .into_iter()
            .partition(|w| w.parent_name == parent_name);
        *waits = kept;

        taken
            .into_iter()
            .filter(|w| w.requester.strong_count() > 0)
            .collect()
    }

    /// 요청자의 대기 모두 취소. 취소 수 반환
    pub fn cancel_for_requester(&self, requester: &Arc<ModuleInstance>) -> usize {
        let mut waits = self.waits.lock();
        let before = waits.len();
        waits.retain(|w| w.requester.strong_count() > 0 && !w.is_from(requester));
        before - waits.len()
    }

    /// 부모 이름에 걸린 대기 수
    pub fn pending_for(&self, parent_name: &str) -> usize {
        self.waits
            .lock()
            .iter()
            .filter(|w| w.parent_name == parent_name && w.requester.strong_count() > 0)
            .count()
    }

    pub fn len(&self) -> usize {
        self.waits.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.waits.lock().is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::module::descriptor::ModuleDescriptor;
    use std::path::PathBuf;

    fn instance(name: &str) -> Arc<ModuleInstance> {
        Arc::new(ModuleInstance::new(
            ModuleDescriptor::new(name),
            PathBuf::from("mods"),
            None,
            Weak::new(),
        ))
    }

    #[test]
    fn test_defer_and_take() {
        let scheduler = CompanionScheduler::new();
        let requester = instance("x");

        assert!(scheduler.defer(CompanionWait::new("parent", "child", &requester)));
        assert!(!scheduler.defer(CompanionWait::new("parent", "child", &requester)));
        assert!(scheduler.defer(CompanionWait::new("other", "child", &requester)));
        assert_eq!(scheduler.pending_for("parent"), 1);

        let taken = scheduler.take_for("parent");
        assert_eq!(taken.len(), 1);
        assert_eq!(taken[0].child_name, "child");
        assert_eq!(scheduler.pending_for("parent"), 0);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_dead_requester_is_inert() {
        let scheduler = CompanionScheduler::new();
        let requester = instance("x");
        scheduler.defer(CompanionWait::new("parent", "child", &requester));
        drop(requester);

        assert_eq!(scheduler.pending_for("parent"), 0);
        assert!(scheduler.take_for("parent").is_empty());
    }

    #[test]
    fn test_cancel_for_requester() {
        let scheduler = CompanionScheduler::new();
        let a = instance("a");
        let b = instance("b");
        scheduler.defer(CompanionWait::new("p", "c1", &a));
        scheduler.defer(CompanionWait::new("p", "c2", &a));
        scheduler.defer(CompanionWait::new("p", "c3", &b));

        assert_eq!(scheduler.cancel_for_requester(&a), 2);
        assert_eq!(scheduler.pending_for("p"), 1);
        assert!(!scheduler.is_empty());
    }
}
