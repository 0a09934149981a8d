//! Dependency Index - 전체 이름 → 로드된 인스턴스
//!
//! 이름당 살아 있는 인스턴스는 최대 하나입니다. 역방향 조회
//! ("누가 X에 의존하는가")는 각 인스턴스의 `dependencies`를 훑어 계산합니다.

use super::instance::ModuleInstance;
use parking_lot::RwLock;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

struct IndexEntry {
    instance: Arc<ModuleInstance>,
    load_order: u64,
}

/// 의존성 인덱스
#[derive(Default)]
pub struct DependencyIndex {
    entries: RwLock<HashMap<String, IndexEntry>>,
    load_counter: AtomicU64,
}

impl DependencyIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// 인스턴스 등록. 같은 이름이 있으면 false
    pub fn insert(&self, instance: Arc<ModuleInstance>) -> bool {
        let name = instance.name().to_string();
        let mut entries = self.entries.write();

        if entries.contains_key(&name) {
            warn!("Module {} is already indexed", name);
            return false;
        }

        let load_order = self.load_counter.fetch_add(1, Ordering::SeqCst);
        entries.insert(
            name.clone(),
            IndexEntry {
                instance,
                load_order,
            },
        );

        debug!(module = %name, load_order, "Indexed module");
        true
    }

    /// 이 인스턴스가 등록돼 있을 때만 제거
    pub fn remove_instance(&self, instance: &Arc<ModuleInstance>) -> bool {
        let mut entries = self.entries.write();
        let registered = entries
            .get(instance.name())
            .is_some_and(|entry| Arc::ptr_eq(&entry.instance, instance));

        if registered {
            entries.remove(instance.name());
            debug!(module = %instance.name(), "Unindexed module");
        }
        registered
    }

    pub fn get(&self, name: &str) -> Option<Arc<ModuleInstance>> {
        self.entries
            .read()
            .get(name)
            .map(|entry| Arc::clone(&entry.instance))
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    /// 정확히 이 인스턴스가 등록돼 있는지
    pub fn contains_instance(&self, instance: &Arc<ModuleInstance>) -> bool {
        self.entries
            .read()
            .get(instance.name())
            .is_some_and(|entry| Arc::ptr_eq(&entry.instance, instance))
    }

    /// 로드 순서대로 정렬된 인스턴스
    pub fn instances(&self) -> Vec<Arc<ModuleInstance>> {
        let entries = self.entries.read();
        let mut ordered: Vec<&IndexEntry> = entries.values().collect();
        ordered.sort_by_key(|entry| entry.load_order);
        ordered
            .into_iter()
            .map(|entry| Arc::clone(&entry.instance))
            .collect()
    }

    /// 로드 순서대로 정렬된 이름
    pub fn names(&self) -> Vec<String> {
        self.instances()
            .iter()
            .map(|instance| instance.name().to_string())
            .collect()
    }

    /// `target`에 의존하는 인스턴스 (로드 순)
    pub fn dependents_of(&self, target: &Arc<ModuleInstance>) -> Vec<Arc<ModuleInstance>> {
        self.instances()
            .into_iter()
            .filter(|instance| !Arc::ptr_eq(instance, target) && instance.depends_on(target))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }
}
