//! Subscription Tracker - 모듈이 붙인 콜백 추적
//!
//! 관찰 중인 [`EventSource`]에서 구독이 생기면, 현재 스레드에서 실행 중인
//! 모듈(init/void 단계, `with_context`, 또는 그 모듈이 등록한 콜백의 호출)의
//! 소유로 기록합니다. 모듈이
//! 언로드될 때 [`SubscriptionTracker::teardown`]이 기록된 콜백을 정확히 한 번씩
//! 해제합니다.
//!
//! ```text
//! EventEmitter ──Subscribed──▶ tracker ──record──▶ instance.subscriptions
//!              ──Unsubscribed──▶ revoke_one
//!              ──TopicCleared──▶ revoke_by_topic
//! unload ──teardown──▶ source.unsubscribe(topic, cb) (살아 있는 소스만)
//! ```

use super::instance::ModuleInstance;
use modhost_foundation::{
    CallbackId, EventSource, SourceId, SubscriptionNotice, SubscriptionObserver,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use tracing::{debug, trace};

/// 옵저버 이름 접두어. 추적기마다 `#<n>`이 붙음
pub const TRACKER_OBSERVER_NAME: &str = "modhost.subscription-tracker";

static TRACKER_COUNTER: AtomicU64 = AtomicU64::new(1);

/// 인스턴스별 구독 기록
#[derive(Clone)]
pub struct SubscriptionRecord {
    /// 소스가 먼저 사라지면 정리 시 건너뜀
    pub source: Weak<dyn EventSource>,
    pub source_id: SourceId,
    pub topic: String,
    pub callback: CallbackId,
}

impl std::fmt::Debug for SubscriptionRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SubscriptionRecord")
            .field("source_id", &self.source_id)
            .field("topic", &self.topic)
            .field("callback", &self.callback)
            .finish()
    }
}

struct ExecFrame {
    id: u64,
    thread: ThreadId,
    module: Weak<ModuleInstance>,
}

/// 실행 프레임 가드 (drop 시 프레임 제거)
pub struct ExecGuard<'a> {
    tracker: &'a SubscriptionTracker,
    id: u64,
}

impl Drop for ExecGuard<'_> {
    fn drop(&mut self) {
        self.tracker.frames.lock().retain(|f| f.id != self.id);
    }
}

/// 구독 추적기
pub struct SubscriptionTracker {
    observer_name: String,
    frames: Mutex<Vec<ExecFrame>>,
    frame_counter: AtomicU64,
    /// (소스, 콜백) → 소유 인스턴스
    owners: Mutex<HashMap<(SourceId, CallbackId), Owner>>,
}

struct Owner {
    topic: String,
    instance: Weak<ModuleInstance>,
}

impl SubscriptionTracker {
    pub fn new() -> Self {
        Self {
            observer_name: format!(
                "{}#{}",
                TRACKER_OBSERVER_NAME,
                TRACKER_COUNTER.fetch_add(1, Ordering::SeqCst)
            ),
            frames: Mutex::new(Vec::new()),
            frame_counter: AtomicU64::new(0),
            owners: Mutex::new(HashMap::new()),
        }
    }

    /// 이벤트 소스에 등록되는 옵저버 이름 (추적기마다 고유)
    pub fn observer_name(&self) -> &str {
        &self.observer_name
    }

    // ========================================================================
    // 실행 컨텍스트
    // ========================================================================

    /// 현재 스레드에서 `instance` 코드 실행 시작
    pub fn enter(&self, instance: &Arc<ModuleInstance>) -> ExecGuard<'_> {
        let id = self.push_frame(instance);
        ExecGuard { tracker: self, id }
    }

    fn push_frame(&self, instance: &Arc<ModuleInstance>) -> u64 {
        let id = self.frame_counter.fetch_add(1, Ordering::SeqCst);
        self.frames.lock().push(ExecFrame {
            id,
            thread: std::thread::current().id(),
            module: Arc::downgrade(instance),
        });
        id
    }

    /// 현재 스레드에서 실행 중인 가장 안쪽 모듈
    pub fn current(&self) -> Option<Arc<ModuleInstance>> {
        let thread = std::thread::current().id();
        self.frames
            .lock()
            .iter()
            .rev()
            .find(|f| f.thread == thread)
            .and_then(|f| f.module.upgrade())
    }

    /// 현재 스레드의 중첩 깊이 (진단용)
    pub fn depth(&self) -> usize {
        let thread = std::thread::current().id();
        self.frames
            .lock()
            .iter()
            .filter(|f| f.thread == thread)
            .count()
    }

    // ========================================================================
    // 기록/해제
    // ========================================================================

    /// 구독 기록
    pub fn record(
        &self,
        instance: &Arc<ModuleInstance>,
        source: Weak<dyn EventSource>,
        source_id: SourceId,
        topic: &str,
        callback: CallbackId,
    ) {
        instance.subscriptions().lock().push(SubscriptionRecord {
            source,
            source_id,
            topic: topic.to_string(),
            callback,
        });
        self.owners.lock().insert(
            (source_id, callback),
            Owner {
                topic: topic.to_string(),
                instance: Arc::downgrade(instance),
            },
        );
        trace!(module = %instance.name(), source = %source_id, topic, callback = %callback, "Recorded subscription");
    }

    /// 소스+토픽이 일치하는 기록 모두 제거. 제거 수 반환
    pub fn revoke_by_topic(
        &self,
        instance: &Arc<ModuleInstance>,
        source_id: SourceId,
        topic: &str,
    ) -> usize {
        let removed: Vec<SubscriptionRecord> = {
            let mut records = instance.subscriptions().lock();
            let (removed, kept): (Vec<_>, Vec<_>) = std::mem::take(&mut *records)
                .into_iter()
                .partition(|r| r.source_id == source_id && r.topic == topic);
            *records = kept;
            removed
        };

        let mut owners = self.owners.lock();
        for record in &removed {
            owners.remove(&(record.source_id, record.callback));
        }

        removed.len()
    }

    /// 기록 하나 제거. 두 번째 호출은 no-op
    pub fn revoke_one(
        &self,
        instance: &Arc<ModuleInstance>,
        source_id: SourceId,
        topic: &str,
        callback: CallbackId,
    ) -> bool {
        let removed = {
            let mut records = instance.subscriptions().lock();
            match records.iter().position(|r| {
                r.source_id == source_id && r.topic == topic && r.callback == callback
            }) {
                Some(pos) => {
                    records.remove(pos);
                    true
                }
                None => false,
            }
        };

        if removed {
            self.owners.lock().remove(&(source_id, callback));
        }

        removed
    }

    /// 인스턴스의 모든 구독 해제. 살아 있는 소스에서 해제한 수 반환
    ///
    /// 목록을 먼저 비우므로 해제 중 들어오는 `Unsubscribed` 통지는 no-op입니다.
    pub fn teardown(&self, instance: &Arc<ModuleInstance>) -> usize {
        let records = std::mem::take(&mut *instance.subscriptions().lock());
        if records.is_empty() {
            return 0;
        }

        {
            let mut owners = self.owners.lock();
            for record in &records {
                owners.remove(&(record.source_id, record.callback));
            }
        }

        let mut revoked = 0;
        for record in records {
            match record.source.upgrade() {
                Some(source) => {
                    if source.unsubscribe(&record.topic, record.callback) {
                        revoked += 1;
                    }
                }
                None => {
                    trace!(topic = %record.topic, callback = %record.callback, "Source gone, dropping record");
                }
            }
        }

        debug!(module = %instance.name(), revoked, "Subscriptions torn down");
        revoked
    }

    fn owner_of(&self, source_id: SourceId, callback: CallbackId) -> Option<Arc<ModuleInstance>> {
        self.owners
            .lock()
            .get(&(source_id, callback))
            .and_then(|o| o.instance.upgrade())
    }

    fn owners_of_topic(&self, source_id: SourceId, topic: &str) -> Vec<Arc<ModuleInstance>> {
        let mut found: Vec<Arc<ModuleInstance>> = Vec::new();
        for ((sid, _), owner) in self.owners.lock().iter() {
            if *sid != source_id || owner.topic != topic {
                continue;
            }
            if let Some(instance) = owner.instance.upgrade() {
                if !found.iter().any(|i| Arc::ptr_eq(i, &instance)) {
                    found.push(instance);
                }
            }
        }
        found
    }
}

impl Default for SubscriptionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl SubscriptionObserver for SubscriptionTracker {
    fn name(&self) -> &str {
        &self.observer_name
    }

    // 모듈이 등록한 콜백이 도는 동안은 그 모듈의 코드가 실행 중인 것
    fn dispatch_started(&self, source_id: SourceId, callback: CallbackId) -> Option<u64> {
        let owner = self.owner_of(source_id, callback)?;
        Some(self.push_frame(&owner))
    }

    fn dispatch_finished(&self, token: u64) {
        self.frames.lock().retain(|f| f.id != token);
    }

    fn observe(&self, notice: &SubscriptionNotice) {
        match notice {
            SubscriptionNotice::Subscribed {
                source,
                source_id,
                topic,
                callback,
                permanent,
            } => {
                if *permanent {
                    return;
                }
                match self.current() {
                    Some(instance) => {
                        self.record(&instance, source.clone(), *source_id, topic, *callback)
                    }
                    None => trace!(topic = %topic, "Subscription outside module context"),
                }
            }
            SubscriptionNotice::Unsubscribed {
                source_id,
                topic,
                callback,
            } => {
                if let Some(instance) = self.owner_of(*source_id, *callback) {
                    self.revoke_one(&instance, *source_id, topic, *callback);
                }
            }
            SubscriptionNotice::TopicCleared { source_id, topic } => {
                for instance in self.owners_of_topic(*source_id, topic) {
                    self.revoke_by_topic(&instance, *source_id, topic);
                }
            }
        }
    }
}
