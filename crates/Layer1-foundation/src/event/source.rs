//! Event Source - 취소 가능한 토픽 구독
//!
//! 모듈 코드가 콜백을 등록하는 대상입니다. 구독/해제/토픽 정리가 일어날 때마다
//! 등록된 [`SubscriptionObserver`]에게 통지하므로, 호스트는 모듈 코드의 협조
//! 없이도 "이 모듈이 붙인 모든 것"을 추적할 수 있습니다.

use parking_lot::RwLock;
use serde_json::Value;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use tracing::{debug, trace};

static SOURCE_COUNTER: AtomicU64 = AtomicU64::new(1);

// ============================================================================
// IDs
// ============================================================================

/// 이벤트 소스 ID (프로세스 내 고유)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SourceId(u64);

impl SourceId {
    fn next() -> Self {
        Self(SOURCE_COUNTER.fetch_add(1, Ordering::SeqCst))
    }
}

impl std::fmt::Display for SourceId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "source-{}", self.0)
    }
}

/// 콜백 ID (소스 내 고유)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CallbackId(u64);

impl std::fmt::Display for CallbackId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "cb-{}", self.0)
    }
}

/// 콜백 타입
pub type EventCallback = Arc<dyn Fn(&Value) + Send + Sync>;

// ============================================================================
// EventSource trait
// ============================================================================

/// 구독 취소가 가능한 이벤트 소스
pub trait EventSource: Send + Sync {
    /// 소스 ID
    fn id(&self) -> SourceId;

    /// 소스 이름 (디버깅용)
    fn name(&self) -> &str;

    /// 콜백 하나 해제. 없거나 영구 콜백이면 false
    fn unsubscribe(&self, topic: &str, callback: CallbackId) -> bool;

    /// 토픽의 활성 콜백 수
    fn callback_count(&self, topic: &str) -> usize;
}

// ============================================================================
// 구독 통지
// ============================================================================

/// 소스가 옵저버에게 보내는 구독 변경 통지
#[derive(Clone)]
pub enum SubscriptionNotice {
    /// 콜백 등록됨
    Subscribed {
        source: Weak<dyn EventSource>,
        source_id: SourceId,
        topic: String,
        callback: CallbackId,
        /// 영구 구독은 추적 대상이 아님
        permanent: bool,
    },

    /// 콜백 하나 해제됨
    Unsubscribed {
        source_id: SourceId,
        topic: String,
        callback: CallbackId,
    },

    /// 토픽의 모든 콜백이 정리됨
    TopicCleared { source_id: SourceId, topic: String },
}

impl std::fmt::Debug for SubscriptionNotice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Subscribed {
                source_id,
                topic,
                callback,
                permanent,
                ..
            } => f
                .debug_struct("Subscribed")
                .field("source_id", source_id)
                .field("topic", topic)
                .field("callback", callback)
                .field("permanent", permanent)
                .finish(),
            Self::Unsubscribed {
                source_id,
                topic,
                callback,
            } => f
                .debug_struct("Unsubscribed")
                .field("source_id", source_id)
                .field("topic", topic)
                .field("callback", callback)
                .finish(),
            Self::TopicCleared { source_id, topic } => f
                .debug_struct("TopicCleared")
                .field("source_id", source_id)
                .field("topic", topic)
                .finish(),
        }
    }
}

/// 구독 변경 옵저버
pub trait SubscriptionObserver: Send + Sync {
    /// 옵저버 이름 (중복 등록 방지 키)
    fn name(&self) -> &str;

    /// 통지 처리
    fn observe(&self, notice: &SubscriptionNotice);

    /// `emit`이 콜백 하나를 부르기 직전에 호출됨
    ///
    /// `Some(token)`을 돌려주면 콜백이 끝난 뒤(패닉 포함) 같은 토큰으로
    /// [`dispatch_finished`](Self::dispatch_finished)가 호출됩니다.
    fn dispatch_started(&self, _source_id: SourceId, _callback: CallbackId) -> Option<u64> {
        None
    }

    /// 콜백 호출 종료
    fn dispatch_finished(&self, _token: u64) {}
}

/// 콜백 하나를 부르는 동안 열린 옵저버 스코프. drop 시 역순으로 닫음
struct DispatchScope<'a> {
    open: Vec<(&'a Arc<dyn SubscriptionObserver>, u64)>,
}

impl<'a> DispatchScope<'a> {
    fn enter(
        observers: &'a [Arc<dyn SubscriptionObserver>],
        source_id: SourceId,
        callback: CallbackId,
    ) -> Self {
        let open = observers
            .iter()
            .filter_map(|o| o.dispatch_started(source_id, callback).map(|token| (o, token)))
            .collect();
        Self { open }
    }
}

impl Drop for DispatchScope<'_> {
    fn drop(&mut self) {
        while let Some((observer, token)) = self.open.pop() {
            observer.dispatch_finished(token);
        }
    }
}

// ============================================================================
// EventEmitter
// ============================================================================

struct RegisteredCallback {
    id: CallbackId,
    callback: EventCallback,
    permanent: bool,
}

/// 기본 이벤트 소스 구현
///
/// ```ignore
/// let emitter = EventEmitter::new("chat");
/// let id = emitter.subscribe("message", Arc::new(|payload| println!("{payload}")));
/// emitter.emit("message", &json!({"text": "hi"}));
/// emitter.unsubscribe("message", id);
/// ```
pub struct EventEmitter {
    id: SourceId,
    name: String,
    self_ref: Weak<EventEmitter>,
    topics: RwLock<HashMap<String, Vec<RegisteredCallback>>>,
    observers: RwLock<Vec<Arc<dyn SubscriptionObserver>>>,
    callback_counter: AtomicU64,
}

impl EventEmitter {
    /// 새 이미터 생성
    pub fn new(name: impl Into<String>) -> Arc<Self> {
        let name = name.into();
        Arc::new_cyclic(|self_ref| Self {
            id: SourceId::next(),
            name,
            self_ref: self_ref.clone(),
            topics: RwLock::new(HashMap::new()),
            observers: RwLock::new(Vec::new()),
            callback_counter: AtomicU64::new(1),
        })
    }

    /// 옵저버 등록 (같은 이름은 한 번만)
    pub fn add_observer(&self, observer: Arc<dyn SubscriptionObserver>) -> bool {
        let mut observers = self.observers.write();
        if observers.iter().any(|o| o.name() == observer.name()) {
            return false;
        }
        debug!(source = %self.name, observer = observer.name(), "Attached subscription observer");
        observers.push(observer);
        true
    }

    /// 옵저버 해제
    pub fn remove_observer(&self, name: &str) -> bool {
        let mut observers = self.observers.write();
        let before = observers.len();
        observers.retain(|o| o.name() != name);
        before != observers.len()
    }

    /// 콜백 등록 (추적 대상)
    pub fn subscribe(&self, topic: &str, callback: EventCallback) -> CallbackId {
        self.register(topic, callback, false)
    }

    /// 영구 콜백 등록 (해제 불가, 추적 제외)
    pub fn subscribe_permanent(&self, topic: &str, callback: EventCallback) -> CallbackId {
        self.register(topic, callback, true)
    }

    fn register(&self, topic: &str, callback: EventCallback, permanent: bool) -> CallbackId {
        let id = CallbackId(self.callback_counter.fetch_add(1, Ordering::SeqCst));

        self.topics
            .write()
            .entry(topic.to_string())
            .or_default()
            .push(RegisteredCallback {
                id,
                callback,
                permanent,
            });

        trace!(source = %self.name, topic, callback = %id, permanent, "Callback subscribed");

        let source: Weak<dyn EventSource> = self.self_ref.clone();
        self.notify(SubscriptionNotice::Subscribed {
            source,
            source_id: self.id,
            topic: topic.to_string(),
            callback: id,
            permanent,
        });

        id
    }

    /// 토픽의 모든 콜백 정리 (영구 콜백 포함)
    pub fn clear_topic(&self, topic: &str) -> usize {
        let removed = self
            .topics
            .write()
            .remove(topic)
            .map(|callbacks| callbacks.len())
            .unwrap_or(0);

        debug!(source = %self.name, topic, removed, "Topic cleared");

        self.notify(SubscriptionNotice::TopicCleared {
            source_id: self.id,
            topic: topic.to_string(),
        });

        removed
    }

    /// 이벤트 발행. 호출된 콜백 수 반환
    pub fn emit(&self, topic: &str, payload: &Value) -> usize {
        // 콜백이 다시 구독/해제할 수 있으므로 스냅샷 후 호출
        let callbacks: Vec<(CallbackId, EventCallback)> = self
            .topics
            .read()
            .get(topic)
            .map(|list| list.iter().map(|c| (c.id, Arc::clone(&c.callback))).collect())
            .unwrap_or_default();

        let observers: Vec<Arc<dyn SubscriptionObserver>> =
            self.observers.read().iter().cloned().collect();

        for (id, callback) in &callbacks {
            let _scope = DispatchScope::enter(&observers, self.id, *id);
            callback(payload);
        }

        callbacks.len()
    }

    /// 등록된 토픽 목록
    pub fn topics(&self) -> Vec<String> {
        let topics = self.topics.read();
        let mut names: Vec<String> = topics
            .iter()
            .filter(|(_, list)| !list.is_empty())
            .map(|(name, _)| name.clone())
            .collect();
        names.sort();
        names
    }

    fn notify(&self, notice: SubscriptionNotice) {
        let observers: Vec<Arc<dyn SubscriptionObserver>> =
            self.observers.read().iter().cloned().collect();

        for observer in observers {
            observer.observe(&notice);
        }
    }
}

impl EventSource for EventEmitter {
    fn id(&self) -> SourceId {
        self.id
    }

    fn name(&self) -> &str {
        &self.name
    }

    fn unsubscribe(&self, topic: &str, callback: CallbackId) -> bool {
        let removed = {
            let mut topics = self.topics.write();
            match topics.get_mut(topic) {
                Some(list) => match list.iter().position(|c| c.id == callback && !c.permanent) {
                    Some(pos) => {
                        list.remove(pos);
                        if list.is_empty() {
                            topics.remove(topic);
                        }
                        true
                    }
                    None => false,
                },
                None => false,
            }
        };

        if removed {
            trace!(source = %self.name, topic, callback = %callback, "Callback unsubscribed");
            self.notify(SubscriptionNotice::Unsubscribed {
                source_id: self.id,
                topic: topic.to_string(),
                callback,
            });
        }

        removed
    }

    fn callback_count(&self, topic: &str) -> usize {
        self.topics.read().get(topic).map(|l| l.len()).unwrap_or(0)
    }
}

// ============================================================================
// 테스트
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[derive(Default)]
    struct RecordingObserver {
        notices: Mutex<Vec<SubscriptionNotice>>,
    }

    impl SubscriptionObserver for RecordingObserver {
        fn name(&self) -> &str {
            "recording"
        }

        fn observe(&self, notice: &SubscriptionNotice) {
            self.notices.lock().push(notice.clone());
        }
    }

    fn counter_callback(counter: &Arc<AtomicUsize>) -> EventCallback {
        let counter = Arc::clone(counter);
        Arc::new(move |_: &Value| {
            counter.fetch_add(1, Ordering::SeqCst);
        })
    }

    #[test]
    fn test_subscribe_emit_unsubscribe() {
        let emitter = EventEmitter::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        let id = emitter.subscribe("ping", counter_callback(&hits));
        assert_eq!(emitter.emit("ping", &Value::Null), 1);
        assert_eq!(hits.load(Ordering::SeqCst), 1);

        assert!(emitter.unsubscribe("ping", id));
        assert!(!emitter.unsubscribe("ping", id));
        assert_eq!(emitter.callback_count("ping"), 0);
        assert_eq!(emitter.emit("ping", &Value::Null), 0);
    }

    #[test]
    fn test_permanent_callbacks_cannot_be_unsubscribed() {
        let emitter = EventEmitter::new("test");
        let hits = Arc::new(AtomicUsize::new(0));

        let id = emitter.subscribe_permanent("ping", counter_callback(&hits));
        assert!(!emitter.unsubscribe("ping", id));
        assert_eq!(emitter.callback_count("ping"), 1);

        assert_eq!(emitter.clear_topic("ping"), 1);
        assert_eq!(emitter.callback_count("ping"), 0);
    }

    #[test]
    fn test_observer_notices() {
        let emitter = EventEmitter::new("test");
        let observer = Arc::new(RecordingObserver::default());
        assert!(emitter.add_observer(observer.clone()));
        assert!(!emitter.add_observer(observer.clone()));

        let id = emitter.subscribe("a", Arc::new(|_: &Value| {}));
        emitter.subscribe_permanent("a", Arc::new(|_: &Value| {}));
        emitter.unsubscribe("a", id);
        emitter.clear_topic("a");

        let notices = observer.notices.lock();
        assert_eq!(notices.len(), 4);
        assert!(matches!(notices[0], SubscriptionNotice::Subscribed { permanent: false, .. }));
        assert!(matches!(notices[1], SubscriptionNotice::Subscribed { permanent: true, .. }));
        assert!(matches!(notices[2], SubscriptionNotice::Unsubscribed { .. }));
        assert!(matches!(notices[3], SubscriptionNotice::TopicCleared { .. }));
    }

    #[test]
    fn test_notice_carries_live_weak_source() {
        let emitter = EventEmitter::new("test");
        let observer = Arc::new(RecordingObserver::default());
        emitter.add_observer(observer.clone());
        emitter.subscribe("a", Arc::new(|_: &Value| {}));

        let notices = observer.notices.lock();
        match &notices[0] {
            SubscriptionNotice::Subscribed { source, source_id, .. } => {
                let source = source.upgrade().expect("source alive");
                assert_eq!(source.id(), *source_id);
                assert_eq!(source.name(), "test");
            }
            other => panic!("unexpected notice: {:?}", other),
        }
    }

    #[derive(Default)]
    struct ScopeObserver {
        log: Mutex<Vec<String>>,
    }

    impl SubscriptionObserver for ScopeObserver {
        fn name(&self) -> &str {
            "scope"
        }

        fn observe(&self, notice: &SubscriptionNotice) {
            if let SubscriptionNotice::Subscribed { topic, .. } = notice {
                self.log.lock().push(format!("sub:{topic}"));
            }
        }

        fn dispatch_started(&self, _source_id: SourceId, callback: CallbackId) -> Option<u64> {
            self.log.lock().push(format!("start:{callback}"));
            Some(callback.0)
        }

        fn dispatch_finished(&self, token: u64) {
            self.log.lock().push(format!("end:{token}"));
        }
    }

    #[test]
    fn test_dispatch_scope_wraps_each_callback() {
        let emitter = EventEmitter::new("test");
        let observer = Arc::new(ScopeObserver::default());
        emitter.add_observer(observer.clone());

        let inner = Arc::clone(&emitter);
        let first = emitter.subscribe(
            "a",
            Arc::new(move |_: &Value| {
                inner.subscribe("b", Arc::new(|_: &Value| {}));
            }),
        );
        let second = emitter.subscribe("a", Arc::new(|_: &Value| {}));
        observer.log.lock().clear();

        assert_eq!(emitter.emit("a", &Value::Null), 2);
        assert_eq!(
            *observer.log.lock(),
            vec![
                format!("start:{first}"),
                "sub:b".to_string(),
                format!("end:{}", first.0),
                format!("start:{second}"),
                format!("end:{}", second.0),
            ]
        );
    }

    #[test]
    fn test_callback_may_resubscribe_during_emit() {
        let emitter = EventEmitter::new("test");
        let inner = Arc::clone(&emitter);
        emitter.subscribe(
            "a",
            Arc::new(move |_: &Value| {
                inner.subscribe("b", Arc::new(|_: &Value| {}));
            }),
        );

        emitter.emit("a", &Value::Null);
        assert_eq!(emitter.callback_count("b"), 1);
        assert_eq!(emitter.topics(), vec!["a".to_string(), "b".to_string()]);
    }
}
