//! 통합 테스트 공용 fixture
//!
//! 메모리 해석기 + 기록용 모듈 코드 + 알림 기록 리스너

#![allow(dead_code)]

use modhost_core::module::{
    HookOutcome, ModuleCode, ModuleDescriptor, ModuleHost, ModuleInstance, RegistryBindingHost,
    StaticManifestResolver,
};
use modhost_foundation::{EventListener, HostEvent};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

pub const MODS: &str = "mods";

pub type Journal = Arc<Mutex<Vec<String>>>;
pub type InitAction = Arc<dyn Fn(&Arc<ModuleInstance>) + Send + Sync>;

// ============================================================================
// 모듈 코드
// ============================================================================

/// init/void 호출을 journal에 남기는 코드
pub struct ScriptedCode {
    journal: Journal,
    refuse_init: bool,
    refuse_void: Arc<AtomicBool>,
    on_init: Option<InitAction>,
}

impl ScriptedCode {
    pub fn new(journal: &Journal) -> Self {
        Self {
            journal: Arc::clone(journal),
            refuse_init: false,
            refuse_void: Arc::new(AtomicBool::new(false)),
            on_init: None,
        }
    }

    pub fn refusing_init(mut self) -> Self {
        self.refuse_init = true;
        self
    }

    /// 공유 플래그가 켜져 있는 동안 void 거부
    pub fn refusing_void_while(mut self, flag: &Arc<AtomicBool>) -> Self {
        self.refuse_void = Arc::clone(flag);
        self
    }

    pub fn on_init(mut self, action: impl Fn(&Arc<ModuleInstance>) + Send + Sync + 'static) -> Self {
        self.on_init = Some(Arc::new(action));
        self
    }
}

impl ModuleCode for ScriptedCode {
    fn init(&self, instance: &Arc<ModuleInstance>) -> HookOutcome {
        self.journal.lock().push(format!("init:{}", instance.name()));
        if let Some(action) = &self.on_init {
            action(instance);
        }
        if self.refuse_init {
            return HookOutcome::stop("refused");
        }
        HookOutcome::Continue
    }

    fn void(&self, instance: &Arc<ModuleInstance>) -> HookOutcome {
        if self.refuse_void.load(Ordering::SeqCst) {
            self.journal.lock().push(format!("refuse:{}", instance.name()));
            return HookOutcome::stop("still busy");
        }
        self.journal.lock().push(format!("void:{}", instance.name()));
        HookOutcome::Continue
    }
}

// ============================================================================
// 알림 기록
// ============================================================================

#[derive(Default)]
pub struct Recorder {
    events: Mutex<Vec<HostEvent>>,
}

impl Recorder {
    /// "module.loaded:chat" 형식
    pub fn entries(&self) -> Vec<String> {
        self.events
            .lock()
            .iter()
            .map(|e| match &e.module {
                Some(module) => format!("{}:{}", e.event_type, module),
                None => e.event_type.clone(),
            })
            .collect()
    }

    pub fn of_type(&self, event_type: &str) -> Vec<HostEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.event_type == event_type)
            .cloned()
            .collect()
    }

    pub fn position(&self, entry: &str) -> Option<usize> {
        self.entries().iter().position(|e| e == entry)
    }
}

impl EventListener for Recorder {
    fn name(&self) -> &str {
        "test-recorder"
    }

    fn on_event(&self, event: &HostEvent) -> modhost_foundation::Result<()> {
        self.events.lock().push(event.clone());
        Ok(())
    }
}

// ============================================================================
// Fixture
// ============================================================================

pub struct Fixture {
    pub resolver: Arc<StaticManifestResolver>,
    pub bindings: Arc<RegistryBindingHost>,
    pub journal: Journal,
    pub recorder: Arc<Recorder>,
}

impl Fixture {
    pub fn new() -> Self {
        let journal: Journal = Arc::new(Mutex::new(Vec::new()));
        let fallback_journal = Arc::clone(&journal);
        let bindings = RegistryBindingHost::new().with_fallback(move |_| {
            Arc::new(ScriptedCode::new(&fallback_journal)) as Arc<dyn ModuleCode>
        });

        Self {
            resolver: Arc::new(StaticManifestResolver::new()),
            bindings: Arc::new(bindings),
            journal,
            recorder: Arc::new(Recorder::default()),
        }
    }

    /// `mods`에 모듈 추가
    pub fn module(self, descriptor: ModuleDescriptor) -> Self {
        self.resolver.insert(MODS, descriptor);
        self
    }

    /// 지정 디렉토리에 모듈 추가 (서브모듈은 `mods/<parent>`)
    pub fn module_in(self, dir: &str, descriptor: ModuleDescriptor) -> Self {
        self.resolver.insert(dir, descriptor);
        self
    }

    /// 코드 유닛에 전용 코드 등록
    pub fn code<F>(self, code_unit: &str, factory: F) -> Self
    where
        F: Fn(&Journal) -> ScriptedCode + Send + Sync + 'static,
    {
        let journal = Arc::clone(&self.journal);
        self.bindings.register(
            code_unit,
            Arc::new(move |_: &ModuleDescriptor| Arc::new(factory(&journal)) as Arc<dyn ModuleCode>),
        );
        self
    }

    pub fn host(&self) -> ModuleHost {
        let host = ModuleHost::builder()
            .with_search_dir(MODS)
            .with_resolver(self.resolver.clone())
            .with_bindings(self.bindings.clone())
            .build();
        host.events().subscribe(self.recorder.clone());
        host
    }

    pub fn journal(&self) -> Vec<String> {
        self.journal.lock().clone()
    }

    pub fn clear_journal(&self) {
        self.journal.lock().clear();
    }
}
