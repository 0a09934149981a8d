//! 라이프사이클 통합 테스트 - load / unload / 서브모듈 / 훅 체인
//!
//! `cargo test -p modhost-core --test lifecycle_test`

mod common;

use common::{Fixture, ScriptedCode, MODS};
use modhost_core::module::{
    HookOutcome, ModuleDescriptor, ModuleError, ModuleHost, ModuleState, RegistryBindingHost,
    UnloadOptions, PRIORITY_FIRST, PRIORITY_LAST,
};
use parking_lot::Mutex;
use serde_json::json;
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

fn core_and_chat() -> Fixture {
    Fixture::new()
        .module(ModuleDescriptor::new("core"))
        .module(ModuleDescriptor::new("chat").with_dependency("core"))
}

// ============================================================================
// Load
// ============================================================================

#[test]
fn test_load_then_already_loaded() {
    let fixture = Fixture::new().module(ModuleDescriptor::new("core"));
    let host = fixture.host();

    let core = host.load("core").unwrap();
    assert!(host.is_loaded("core"));
    assert_eq!(core.state(), ModuleState::Loaded);
    assert!(core.loaded_at().is_some());

    let err = host.load("core").unwrap_err();
    assert_eq!(err, ModuleError::AlreadyLoaded("core".to_string()));
}

#[test]
fn test_dependency_loaded_before_dependent_init() {
    let fixture = core_and_chat();
    let host = fixture.host();

    let chat = host.load("chat").unwrap();
    let core = host.get("core").unwrap();

    assert!(core.is_loaded());
    assert_eq!(fixture.journal(), vec!["init:core", "init:chat"]);

    let loaded_core = fixture.recorder.position("module.loaded:core").unwrap();
    let chat_init = fixture.recorder.position("module.initializing:chat").unwrap();
    assert!(loaded_core < chat_init);

    assert_eq!(chat.dependencies().len(), 1);
    assert!(chat.depends_on(&core));
    let dependents: Vec<String> = core.dependents().iter().map(|d| d.name().to_string()).collect();
    assert_eq!(dependents, vec!["chat"]);
}

#[test]
fn test_not_found_lists_searched_dirs() {
    let host = Fixture::new().host();

    match host.load("ghost").unwrap_err() {
        ModuleError::NotFound { name, searched } => {
            assert_eq!(name, "ghost");
            assert_eq!(searched, vec![PathBuf::from(MODS)]);
        }
        other => panic!("unexpected error: {other}"),
    }
}

#[test]
fn test_failed_dependency_keeps_loaded_siblings() {
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("core"))
        .module(
            ModuleDescriptor::new("chat")
                .with_dependency("core")
                .with_dependency("ghost"),
        );
    let host = fixture.host();

    match host.load("chat").unwrap_err() {
        ModuleError::DependencyFailed {
            module, dependency, ..
        } => {
            assert_eq!(module, "chat");
            assert_eq!(dependency, "ghost");
        }
        other => panic!("unexpected error: {other}"),
    }

    // 먼저 로드된 의존성은 되돌리지 않음
    assert!(host.is_loaded("core"));
    assert!(!host.is_loaded("chat"));
}

#[test]
fn test_dependency_cycle_is_reported() {
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("a").with_dependency("b"))
        .module(ModuleDescriptor::new("b").with_dependency("a"));
    let host = fixture.host();

    let err = host.load("a").unwrap_err();
    assert!(err.to_string().contains("dependency cycle"), "{err}");
    assert!(host.loaded_names().is_empty());
    assert!(fixture.journal().is_empty());
}

#[test]
fn test_self_dependency_is_skipped() {
    let fixture = Fixture::new().module(ModuleDescriptor::new("solo").with_dependency("solo"));
    let host = fixture.host();

    let solo = host.load("solo").unwrap();
    assert!(solo.dependencies().is_empty());
}

#[test]
fn test_base_dependency_uses_prefix() {
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("base.net"))
        .module(ModuleDescriptor::new("chat").with_base_dependency("net"));
    let host = fixture.host();

    host.load("chat").unwrap();
    assert_eq!(host.loaded_names(), vec!["base.net", "chat"]);
}

#[test]
fn test_load_all_skips_attempted_names() {
    let fixture = core_and_chat();
    let host = fixture.host();

    let loaded = host.load_all(&["chat", "core", "ghost"]);
    let names: Vec<&str> = loaded.iter().map(|i| i.name()).collect();

    // core는 chat의 의존성으로 이미 시도됨
    assert_eq!(names, vec!["chat"]);
    assert_eq!(host.loaded_names(), vec!["core", "chat"]);
    assert_eq!(fixture.journal(), vec!["init:core", "init:chat"]);
}

#[test]
fn test_activation_failure() {
    let resolver = Fixture::new().module(ModuleDescriptor::new("orphan")).resolver;
    let host = ModuleHost::builder()
        .with_search_dir(MODS)
        .with_resolver(resolver)
        .with_bindings(Arc::new(RegistryBindingHost::new()))
        .build();

    match host.load("orphan").unwrap_err() {
        ModuleError::ActivationFailed { module, .. } => assert_eq!(module, "orphan"),
        other => panic!("unexpected error: {other}"),
    }
    assert!(!host.is_loaded("orphan"));
}

#[test]
fn test_shared_namespace_cannot_bind_twice() {
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("left").with_code_unit("shared").no_bind())
        .module(ModuleDescriptor::new("right").with_code_unit("shared").no_bind());
    let host = fixture.host();

    host.load("left").unwrap();
    assert!(matches!(
        host.load("right").unwrap_err(),
        ModuleError::ActivationFailed { .. }
    ));
    assert!(host.is_loaded("left"));
    assert!(fixture.bindings.is_active("shared"));
}

// ============================================================================
// Init 취소
// ============================================================================

#[test]
fn test_init_cancel_rolls_back() {
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("bad"))
        .code("bad", |journal| ScriptedCode::new(journal).refusing_init());
    let host = fixture.host();

    match host.load("bad").unwrap_err() {
        ModuleError::InitCanceled { module, step } => {
            assert_eq!(module, "bad");
            assert_eq!(step, "bad::init");
        }
        other => panic!("unexpected error: {other}"),
    }

    assert!(!host.is_loaded("bad"));
    assert!(host.get("bad").is_none());
    assert!(!fixture.bindings.is_active("bad"));
    // 부분적인 부작용을 되돌리기 위해 void도 실행됨
    assert_eq!(fixture.journal(), vec!["init:bad", "void:bad"]);
    assert_eq!(fixture.recorder.of_type("module.init_canceled").len(), 1);
    assert!(fixture.recorder.of_type("module.loaded").is_empty());
}

#[test]
fn test_init_cancel_unloads_submodules_created_during_init() {
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("host"))
        .module_in("mods/host", ModuleDescriptor::new("widget"))
        .code("host", |journal| {
            ScriptedCode::new(journal)
                .on_init(|instance| {
                    instance.load_submodule("widget").unwrap();
                })
                .refusing_init()
        });
    let host = fixture.host();

    assert!(matches!(
        host.load("host").unwrap_err(),
        ModuleError::InitCanceled { .. }
    ));
    assert!(host.get("host/widget").is_none());
    assert!(host.loaded_names().is_empty());
    assert!(fixture.journal().contains(&"void:host/widget".to_string()));
}

#[test]
fn test_global_init_step_can_cancel() {
    let fixture = Fixture::new().module(ModuleDescriptor::new("core"));
    let host = fixture.host();
    host.add_init_step("policy", PRIORITY_FIRST, |instance| {
        HookOutcome::from(instance.name() != "core")
    });

    match host.load("core").unwrap_err() {
        ModuleError::InitCanceled { step, .. } => assert_eq!(step, "policy"),
        other => panic!("unexpected error: {other}"),
    }
    // 먼저 실행된 단계에서 멈췄으므로 모듈 init은 실행되지 않음
    assert_eq!(fixture.journal(), vec!["void:core"]);
}

#[test]
fn test_step_priority_order() {
    let fixture = Fixture::new().module(ModuleDescriptor::new("core"));
    let host = fixture.host();
    let order = Arc::new(Mutex::new(Vec::new()));

    let first = Arc::clone(&order);
    host.add_init_step("first", PRIORITY_FIRST, move |_| {
        first.lock().push("first");
        HookOutcome::Continue
    });
    let last = Arc::clone(&order);
    host.add_init_step("last", PRIORITY_LAST, move |_| {
        last.lock().push("last");
        HookOutcome::Continue
    });

    let journal = Arc::clone(&fixture.journal);
    let module = Arc::clone(&order);
    host.add_init_step("module-tail", 0, move |_| {
        // 같은 priority에서는 전역 단계가 먼저
        assert!(journal.lock().is_empty());
        module.lock().push("global-0");
        HookOutcome::Continue
    });

    host.load("core").unwrap();
    assert_eq!(*order.lock(), vec!["first", "global-0", "last"]);
    assert_eq!(fixture.journal(), vec!["init:core"]);
}

// ============================================================================
// Unload
// ============================================================================

#[test]
fn test_unload_refused_while_dependents_loaded() {
    let fixture = core_and_chat();
    let host = fixture.host();
    host.load("chat").unwrap();

    match host.unload("core", UnloadOptions::default()).unwrap_err() {
        ModuleError::DependentsStillLoaded { module, dependents } => {
            assert_eq!(module, "core");
            assert_eq!(dependents, vec!["chat"]);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(host.is_loaded("core"));
    assert!(host.is_loaded("chat"));
}

#[test]
fn test_unload_with_dependents_voids_dependents_first() {
    let fixture = core_and_chat();
    let host = fixture.host();
    host.load("chat").unwrap();
    fixture.clear_journal();

    let name = host
        .unload("core", UnloadOptions::new().with_dependents())
        .unwrap();
    assert_eq!(name, "core");

    assert_eq!(fixture.journal(), vec!["void:chat", "void:core"]);
    assert!(!host.is_loaded("chat"));
    assert!(!host.is_loaded("core"));

    let unloaded_chat = fixture.recorder.position("module.unloaded:chat").unwrap();
    let voiding_core = fixture.recorder.position("module.voiding:core").unwrap();
    assert!(unloaded_chat < voiding_core);
}

#[test]
fn test_void_cancel_keeps_module_loaded() {
    let busy = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&busy);
    let fixture = Fixture::new()
        .module(ModuleDescriptor::new("core"))
        .code("core", move |journal| {
            ScriptedCode::new(journal).refusing_void_while(&flag)
        });
    let host = fixture.host();
    let core = host.load("core").unwrap();
    core.store("counter", json!(1));

    match host.unload("core", UnloadOptions::default()).unwrap_err() {
        ModuleError::VoidCanceled { module, step } => {
            assert_eq!(module, "core");
            assert_eq!(step, "core::void");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(host.is_loaded("core"));
    assert_eq!(core.state(), ModuleState::Loaded);
    assert_eq!(core.retrieve("counter"), Some(json!(1)));
    assert_eq!(fixture.recorder.of_type("module.void_canceled").len(), 1);

    busy.store(false, Ordering::SeqCst);
    host.unload("core", UnloadOptions::default()).unwrap();
    assert!(!host.is_loaded("core"));
    assert_eq!(core.state(), ModuleState::Unloaded);
}

#[test]
fn test_void_cancel_after_cascade_leaves_dependents_unloaded() {
    let busy = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&busy);
    let fixture = core_and_chat().code("core", move |journal| {
        ScriptedCode::new(journal).refusing_void_while(&flag)
    });
    let host = fixture.host();
    host.load("chat").unwrap();

    let err = host
        .unload("core", UnloadOptions::new().with_dependents())
        .unwrap_err();
    assert!(matches!(err, ModuleError::VoidCanceled { .. }));
    assert!(host.is_loaded("core"));
    assert!(!host.is_loaded("chat"));
}

#[test]
fn test_unload_unknown_is_not_loaded() {
    let host = Fixture::new().host();
    let err = host.unload("ghost", UnloadOptions::default()).unwrap_err();
    assert!(err.is_not_loaded());
}

#[test]
fn test_unloaded_instance_handle_is_rejected() {
    let fixture = Fixture::new().module(ModuleDescriptor::new("core"));
    let host = fixture.host();
    let old = host.load("core").unwrap();
    host.unload(&old, UnloadOptions::default()).unwrap();
    host.load("core").unwrap();

    // 같은 이름의 새 인스턴스가 있어도 옛 핸들로는 언로드되지 않음
    assert!(host.unload(&old, UnloadOptions::default()).unwrap_err().is_not_loaded());
    assert!(host.is_loaded("core"));
}

// ============================================================================
// 서브모듈
// ============================================================================

fn parent_with_child() -> Fixture {
    Fixture::new()
        .module(ModuleDescriptor::new("parent"))
        .module_in("mods/parent", ModuleDescriptor::new("child"))
        .code("parent", |journal| {
            ScriptedCode::new(journal).on_init(|instance| {
                instance.load_submodule("child").unwrap();
            })
        })
}

#[test]
fn test_submodule_loaded_under_parent() {
    let fixture = parent_with_child();
    let host = fixture.host();
    let parent = host.load("parent").unwrap();

    let child = host.get("parent/child").unwrap();
    assert_eq!(child.local_name(), "child");
    assert!(child.is_submodule());
    assert!(Arc::ptr_eq(&child.parent().unwrap(), &parent));
    assert!(Arc::ptr_eq(&parent.submodule("child").unwrap(), &child));

    // 이미 있는 서브모듈은 그대로 반환
    let again = parent.load_submodule("child").unwrap();
    assert!(Arc::ptr_eq(&again, &child));
}

#[test]
fn test_submodule_cannot_unload_independently() {
    let fixture = parent_with_child();
    let host = fixture.host();
    host.load("parent").unwrap();
    let child = host.get("parent/child").unwrap();

    let err = host.unload(&child, UnloadOptions::default()).unwrap_err();
    assert_eq!(
        err,
        ModuleError::SubmoduleCannotUnloadIndependently("parent/child".to_string())
    );
    assert!(child.is_loaded());
}

#[test]
fn test_forced_submodule_unload_redirects_to_parent() {
    let fixture = parent_with_child();
    let host = fixture.host();
    let parent = host.load("parent").unwrap();
    fixture.clear_journal();

    let name = host
        .unload("parent/child", UnloadOptions::new().forced())
        .unwrap();
    assert_eq!(name, "parent");
    assert!(host.loaded_names().is_empty());
    assert_eq!(fixture.journal(), vec!["void:parent", "void:parent/child"]);
    assert!(parent.submodules().is_empty());
}

#[test]
fn test_submodule_cannot_refuse_parent_unload() {
    let busy = Arc::new(AtomicBool::new(true));
    let flag = Arc::clone(&busy);
    let fixture = parent_with_child().code("child", move |journal| {
        ScriptedCode::new(journal).refusing_void_while(&flag)
    });
    let host = fixture.host();
    host.load("parent").unwrap();

    host.unload("parent", UnloadOptions::default()).unwrap();
    assert!(host.get("parent/child").is_none());
    assert!(fixture.journal().contains(&"refuse:parent/child".to_string()));
}

// ============================================================================
// 인스턴스 저장소
// ============================================================================

#[test]
fn test_instance_store_and_lists() {
    let fixture = Fixture::new().module(ModuleDescriptor::new("core"));
    let host = fixture.host();
    let core = host.load("core").unwrap();

    assert!(core.store("greeting", json!("hello")).is_none());
    assert_eq!(core.store("greeting", json!("hi")), Some(json!("hello")));
    assert_eq!(core.retrieve("greeting"), Some(json!("hi")));
    assert_eq!(core.forget("greeting"), Some(json!("hi")));
    assert!(core.retrieve("greeting").is_none());

    core.list_add("seen", json!(1));
    core.list_add("seen", json!(2));
    assert_eq!(core.list_items("seen"), vec![json!(1), json!(2)]);
    assert!(core.list_items("missing").is_empty());
}
