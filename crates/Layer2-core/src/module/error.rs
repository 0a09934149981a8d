//! Error types for module lifecycle
//!
//! ModuleError는 로드/언로드/리로드에서 호출자에게 돌려주는 에러입니다.
//! 알림 리스너 실패를 제외하면 어떤 에러도 조용히 삼키지 않습니다.

use modhost_foundation::Error as FoundationError;
use std::path::PathBuf;
use thiserror::Error;

/// Result type for module lifecycle operations
pub type Result<T> = std::result::Result<T, ModuleError>;

/// Errors returned by the lifecycle manager
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ModuleError {
    /// No search directory contained a matching descriptor
    #[error("Module not found: {name} (searched {} directories)", searched.len())]
    NotFound { name: String, searched: Vec<PathBuf> },

    /// Descriptor exists but is malformed
    #[error("Invalid manifest for {name}: {reason}")]
    Manifest { name: String, reason: String },

    /// Name already present in the dependency index
    #[error("Module already loaded: {0}")]
    AlreadyLoaded(String),

    /// A declared dependency could not be brought to `Loaded`
    #[error("Dependency {dependency} of {module} failed: {reason}")]
    DependencyFailed {
        module: String,
        dependency: String,
        reason: String,
    },

    /// Binding host refused to activate the code unit
    #[error("Activation failed for {module}: {reason}")]
    ActivationFailed { module: String, reason: String },

    /// An init step stopped the load
    #[error("Init of {module} canceled by {step}")]
    InitCanceled { module: String, step: String },

    /// Unload refused because other modules depend on this one
    #[error("Cannot unload {module}: still required by {}", dependents.join(", "))]
    DependentsStillLoaded {
        module: String,
        dependents: Vec<String>,
    },

    /// Submodules follow their parent's lifecycle
    #[error("Submodule {0} cannot be unloaded independently of its parent")]
    SubmoduleCannotUnloadIndependently(String),

    /// A void step stopped the unload
    #[error("Void of {module} canceled by {step}")]
    VoidCanceled { module: String, step: String },

    /// Name is not in the dependency index
    #[error("Module not loaded: {0}")]
    NotLoaded(String),
}

impl ModuleError {
    /// 매니페스트 에러 생성 헬퍼
    pub fn manifest(name: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        ModuleError::Manifest {
            name: name.into(),
            reason: reason.to_string(),
        }
    }

    /// 에러가 가리키는 모듈 이름
    pub fn module_name(&self) -> &str {
        match self {
            ModuleError::NotFound { name, .. } | ModuleError::Manifest { name, .. } => name,
            ModuleError::AlreadyLoaded(name)
            | ModuleError::SubmoduleCannotUnloadIndependently(name)
            | ModuleError::NotLoaded(name) => name,
            ModuleError::DependencyFailed { module, .. }
            | ModuleError::ActivationFailed { module, .. }
            | ModuleError::InitCanceled { module, .. }
            | ModuleError::DependentsStillLoaded { module, .. }
            | ModuleError::VoidCanceled { module, .. } => module,
        }
    }

    pub fn is_not_loaded(&self) -> bool {
        matches!(self, ModuleError::NotLoaded(_))
    }

    /// 상태를 바꾸지 않고 실패한 에러인지 (재시도하면 성공할 수 있음)
    ///
    /// 언로드 거부와 중복 로드는 인덱스를 건드리지 않습니다.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            ModuleError::AlreadyLoaded(_)
                | ModuleError::DependentsStillLoaded { .. }
                | ModuleError::SubmoduleCannotUnloadIndependently(_)
                | ModuleError::VoidCanceled { .. }
                | ModuleError::NotLoaded(_)
        )
    }
}

impl From<FoundationError> for ModuleError {
    fn from(err: FoundationError) -> Self {
        let name = match &err {
            FoundationError::NotFound(name) => name.clone(),
            _ => String::new(),
        };
        ModuleError::Manifest {
            name,
            reason: err.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display() {
        let err = ModuleError::DependentsStillLoaded {
            module: "core".into(),
            dependents: vec!["chat".into(), "games".into()],
        };
        assert_eq!(err.to_string(), "Cannot unload core: still required by chat, games");

        let err = ModuleError::NotFound {
            name: "ghost".into(),
            searched: vec![PathBuf::from("a"), PathBuf::from("b")],
        };
        assert_eq!(err.to_string(), "Module not found: ghost (searched 2 directories)");
    }

    #[test]
    fn test_predicates() {
        assert!(ModuleError::NotLoaded("x".into()).is_not_loaded());
        assert!(ModuleError::AlreadyLoaded("x".into()).is_recoverable());
        assert!(!ModuleError::InitCanceled {
            module: "x".into(),
            step: "x::init".into()
        }
        .is_recoverable());
    }

    #[test]
    fn test_module_name() {
        let err = ModuleError::VoidCanceled {
            module: "chat".into(),
            step: "keepalive".into(),
        };
        assert_eq!(err.module_name(), "chat");
    }

    #[test]
    fn test_from_foundation_error() {
        let io = std::io::Error::new(std::io::ErrorKind::Other, "disk gone");
        let err: ModuleError = FoundationError::from(io).into();
        assert!(matches!(err, ModuleError::Manifest { .. }));
        assert!(err.to_string().contains("disk gone"));
    }
}
