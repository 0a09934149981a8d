//! Hook Chain - init/void 단계 목록
//!
//! 이름 있는 단계들을 priority 오름차순(같으면 등록 순)으로 실행합니다.
//! 한 단계라도 `Stop`을 돌려주면 체인 전체가 그 단계 이름으로 실패합니다.

use super::instance::ModuleInstance;
use std::sync::Arc;
use tracing::trace;

/// 모듈 자신의 init/void 단계 priority
pub const PRIORITY_MODULE: i32 = 0;

/// 가장 먼저 실행
pub const PRIORITY_FIRST: i32 = -1000;

/// 가장 나중에 실행 (컴패니언 언로드 훅)
pub const PRIORITY_LAST: i32 = 1000;

/// 단계 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HookOutcome {
    /// 다음 단계로
    Continue,
    /// 체인 중단 (사유)
    Stop(String),
}

impl HookOutcome {
    pub fn stop(reason: impl Into<String>) -> Self {
        Self::Stop(reason.into())
    }

    pub fn is_continue(&self) -> bool {
        matches!(self, Self::Continue)
    }
}

impl From<bool> for HookOutcome {
    fn from(ok: bool) -> Self {
        if ok {
            Self::Continue
        } else {
            Self::Stop("step returned false".to_string())
        }
    }
}

/// 단계 함수
pub type HookFn = Arc<dyn Fn(&Arc<ModuleInstance>) -> HookOutcome + Send + Sync>;

/// 이름 있는 단계
#[derive(Clone)]
pub struct HookStep {
    pub name: String,
    pub priority: i32,
    seq: u64,
    run: HookFn,
}

impl std::fmt::Debug for HookStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("HookStep")
            .field("name", &self.name)
            .field("priority", &self.priority)
            .finish()
    }
}

/// 체인 실행 결과
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChainResult {
    Completed,
    Stopped { step: String, reason: String },
}

/// 단계 목록
#[derive(Default)]
pub struct HookChain {
    steps: Vec<HookStep>,
    next_seq: u64,
}

impl HookChain {
    pub fn new() -> Self {
        Self::default()
    }

    /// 단계 추가
    pub fn add(&mut self, name: impl Into<String>, priority: i32, run: HookFn) {
        let seq = self.next_seq;
        self.next_seq += 1;
        self.steps.push(HookStep {
            name: name.into(),
            priority,
            seq,
            run,
        });
    }

    /// 이름으로 단계 제거 (같은 이름 모두)
    pub fn remove(&mut self, name: &str) -> bool {
        let before = self.steps.len();
        self.steps.retain(|s| s.name != name);
        before != self.steps.len()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.steps.iter().any(|s| s.name == name)
    }

    pub fn len(&self) -> usize {
        self.steps.len()
    }

    pub fn is_empty(&self) -> bool {
        self.steps.is_empty()
    }

    pub fn clear(&mut self) {
        self.steps.clear();
    }

    /// 실행 순서로 정렬된 스냅샷
    ///
    /// 실행 중에 단계가 추가되어도 현재 패스에는 영향이 없습니다.
    pub fn snapshot(&self) -> Vec<HookStep> {
        let mut steps = self.steps.clone();
        steps.sort_by_key(|s| (s.priority, s.seq));
        steps
    }

    /// 실행 순서의 단계 이름
    pub fn names(&self) -> Vec<String> {
        self.snapshot().into_iter().map(|s| s.name).collect()
    }
}

/// 스냅샷 실행
pub fn run_steps(steps: &[HookStep], instance: &Arc<ModuleInstance>) -> ChainResult {
    for step in steps {
        trace!(module = %instance.name(), step = %step.name, "Running hook step");
        if let HookOutcome::Stop(reason) = (step.run)(instance) {
            return ChainResult::Stopped {
                step: step.name.clone(),
                reason,
            };
        }
    }
    ChainResult::Completed
}
