//! Manifest Resolver - 이름 → 디스크립터 해석
//!
//! 디렉토리를 순서대로 시도하여 처음 찾은 디스크립터를 사용합니다.
//!
//! ## 디렉토리 구조 (JsonManifestResolver)
//!
//! ```text
//! mods/
//! ├── chat/
//! │   ├── module.json      # chat
//! │   └── emotes.json      # chat/emotes (chat의 서브모듈)
//! └── net.json             # net
//! ```

use super::descriptor::ModuleDescriptor;
use super::error::{ModuleError, Result};
use crate::config::strip_json_comments;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// 디렉토리형 모듈의 매니페스트 파일 이름
pub const MANIFEST_FILE: &str = "module.json";

// ============================================================================
// ManifestResolver trait
// ============================================================================

/// 매니페스트 해석기
pub trait ManifestResolver: Send + Sync {
    /// 한 디렉토리에서 이름 검색. 없으면 `Ok(None)`
    fn lookup(&self, name: &str, dir: &Path) -> Result<Option<ModuleDescriptor>>;

    /// 디렉토리들을 순서대로 검색. 첫 번째 일치가 이김
    fn resolve(&self, name: &str, dirs: &[PathBuf]) -> Result<(ModuleDescriptor, PathBuf)> {
        for dir in dirs {
            if let Some(descriptor) = self.lookup(name, dir)? {
                debug!(module = name, dir = %dir.display(), "Resolved descriptor");
                return Ok((descriptor, dir.clone()));
            }
        }

        Err(ModuleError::NotFound {
            name: name.to_string(),
            searched: dirs.to_vec(),
        })
    }

    /// 디렉토리의 모든 최상위 디스크립터 (목록 표시용)
    fn discover(&self, _dirs: &[PathBuf]) -> Vec<(ModuleDescriptor, PathBuf)> {
        Vec::new()
    }
}

// ============================================================================
// JsonManifestResolver
// ============================================================================

/// JSON 파일 기반 해석기
///
/// `<dir>/<name>/module.json`을 먼저, 없으면 `<dir>/<name>.json`을 읽습니다.
#[derive(Debug, Default, Clone)]
pub struct JsonManifestResolver;

impl JsonManifestResolver {
    pub fn new() -> Self {
        Self
    }

    fn candidate_paths(name: &str, dir: &Path) -> [PathBuf; 2] {
        [
            dir.join(name).join(MANIFEST_FILE),
            dir.join(format!("{}.json", name)),
        ]
    }

    fn read_manifest(path: &Path, name: &str) -> Result<ModuleDescriptor> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ModuleError::manifest(name, format!("{}: {}", path.display(), e)))?;
        let content = strip_json_comments(&content);

        let descriptor: ModuleDescriptor = serde_json::from_str(&content)
            .map_err(|e| ModuleError::manifest(name, format!("{}: {}", path.display(), e)))?;

        if !descriptor.name.is_empty() && descriptor.name != name {
            return Err(ModuleError::manifest(
                name,
                format!(
                    "{} declares name '{}'",
                    path.display(),
                    descriptor.name
                ),
            ));
        }

        Ok(descriptor.normalized(name))
    }
}

impl ManifestResolver for JsonManifestResolver {
    fn lookup(&self, name: &str, dir: &Path) -> Result<Option<ModuleDescriptor>> {
        for path in Self::candidate_paths(name, dir) {
            if path.is_file() {
                return Self::read_manifest(&path, name).map(Some);
            }
        }
        Ok(None)
    }

    fn discover(&self, dirs: &[PathBuf]) -> Vec<(ModuleDescriptor, PathBuf)> {
        let mut found = Vec::new();
        let mut seen = HashSet::new();

        for dir in dirs {
            let entries = match std::fs::read_dir(dir) {
                Ok(entries) => entries,
                Err(e) => {
                    debug!("Skipping search dir {}: {}", dir.display(), e);
                    continue;
                }
            };

            let mut names: Vec<String> = entries
                .filter_map(|entry| entry.ok())
                .filter_map(|entry| {
                    let path = entry.path();
                    if path.is_dir() && path.join(MANIFEST_FILE).is_file() {
                        path.file_name().map(|n| n.to_string_lossy().into_owned())
                    } else if path.extension().is_some_and(|ext| ext == "json") {
                        path.file_stem().map(|n| n.to_string_lossy().into_owned())
                    } else {
                        None
                    }
                })
                .collect();
            names.sort();

            for name in names {
                // 앞 디렉토리가 이김
                if seen.contains(&name) {
                    continue;
                }
                match self.lookup(&name, dir) {
                    Ok(Some(descriptor)) => {
                        seen.insert(name);
                        found.push((descriptor, dir.clone()));
                    }
                    Ok(None) => {}
                    Err(e) => warn!("Skipping {} in {}: {}", name, dir.display(), e),
                }
            }
        }

        found
    }
}

// ============================================================================
// StaticManifestResolver
// ============================================================================

/// 메모리 테이블 기반 해석기 (임베딩, 테스트용)
#[derive(Debug, Default)]
pub struct StaticManifestResolver {
    /// 디렉토리 → (이름 → 디스크립터)
    tables: RwLock<HashMap<PathBuf, HashMap<String, ModuleDescriptor>>>,
    /// 디렉토리 등록 순서
    order: RwLock<Vec<PathBuf>>,
}

impl StaticManifestResolver {
    pub fn new() -> Self {
        Self::default()
    }

    /// 빌더 패턴: 디스크립터 추가
    pub fn with_module(self, dir: impl Into<PathBuf>, descriptor: ModuleDescriptor) -> Self {
        self.insert(dir, descriptor);
        self
    }

    /// 디스크립터 추가 (같은 이름은 교체)
    pub fn insert(&self, dir: impl Into<PathBuf>, descriptor: ModuleDescriptor) {
        let dir = dir.into();
        let local = if descriptor.local_name.is_empty() {
            descriptor.name.clone()
        } else {
            descriptor.local_name.clone()
        };
        let descriptor = descriptor.normalized(&local);

        {
            let mut order = self.order.write();
            if !order.contains(&dir) {
                order.push(dir.clone());
            }
        }

        self.tables
            .write()
            .entry(dir)
            .or_default()
            .insert(descriptor.local_name.clone(), descriptor);
    }

    /// 디스크립터 제거
    pub fn remove(&self, dir: &Path, name: &str) -> Option<ModuleDescriptor> {
        self.tables.write().get_mut(dir).and_then(|t| t.remove(name))
    }
}

impl ManifestResolver for StaticManifestResolver {
    fn lookup(&self, name: &str, dir: &Path) -> Result<Option<ModuleDescriptor>> {
        Ok(self
            .tables
            .read()
            .get(dir)
            .and_then(|table| table.get(name))
            .cloned())
    }

    fn discover(&self, dirs: &[PathBuf]) -> Vec<(ModuleDescriptor, PathBuf)> {
        let tables = self.tables.read();
        let mut seen = HashSet::new();
        let mut found = Vec::new();

        for dir in dirs {
            if let Some(table) = tables.get(dir) {
                let mut descriptors: Vec<&ModuleDescriptor> = table.values().collect();
                descriptors.sort_by(|a, b| a.local_name.cmp(&b.local_name));
                for descriptor in descriptors {
                    if seen.insert(descriptor.local_name.clone()) {
                        found.push((descriptor.clone(), dir.clone()));
                    }
                }
            }
        }

        found
    }
}

impl StaticManifestResolver {
    /// 등록된 디렉토리 (등록 순서)
    pub fn dirs(&self) -> Vec<PathBuf> {
        self.order.read().clone()
    }
}

// ============================================================================
// dependency_plan - 로드 순서 미리보기
// ============================================================================

/// 의존성 우선 로드 순서 계산 (드라이런)
///
/// 자기 자신 의존은 무시하고, 순환은 `DependencyFailed`로 보고합니다.
pub fn dependency_plan(
    resolver: &dyn ManifestResolver,
    name: &str,
    dirs: &[PathBuf],
    base_prefix: &str,
) -> Result<Vec<String>> {
    let mut order = Vec::new();
    let mut visiting = Vec::new();
    visit(resolver, name, dirs, base_prefix, &mut visiting, &mut order)?;
    Ok(order)
}

fn visit(
    resolver: &dyn ManifestResolver,
    name: &str,
    dirs: &[PathBuf],
    base_prefix: &str,
    visiting: &mut Vec<String>,
    order: &mut Vec<String>,
) -> Result<()> {
    if order.iter().any(|n| n == name) {
        return Ok(());
    }

    let (descriptor, _) = resolver.resolve(name, dirs)?;
    visiting.push(name.to_string());

    for dependency in descriptor.dependency_names(base_prefix) {
        if dependency == name {
            continue;
        }
        if visiting.contains(&dependency) {
            return Err(ModuleError::DependencyFailed {
                module: name.to_string(),
                dependency,
                reason: "dependency cycle".to_string(),
            });
        }
        visit(resolver, &dependency, dirs, base_prefix, visiting, order).map_err(|e| match e {
            cycle @ ModuleError::DependencyFailed { .. } => cycle,
            other => ModuleError::DependencyFailed {
                module: name.to_string(),
                dependency: dependency.clone(),
                reason: other.to_string(),
            },
        })?;
    }

    visiting.pop();
    order.push(name.to_string());
    Ok(())
}
