//! Module Descriptor - 해석된 모듈 메타데이터
//!
//! 디스크립터는 로드 전에 확정되는 불변 정보입니다. 서브모듈은
//! [`ModuleDescriptor::into_submodule`]로 `<parent>/<local>` 전체 이름을 얻습니다.

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// 서브모듈 전체 이름 구분자
pub const SUBMODULE_SEPARATOR: char = '/';

// ============================================================================
// ModuleVersion
// ============================================================================

/// 모듈 버전
///
/// JSON에서는 `"1.2.3"` 문자열로 표현됩니다. 이름 기반 해석만 하므로
/// 버전은 정보용입니다.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct ModuleVersion {
    pub major: u32,
    pub minor: u32,
    pub patch: u32,
}

impl ModuleVersion {
    pub fn new(major: u32, minor: u32, patch: u32) -> Self {
        Self {
            major,
            minor,
            patch,
        }
    }

    /// 버전 문자열 파싱 (예: "1", "1.2", "1.2.3")
    pub fn parse(s: &str) -> Option<Self> {
        let parts: Vec<&str> = s.trim().trim_start_matches('v').split('.').collect();
        if parts.is_empty() || parts.len() > 3 {
            return None;
        }

        let mut numbers = [0u32; 3];
        for (slot, part) in numbers.iter_mut().zip(&parts) {
            *slot = part.parse().ok()?;
        }

        Some(Self::new(numbers[0], numbers[1], numbers[2]))
    }
}

impl std::fmt::Display for ModuleVersion {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}

impl Default for ModuleVersion {
    fn default() -> Self {
        Self::new(0, 1, 0)
    }
}

impl TryFrom<String> for ModuleVersion {
    type Error = String;

    fn try_from(value: String) -> std::result::Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid version: {}", value))
    }
}

impl From<ModuleVersion> for String {
    fn from(version: ModuleVersion) -> Self {
        version.to_string()
    }
}

// ============================================================================
// DescriptorFlags
// ============================================================================

/// 바인딩 관련 플래그
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct DescriptorFlags {
    /// 모듈 전용 네임스페이스를 만들지 않음 (코드 유닛 이름 그대로 사용)
    pub no_bind: bool,

    /// 리로드 사이에 바인딩을 지우지 않음
    pub preserve_bindings: bool,
}

// ============================================================================
// ModuleDescriptor
// ============================================================================

/// 모듈 디스크립터
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ModuleDescriptor {
    /// 전체 이름 (서브모듈은 `parent/local`)
    #[serde(default)]
    pub name: String,

    /// 짧은 이름 (검색에 쓰인 이름)
    #[serde(skip)]
    pub local_name: String,

    /// 바인딩 호스트가 활성화할 코드 유닛 ID
    #[serde(default)]
    pub code_unit: String,

    /// 선언된 의존성 (이름)
    #[serde(default)]
    pub dependencies: Vec<String>,

    /// base 의존성 (접두사가 붙어 해석됨)
    #[serde(default)]
    pub base_dependencies: Vec<String>,

    /// 버전
    #[serde(default)]
    pub version: ModuleVersion,

    /// 플래그
    #[serde(default)]
    pub flags: DescriptorFlags,

    /// 설명
    #[serde(default)]
    pub description: String,

    /// 추가 메타데이터
    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl ModuleDescriptor {
    /// 새 디스크립터 생성 (코드 유닛 = 이름)
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        Self {
            local_name: name.clone(),
            code_unit: name.clone(),
            name,
            dependencies: vec![],
            base_dependencies: vec![],
            version: ModuleVersion::default(),
            flags: DescriptorFlags::default(),
            description: String::new(),
            metadata: HashMap::new(),
        }
    }

    /// 빌더 패턴: 코드 유닛 설정
    pub fn with_code_unit(mut self, code_unit: impl Into<String>) -> Self {
        self.code_unit = code_unit.into();
        self
    }

    /// 빌더 패턴: 의존성 추가
    pub fn with_dependency(mut self, name: impl Into<String>) -> Self {
        self.dependencies.push(name.into());
        self
    }

    /// 빌더 패턴: base 의존성 추가
    pub fn with_base_dependency(mut self, name: impl Into<String>) -> Self {
        self.base_dependencies.push(name.into());
        self
    }

    /// 빌더 패턴: 버전 설정
    pub fn with_version(mut self, version: ModuleVersion) -> Self {
        self.version = version;
        self
    }

    /// 빌더 패턴: 설명 설정
    pub fn with_description(mut self, desc: impl Into<String>) -> Self {
        self.description = desc.into();
        self
    }

    /// 빌더 패턴: `noBind` 설정
    pub fn no_bind(mut self) -> Self {
        self.flags.no_bind = true;
        self
    }

    /// 빌더 패턴: `preserveBindings` 설정
    pub fn preserve_bindings(mut self) -> Self {
        self.flags.preserve_bindings = true;
        self
    }

    /// 빌더 패턴: 메타데이터 추가
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// 파일에서 읽은 디스크립터의 빈 필드를 검색 이름으로 채움
    pub fn normalized(mut self, lookup_name: &str) -> Self {
        if self.name.is_empty() {
            self.name = lookup_name.to_string();
        }
        self.local_name = lookup_name.to_string();
        if self.code_unit.is_empty() {
            self.code_unit = self.name.clone();
        }
        self
    }

    /// 부모 아래의 서브모듈 디스크립터로 변환
    pub fn into_submodule(mut self, parent: &str) -> Self {
        self.name = format!("{}{}{}", parent, SUBMODULE_SEPARATOR, self.local_name);
        self
    }

    /// 서브모듈 전체 이름인지
    pub fn is_submodule(&self) -> bool {
        self.name.contains(SUBMODULE_SEPARATOR)
    }

    /// 로드 순서대로 해석된 의존성 이름 (일반 → base, 중복 제거)
    pub fn dependency_names(&self, base_prefix: &str) -> Vec<String> {
        let mut names: Vec<String> = Vec::new();

        let declared = self.dependencies.iter().cloned();
        let base = self
            .base_dependencies
            .iter()
            .map(|name| format!("{}{}", base_prefix, name));

        for name in declared.chain(base) {
            if !names.contains(&name) {
                names.push(name);
            }
        }

        names
    }
}
