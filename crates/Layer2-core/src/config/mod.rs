//! # Configuration System
//!
//! ## 설정 우선순위 (낮은 → 높은)
//!
//! 1. User-level: `~/.modhost/settings.json` (전역 설정)
//! 2. Project-level: `.modhost/settings.json` (프로젝트별)
//! 3. Local: `.modhost/settings.local.json` (gitignore됨)
//!
//! ## 사용 예시
//!
//! ```ignore
//! use modhost_core::config::{ConfigLoader, HostConfig};
//!
//! let loader = ConfigLoader::new(Path::new("."));
//! let config = loader.load_all()?;
//!
//! for dir in config.resolved_search_dirs(Path::new(".")) {
//!     // ...
//! }
//! ```

mod loader;
mod types;

pub use loader::{
    load_config_from_file, merge_configs, strip_json_comments, ConfigLoader, CONFIG_DIR_NAME,
};
pub use types::{HostConfig, DEFAULT_BASE_PREFIX, DEFAULT_EVENT_HISTORY};
