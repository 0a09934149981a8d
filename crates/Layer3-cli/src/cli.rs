//! Command implementations
//!
//! 모든 명령은 패시브 바인딩으로 실행됩니다. 모듈 코드는 실행되지 않고
//! 매니페스트, 의존성 해석, 라이프사이클 알림만 확인할 수 있습니다.

use anyhow::Context;
use modhost_core::{ConfigLoader, HostConfig, ModuleHost};
use modhost_foundation::event::system;
use modhost_foundation::HostEvent;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// 기본 설정 파일 위에 `--config` 파일을 얹어 병합
pub fn load_config(working_dir: &Path, extra: Option<&Path>) -> anyhow::Result<HostConfig> {
    let mut loader = ConfigLoader::new(working_dir);

    if let Some(path) = extra {
        if !path.exists() {
            anyhow::bail!("settings file not found: {}", path.display());
        }
        loader.add_path(path.to_path_buf(), u8::MAX);
    }

    loader.load_all().context("failed to load settings")
}

/// 설정 + `-d` 디렉토리로 호스트 생성
///
/// 검색 경로가 하나도 없으면 작업 디렉토리를 씁니다.
pub fn build_host(mut config: HostConfig, working_dir: &Path, extra_dirs: &[PathBuf]) -> ModuleHost {
    config.search_dirs = config.resolved_search_dirs(working_dir);

    let mut builder = ModuleHost::builder();
    for dir in extra_dirs {
        builder = builder.with_search_dir(absolute(working_dir, dir));
    }
    if config.search_dirs.is_empty() && extra_dirs.is_empty() {
        builder = builder.with_search_dir(working_dir.to_path_buf());
    }

    let host = builder.with_config(config).build();
    info!(dirs = host.search_dirs().len(), "Module host ready");
    host.events()
        .publish(system::started(env!("CARGO_PKG_VERSION")));
    host
}

fn absolute(working_dir: &Path, dir: &Path) -> PathBuf {
    if dir.is_absolute() {
        dir.to_path_buf()
    } else {
        working_dir.join(dir)
    }
}

// ============================================================================
// Commands
// ============================================================================

/// `modhost list`
pub fn list_modules(host: &ModuleHost) -> anyhow::Result<()> {
    let found = host.discover();

    if found.is_empty() {
        println!("No modules found in:");
        for dir in host.search_dirs() {
            println!("  {}", dir.display());
        }
        return Ok(());
    }

    println!("\n{:<24} {:<10} {:<30} {}", "Name", "Version", "Dependencies", "Directory");
    println!("{}", "-".repeat(90));

    for (descriptor, dir) in found {
        let mut dependencies = descriptor.dependencies.clone();
        dependencies.extend(
            descriptor
                .base_dependencies
                .iter()
                .map(|name| format!("{}{}", host.config().base_prefix(), name)),
        );
        let dependencies = if dependencies.is_empty() {
            "-".to_string()
        } else {
            truncate(&dependencies.join(", "), 28)
        };

        println!(
            "{:<24} {:<10} {:<30} {}",
            descriptor.name,
            descriptor.version.to_string(),
            dependencies,
            dir.display()
        );
        if !descriptor.description.is_empty() {
            println!("  {}", truncate(&descriptor.description, 86));
        }
    }
    println!();

    Ok(())
}

/// `modhost plan <name>`
pub fn print_plan(host: &ModuleHost, name: &str) -> anyhow::Result<()> {
    let order = host
        .plan(name)
        .with_context(|| format!("cannot plan {}", name))?;

    println!("Load order for {}:", name);
    for (i, module) in order.iter().enumerate() {
        println!("  {:>2}. {}", i + 1, module);
    }

    Ok(())
}

/// `modhost load [names...]`
pub fn dry_run_load(host: &ModuleHost, names: &[String], show_events: bool) -> anyhow::Result<()> {
    let names = requested_names(host, names)?;

    let loaded = host.load_all(names.as_slice());
    if loaded.len() < names.len() {
        warn!(
            requested = names.len(),
            loaded = loaded.len(),
            "Some requested modules failed to load"
        );
    }
    println!("Loaded {} of {} requested module(s)\n", loaded.len(), names.len());

    for name in host.loaded_names() {
        let Some(instance) = host.get(&name) else {
            continue;
        };
        let dependencies: Vec<String> = instance
            .dependencies()
            .iter()
            .map(|d| d.name().to_string())
            .collect();
        println!(
            "  {:<24} {:<12} {}",
            name,
            instance.state().to_string(),
            if dependencies.is_empty() {
                String::new()
            } else {
                format!("<- {}", dependencies.join(", "))
            }
        );
    }

    if show_events {
        print_events(host);
    }

    host.unload_all();
    Ok(())
}

/// `modhost reload <names...>`
pub fn dry_run_reload(host: &ModuleHost, names: &[String]) -> anyhow::Result<()> {
    let loaded = host.load_all(names);
    if loaded.is_empty() {
        anyhow::bail!("none of the requested modules could be loaded");
    }

    let targets: Vec<String> = loaded.iter().map(|i| i.name().to_string()).collect();
    let reactivated = match host.reload_many(targets) {
        Ok(count) => count,
        Err(e) => {
            warn!(error = %e, "Reload aborted");
            host.unload_all();
            return Err(e).context("reload aborted");
        }
    };

    println!("Reactivated {} module(s)", reactivated);
    print_events(host);

    host.unload_all();
    Ok(())
}

fn requested_names(host: &ModuleHost, names: &[String]) -> anyhow::Result<Vec<String>> {
    if !names.is_empty() {
        return Ok(names.to_vec());
    }

    let auto_load = host.config().auto_load.clone();
    if auto_load.is_empty() {
        anyhow::bail!("no module names given and `autoLoad` is empty");
    }
    Ok(auto_load)
}

fn print_events(host: &ModuleHost) {
    println!("\nNotifications:");
    for event in host.events().history(None) {
        println!("  {}", format_event(&event));
    }
}

fn format_event(event: &HostEvent) -> String {
    let mut line = format!(
        "{} {:<22}",
        event.timestamp.format("%H:%M:%S%.3f"),
        event.event_type
    );
    if let Some(module) = &event.module {
        line.push(' ');
        line.push_str(module);
    }
    if !event.data.is_null() {
        line.push(' ');
        line.push_str(&event.data.to_string());
    }
    line
}

/// Truncate a string for display
fn truncate(s: &str, max_len: usize) -> String {
    let s = s.replace('\n', " ");
    if s.chars().count() <= max_len {
        s
    } else {
        let cut: String = s.chars().take(max_len.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
