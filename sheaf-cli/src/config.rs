//! CLI 配置
//!
//! 包含 CLI 特有的配置：日志配置和构建配置文件的读取

use anyhow::{bail, Context, Result};
use sheaf_config::{BundlerConfig, Phase};
use std::path::Path;
use tracing::Level;

/// CLI 日志配置
#[derive(Debug, Clone)]
pub struct LogConfig {
    pub global: Level,
    pub resolve: Option<Level>,
    pub transform: Option<Level>,
    pub graph: Option<Level>,
    pub split: Option<Level>,
    pub emit: Option<Level>,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            global: Level::INFO,
            resolve: None,
            transform: None,
            graph: None,
            split: None,
            emit: None,
        }
    }
}

impl LogConfig {
    /// Get log level for a specific phase
    pub fn level_for(&self, phase: Phase) -> Level {
        let level = match phase {
            Phase::Resolve => self.resolve,
            Phase::Transform => self.transform,
            Phase::Graph => self.graph,
            Phase::Split => self.split,
            Phase::Emit => self.emit,
        };
        level.unwrap_or(self.global)
    }

    pub fn set(&mut self, phase: Phase, level: Level) {
        let slot = match phase {
            Phase::Resolve => &mut self.resolve,
            Phase::Transform => &mut self.transform,
            Phase::Graph => &mut self.graph,
            Phase::Split => &mut self.split,
            Phase::Emit => &mut self.emit,
        };
        *slot = Some(level);
    }
}

/// 解析 `PHASE=LEVEL`，例如 `split=debug`
pub fn parse_phase_level(s: &str) -> Result<(Phase, Level)> {
    let Some((phase, level)) = s.split_once('=') else {
        bail!("expected PHASE=LEVEL, got '{}'", s);
    };
    let phase = Phase::ALL
        .into_iter()
        .find(|p| p.as_str() == phase.trim())
        .with_context(|| {
            let known: Vec<&str> = Phase::ALL.iter().map(Phase::as_str).collect();
            format!("unknown phase '{}' (expected one of {})", phase, known.join(", "))
        })?;
    let level = level
        .trim()
        .parse::<Level>()
        .with_context(|| format!("invalid log level '{}'", level))?;
    Ok((phase, level))
}

/// 读取构建配置文件
///
/// 相对的 `context` 以配置文件所在目录为基准。
pub fn load_bundler_config(path: &Path) -> Result<BundlerConfig> {
    if !path.exists() {
        bail!(
            "未找到 '{}'\n\n当前目录不是一个 Sheaf 项目。\n提示: 创建 '{}' 文件并指定 'entry' 字段",
            path.display(),
            path.display()
        );
    }

    let content =
        std::fs::read_to_string(path).with_context(|| format!("无法读取 '{}'", path.display()))?;
    let mut config: BundlerConfig =
        serde_json::from_str(&content).with_context(|| format!("解析 '{}' 失败", path.display()))?;

    let cwd = std::env::current_dir().context("无法获取当前目录")?;
    let base_dir = match path.parent() {
        Some(dir) => cwd.join(dir),
        None => cwd,
    };
    config.context = base_dir.join(&config.context);
    Ok(config)
}
