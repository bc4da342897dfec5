//! CLI 格式化输出
//!
//! 构建警告和输出文件列表的显示。

use sheaf_core::{BuildResult, Warning};
use std::path::Path;

pub fn print_warnings(warnings: &[Warning]) {
    for warning in warnings {
        eprintln!("⚠️  {}", warning);
    }
}

/// 打印输出文件及大小，并在最后给出统计信息
pub fn print_summary(result: &BuildResult, output_dir: &Path, written: bool) {
    let width = result.files.keys().map(String::len).max().unwrap_or(0);
    for (name, content) in &result.files {
        println!("  {:<width$}  {:>10}", name, format_size(content.len()), width = width);
    }

    let stats = &result.stats;
    println!(
        "{} modules, {} chunks, {} files (cache: {} hits, {} misses)",
        stats.modules, stats.chunks, stats.files, stats.cache_hits, stats.cache_misses
    );
    if written {
        println!("✅ Output written to {}", output_dir.display());
    } else {
        println!("✅ Build succeeded (dry run, nothing written)");
    }
}

fn format_size(bytes: usize) -> String {
    if bytes < 1024 {
        format!("{} B", bytes)
    } else {
        format!("{:.1} KiB", bytes as f64 / 1024.0)
    }
}
