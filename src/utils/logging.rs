//! 日志工具模块
//!
//! 提供日志初始化、格式化和输出的辅助函数

use std::fs;

use tracing::info;
use tracing_subscriber::EnvFilter;

use crate::config::Config;
use crate::error::AppResult;
use crate::orchestrator::RunStats;

/// 初始化 tracing 输出
///
/// `RUST_LOG` 优先；否则按 `verbose` 选择 debug / info 级别
pub fn init_tracing(verbose: bool) {
    let default_level = if verbose { "md_harvest=debug" } else { "md_harvest=info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));
    let _ = tracing_subscriber::fmt().with_env_filter(filter).try_init();
}

/// 初始化运行日志文件
///
/// # 参数
/// - `log_file_path`: 日志文件路径
pub fn init_log_file(log_file_path: &str) -> AppResult<()> {
    let log_header = format!(
        "{}\n文献采集日志 - {}\n{}\n\n",
        "=".repeat(60),
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        "=".repeat(60)
    );
    fs::write(log_file_path, log_header)?;
    Ok(())
}

/// 记录程序启动信息
pub fn log_startup(config: &Config) {
    info!("{}", "=".repeat(60));
    info!("🚀 程序启动 - 文献采集与抽取");
    info!("🔍 检索式: {}", config.query);
    info!("📊 浏览器页面上限: {}", config.browser_pool_size);
    info!("⏱️ 单篇抓取超时: {} 秒", config.fetch_timeout_secs);
    info!("{}", "=".repeat(60));
}

/// 打印本轮统计，并追加写入运行日志文件
///
/// # 参数
/// - `stats`: 本轮统计
/// - `log_file_path`: 日志文件路径
pub fn print_final_stats(stats: &RunStats, log_file_path: &str) -> AppResult<()> {
    let finished = chrono::Local::now().format("%Y-%m-%d %H:%M:%S").to_string();
    let lines = [
        format!("完成时间: {}", finished),
        format!("🔍 检索: {} 篇 (新增 {} 篇)", stats.searched, stats.new_articles),
        format!(
            "📄 抓取: {} 篇 (✅ 成功 {}, 🛑 拉黑 {}, ❌ 失败 {})",
            stats.fetch_targets, stats.succeeded, stats.discredited, stats.failed
        ),
        format!(
            "🧪 抽取: {} 篇 (跳过已有记录 {} 篇)",
            stats.extracted, stats.skipped_extraction
        ),
        format!("💾 结构化记录: {} 条", stats.records),
    ];

    info!("\n{}", "=".repeat(60));
    info!("📊 全部处理完成统计");
    for line in &lines {
        info!("{}", line);
    }
    info!("{}", "=".repeat(60));

    let mut content = fs::read_to_string(log_file_path).unwrap_or_default();
    content.push_str(&lines.join("\n"));
    content.push('\n');
    fs::write(log_file_path, content)?;
    info!("\n日志已保存至: {}", log_file_path);
    Ok(())
}

/// 截断长文本用于日志显示
///
/// # 参数
/// - `text`: 原始文本
/// - `max_len`: 最大长度
///
/// # 返回
/// 返回截断后的文本
pub fn truncate_text(text: &str, max_len: usize) -> String {
    if text.chars().count() > max_len {
        text.chars().take(max_len).collect::<String>() + "..."
    } else {
        text.to_string()
    }
}
