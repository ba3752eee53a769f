use std::path::PathBuf;

use anyhow::Result;
use md_harvest::utils::init_tracing;
use md_harvest::{App, Config};

#[tokio::main]
async fn main() -> Result<()> {
    // 第一个参数为可选的配置文件路径
    let config_path = std::env::args().nth(1).map(PathBuf::from);

    // 加载配置
    let config = Config::load(config_path.as_deref())?;

    // 初始化日志
    init_tracing(config.verbose_logging);

    // 初始化并运行应用
    App::initialize(config).await?.run().await?;

    Ok(())
}
