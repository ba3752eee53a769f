//! 文章处理上下文
//!
//! 封装"我正在处理第几篇文章、它是谁"这一信息

use std::fmt::Display;

/// 文章处理上下文，仅用于日志前缀
#[derive(Debug, Clone)]
pub struct ArticleCtx {
    /// 文章在本轮中的序号（从1开始）
    pub index: usize,

    /// 本轮文章总数
    pub total: usize,

    /// 外部 ID（PMID 等）
    pub external_id: String,
}

impl ArticleCtx {
    pub fn new(index: usize, total: usize, external_id: impl Into<String>) -> Self {
        Self {
            index,
            total,
            external_id: external_id.into(),
        }
    }
}

impl Display for ArticleCtx {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[文章 {}/{} ID#{}]", self.index, self.total, self.external_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_prefix() {
        let ctx = ArticleCtx::new(2, 10, "38012345");
        assert_eq!(ctx.to_string(), "[文章 2/10 ID#38012345]");
    }
}
