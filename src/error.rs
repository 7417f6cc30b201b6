use std::path::PathBuf;

use thiserror::Error;

/// 配置文件错误
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("无法读取配置文件 {path}: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("配置文件格式错误: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("配置文件缺少字段: {}", .0.join(", "))]
    MissingFields(Vec<&'static str>),
    #[error("配置字段 `{field}` 无效: {reason}")]
    Invalid { field: &'static str, reason: String },
}

/// 相似度搜索错误
#[derive(Debug, Error, PartialEq)]
pub enum SearchError {
    /// 数据库中没有任何可供比较的记录
    #[error("数据库中没有可供比较的图片")]
    EmptyStore,
    #[error("记录 {id} 的向量维度为 {actual}，期望 {expected}")]
    DimensionMismatch { id: i64, expected: usize, actual: usize },
}
