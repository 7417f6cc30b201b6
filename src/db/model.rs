/// 待插入的图片记录，id 与 created_at 由数据库生成
#[derive(Debug, Clone)]
pub struct NewImageRecord {
    /// 处理后图片的路径
    pub file_path: String,
    /// 原始图片文件名
    pub file_name: String,
    /// 处理后图片内容的哈希，十六进制
    pub file_hash: String,
    /// 图片向量
    pub embedding: Vec<f32>,
}

/// 搜索时读取的记录快照
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEmbedding {
    pub id: i64,
    pub file_path: String,
    pub file_name: String,
    pub embedding: Vec<f32>,
}

/// 插入结果，哈希重复属于正常情况而非错误
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InsertOutcome {
    Inserted(i64),
    DuplicateHash,
}
