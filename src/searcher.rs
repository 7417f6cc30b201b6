use std::cmp::Ordering;

use rayon::prelude::*;
use serde::{Deserialize, Serialize};

use crate::db::StoredEmbedding;
use crate::error::SearchError;

/// 排序后的单条结果
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RankedResult {
    /// 从 1 开始的名次
    pub rank: usize,
    /// 余弦相似度，范围 [-1, 1]
    pub similarity: f32,
    pub file_name: String,
    pub file_path: String,
}

/// 完整的排序结果，至少包含一条记录
#[derive(Debug, Clone)]
pub struct Ranking {
    results: Vec<RankedResult>,
}

impl Ranking {
    /// 最相似的结果
    pub fn top(&self) -> &RankedResult {
        &self.results[0]
    }

    pub fn results(&self) -> &[RankedResult] {
        &self.results
    }

    pub fn len(&self) -> usize {
        self.results.len()
    }

    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// 计算余弦相似度
///
/// 任一向量范数为 0 时结果为 0，不会产生 NaN；结果不会是 -0.0
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let (mut dot, mut norm_a, mut norm_b) = (0f64, 0f64, 0f64);
    for (&x, &y) in a.iter().zip(b) {
        let (x, y) = (x as f64, y as f64);
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0. || norm_b == 0. {
        return 0.;
    }
    let similarity = dot / (norm_a.sqrt() * norm_b.sqrt());
    if !similarity.is_finite() {
        return 0.;
    }
    // 下溢得到的 -0.0 在 total_cmp 中小于 0.0
    similarity.clamp(-1., 1.) as f32 + 0.

}

/// 将查询向量与快照中的所有记录比较并排序
///
/// 相似度降序，相似度完全相同时按记录 id 升序
pub fn rank(query: &[f32], snapshot: Vec<StoredEmbedding>) -> Result<Ranking, SearchError> {
    if snapshot.is_empty() {
        return Err(SearchError::EmptyStore);
    }
    if let Some(record) = snapshot.iter().find(|r| r.embedding.len() != query.len()) {
        return Err(SearchError::DimensionMismatch {
            id: record.id,
            expected: query.len(),
            actual: record.embedding.len(),
        });
    }

    let mut scored = snapshot
        .into_par_iter()
        .map(|record| (cosine_similarity(query, &record.embedding), record))
        .collect::<Vec<_>>();
    scored.sort_unstable_by(|(sa, ra), (sb, rb)| match sb.total_cmp(sa) {
        Ordering::Equal => ra.id.cmp(&rb.id),
        ord => ord,
    });

    let results = scored
        .into_iter()
        .enumerate()
        .map(|(i, (similarity, record))| RankedResult {
            rank: i + 1,
            similarity,
            file_name: record.file_name,
            file_path: record.file_path,
        })
        .collect();

    Ok(Ranking { results })
}
