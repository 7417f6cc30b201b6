use std::fmt;
use std::str::FromStr;

use anyhow::{Result, anyhow};
use image::DynamicImage;
use image::imageops::FilterType;
use log::{info, warn};

/// 将图片映射为固定维度向量的模型
pub trait Embedder: Send + Sync {
    /// 输出向量的维度
    fn dimension(&self) -> usize;

    /// 计算一张（已预处理）图片的向量
    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>>;
}

/// 计算设备
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Device {
    Cpu,
    Cuda,
}

impl FromStr for Device {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "cpu" => Ok(Self::Cpu),
            "cuda" | "gpu" => Ok(Self::Cuda),
            _ => Err(format!("不支持的设备: {}", s)),
        }
    }
}

impl fmt::Display for Device {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Cpu => f.write_str("cpu"),
            Self::Cuda => f.write_str("cuda"),
        }
    }
}

/// 内置模型
///
/// 名称格式：
/// * `histogram-<bins>`：RGB 联合颜色直方图，维度为 bins³
/// * `thumbnail-<side>`：灰度缩略图，维度为 side²
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingModel {
    Histogram { bins: u32 },
    Thumbnail { side: u32 },
}

impl EmbeddingModel {
    pub fn dimension(&self) -> usize {
        match *self {
            Self::Histogram { bins } => (bins * bins * bins) as usize,
            Self::Thumbnail { side } => (side * side) as usize,
        }
    }
}

impl FromStr for EmbeddingModel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (kind, size) = s.rsplit_once('-').ok_or_else(|| format!("无效的模型名称: {}", s))?;
        let size: u32 = size.parse().map_err(|_| format!("无效的模型参数: {}", s))?;
        match kind {
            "histogram" if (1..=64).contains(&size) => Ok(Self::Histogram { bins: size }),
            "thumbnail" if (1..=256).contains(&size) => Ok(Self::Thumbnail { side: size }),
            "histogram" | "thumbnail" => Err(format!("模型参数超出范围: {}", s)),
            _ => Err(format!("未知的模型: {}", kind)),
        }
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Histogram { bins } => write!(f, "histogram-{}", bins),
            Self::Thumbnail { side } => write!(f, "thumbnail-{}", side),
        }
    }
}

/// 加载模型
pub fn load_embedder(model: EmbeddingModel, device: Device) -> Result<Box<dyn Embedder>> {
    info!("加载模型: {} ({})", model, device);
    if device == Device::Cuda {
        warn!("内置模型不支持 CUDA，将在 CPU 上运行");
    }
    let embedder: Box<dyn Embedder> = match model {
        EmbeddingModel::Histogram { bins } => Box::new(HistogramEmbedder { bins }),
        EmbeddingModel::Thumbnail { side } => Box::new(ThumbnailEmbedder { side }),
    };
    Ok(embedder)
}

/// RGB 联合直方图，按像素总数归一化
pub struct HistogramEmbedder {
    bins: u32,
}

impl Embedder for HistogramEmbedder {
    fn dimension(&self) -> usize {
        EmbeddingModel::Histogram { bins: self.bins }.dimension()
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        let rgb = image.to_rgb8();
        let total = rgb.width() as usize * rgb.height() as usize;
        if total == 0 {
            return Err(anyhow!("图片为空"));
        }

        let bins = self.bins as usize;
        let bucket = |v: u8| v as usize * bins / 256;
        let mut hist = vec![0u32; self.dimension()];
        for px in rgb.pixels() {
            let [r, g, b] = px.0;
            hist[(bucket(r) * bins + bucket(g)) * bins + bucket(b)] += 1;
        }

        Ok(hist.into_iter().map(|n| n as f32 / total as f32).collect())
    }
}

/// 灰度缩略图，像素值缩放到 [0, 1]
pub struct ThumbnailEmbedder {
    side: u32,
}

impl Embedder for ThumbnailEmbedder {
    fn dimension(&self) -> usize {
        EmbeddingModel::Thumbnail { side: self.side }.dimension()
    }

    fn embed(&self, image: &DynamicImage) -> Result<Vec<f32>> {
        if image.width() == 0 || image.height() == 0 {
            return Err(anyhow!("图片为空"));
        }
        let thumb = image.resize_exact(self.side, self.side, FilterType::Triangle).to_luma8();
        Ok(thumb.pixels().map(|px| px.0[0] as f32 / 255.).collect())
    }
}
