use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use image::codecs::jpeg::JpegEncoder;
use image::imageops::FilterType;
use image::{DynamicImage, ImageReader};
use log::{debug, info};
use regex::Regex;
use walkdir::WalkDir;

use crate::hash::ContentHash;

/// 处理后图片的 JPEG 质量
const JPEG_QUALITY: u8 = 95;

/// 默认支持的图片后缀
pub const DEFAULT_EXTENSIONS: &str = "jpg,jpeg,png,webp";

/// 格式转换并缩放后的图片
pub struct ProcessedImage {
    /// 原始文件路径
    pub source: PathBuf,
    /// RGB8 格式，尺寸固定为目标宽高
    pub image: DynamicImage,
    /// 处理后像素内容的哈希
    pub hash: ContentHash,
}

impl ProcessedImage {
    /// 原始文件名
    pub fn file_name(&self) -> String {
        self.source
            .file_name()
            .map(|name| name.to_string_lossy().into_owned())
            .unwrap_or_else(|| self.source.to_string_lossy().into_owned())
    }

    /// 处理后图片保存时使用的文件名：`<原文件名>_<哈希前缀>.jpg`
    pub fn processed_name(&self) -> String {
        let stem = self.source.file_stem().map(|s| s.to_string_lossy()).unwrap_or_default();
        format!("{}_{}.jpg", stem, self.hash.short())
    }
}

/// 图片预处理：解码、转为 RGB、拉伸缩放到固定尺寸
///
/// 缩放不保持长宽比，输出尺寸严格等于 `width`×`height`
#[derive(Debug, Clone, Copy)]
pub struct Preprocessor {
    width: u32,
    height: u32,
}

impl Preprocessor {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// 读取并处理一张图片
    pub fn load<P: AsRef<Path>>(&self, path: P) -> Result<ProcessedImage> {
        let path = path.as_ref();
        let image = ImageReader::open(path)
            .with_context(|| format!("无法打开图片: {}", path.display()))?
            .with_guessed_format()?
            .decode()
            .with_context(|| format!("无法解码图片: {}", path.display()))?;
        Ok(self.process(path.to_path_buf(), image))
    }

    /// 处理已解码的图片
    pub fn process(&self, source: PathBuf, image: DynamicImage) -> ProcessedImage {
        let rgb = image.to_rgb8();
        let resized = image::imageops::resize(&rgb, self.width, self.height, FilterType::Lanczos3);
        let hash = ContentHash::of_image(&resized);
        ProcessedImage { source, image: DynamicImage::ImageRgb8(resized), hash }
    }

    /// 将处理后的图片以 JPEG 格式保存到指定目录，返回保存路径
    pub fn save(&self, image: &ProcessedImage, dir: &Path) -> Result<PathBuf> {
        let path = dir.join(image.processed_name());
        let file = File::create(&path)
            .with_context(|| format!("无法创建文件: {}", path.display()))?;
        let mut writer = BufWriter::new(file);
        image.image.write_with_encoder(JpegEncoder::new_with_quality(&mut writer, JPEG_QUALITY))?;
        writer.flush()?;
        debug!("保存处理后图片: {}", path.display());
        Ok(path)
    }
}

/// 根据逗号分隔的后缀列表构建大小写不敏感的正则
pub fn suffix_regex(suffix: &str) -> Result<Regex> {
    let alternatives = suffix
        .split(',')
        .map(|s| regex::escape(s.trim().trim_start_matches('.')))
        .filter(|s| !s.is_empty())
        .collect::<Vec<_>>();
    Ok(Regex::new(&format!("(?i)^({})$", alternatives.join("|")))?)
}

/// 递归扫描目录中的图片文件，结果按路径排序
pub fn scan_images(dir: &Path, regex_suf: &Regex) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        anyhow::bail!("图片目录不存在: {}", dir.display());
    }
    info!("开始扫描目录: {}", dir.display());
    let mut entries = WalkDir::new(dir)
        .into_iter()
        .filter_map(|entry| {
            entry.ok().and_then(|entry| {
                let path = entry.path();
                if entry.file_type().is_file() {
                    if let Some(ext) = path.extension() {
                        if regex_suf.is_match(&ext.to_string_lossy()) {
                            return Some(path.to_path_buf());
                        }
                    }
                }
                None
            })
        })
        .collect::<Vec<_>>();
    entries.sort();
    info!("扫描完成，共 {} 张图片", entries.len());
    Ok(entries)
}
