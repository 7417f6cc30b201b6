#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::Result;
use image::{Rgb, RgbImage};
use serde_json::json;

/// 参考图片：名称与主色调
pub const FRUITS: [(&str, [u8; 3]); 3] =
    [("apple", [220, 20, 30]), ("banana", [240, 220, 40]), ("grapes", [110, 40, 140])];

/// 生成一张带轻微渐变的纯色图片，避免所有像素完全相同
pub fn fruit_image(color: [u8; 3]) -> RgbImage {
    RgbImage::from_fn(48, 40, |x, y| {
        let shade = ((x + y) % 8) as u8;
        Rgb([color[0].saturating_sub(shade), color[1].saturating_sub(shade), color[2]])
    })
}

/// 测试用的工作目录，包含参考图片与配置文件
pub struct Workspace {
    pub root: PathBuf,
    pub images: PathBuf,
    pub processed: PathBuf,
    pub output: PathBuf,
    pub store: PathBuf,
    pub config: PathBuf,
}

impl Workspace {
    pub fn create(root: &Path) -> Result<Self> {
        let ws = Self {
            root: root.to_path_buf(),
            images: root.join("images"),
            processed: root.join("processed"),
            output: root.join("output"),
            store: root.join("store.db"),
            config: root.join("config.json"),
        };
        fs::create_dir_all(&ws.images)?;
        for (name, color) in FRUITS {
            fruit_image(color).save(ws.images.join(format!("{}.png", name)))?;
        }
        ws.write_config(json!({}))?;
        Ok(ws)
    }

    /// 写入配置文件，`extra` 中的字段会覆盖默认值
    pub fn write_config(&self, extra: serde_json::Value) -> Result<()> {
        let mut config = json!({
            "source-directory": self.images,
            "processed-directory": self.processed,
            "output-directory": self.output,
            "device": "cpu",
            "model-name": "histogram-4",
            "embedding-dimension": 64,
            "resize-width": 32,
            "resize-height": 32,
            "sqlite-path": self.store,
        });
        if let (Some(map), Some(extra)) = (config.as_object_mut(), extra.as_object()) {
            map.extend(extra.clone());
        }
        fs::write(&self.config, serde_json::to_vec_pretty(&config)?)?;
        Ok(())
    }

    pub fn image(&self, name: &str) -> PathBuf {
        self.images.join(format!("{}.png", name))
    }

    /// 输出目录下生成的所有结果目录
    pub fn output_dirs(&self) -> Result<Vec<PathBuf>> {
        if !self.output.exists() {
            return Ok(vec![]);
        }
        let mut dirs = fs::read_dir(&self.output)?
            .map(|entry| entry.map(|e| e.path()))
            .collect::<Result<Vec<_>, _>>()?;
        dirs.sort();
        Ok(dirs)
    }
}
