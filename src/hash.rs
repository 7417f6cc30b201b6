use std::fmt;

use image::RgbImage;

/// 处理后图片内容的 blake3 摘要，用作去重键
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ContentHash(blake3::Hash);

impl ContentHash {
    /// 计算处理后（格式转换、缩放之后）的像素内容哈希
    ///
    /// 宽高也参与计算，避免不同尺寸但像素字节相同的图片冲突
    pub fn of_image(image: &RgbImage) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(&image.width().to_le_bytes());
        hasher.update(&image.height().to_le_bytes());
        hasher.update(image.as_raw());
        Self(hasher.finalize())
    }

    /// 十六进制字符串，数据库中以此形式保存
    pub fn to_hex(&self) -> String {
        self.0.to_hex().to_string()
    }

    /// 十六进制的前 8 位，用于生成文件名
    pub fn short(&self) -> String {
        let mut hex = self.to_hex();
        hex.truncate(8);
        hex
    }
}

impl fmt::Display for ContentHash {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0.to_hex())
    }
}

#[cfg(test)]
mod tests {
    use image::Rgb;

    use super::*;

    #[test]
    fn test_hash_deterministic() {
        let img = RgbImage::from_fn(8, 8, |x, y| Rgb([x as u8, y as u8, 0]));
        assert_eq!(ContentHash::of_image(&img), ContentHash::of_image(&img.clone()));
    }

    #[test]
    fn test_hash_pixel_sensitive() {
        let a = RgbImage::from_pixel(8, 8, Rgb([1, 2, 3]));
        let mut b = a.clone();
        b.put_pixel(7, 7, Rgb([1, 2, 4]));
        assert_ne!(ContentHash::of_image(&a), ContentHash::of_image(&b));
    }

    #[test]
    fn test_hash_includes_dimensions() {
        // 两张图片像素字节完全一致，只是宽高不同
        let a = RgbImage::from_pixel(4, 2, Rgb([9, 9, 9]));
        let b = RgbImage::from_pixel(2, 4, Rgb([9, 9, 9]));
        assert_eq!(a.as_raw(), b.as_raw());
        assert_ne!(ContentHash::of_image(&a), ContentHash::of_image(&b));
    }

    #[test]
    fn test_hex_format() {
        let hash = ContentHash::of_image(&RgbImage::new(1, 1));
        assert_eq!(hash.to_hex().len(), 64);
        assert_eq!(hash.short().len(), 8);
        assert!(hash.to_hex().starts_with(&hash.short()));
        assert_eq!(hash.to_string(), hash.to_hex());
    }
}
