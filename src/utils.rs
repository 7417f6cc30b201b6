use std::path::{Path, PathBuf};

use indicatif::ProgressStyle;

pub fn pb_style() -> ProgressStyle {
    ProgressStyle::default_bar()
        .template("[{elapsed_precise}] {bar:40.cyan/blue} {pos:>7}/{len:7} {msg}")
        .unwrap_or_else(|_| ProgressStyle::default_bar())
        .progress_chars("##-")
}

/// 去除用户输入路径两端的空白与引号，拖拽文件到终端时常带有引号
pub fn clean_input_path(input: &str) -> Option<PathBuf> {
    let trimmed = input.trim();
    let unquoted = trimmed
        .strip_prefix('"')
        .and_then(|s| s.strip_suffix('"'))
        .or_else(|| trimmed.strip_prefix('\'').and_then(|s| s.strip_suffix('\'')))
        .unwrap_or(trimmed)
        .trim();
    if unquoted.is_empty() { None } else { Some(PathBuf::from(unquoted)) }
}

/// 文件名去掉后缀的部分，无法获取时返回 `query`
pub fn file_stem(path: &Path) -> String {
    path.file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| "query".to_owned())
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    #[rstest]
    #[case("  apple.png ", Some("apple.png"))]
    #[case("\"/tmp/my image.jpg\"", Some("/tmp/my image.jpg"))]
    #[case("'q.webp'", Some("q.webp"))]
    #[case("   ", None)]
    #[case("\"\"", None)]
    fn test_clean_input_path(#[case] input: &str, #[case] expected: Option<&str>) {
        assert_eq!(clean_input_path(input), expected.map(PathBuf::from));
    }

    #[test]
    fn test_file_stem() {
        assert_eq!(file_stem(Path::new("/a/b/apple.png")), "apple");
        assert_eq!(file_stem(Path::new("noext")), "noext");
        assert_eq!(file_stem(Path::new("/")), "query");
    }
}
