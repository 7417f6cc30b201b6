use std::fs;
use std::path::{Path, PathBuf};
use std::sync::LazyLock;

use clap::Parser;
use directories::ProjectDirs;
use serde::Deserialize;
use serde_json::{Value, json};

use crate::embedder::{Device, EmbeddingModel};
use crate::error::ConfigError;
use crate::preprocess::DEFAULT_EXTENSIONS;

static DEFAULT_ENV: LazyLock<PathBuf> = LazyLock::new(|| {
    ProjectDirs::from("", "embsearch", "embsearch")
        .map(|dirs| dirs.config_dir().join("config.json"))
        .unwrap_or_else(|| PathBuf::from("config.json"))
});

fn default_env_file() -> PathBuf {
    DEFAULT_ENV.clone()
}

#[derive(Parser, Debug, Clone)]
#[command(name = "embsearch", version, about = "基于余弦相似度的以图搜图工具")]
pub struct Opts {
    /// 配置文件路径
    #[arg(long, value_name = "PATH", default_value_os_t = default_env_file())]
    pub env: PathBuf,
    /// 搜索与指定图片相似的图片，搜索完成后退出
    #[arg(long, value_name = "IMAGE", conflicts_with = "process_only")]
    pub search: Option<PathBuf>,
    /// 只处理参考图片，不进行搜索
    #[arg(long)]
    pub process_only: bool,
    /// 跳过参考图片处理，直接使用数据库中已有的数据进行搜索
    #[arg(long, conflicts_with = "process_only")]
    pub skip_ingest: bool,
    /// 退出时不清理数据库
    #[arg(long)]
    pub no_cleanup: bool,
}

/// 运行模式
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Mode {
    /// 只处理参考图片
    ProcessOnly,
    /// 搜索一张图片后退出
    Search(PathBuf),
    /// 交互式连续搜索
    Interactive,
}

impl Opts {
    pub fn mode(&self) -> Mode {
        match (&self.search, self.process_only) {
            (_, true) => Mode::ProcessOnly,
            (Some(image), false) => Mode::Search(image.clone()),
            (None, false) => Mode::Interactive,
        }
    }
}

/// 数据库连接参数
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreConfig {
    Postgres { host: String, port: u16, user: String, password: String, database: String },
    Sqlite { path: PathBuf },
}

/// 校验后的配置，运行期间不可变
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// 参考图片目录
    pub source_directory: PathBuf,
    /// 处理后图片的保存目录
    pub processed_directory: PathBuf,
    /// 搜索结果的输出目录
    pub output_directory: PathBuf,
    pub device: Device,
    pub model: EmbeddingModel,
    /// 向量维度，必须与模型输出一致
    pub dimension: usize,
    pub resize_width: u32,
    pub resize_height: u32,
    /// 参考图片后缀，逗号分隔
    pub extensions: String,
    pub store: StoreConfig,
    /// 退出时是否清理数据库
    pub cleanup_on_exit: bool,
}

/// 配置文件的原始内容，所有字段都是可选的，由 [`Config::validate`] 统一检查
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "kebab-case")]
struct RawConfig {
    source_directory: Option<PathBuf>,
    processed_directory: Option<PathBuf>,
    output_directory: Option<PathBuf>,
    device: Option<String>,
    model_name: Option<String>,
    embedding_dimension: Option<usize>,
    resize_width: Option<u32>,
    resize_height: Option<u32>,
    supported_extensions: Option<String>,
    postgres_host: Option<String>,
    postgres_port: Option<u16>,
    postgres_user: Option<String>,
    postgres_password: Option<String>,
    postgres_database: Option<String>,
    sqlite_path: Option<PathBuf>,
    cleanup_on_exit: Option<bool>,
}

/// 记录缺失的必填字段，最后一次性报告
struct Required<'a> {
    missing: &'a mut Vec<&'static str>,
}

impl Required<'_> {
    fn take<T>(&mut self, name: &'static str, value: Option<T>) -> Option<T> {
        if value.is_none() {
            self.missing.push(name);
        }
        value
    }
}

impl Config {
    /// 读取并校验配置文件
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path)
            .map_err(|source| ConfigError::Read { path: path.to_path_buf(), source })?;
        Self::from_json(&text)
    }

    pub fn from_json(text: &str) -> Result<Self, ConfigError> {
        let raw: RawConfig = serde_json::from_str(text)?;
        Self::validate(raw)
    }

    fn validate(raw: RawConfig) -> Result<Self, ConfigError> {
        let mut missing = vec![];
        let mut req = Required { missing: &mut missing };

        let source_directory = req.take("source-directory", raw.source_directory);
        let processed_directory = req.take("processed-directory", raw.processed_directory);
        let output_directory = req.take("output-directory", raw.output_directory);
        let device = req.take("device", raw.device);
        let model_name = req.take("model-name", raw.model_name);
        let dimension = req.take("embedding-dimension", raw.embedding_dimension);
        let resize_width = req.take("resize-width", raw.resize_width);
        let resize_height = req.take("resize-height", raw.resize_height);

        let store = match raw.sqlite_path {
            Some(path) => Some(StoreConfig::Sqlite { path }),
            None => {
                let host = req.take("postgres-host", raw.postgres_host);
                let port = req.take("postgres-port", raw.postgres_port);
                let user = req.take("postgres-user", raw.postgres_user);
                let password = req.take("postgres-password", raw.postgres_password);
                let database = req.take("postgres-database", raw.postgres_database);
                match (host, port, user, password, database) {
                    (Some(host), Some(port), Some(user), Some(password), Some(database)) => {
                        Some(StoreConfig::Postgres { host, port, user, password, database })
                    }
                    _ => None,
                }
            }
        };

        let (
            Some(source_directory),
            Some(processed_directory),
            Some(output_directory),
            Some(device),
            Some(model_name),
            Some(dimension),
            Some(resize_width),
            Some(resize_height),
            Some(store),
        ) = (
            source_directory,
            processed_directory,
            output_directory,
            device,
            model_name,
            dimension,
            resize_width,
            resize_height,
            store,
        )
        else {
            return Err(ConfigError::MissingFields(missing));
        };

        let device = device
            .parse::<Device>()
            .map_err(|reason| ConfigError::Invalid { field: "device", reason })?;
        let model = model_name
            .parse::<EmbeddingModel>()
            .map_err(|reason| ConfigError::Invalid { field: "model-name", reason })?;
        if dimension == 0 {
            return Err(invalid("embedding-dimension", "维度必须大于 0"));
        }
        if dimension != model.dimension() {
            return Err(invalid(
                "embedding-dimension",
                format!("模型 {} 的输出维度为 {}，配置为 {}", model, model.dimension(), dimension),
            ));
        }
        if resize_width == 0 {
            return Err(invalid("resize-width", "宽度必须大于 0"));
        }
        if resize_height == 0 {
            return Err(invalid("resize-height", "高度必须大于 0"));
        }
        let extensions = raw.supported_extensions.unwrap_or_else(|| DEFAULT_EXTENSIONS.to_owned());
        if extensions.split(',').all(|s| s.trim().trim_start_matches('.').is_empty()) {
            return Err(invalid("supported-extensions", "至少需要一个后缀"));
        }

        Ok(Self {
            source_directory,
            processed_directory,
            output_directory,
            device,
            model,
            dimension,
            resize_width,
            resize_height,
            extensions,
            store,
            cleanup_on_exit: raw.cleanup_on_exit.unwrap_or(true),
        })
    }

    /// 与配置文件相同格式的 JSON 快照，数据库密码会被隐藏
    pub fn snapshot(&self) -> Value {
        let mut value = json!({
            "source-directory": self.source_directory,
            "processed-directory": self.processed_directory,
            "output-directory": self.output_directory,
            "device": self.device.to_string(),
            "model-name": self.model.to_string(),
            "embedding-dimension": self.dimension,
            "resize-width": self.resize_width,
            "resize-height": self.resize_height,
            "supported-extensions": self.extensions,
            "cleanup-on-exit": self.cleanup_on_exit,
        });
        let store = match &self.store {
            StoreConfig::Postgres { host, port, user, database, .. } => json!({
                "postgres-host": host,
                "postgres-port": port,
                "postgres-user": user,
                "postgres-password": "********",
                "postgres-database": database,
            }),
            StoreConfig::Sqlite { path } => json!({ "sqlite-path": path }),
        };
        if let (Some(map), Value::Object(store)) = (value.as_object_mut(), store) {
            map.extend(store);
        }
        value
    }
}

fn invalid(field: &'static str, reason: impl Into<String>) -> ConfigError {
    ConfigError::Invalid { field, reason: reason.into() }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn postgres_json() -> Value {
        json!({
            "source-directory": "images",
            "processed-directory": "processed",
            "output-directory": "output",
            "device": "cpu",
            "model-name": "histogram-8",
            "embedding-dimension": 512,
            "resize-width": 224,
            "resize-height": 224,
            "postgres-host": "localhost",
            "postgres-port": 5432,
            "postgres-user": "postgres",
            "postgres-password": "secret",
            "postgres-database": "images",
        })
    }

    #[test]
    fn test_load_postgres() {
        let config = Config::from_json(&postgres_json().to_string()).unwrap();
        assert_eq!(config.model, EmbeddingModel::Histogram { bins: 8 });
        assert_eq!(config.dimension, 512);
        assert_eq!(config.device, Device::Cpu);
        assert_eq!(config.extensions, DEFAULT_EXTENSIONS);
        assert!(config.cleanup_on_exit);
        assert_eq!(
            config.store,
            StoreConfig::Postgres {
                host: "localhost".into(),
                port: 5432,
                user: "postgres".into(),
                password: "secret".into(),
                database: "images".into(),
            }
        );
    }

    #[test]
    fn test_sqlite_replaces_postgres_fields() {
        let json = json!({
            "source-directory": "images",
            "processed-directory": "processed",
            "output-directory": "output",
            "device": "cuda",
            "model-name": "thumbnail-16",
            "embedding-dimension": 256,
            "resize-width": 64,
            "resize-height": 32,
            "sqlite-path": "store.db",
            "cleanup-on-exit": false,
        });
        let config = Config::from_json(&json.to_string()).unwrap();
        assert_eq!(config.store, StoreConfig::Sqlite { path: "store.db".into() });
        assert!(!config.cleanup_on_exit);
    }

    #[test]
    fn test_missing_fields_reported_together() {
        let mut json = postgres_json();
        let map = json.as_object_mut().unwrap();
        map.remove("model-name");
        map.remove("postgres-port");
        map.remove("resize-height");
        match Config::from_json(&json.to_string()) {
            Err(ConfigError::MissingFields(fields)) => {
                assert_eq!(fields, vec!["model-name", "resize-height", "postgres-port"]);
            }
            other => panic!("unexpected result: {:?}", other),
        }
    }

    #[test]
    fn test_dimension_must_match_model() {
        let mut json = postgres_json();
        json["embedding-dimension"] = json!(768);
        let err = Config::from_json(&json.to_string()).unwrap_err();
        assert!(matches!(err, ConfigError::Invalid { field: "embedding-dimension", .. }));
    }

    #[test]
    fn test_invalid_values() {
        for (key, value, field) in [
            ("device", json!("tpu"), "device"),
            ("model-name", json!("clip-large"), "model-name"),
            ("resize-width", json!(0), "resize-width"),
        ] {
            let mut json = postgres_json();
            json[key] = value;
            match Config::from_json(&json.to_string()) {
                Err(ConfigError::Invalid { field: f, .. }) => assert_eq!(f, field),
                other => panic!("unexpected result: {:?}", other),
            }
        }
    }

    #[test]
    fn test_wrong_type_is_parse_error() {
        let mut json = postgres_json();
        json["postgres-port"] = json!("5432");
        assert!(matches!(Config::from_json(&json.to_string()), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn test_snapshot_redacts_password() {
        let config = Config::from_json(&postgres_json().to_string()).unwrap();
        let snapshot = config.snapshot();
        assert_eq!(snapshot["postgres-password"], "********");
        assert_eq!(snapshot["postgres-host"], "localhost");
        assert_eq!(snapshot["model-name"], "histogram-8");
        assert_eq!(snapshot["embedding-dimension"], 512);

        // 快照除密码外可以重新加载为相同的配置
        let mut reloaded = snapshot.clone();
        reloaded["postgres-password"] = json!("secret");
        assert_eq!(Config::from_json(&reloaded.to_string()).unwrap(), config);
    }

    #[test]
    fn test_mode() {
        let opts = Opts::parse_from(["embsearch", "--env", "a.json"]);
        assert_eq!(opts.mode(), Mode::Interactive);
        let opts = Opts::parse_from(["embsearch", "--search", "q.jpg", "--no-cleanup"]);
        assert_eq!(opts.mode(), Mode::Search(PathBuf::from("q.jpg")));
        assert!(opts.no_cleanup);
        let opts = Opts::parse_from(["embsearch", "--process-only"]);
        assert_eq!(opts.mode(), Mode::ProcessOnly);
        let conflict = Opts::try_parse_from(["embsearch", "--process-only", "--search", "q.jpg"]);
        assert!(conflict.is_err());
    }
}
