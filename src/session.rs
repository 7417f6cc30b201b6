use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

use anyhow::{Context, Result, bail};
use log::{debug, info};
use tokio::sync::OnceCell;
use tokio::task::block_in_place;

use crate::config::Config;
use crate::db::EmbeddingStore;
use crate::embedder::{Embedder, load_embedder};
use crate::ingest::{IngestStats, IngestionPipeline};
use crate::preprocess::Preprocessor;
use crate::searcher::{self, Ranking};
use crate::shutdown::Shutdown;

/// 根据配置加载模型
pub type EmbedderLoader = Box<dyn Fn(&Config) -> Result<Box<dyn Embedder>> + Send + Sync>;

/// 一次运行期间共享的模型与数据库连接
///
/// 模型最多加载一次，参考图片最多导入一次；
/// 清理在 [`SearchSession::close`] 中执行，且只会执行一次
pub struct SearchSession {
    config: Config,
    store: EmbeddingStore,
    embedder: OnceCell<Box<dyn Embedder>>,
    loader: EmbedderLoader,
    ingested: OnceCell<IngestStats>,
    preprocessor: Preprocessor,
    cleanup_enabled: bool,
    cleaned: AtomicBool,
}

impl SearchSession {
    /// 连接数据库并加载模型，任何一步失败都视为启动失败
    pub async fn open(config: Config, cleanup_enabled: bool) -> Result<Self> {
        let loader: EmbedderLoader = Box::new(|c: &Config| load_embedder(c.model, c.device));
        Self::open_with(config, cleanup_enabled, loader).await
    }

    pub async fn open_with(
        config: Config,
        cleanup_enabled: bool,
        loader: EmbedderLoader,
    ) -> Result<Self> {
        let store = EmbeddingStore::open(&config.store, config.dimension)
            .await
            .context("无法连接数据库")?;
        let session = Self {
            preprocessor: Preprocessor::new(config.resize_width, config.resize_height),
            config,
            store,
            embedder: OnceCell::new(),
            loader,
            ingested: OnceCell::new(),
            cleanup_enabled,
            cleaned: AtomicBool::new(false),
        };
        session.embedder().await.context("无法加载模型")?;
        Ok(session)
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn store(&self) -> &EmbeddingStore {
        &self.store
    }

    /// 获取模型，第一次调用时加载
    pub async fn embedder(&self) -> Result<&dyn Embedder> {
        let embedder = self
            .embedder
            .get_or_try_init(|| async {
                let embedder = (self.loader)(&self.config)?;
                if embedder.dimension() != self.config.dimension {
                    bail!("模型输出维度为 {}，配置为 {}", embedder.dimension(), self.config.dimension);
                }
                info!("模型加载完成，向量维度 {}", embedder.dimension());
                Ok(embedder)
            })
            .await?;
        Ok(embedder.as_ref())
    }

    /// 导入参考图片，同一会话中只会执行一次
    pub async fn ingest(&self, shutdown: &Shutdown) -> Result<IngestStats> {
        let stats = self
            .ingested
            .get_or_try_init(|| async {
                let embedder = self.embedder().await?;
                let pipeline = IngestionPipeline::new(&self.config, &self.store, embedder)?;
                pipeline.run(shutdown).await
            })
            .await?;
        Ok(*stats)
    }

    /// 用与参考图片相同的方式处理查询图片，并与数据库中的全部记录比较
    ///
    /// 数据库为空时返回 [`crate::error::SearchError::EmptyStore`]
    pub async fn search<P: AsRef<Path>>(&self, image: P) -> Result<Ranking> {
        let image = image.as_ref();
        let embedder = self.embedder().await?;
        let query = block_in_place(|| {
            let processed = self.preprocessor.load(image)?;
            embedder.embed(&processed.image)
        })?;
        let snapshot = self.store.fetch_all().await?;
        debug!("与 {} 条记录比较: {}", snapshot.len(), image.display());
        Ok(block_in_place(|| searcher::rank(&query, snapshot))?)
    }

    /// 清理数据库，返回本次调用是否执行了清理
    ///
    /// 多次调用时只有第一次生效
    pub async fn cleanup(&self) -> bool {
        if self.cleaned.swap(true, Ordering::SeqCst) {
            debug!("清理已执行过");
            return false;
        }
        if self.cleanup_enabled {
            info!("正在清理数据库……");
            self.store.clear().await;
        } else {
            info!("已禁用清理，保留数据库内容");
        }
        true
    }

    /// 清理并释放数据库连接与模型
    pub async fn close(self) {
        self.cleanup().await;
        self.store.close().await;
        drop(self.embedder);
        debug!("会话已关闭");
    }
}
