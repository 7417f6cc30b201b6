use log::{info, warn};
use sqlx::postgres::{PgConnectOptions, PgPool, PgPoolOptions};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePool, SqlitePoolOptions, SqliteSynchronous,
};

pub mod crud;
pub mod model;

pub use model::*;

use crate::config::StoreConfig;

/// 保存图片向量的表名
pub const TABLE: &str = "image_embeddings";

/// 数据库连接，整个会话只持有一个连接
#[derive(Debug, Clone)]
pub enum Database {
    Sqlite(SqlitePool),
    Postgres(PgPool),
}

pub async fn init_db(store: &StoreConfig) -> Result<Database, sqlx::Error> {
    match store {
        StoreConfig::Sqlite { path } => {
            info!("初始化数据库连接: {}", path.display());
            let options = SqliteConnectOptions::new()
                .journal_mode(SqliteJournalMode::Wal)
                .synchronous(SqliteSynchronous::Normal)
                .filename(path)
                .create_if_missing(true);
            let pool = SqlitePoolOptions::new().max_connections(1).connect_with(options).await?;
            Ok(Database::Sqlite(pool))
        }
        StoreConfig::Postgres { host, port, user, password, database } => {
            info!("初始化数据库连接: {}@{}:{}/{}", user, host, port, database);
            let options = PgConnectOptions::new()
                .host(host)
                .port(*port)
                .username(user)
                .password(password)
                .database(database);
            let pool = PgPoolOptions::new().max_connections(1).connect_with(options).await?;
            Ok(Database::Postgres(pool))
        }
    }
}

/// 图片向量存储
///
/// 以内容哈希作为唯一键，所有向量维度固定为 `dimension`
pub struct EmbeddingStore {
    db: Database,
    dimension: usize,
}

impl EmbeddingStore {
    /// 打开数据库连接并确保表存在
    pub async fn open(store: &StoreConfig, dimension: usize) -> Result<Self, sqlx::Error> {
        let db = init_db(store).await?;
        let store = Self { db, dimension };
        store.ensure_schema().await?;
        Ok(store)
    }

    pub fn dimension(&self) -> usize {
        self.dimension
    }

    /// 创建表，可重复调用
    ///
    /// 已有的表按其他维度创建时返回错误，不会修改表中的数据
    pub async fn ensure_schema(&self) -> Result<(), sqlx::Error> {
        crud::create_table(&self.db, self.dimension).await?;
        if let Some(existing) = crud::table_dimension(&self.db).await? {
            if existing != self.dimension {
                return Err(sqlx::Error::Configuration(
                    format!(
                        "表 `{}` 的向量维度为 {}，配置为 {}，请先清理数据库",
                        TABLE, existing, self.dimension
                    )
                    .into(),
                ));
            }
        }
        info!("已创建或确认表 `{}`", TABLE);
        Ok(())
    }

    /// 插入一条记录，哈希已存在时返回 [`InsertOutcome::DuplicateHash`]
    pub async fn insert(&self, record: &NewImageRecord) -> Result<InsertOutcome, sqlx::Error> {
        if record.embedding.len() != self.dimension {
            return Err(sqlx::Error::Encode(
                format!("向量维度为 {}，期望 {}", record.embedding.len(), self.dimension).into(),
            ));
        }
        crud::add_image(&self.db, record).await
    }

    pub async fn contains_hash(&self, hash: &str) -> Result<bool, sqlx::Error> {
        crud::check_hash(&self.db, hash).await
    }

    /// 读取全部记录的快照，按 id 升序
    pub async fn fetch_all(&self) -> Result<Vec<StoredEmbedding>, sqlx::Error> {
        crud::get_embeddings(&self.db).await
    }

    pub async fn count(&self) -> Result<i64, sqlx::Error> {
        crud::count_images(&self.db).await
    }

    /// 清空所有记录，失败时只记录日志
    pub async fn clear(&self) {
        match crud::drop_table(&self.db).await {
            Ok(()) => info!("数据库已清理"),
            Err(e) => warn!("数据库清理失败: {}", e),
        }
    }

    /// 关闭数据库连接
    pub async fn close(self) {
        match self.db {
            Database::Sqlite(pool) => pool.close().await,
            Database::Postgres(pool) => pool.close().await,
        }
        info!("数据库连接已关闭");
    }
}

#[cfg(test)]
mod tests {
    use tempfile::TempDir;

    use super::*;

    async fn open_temp(dir: &TempDir, dimension: usize) -> EmbeddingStore {
        let store = StoreConfig::Sqlite { path: dir.path().join("store.db") };
        EmbeddingStore::open(&store, dimension).await.unwrap()
    }

    fn record(hash: &str, embedding: Vec<f32>) -> NewImageRecord {
        NewImageRecord {
            file_path: format!("/processed/{hash}.jpg"),
            file_name: format!("{hash}.png"),
            file_hash: hash.to_owned(),
            embedding,
        }
    }

    #[tokio::test]
    async fn test_insert_and_fetch() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 3).await;

        let a = store.insert(&record("aaa", vec![1., 0., 0.])).await.unwrap();
        let b = store.insert(&record("bbb", vec![0., 1., 0.5])).await.unwrap();
        assert!(matches!(a, InsertOutcome::Inserted(_)));
        assert!(matches!(b, InsertOutcome::Inserted(_)));

        let all = store.fetch_all().await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all[0].id < all[1].id);
        assert_eq!(all[0].file_name, "aaa.png");
        assert_eq!(all[1].embedding, vec![0., 1., 0.5]);
    }

    #[tokio::test]
    async fn test_duplicate_hash() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 2).await;

        store.insert(&record("same", vec![1., 2.])).await.unwrap();
        let outcome = store.insert(&record("same", vec![3., 4.])).await.unwrap();
        assert_eq!(outcome, InsertOutcome::DuplicateHash);
        assert!(store.contains_hash("same").await.unwrap());
        assert!(!store.contains_hash("other").await.unwrap());

        // 重复插入不会修改原有记录
        let all = store.fetch_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].embedding, vec![1., 2.]);
    }

    #[tokio::test]
    async fn test_dimension_enforced() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 4).await;
        assert!(store.insert(&record("short", vec![1., 2.])).await.is_err());
        assert_eq!(store.count().await.unwrap(), 0);
    }

    #[tokio::test]
    async fn test_schema_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 2).await;
        store.insert(&record("x", vec![0., 1.])).await.unwrap();
        store.ensure_schema().await.unwrap();
        store.ensure_schema().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_reopen_with_other_dimension() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 4).await;
        store.insert(&record("x", vec![0., 1., 2., 3.])).await.unwrap();
        store.close().await;

        let config = StoreConfig::Sqlite { path: dir.path().join("store.db") };
        let err = EmbeddingStore::open(&config, 2).await.err().unwrap();
        assert!(matches!(err, sqlx::Error::Configuration(_)));

        // 原有数据不受影响
        let store = open_temp(&dir, 4).await;
        assert_eq!(store.count().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_empty_table_with_other_dimension() {
        let dir = TempDir::new().unwrap();
        open_temp(&dir, 8).await.close().await;

        let config = StoreConfig::Sqlite { path: dir.path().join("store.db") };
        assert!(EmbeddingStore::open(&config, 3).await.is_err());

        // 清理后可以按新维度重建
        let store = open_temp(&dir, 8).await;
        store.clear().await;
        store.close().await;
        let store = open_temp(&dir, 3).await;
        assert_eq!(store.dimension(), 3);
    }

    #[tokio::test]
    async fn test_clear_idempotent() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 2).await;
        store.insert(&record("x", vec![0., 1.])).await.unwrap();

        store.clear().await;
        store.clear().await;
        assert!(store.count().await.is_err());

        store.ensure_schema().await.unwrap();
        assert_eq!(store.count().await.unwrap(), 0);
        store.close().await;
    }

    #[tokio::test]
    async fn test_persisted_across_connections() {
        let dir = TempDir::new().unwrap();
        let store = open_temp(&dir, 2).await;
        store.insert(&record("p", vec![0.25, -1.5])).await.unwrap();
        store.close().await;

        let store = open_temp(&dir, 2).await;
        let all = store.fetch_all().await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].embedding, vec![0.25, -1.5]);
    }
}
