use sqlx::Result;

use super::{Database, InsertOutcome, NewImageRecord, StoredEmbedding, TABLE};

/// 创建表，已存在时不做任何事
///
/// 向量长度由 CHECK 约束固定为 `dimension`
pub async fn create_table(db: &Database, dimension: usize) -> Result<()> {
    match db {
        Database::Sqlite(pool) => {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {TABLE} (
                    id INTEGER PRIMARY KEY AUTOINCREMENT,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    file_path TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    file_hash TEXT UNIQUE NOT NULL,
                    embedding BLOB NOT NULL CHECK (length(embedding) = {})
                )
                "#,
                dimension * size_of::<f32>()
            );
            sqlx::query(&sql).execute(pool).await?;
        }
        Database::Postgres(pool) => {
            let sql = format!(
                r#"
                CREATE TABLE IF NOT EXISTS {TABLE} (
                    id BIGSERIAL PRIMARY KEY,
                    created_at TIMESTAMP DEFAULT CURRENT_TIMESTAMP,
                    file_path TEXT NOT NULL,
                    file_name TEXT NOT NULL,
                    file_hash TEXT UNIQUE NOT NULL,
                    embedding REAL[] NOT NULL CHECK (cardinality(embedding) = {dimension})
                )
                "#
            );
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}

/// 读取已有表的向量维度
///
/// 优先使用建表时的 CHECK 约束，找不到约束时使用第一条记录的长度；
/// 表为空且没有约束时返回 `None`
pub async fn table_dimension(db: &Database) -> Result<Option<usize>> {
    match db {
        Database::Sqlite(pool) => {
            let schema = sqlx::query_scalar::<_, String>(
                "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?",
            )
            .bind(TABLE)
            .fetch_optional(pool)
            .await?;
            if let Some(bytes) = schema.and_then(|sql| number_after(&sql, "length(embedding)")) {
                return Ok(Some(bytes / size_of::<f32>()));
            }
            let sql = format!("SELECT length(embedding) FROM {TABLE} LIMIT 1");
            let bytes = sqlx::query_scalar::<_, i64>(&sql).fetch_optional(pool).await?;
            Ok(bytes.map(|b| b as usize / size_of::<f32>()))
        }
        Database::Postgres(pool) => {
            let checks = sqlx::query_scalar::<_, String>(
                r#"
                SELECT pg_get_constraintdef(c.oid)
                FROM pg_constraint c JOIN pg_class t ON t.oid = c.conrelid
                WHERE t.relname = $1 AND c.contype = 'c'
                "#,
            )
            .bind(TABLE)
            .fetch_all(pool)
            .await?;
            let declared = checks.iter().find_map(|c| number_after(c, "cardinality(embedding)"));
            if let Some(dim) = declared {
                return Ok(Some(dim));
            }
            let sql = format!("SELECT cardinality(embedding)::BIGINT FROM {TABLE} LIMIT 1");
            let dim = sqlx::query_scalar::<_, i64>(&sql).fetch_optional(pool).await?;
            Ok(dim.map(|d| d as usize))
        }
    }
}

/// 取出 `marker = <数字>` 中的数字
fn number_after(text: &str, marker: &str) -> Option<usize> {
    let start = text.find(marker)? + marker.len();
    let rest = text[start..].trim_start_matches([' ', '=']);
    let digits = rest.chars().take_while(char::is_ascii_digit).collect::<String>();
    digits.parse().ok()
}

/// 添加图片记录
///
/// 单条语句完成插入，哈希冲突时不写入任何数据
pub async fn add_image(db: &Database, record: &NewImageRecord) -> Result<InsertOutcome> {
    let id = match db {
        Database::Sqlite(pool) => {
            let sql = format!(
                r#"
                INSERT INTO {TABLE} (file_path, file_name, file_hash, embedding)
                VALUES (?, ?, ?, ?)
                ON CONFLICT (file_hash) DO NOTHING
                RETURNING id
                "#
            );
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(&record.file_path)
                .bind(&record.file_name)
                .bind(&record.file_hash)
                .bind(bytemuck::cast_slice::<f32, u8>(&record.embedding))
                .fetch_optional(pool)
                .await?
        }
        Database::Postgres(pool) => {
            let sql = format!(
                r#"
                INSERT INTO {TABLE} (file_path, file_name, file_hash, embedding)
                VALUES ($1, $2, $3, $4)
                ON CONFLICT (file_hash) DO NOTHING
                RETURNING id
                "#
            );
            sqlx::query_scalar::<_, i64>(&sql)
                .bind(&record.file_path)
                .bind(&record.file_name)
                .bind(&record.file_hash)
                .bind(&record.embedding[..])
                .fetch_optional(pool)
                .await?
        }
    };

    Ok(match id {
        Some(id) => InsertOutcome::Inserted(id),
        None => InsertOutcome::DuplicateHash,
    })
}

/// 检查图片哈希是否存在
pub async fn check_hash(db: &Database, hash: &str) -> Result<bool> {
    let count = match db {
        Database::Sqlite(pool) => {
            let sql = format!("SELECT COUNT(*) FROM {TABLE} WHERE file_hash = ?");
            sqlx::query_scalar::<_, i64>(&sql).bind(hash).fetch_one(pool).await?
        }
        Database::Postgres(pool) => {
            let sql = format!("SELECT COUNT(*) FROM {TABLE} WHERE file_hash = $1");
            sqlx::query_scalar::<_, i64>(&sql).bind(hash).fetch_one(pool).await?
        }
    };
    Ok(count > 0)
}

/// 读取全部向量，按 id 升序
pub async fn get_embeddings(db: &Database) -> Result<Vec<StoredEmbedding>> {
    let sql = format!("SELECT id, file_path, file_name, embedding FROM {TABLE} ORDER BY id ASC");
    let records = match db {
        Database::Sqlite(pool) => sqlx::query_as::<_, (i64, String, String, Vec<u8>)>(&sql)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|(id, file_path, file_name, blob)| StoredEmbedding {
                id,
                file_path,
                file_name,
                embedding: bytemuck::pod_collect_to_vec::<u8, f32>(&blob),
            })
            .collect(),
        Database::Postgres(pool) => sqlx::query_as::<_, (i64, String, String, Vec<f32>)>(&sql)
            .fetch_all(pool)
            .await?
            .into_iter()
            .map(|(id, file_path, file_name, embedding)| StoredEmbedding {
                id,
                file_path,
                file_name,
                embedding,
            })
            .collect(),
    };
    Ok(records)
}

/// 查询数据库中的图片数量
pub async fn count_images(db: &Database) -> Result<i64> {
    let sql = format!("SELECT COUNT(*) FROM {TABLE}");
    match db {
        Database::Sqlite(pool) => sqlx::query_scalar(&sql).fetch_one(pool).await,
        Database::Postgres(pool) => sqlx::query_scalar(&sql).fetch_one(pool).await,
    }
}

/// 删除整张表，表不存在时不做任何事
pub async fn drop_table(db: &Database) -> Result<()> {
    let sql = format!("DROP TABLE IF EXISTS {TABLE}");
    match db {
        Database::Sqlite(pool) => {
            sqlx::query(&sql).execute(pool).await?;
        }
        Database::Postgres(pool) => {
            sqlx::query(&sql).execute(pool).await?;
        }
    }
    Ok(())
}
