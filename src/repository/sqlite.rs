//! SQLite 存储实现
//!
//! 单连接 + 互斥锁，所有时间字段按毫秒时间戳存储。
//! resources.url 带唯一索引，重复写入返回 `RepositoryError::Duplicate`。

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use parking_lot::Mutex;
use rusqlite::{params, Connection, ErrorCode, OptionalExtension, Row};
use tracing::{debug, info};

use super::{
    AccountRepository, ProviderRepository, ReadyResourceRepository, RepoResult, RepositoryError,
    ResourceRepository, SystemConfigRepository, TaxonomyRepository,
};
use crate::models::{Account, Provider, ReadyResource, Resource};
use crate::provider::ProviderKind;

const READY_COLUMNS: &str = "id, title, description, url, category, tags, img, source, extra, key, error_msg, create_time, ip";

const RESOURCE_COLUMNS: &str = "id, title, description, url, pan_id, save_url, file_size, category_id, view_count, is_valid, is_public, cover, author, error_msg, ck_id, fid, key, created_at, updated_at";

const ACCOUNT_COLUMNS: &str = "id, pan_id, idx, ck, is_valid, space, left_space, used_space, username, vip_status, service_type, remark";

pub struct SqliteStore {
    conn: Mutex<Connection>,
}

impl SqliteStore {
    /// 打开（或创建）数据库文件
    pub fn open(db_path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = db_path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let conn = Connection::open(db_path)?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.init_tables()?;

        info!("数据库已打开: {:?}", db_path);
        Ok(store)
    }

    pub fn open_in_memory() -> anyhow::Result<Self> {
        let store = Self {
            conn: Mutex::new(Connection::open_in_memory()?),
        };
        store.init_tables()?;
        Ok(store)
    }

    fn init_tables(&self) -> anyhow::Result<()> {
        let conn = self.conn.lock();

        conn.execute_batch(
            r#"
            CREATE TABLE IF NOT EXISTS ready_resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT,
                description TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                category TEXT NOT NULL DEFAULT '',
                tags TEXT NOT NULL DEFAULT '',
                img TEXT NOT NULL DEFAULT '',
                source TEXT NOT NULL DEFAULT '',
                extra TEXT NOT NULL DEFAULT '',
                key TEXT NOT NULL DEFAULT '',
                error_msg TEXT NOT NULL DEFAULT '',
                create_time INTEGER NOT NULL,
                ip TEXT
            );

            CREATE TABLE IF NOT EXISTS resources (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL DEFAULT '',
                description TEXT NOT NULL DEFAULT '',
                url TEXT NOT NULL,
                pan_id INTEGER,
                save_url TEXT NOT NULL DEFAULT '',
                file_size TEXT NOT NULL DEFAULT '',
                category_id INTEGER,
                view_count INTEGER NOT NULL DEFAULT 0,
                is_valid INTEGER NOT NULL DEFAULT 1,
                is_public INTEGER NOT NULL DEFAULT 1,
                cover TEXT NOT NULL DEFAULT '',
                author TEXT NOT NULL DEFAULT '',
                error_msg TEXT NOT NULL DEFAULT '',
                ck_id INTEGER,
                fid TEXT NOT NULL DEFAULT '',
                key TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            );
            CREATE UNIQUE INDEX IF NOT EXISTS idx_resources_url ON resources(url);
            CREATE INDEX IF NOT EXISTS idx_resources_pan_created ON resources(pan_id, created_at);

            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS tags (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE
            );

            CREATE TABLE IF NOT EXISTS resource_tags (
                resource_id INTEGER NOT NULL,
                tag_id INTEGER NOT NULL,
                PRIMARY KEY (resource_id, tag_id)
            );

            CREATE TABLE IF NOT EXISTS pans (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name TEXT NOT NULL UNIQUE,
                remark TEXT NOT NULL DEFAULT ''
            );

            CREATE TABLE IF NOT EXISTS cks (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                pan_id INTEGER NOT NULL,
                idx INTEGER,
                ck TEXT NOT NULL DEFAULT '',
                is_valid INTEGER NOT NULL DEFAULT 1,
                space INTEGER NOT NULL DEFAULT 0,
                left_space INTEGER NOT NULL DEFAULT 0,
                used_space INTEGER NOT NULL DEFAULT 0,
                username TEXT NOT NULL DEFAULT '',
                vip_status INTEGER NOT NULL DEFAULT 0,
                service_type TEXT NOT NULL DEFAULT '',
                remark TEXT NOT NULL DEFAULT ''
            );
            CREATE INDEX IF NOT EXISTS idx_cks_pan ON cks(pan_id);

            CREATE TABLE IF NOT EXISTS system_config (
                key TEXT PRIMARY KEY,
                value TEXT NOT NULL DEFAULT ''
            );
            "#,
        )?;

        debug!("数据库表结构初始化完成");
        Ok(())
    }

    /// 写入平台目录（已存在的名称跳过），返回目录总数
    pub fn seed_providers(&self) -> anyhow::Result<usize> {
        let conn = self.conn.lock();
        let names = ProviderKind::SUPPORTED
            .into_iter()
            .map(|k| (k.catalog_name(), k.label()))
            .chain(std::iter::once((
                ProviderKind::NotFound.catalog_name(),
                ProviderKind::NotFound.label(),
            )));

        for (name, remark) in names {
            conn.execute(
                "INSERT OR IGNORE INTO pans (name, remark) VALUES (?1, ?2)",
                params![name, remark],
            )?;
        }

        let count: i64 = conn.query_row("SELECT COUNT(*) FROM pans", [], |r| r.get(0))?;
        Ok(count as usize)
    }

    /// 录入网盘账号
    pub fn create_account(&self, account: &Account) -> RepoResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO cks (pan_id, idx, ck, is_valid, space, left_space, used_space,
                             username, vip_status, service_type, remark)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)
            "#,
            params![
                account.pan_id,
                account.idx,
                account.ck,
                account.is_valid,
                account.space,
                account.left_space,
                account.used_space,
                account.username,
                account.vip_status,
                account.service_type,
                account.remark,
            ],
        )?;
        Ok(conn.last_insert_rowid())
    }

    pub fn find_resource_by_url(&self, url: &str) -> RepoResult<Option<Resource>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM resources WHERE url = ?1", RESOURCE_COLUMNS);
        let resource = conn
            .query_row(&sql, params![url], resource_from_row)
            .optional()?;
        Ok(resource)
    }

    /// 资源关联的标签 ID
    pub fn tag_ids_for(&self, resource_id: i64) -> RepoResult<Vec<i64>> {
        let conn = self.conn.lock();
        let mut stmt = conn
            .prepare("SELECT tag_id FROM resource_tags WHERE resource_id = ?1 ORDER BY tag_id")?;
        let ids = stmt
            .query_map(params![resource_id], |r| r.get(0))?
            .collect::<Result<Vec<i64>, _>>()?;
        Ok(ids)
    }

    fn find_or_create_named(&self, table: &str, name: &str) -> RepoResult<i64> {
        let conn = self.conn.lock();
        let select = format!("SELECT id FROM {} WHERE name = ?1", table);
        if let Some(id) = conn
            .query_row(&select, params![name], |r| r.get::<_, i64>(0))
            .optional()?
        {
            return Ok(id);
        }

        let insert = format!("INSERT INTO {} (name) VALUES (?1)", table);
        conn.execute(&insert, params![name])?;
        Ok(conn.last_insert_rowid())
    }
}

fn to_millis(dt: &DateTime<Utc>) -> i64 {
    dt.timestamp_millis()
}

fn from_millis(ms: i64) -> DateTime<Utc> {
    Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
}

/// 唯一约束冲突映射为 Duplicate，其余归为存储错误
fn map_insert_error(e: rusqlite::Error, url: &str) -> RepositoryError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            RepositoryError::Duplicate(url.to_string())
        }
        _ => RepositoryError::from(e),
    }
}

fn ready_from_row(row: &Row<'_>) -> rusqlite::Result<ReadyResource> {
    Ok(ReadyResource {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        url: row.get(3)?,
        category: row.get(4)?,
        tags: row.get(5)?,
        img: row.get(6)?,
        source: row.get(7)?,
        extra: row.get(8)?,
        key: row.get(9)?,
        error_msg: row.get(10)?,
        create_time: from_millis(row.get(11)?),
        ip: row.get(12)?,
    })
}

fn resource_from_row(row: &Row<'_>) -> rusqlite::Result<Resource> {
    Ok(Resource {
        id: row.get(0)?,
        title: row.get(1)?,
        description: row.get(2)?,
        url: row.get(3)?,
        pan_id: row.get(4)?,
        save_url: row.get(5)?,
        file_size: row.get(6)?,
        category_id: row.get(7)?,
        view_count: row.get(8)?,
        is_valid: row.get(9)?,
        is_public: row.get(10)?,
        cover: row.get(11)?,
        author: row.get(12)?,
        error_msg: row.get(13)?,
        ck_id: row.get(14)?,
        fid: row.get(15)?,
        key: row.get(16)?,
        created_at: from_millis(row.get(17)?),
        updated_at: from_millis(row.get(18)?),
    })
}

fn account_from_row(row: &Row<'_>) -> rusqlite::Result<Account> {
    Ok(Account {
        id: row.get(0)?,
        pan_id: row.get(1)?,
        idx: row.get(2)?,
        ck: row.get(3)?,
        is_valid: row.get(4)?,
        space: row.get(5)?,
        left_space: row.get(6)?,
        used_space: row.get(7)?,
        username: row.get(8)?,
        vip_status: row.get(9)?,
        service_type: row.get(10)?,
        remark: row.get(11)?,
    })
}

fn insert_ready(conn: &Connection, item: &ReadyResource, key: &str) -> rusqlite::Result<i64> {
    conn.execute(
        r#"
        INSERT INTO ready_resources (title, description, url, category, tags, img, source,
                                     extra, key, error_msg, create_time, ip)
        VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12)
        "#,
        params![
            item.title,
            item.description,
            item.url,
            item.category,
            item.tags,
            item.img,
            item.source,
            item.extra,
            key,
            item.error_msg,
            to_millis(&item.create_time),
            item.ip,
        ],
    )?;
    Ok(conn.last_insert_rowid())
}

#[async_trait]
impl ReadyResourceRepository for SqliteStore {
    async fn find_all(&self) -> RepoResult<Vec<ReadyResource>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM ready_resources ORDER BY id", READY_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map([], ready_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn create(&self, item: &ReadyResource) -> RepoResult<i64> {
        let conn = self.conn.lock();
        Ok(insert_ready(&conn, item, &item.key)?)
    }

    async fn batch_create(&self, items: &[ReadyResource]) -> RepoResult<Vec<i64>> {
        let batch_key = uuid::Uuid::new_v4().to_string();
        let mut conn = self.conn.lock();
        let tx = conn.transaction()?;

        let mut ids = Vec::with_capacity(items.len());
        for item in items {
            let key = if item.key.is_empty() {
                batch_key.as_str()
            } else {
                item.key.as_str()
            };
            ids.push(insert_ready(&tx, item, key)?);
        }

        tx.commit()?;
        debug!("批量写入待处理资源 {} 条, key={}", ids.len(), batch_key);
        Ok(ids)
    }

    async fn delete(&self, id: i64) -> RepoResult<()> {
        let conn = self.conn.lock();
        conn.execute("DELETE FROM ready_resources WHERE id = ?1", params![id])?;
        Ok(())
    }
}

#[async_trait]
impl ResourceRepository for SqliteStore {
    async fn create(&self, resource: &Resource) -> RepoResult<i64> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO resources (title, description, url, pan_id, save_url, file_size,
                                   category_id, view_count, is_valid, is_public, cover, author,
                                   error_msg, ck_id, fid, key, created_at, updated_at)
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18)
            "#,
            params![
                resource.title,
                resource.description,
                resource.url,
                resource.pan_id,
                resource.save_url,
                resource.file_size,
                resource.category_id,
                resource.view_count,
                resource.is_valid,
                resource.is_public,
                resource.cover,
                resource.author,
                resource.error_msg,
                resource.ck_id,
                resource.fid,
                resource.key,
                to_millis(&resource.created_at),
                to_millis(&resource.updated_at),
            ],
        )
        .map_err(|e| map_insert_error(e, &resource.url))?;
        Ok(conn.last_insert_rowid())
    }

    async fn update(&self, resource: &Resource) -> RepoResult<()> {
        let conn = self.conn.lock();
        let changed = conn.execute(
            r#"
            UPDATE resources SET
                title = ?1, description = ?2, pan_id = ?3, save_url = ?4, file_size = ?5,
                category_id = ?6, is_valid = ?7, is_public = ?8, cover = ?9, author = ?10,
                error_msg = ?11, ck_id = ?12, fid = ?13, key = ?14, updated_at = ?15
            WHERE id = ?16
            "#,
            params![
                resource.title,
                resource.description,
                resource.pan_id,
                resource.save_url,
                resource.file_size,
                resource.category_id,
                resource.is_valid,
                resource.is_public,
                resource.cover,
                resource.author,
                resource.error_msg,
                resource.ck_id,
                resource.fid,
                resource.key,
                to_millis(&Utc::now()),
                resource.id,
            ],
        )?;

        if changed == 0 {
            return Err(RepositoryError::NotFound(format!("resource#{}", resource.id)));
        }
        Ok(())
    }

    async fn find_exists(&self, url: &str) -> RepoResult<bool> {
        let conn = self.conn.lock();
        let found = conn
            .query_row(
                "SELECT 1 FROM resources WHERE url = ?1 LIMIT 1",
                params![url],
                |_| Ok(()),
            )
            .optional()?;
        Ok(found.is_some())
    }

    async fn get_resources_for_transfer(
        &self,
        pan_id: i64,
        since: DateTime<Utc>,
        limit: usize,
    ) -> RepoResult<Vec<Resource>> {
        let conn = self.conn.lock();
        let sql = format!(
            r#"
            SELECT {} FROM resources
            WHERE pan_id = ?1 AND save_url = '' AND error_msg = '' AND created_at >= ?2
            ORDER BY created_at DESC, id DESC
            LIMIT ?3
            "#,
            RESOURCE_COLUMNS
        );
        let mut stmt = conn.prepare(&sql)?;
        let limit = i64::try_from(limit).unwrap_or(i64::MAX);
        let items = stmt
            .query_map(params![pan_id, to_millis(&since), limit], resource_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn create_resource_tag(&self, resource_id: i64, tag_id: i64) -> RepoResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            "INSERT OR IGNORE INTO resource_tags (resource_id, tag_id) VALUES (?1, ?2)",
            params![resource_id, tag_id],
        )?;
        Ok(())
    }
}

#[async_trait]
impl AccountRepository for SqliteStore {
    async fn find_all(&self) -> RepoResult<Vec<Account>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM cks ORDER BY id", ACCOUNT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map([], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }

    async fn find_by_provider(&self, pan_id: i64) -> RepoResult<Vec<Account>> {
        let conn = self.conn.lock();
        let sql = format!("SELECT {} FROM cks WHERE pan_id = ?1 ORDER BY id", ACCOUNT_COLUMNS);
        let mut stmt = conn.prepare(&sql)?;
        let items = stmt
            .query_map(params![pan_id], account_from_row)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

#[async_trait]
impl ProviderRepository for SqliteStore {
    async fn find_all(&self) -> RepoResult<Vec<Provider>> {
        let conn = self.conn.lock();
        let mut stmt = conn.prepare("SELECT id, name, remark FROM pans ORDER BY id")?;
        let items = stmt
            .query_map([], |r| {
                Ok(Provider {
                    id: r.get(0)?,
                    name: r.get(1)?,
                    remark: r.get(2)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(items)
    }
}

#[async_trait]
impl TaxonomyRepository for SqliteStore {
    async fn find_or_create_category(&self, name: &str) -> RepoResult<i64> {
        self.find_or_create_named("categories", name)
    }

    async fn find_or_create_tag(&self, name: &str) -> RepoResult<i64> {
        self.find_or_create_named("tags", name)
    }
}

#[async_trait]
impl SystemConfigRepository for SqliteStore {
    async fn get_value(&self, key: &str) -> RepoResult<Option<String>> {
        let conn = self.conn.lock();
        let value = conn
            .query_row(
                "SELECT value FROM system_config WHERE key = ?1",
                params![key],
                |r| r.get::<_, String>(0),
            )
            .optional()?;
        Ok(value)
    }

    async fn set_value(&self, key: &str, value: &str) -> RepoResult<()> {
        let conn = self.conn.lock();
        conn.execute(
            r#"
            INSERT INTO system_config (key, value) VALUES (?1, ?2)
            ON CONFLICT(key) DO UPDATE SET value = excluded.value
            "#,
            params![key, value],
        )?;
        Ok(())
    }
}
