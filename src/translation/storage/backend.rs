//! 缓存存储后端
//!
//! 三个命名空间的键值存储：块记录、页面映射、元数据。
//! 一次 `write_batch` 内的操作按顺序生效，`RedbBackend` 在单个事务中提交。

use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use redb::{Database, ReadableTable, TableDefinition, TableError};

use crate::translation::error::{TranslationError, TranslationResult};

const CHUNKS_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("chunks");
const PAGES_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("pages");
const META_TABLE: TableDefinition<&str, &[u8]> = TableDefinition::new("meta");

/// 命名空间
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Namespace {
    /// 块记录
    Chunks,
    /// 页面映射
    Pages,
    /// 元数据（缓存版本等）
    Meta,
}

impl Namespace {
    pub const ALL: [Namespace; 3] = [Namespace::Chunks, Namespace::Pages, Namespace::Meta];

    fn table(self) -> TableDefinition<'static, &'static str, &'static [u8]> {
        match self {
            Namespace::Chunks => CHUNKS_TABLE,
            Namespace::Pages => PAGES_TABLE,
            Namespace::Meta => META_TABLE,
        }
    }
}

/// 批量写操作
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp {
    Put {
        namespace: Namespace,
        key: String,
        value: Vec<u8>,
    },
    Delete {
        namespace: Namespace,
        key: String,
    },
}

impl WriteOp {
    pub fn put(namespace: Namespace, key: impl Into<String>, value: Vec<u8>) -> Self {
        WriteOp::Put {
            namespace,
            key: key.into(),
            value,
        }
    }

    pub fn delete(namespace: Namespace, key: impl Into<String>) -> Self {
        WriteOp::Delete {
            namespace,
            key: key.into(),
        }
    }
}

/// 键值存储后端
#[async_trait]
pub trait CacheBackend: Send + Sync {
    /// 后端名称，用于日志
    fn name(&self) -> &'static str;

    async fn get(&self, namespace: Namespace, key: &str) -> TranslationResult<Option<Vec<u8>>>;

    /// 按顺序应用一组写操作
    async fn write_batch(&self, ops: Vec<WriteOp>) -> TranslationResult<()>;

    /// 列出命名空间内的全部条目
    async fn scan(&self, namespace: Namespace) -> TranslationResult<Vec<(String, Vec<u8>)>>;

    async fn len(&self, namespace: Namespace) -> TranslationResult<usize> {
        Ok(self.scan(namespace).await?.len())
    }

    /// 清空块记录和页面映射，元数据保留
    async fn clear(&self) -> TranslationResult<()>;
}

// ============================================================================
// 内存后端
// ============================================================================

/// 内存后端
#[derive(Debug, Default, Clone)]
pub struct MemoryBackend {
    chunks: Arc<DashMap<String, Vec<u8>>>,
    pages: Arc<DashMap<String, Vec<u8>>>,
    meta: Arc<DashMap<String, Vec<u8>>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn map(&self, namespace: Namespace) -> &DashMap<String, Vec<u8>> {
        match namespace {
            Namespace::Chunks => &self.chunks,
            Namespace::Pages => &self.pages,
            Namespace::Meta => &self.meta,
        }
    }
}

#[async_trait]
impl CacheBackend for MemoryBackend {
    fn name(&self) -> &'static str {
        "memory"
    }

    async fn get(&self, namespace: Namespace, key: &str) -> TranslationResult<Option<Vec<u8>>> {
        Ok(self.map(namespace).get(key).map(|entry| entry.value().clone()))
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> TranslationResult<()> {
        for op in ops {
            match op {
                WriteOp::Put {
                    namespace,
                    key,
                    value,
                } => {
                    self.map(namespace).insert(key, value);
                }
                WriteOp::Delete { namespace, key } => {
                    self.map(namespace).remove(&key);
                }
            }
        }
        Ok(())
    }

    async fn scan(&self, namespace: Namespace) -> TranslationResult<Vec<(String, Vec<u8>)>> {
        Ok(self
            .map(namespace)
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().clone()))
            .collect())
    }

    async fn len(&self, namespace: Namespace) -> TranslationResult<usize> {
        Ok(self.map(namespace).len())
    }

    async fn clear(&self) -> TranslationResult<()> {
        self.pages.clear();
        self.chunks.clear();
        Ok(())
    }
}

// ============================================================================
// redb 持久化后端
// ============================================================================

/// 基于 redb 的持久化后端
///
/// redb 是同步 API，所有操作放到 `spawn_blocking` 中执行。
#[derive(Clone)]
pub struct RedbBackend {
    db: Arc<Database>,
    path: PathBuf,
}

impl RedbBackend {
    /// 打开或创建数据库文件，必要时创建父目录
    pub fn open<P: AsRef<Path>>(path: P) -> TranslationResult<Self> {
        let path = path.as_ref().to_path_buf();
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }

        let db = Database::create(&path).map_err(redb::Error::from)?;
        tracing::info!("打开缓存数据库: {}", path.display());

        Ok(Self {
            db: Arc::new(db),
            path,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    async fn blocking<T, F>(&self, f: F) -> TranslationResult<T>
    where
        T: Send + 'static,
        F: FnOnce(&Database) -> Result<T, redb::Error> + Send + 'static,
    {
        let db = Arc::clone(&self.db);
        let result = tokio::task::spawn_blocking(move || f(&db)).await?;
        result.map_err(TranslationError::from)
    }
}

#[async_trait]
impl CacheBackend for RedbBackend {
    fn name(&self) -> &'static str {
        "redb"
    }

    async fn get(&self, namespace: Namespace, key: &str) -> TranslationResult<Option<Vec<u8>>> {
        let key = key.to_string();
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let table = match txn.open_table(namespace.table()) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(None),
                Err(e) => return Err(e.into()),
            };
            let value = table.get(key.as_str())?.map(|guard| guard.value().to_vec());
            Ok(value)
        })
        .await
    }

    async fn write_batch(&self, ops: Vec<WriteOp>) -> TranslationResult<()> {
        if ops.is_empty() {
            return Ok(());
        }

        self.blocking(move |db| {
            let txn = db.begin_write()?;
            {
                let mut chunks = txn.open_table(CHUNKS_TABLE)?;
                let mut pages = txn.open_table(PAGES_TABLE)?;
                let mut meta = txn.open_table(META_TABLE)?;

                for op in &ops {
                    match op {
                        WriteOp::Put {
                            namespace,
                            key,
                            value,
                        } => {
                            let table = match namespace {
                                Namespace::Chunks => &mut chunks,
                                Namespace::Pages => &mut pages,
                                Namespace::Meta => &mut meta,
                            };
                            table.insert(key.as_str(), value.as_slice())?;
                        }
                        WriteOp::Delete { namespace, key } => {
                            let table = match namespace {
                                Namespace::Chunks => &mut chunks,
                                Namespace::Pages => &mut pages,
                                Namespace::Meta => &mut meta,
                            };
                            table.remove(key.as_str())?;
                        }
                    }
                }
            }
            txn.commit()?;
            Ok(())
        })
        .await
    }

    async fn scan(&self, namespace: Namespace) -> TranslationResult<Vec<(String, Vec<u8>)>> {
        self.blocking(move |db| {
            let txn = db.begin_read()?;
            let table = match txn.open_table(namespace.table()) {
                Ok(table) => table,
                Err(TableError::TableDoesNotExist(_)) => return Ok(Vec::new()),
                Err(e) => return Err(e.into()),
            };

            let mut entries = Vec::new();
            for entry in table.iter()? {
                let (key, value) = entry?;
                entries.push((key.value().to_string(), value.value().to_vec()));
            }
            Ok(entries)
        })
        .await
    }

    async fn clear(&self) -> TranslationResult<()> {
        self.blocking(|db| {
            let txn = db.begin_write()?;
            txn.delete_table(PAGES_TABLE)?;
            txn.delete_table(CHUNKS_TABLE)?;
            txn.commit()?;
            Ok(())
        })
        .await
    }
}
