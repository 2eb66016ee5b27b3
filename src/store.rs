use std::collections::{BTreeSet, HashMap};
use std::path::Path;
use std::sync::RwLock;

use sled::transaction::{TransactionError, TransactionResult};
use sled::Transactional;
use tracing::debug;

use crate::comparison::Comparison;
use crate::error::{CompareError, Result};

/// 模块：对比记录存储 (Comparison Store)
///
/// **职责**: 内容寻址的持久化。key 由记录内容推导，所以相同内容的重复写入
/// 天然是幂等的：覆盖写进去的字节和原来的一模一样。
///
/// 存储后端需要提供的能力只有四个：单条 put / get，以及列表用的 count + scan。
/// 单条 put 必须是原子的：要么整条记录落盘，要么什么都没写。
pub trait ComparisonStore: Send + Sync {
    /// 不存在则创建，存在则无条件覆盖
    fn put(&self, key: &str, record: &Comparison) -> Result<()>;

    fn get(&self, key: &str) -> Result<Option<Comparison>>;

    fn count(&self) -> Result<usize>;

    /// 按 `created_at` 倒序返回最多 `limit` 条
    fn scan_latest(&self, limit: usize) -> Result<Vec<Comparison>>;
}

/// 全量列表，最新的在前
///
/// 采用"先 count 再 fetch"：两步之间如果有并发写入，返回的条数可能少于
/// 此刻实际存在的记录数。这是可以接受的一致性缺口，不做快照隔离。
pub fn list_latest<S: ComparisonStore + ?Sized>(store: &S) -> Result<Vec<Comparison>> {
    let count = store.count()?;
    store.scan_latest(count)
}

/// 时间索引的 key：`created_at` (翻转符号位后的大端序) || 记录 key
///
/// 翻转符号位让负的时间戳也能按字节序正确排序。
fn index_key(created_at: i64, key: &str) -> Vec<u8> {
    let ordered = (created_at as u64) ^ (1 << 63);
    let mut out = Vec::with_capacity(8 + key.len());
    out.extend_from_slice(&ordered.to_be_bytes());
    out.extend_from_slice(key.as_bytes());
    out
}

/// 基于 sled 的持久化实现
///
/// - `comparisons`: key -> bcs 编码的记录
/// - `by_created`: 时间索引 -> key，倒序遍历即为最新优先
pub struct SledStore {
    db: sled::Db,
    records: sled::Tree,
    by_created: sled::Tree,
}

impl SledStore {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        Self::from_db(sled::open(path)?)
    }

    /// 临时库，drop 时删除；测试和基准用
    pub fn temporary() -> Result<Self> {
        Self::from_db(sled::Config::new().temporary(true).open()?)
    }

    fn from_db(db: sled::Db) -> Result<Self> {
        let records = db.open_tree("comparisons")?;
        let by_created = db.open_tree("by_created")?;
        Ok(Self {
            db,
            records,
            by_created,
        })
    }

    pub fn flush(&self) -> Result<()> {
        self.db.flush()?;
        Ok(())
    }
}

impl ComparisonStore for SledStore {
    fn put(&self, key: &str, record: &Comparison) -> Result<()> {
        let value = bcs::to_bytes(record)?;
        let new_index = index_key(record.created_at, key);

        // 记录和索引在同一个事务里写，避免出现只有一半的记录
        let result: TransactionResult<(), ()> = (&self.records, &self.by_created).transaction(
            |(records, by_created)| {
                if let Some(old) = records.insert(key.as_bytes(), value.as_slice())? {
                    // 覆盖写：旧记录的时间索引要去掉，否则列表里会出现两次
                    if let Ok(old) = bcs::from_bytes::<Comparison>(&old) {
                        by_created.remove(index_key(old.created_at, key))?;
                    }
                }
                by_created.insert(new_index.as_slice(), key.as_bytes())?;
                Ok(())
            },
        );

        match result {
            Ok(()) => {
                debug!("put {} ({} bytes)", key, value.len());
                Ok(())
            }
            Err(TransactionError::Storage(e)) => Err(e.into()),
            Err(TransactionError::Abort(())) => Err(CompareError::StoreUnavailable(
                "transaction aborted".to_string(),
            )),
        }
    }

    fn get(&self, key: &str) -> Result<Option<Comparison>> {
        match self.records.get(key.as_bytes())? {
            Some(bytes) => Ok(Some(bcs::from_bytes(&bytes)?)),
            None => Ok(None),
        }
    }

    fn count(&self) -> Result<usize> {
        Ok(self.records.len())
    }

    fn scan_latest(&self, limit: usize) -> Result<Vec<Comparison>> {
        let mut out = Vec::with_capacity(limit.min(1024));
        for entry in self.by_created.iter().rev() {
            if out.len() >= limit {
                break;
            }
            let (_, key) = entry?;
            // 索引和记录不在同一次读快照里，记录不见了就跳过
            if let Some(bytes) = self.records.get(&key)? {
                out.push(bcs::from_bytes(&bytes)?);
            }
        }
        Ok(out)
    }
}

#[derive(Default)]
struct MemoryInner {
    records: HashMap<String, Comparison>,
    by_created: BTreeSet<(i64, String)>,
}

/// 纯内存实现，语义和 [`SledStore`] 一致；进程退出即丢失
#[derive(Default)]
pub struct MemoryStore {
    inner: RwLock<MemoryInner>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn poisoned<T>(_: T) -> CompareError {
    CompareError::StoreUnavailable("memory store lock poisoned".to_string())
}

impl ComparisonStore for MemoryStore {
    fn put(&self, key: &str, record: &Comparison) -> Result<()> {
        let mut inner = self.inner.write().map_err(poisoned)?;
        if let Some(old) = inner.records.insert(key.to_string(), record.clone()) {
            inner.by_created.remove(&(old.created_at, key.to_string()));
        }
        inner.by_created.insert((record.created_at, key.to_string()));
        Ok(())
    }

    fn get(&self, key: &str) -> Result<Option<Comparison>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner.records.get(key).cloned())
    }

    fn count(&self) -> Result<usize> {
        Ok(self.inner.read().map_err(poisoned)?.records.len())
    }

    fn scan_latest(&self, limit: usize) -> Result<Vec<Comparison>> {
        let inner = self.inner.read().map_err(poisoned)?;
        Ok(inner
            .by_created
            .iter()
            .rev()
            .filter_map(|(_, key)| inner.records.get(key).cloned())
            .take(limit)
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};

    fn record(title: &str, left: &[u8], at: i64) -> Comparison {
        Comparison::new(
            title,
            left.to_vec(),
            b"right".to_vec(),
            "a@example.com",
            Utc.timestamp_opt(at, 0).unwrap(),
        )
    }

    fn put(store: &dyn ComparisonStore, c: &Comparison) -> String {
        let key = c.key();
        store.put(&key, c).unwrap();
        key
    }

    fn check_put_get(store: &dyn ComparisonStore) {
        let c = record("t", b"left", 100);
        let key = put(store, &c);

        assert_eq!(store.get(&key).unwrap(), Some(c));
        assert_eq!(store.get("00000000000000000000000000000000").unwrap(), None);
    }

    fn check_overwrite_is_single_entry(store: &dyn ComparisonStore) {
        let first = record("first", b"same", 100);
        let again = record("second", b"same", 200);
        let key = put(store, &first);
        assert_eq!(put(store, &again), key);

        assert_eq!(store.count().unwrap(), 1);
        let all = list_latest(store).unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0], again);
    }

    fn check_descending_order(store: &dyn ComparisonStore) {
        for (i, at) in [300, -5, 100, 200, 0].into_iter().enumerate() {
            put(store, &record(&i.to_string(), &[i as u8], at));
        }

        let times: Vec<i64> = list_latest(store)
            .unwrap()
            .iter()
            .map(|c| c.created_at().timestamp())
            .collect();
        assert_eq!(times, vec![300, 200, 100, 0, -5]);

        let newest: Vec<i64> = store
            .scan_latest(2)
            .unwrap()
            .iter()
            .map(|c| c.created_at().timestamp())
            .collect();
        assert_eq!(newest, vec![300, 200]);
    }

    #[test]
    fn memory_put_get() {
        check_put_get(&MemoryStore::new());
    }

    #[test]
    fn memory_overwrite() {
        check_overwrite_is_single_entry(&MemoryStore::new());
    }

    #[test]
    fn memory_order() {
        check_descending_order(&MemoryStore::new());
    }

    #[test]
    fn sled_put_get() {
        check_put_get(&SledStore::temporary().unwrap());
    }

    #[test]
    fn sled_overwrite() {
        check_overwrite_is_single_entry(&SledStore::temporary().unwrap());
    }

    #[test]
    fn sled_order() {
        check_descending_order(&SledStore::temporary().unwrap());
    }

    #[test]
    fn empty_store_lists_nothing() {
        assert!(list_latest(&MemoryStore::new()).unwrap().is_empty());
        assert!(list_latest(&SledStore::temporary().unwrap()).unwrap().is_empty());
    }

    #[test]
    fn index_key_sorts_by_time_then_key() {
        assert!(index_key(-1, "b") < index_key(0, "a"));
        assert!(index_key(0, "a") < index_key(0, "b"));
        assert!(index_key(i64::MAX - 1, "z") < index_key(i64::MAX, "a"));
    }

    #[test]
    fn sled_survives_reopen() {
        let dir = std::env::temp_dir().join(format!(
            "duibi-store-test-{}-{}",
            std::process::id(),
            Utc::now().timestamp_nanos_opt().unwrap_or_default()
        ));
        let c = record("persist", b"disk", 42);
        let key = c.key();
        {
            let store = SledStore::open(&dir).unwrap();
            store.put(&key, &c).unwrap();
            store.flush().unwrap();
        }
        {
            let store = SledStore::open(&dir).unwrap();
            assert_eq!(store.get(&key).unwrap(), Some(c));
        }
        let _ = std::fs::remove_dir_all(&dir);
    }
}
