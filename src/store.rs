use anyhow::{anyhow, Context};
use indexmap::IndexMap;
use rusqlite::{Connection, OptionalExtension};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::fs::File;
use std::io::Write;
use std::marker::PhantomData;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use crate::config::{Backend, Config};
use crate::model::{Account, Faculty, Session};

pub const SQLITE_FILENAME: &str = "facultyd.sqlite3";
pub const COUNTERS_DOCUMENT: &str = "counters";

/// An entity that lives in a keyed collection.
pub trait Record: Serialize + DeserializeOwned + Clone {
    const COLLECTION: &'static str;

    fn key(&self) -> &str;

    /// Older documents may keep the key only as the map key.
    fn adopt_key(&mut self, key: &str);
}

/// Per-entity storage. Listing preserves insertion order.
pub trait Repository<T: Record> {
    fn list(&self) -> anyhow::Result<Vec<T>>;

    fn put_many(&mut self, entities: &[T]) -> anyhow::Result<()>;

    fn delete(&mut self, id: &str) -> anyhow::Result<bool>;

    fn get(&self, id: &str) -> anyhow::Result<Option<T>> {
        Ok(self.list()?.into_iter().find(|e| e.key() == id))
    }

    fn put(&mut self, entity: &T) -> anyhow::Result<()> {
        self.put_many(std::slice::from_ref(entity))
    }

    fn len(&self) -> anyhow::Result<usize> {
        Ok(self.list()?.len())
    }

    fn list_where(&self, keep: &dyn Fn(&T) -> bool) -> anyhow::Result<Vec<T>> {
        Ok(self.list()?.into_iter().filter(|e| keep(e)).collect())
    }
}

/// Persisted monotonic counters, one per collection.
pub trait CounterStore {
    fn get(&self, name: &str) -> anyhow::Result<Option<u64>>;
    fn set(&mut self, name: &str, value: u64) -> anyhow::Result<()>;
}

fn read_document<V: DeserializeOwned>(path: &Path) -> anyhow::Result<IndexMap<String, V>> {
    if !path.is_file() {
        return Ok(IndexMap::new());
    }
    let text = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.to_string_lossy()))?;
    if text.trim().is_empty() {
        return Ok(IndexMap::new());
    }
    serde_json::from_str(&text)
        .with_context(|| format!("{} is not a valid collection document", path.to_string_lossy()))
}

/// Whole-document replacement through a sibling temp file and a rename.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> anyhow::Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create directory {}", parent.to_string_lossy()))?;
    }
    let mut tmp_name = path.as_os_str().to_owned();
    tmp_name.push(".writing");
    let tmp = PathBuf::from(tmp_name);
    {
        let mut f = File::create(&tmp)
            .with_context(|| format!("failed to create {}", tmp.to_string_lossy()))?;
        f.write_all(bytes)
            .with_context(|| format!("failed to write {}", tmp.to_string_lossy()))?;
        f.sync_all()
            .with_context(|| format!("failed to flush {}", tmp.to_string_lossy()))?;
    }
    std::fs::rename(&tmp, path).with_context(|| {
        format!(
            "failed to move {} into place at {}",
            tmp.to_string_lossy(),
            path.to_string_lossy()
        )
    })
}

fn write_document<V: Serialize>(path: &Path, doc: &IndexMap<String, V>) -> anyhow::Result<()> {
    let text = serde_json::to_string_pretty(doc)
        .with_context(|| format!("failed to serialize {}", path.to_string_lossy()))?;
    write_atomic(path, text.as_bytes())
}

/// One JSON document per collection: `{ "<id>": { ...record } }`.
pub struct JsonCollection<T> {
    path: PathBuf,
    _marker: PhantomData<T>,
}

impl<T: Record> JsonCollection<T> {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(format!("{}.json", T::COLLECTION)),
            _marker: PhantomData,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn load(&self) -> anyhow::Result<IndexMap<String, T>> {
        let mut doc: IndexMap<String, T> = read_document(&self.path)?;
        for (key, entity) in doc.iter_mut() {
            entity.adopt_key(key);
        }
        Ok(doc)
    }
}

impl<T: Record> Repository<T> for JsonCollection<T> {
    fn list(&self) -> anyhow::Result<Vec<T>> {
        Ok(self.load()?.into_values().collect())
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<T>> {
        Ok(self.load()?.swap_remove(id))
    }

    fn put_many(&mut self, entities: &[T]) -> anyhow::Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let mut doc = self.load()?;
        for e in entities {
            if e.key().is_empty() {
                return Err(anyhow!("refusing to store a {} record without a key", T::COLLECTION));
            }
            doc.insert(e.key().to_string(), e.clone());
        }
        write_document(&self.path, &doc)
    }

    fn delete(&mut self, id: &str) -> anyhow::Result<bool> {
        let mut doc = self.load()?;
        if doc.shift_remove(id).is_none() {
            return Ok(false);
        }
        write_document(&self.path, &doc)?;
        Ok(true)
    }
}

pub struct JsonCounters {
    path: PathBuf,
}

impl JsonCounters {
    pub fn new(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(format!("{COUNTERS_DOCUMENT}.json")),
        }
    }
}

impl CounterStore for JsonCounters {
    fn get(&self, name: &str) -> anyhow::Result<Option<u64>> {
        let doc: IndexMap<String, u64> = read_document(&self.path)?;
        Ok(doc.get(name).copied())
    }

    fn set(&mut self, name: &str, value: u64) -> anyhow::Result<()> {
        let mut doc: IndexMap<String, u64> = read_document(&self.path)?;
        doc.insert(name.to_string(), value);
        write_document(&self.path, &doc)
    }
}

pub fn open_sqlite(workspace: &Path) -> anyhow::Result<Connection> {
    std::fs::create_dir_all(workspace)?;
    let conn = Connection::open(workspace.join(SQLITE_FILENAME))?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS records(
            collection TEXT NOT NULL,
            id TEXT NOT NULL,
            seq INTEGER NOT NULL,
            body TEXT NOT NULL,
            PRIMARY KEY(collection, id)
        )",
        [],
    )?;
    conn.execute(
        "CREATE INDEX IF NOT EXISTS idx_records_collection_seq ON records(collection, seq)",
        [],
    )?;
    conn.execute(
        "CREATE TABLE IF NOT EXISTS counters(
            name TEXT PRIMARY KEY,
            value INTEGER NOT NULL
        )",
        [],
    )?;
    Ok(conn)
}

/// Records stored as JSON bodies in one shared `records` table.
pub struct SqliteCollection<T> {
    conn: Rc<Connection>,
    _marker: PhantomData<T>,
}

impl<T: Record> SqliteCollection<T> {
    pub fn new(conn: Rc<Connection>) -> Self {
        Self {
            conn,
            _marker: PhantomData,
        }
    }

    fn decode(id: String, body: String) -> anyhow::Result<T> {
        let mut e: T = serde_json::from_str(&body)
            .with_context(|| format!("corrupt {} record {}", T::COLLECTION, id))?;
        e.adopt_key(&id);
        Ok(e)
    }
}

impl<T: Record> Repository<T> for SqliteCollection<T> {
    fn list(&self) -> anyhow::Result<Vec<T>> {
        let mut stmt = self
            .conn
            .prepare("SELECT id, body FROM records WHERE collection = ? ORDER BY seq")?;
        let rows = stmt
            .query_map([T::COLLECTION], |r| Ok((r.get::<_, String>(0)?, r.get::<_, String>(1)?)))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter()
            .map(|(id, body)| Self::decode(id, body))
            .collect()
    }

    fn get(&self, id: &str) -> anyhow::Result<Option<T>> {
        let body: Option<String> = self
            .conn
            .query_row(
                "SELECT body FROM records WHERE collection = ? AND id = ?",
                (T::COLLECTION, id),
                |r| r.get(0),
            )
            .optional()?;
        body.map(|b| Self::decode(id.to_string(), b)).transpose()
    }

    fn put_many(&mut self, entities: &[T]) -> anyhow::Result<()> {
        if entities.is_empty() {
            return Ok(());
        }
        let tx = self.conn.unchecked_transaction()?;
        for e in entities {
            if e.key().is_empty() {
                return Err(anyhow!("refusing to store a {} record without a key", T::COLLECTION));
            }
            let body = serde_json::to_string(e)?;
            tx.execute(
                "INSERT INTO records(collection, id, seq, body)
                 VALUES(?1, ?2, (SELECT COALESCE(MAX(seq), 0) + 1 FROM records WHERE collection = ?1), ?3)
                 ON CONFLICT(collection, id) DO UPDATE SET body = excluded.body",
                (T::COLLECTION, e.key(), &body),
            )?;
        }
        tx.commit()?;
        Ok(())
    }

    fn delete(&mut self, id: &str) -> anyhow::Result<bool> {
        let n = self.conn.execute(
            "DELETE FROM records WHERE collection = ? AND id = ?",
            (T::COLLECTION, id),
        )?;
        Ok(n > 0)
    }

    fn len(&self) -> anyhow::Result<usize> {
        let n: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM records WHERE collection = ?",
            [T::COLLECTION],
            |r| r.get(0),
        )?;
        Ok(n as usize)
    }
}

pub struct SqliteCounters {
    conn: Rc<Connection>,
}

impl CounterStore for SqliteCounters {
    fn get(&self, name: &str) -> anyhow::Result<Option<u64>> {
        let v: Option<i64> = self
            .conn
            .query_row("SELECT value FROM counters WHERE name = ?", [name], |r| r.get(0))
            .optional()?;
        Ok(v.map(|n| n.max(0) as u64))
    }

    fn set(&mut self, name: &str, value: u64) -> anyhow::Result<()> {
        self.conn.execute(
            "INSERT INTO counters(name, value) VALUES(?, ?)
             ON CONFLICT(name) DO UPDATE SET value = excluded.value",
            (name, value as i64),
        )?;
        Ok(())
    }
}

/// The three collections of one workspace plus their id counters.
pub struct Store {
    pub backend: Backend,
    pub accounts: Box<dyn Repository<Account>>,
    pub faculties: Box<dyn Repository<Faculty>>,
    pub sessions: Box<dyn Repository<Session>>,
    pub counters: Box<dyn CounterStore>,
    documents: Vec<PathBuf>,
}

impl Store {
    pub fn open(workspace: &Path, cfg: &Config) -> anyhow::Result<Store> {
        match cfg.storage.backend {
            Backend::Json => {
                let data_dir = workspace.join(&cfg.storage.data_dir);
                std::fs::create_dir_all(&data_dir).with_context(|| {
                    format!("failed to create data directory {}", data_dir.to_string_lossy())
                })?;
                let accounts = JsonCollection::<Account>::new(&data_dir);
                let faculties = JsonCollection::<Faculty>::new(&data_dir);
                let sessions = JsonCollection::<Session>::new(&data_dir);
                let counters = JsonCounters::new(&data_dir);
                let documents = vec![
                    accounts.path().to_path_buf(),
                    faculties.path().to_path_buf(),
                    sessions.path().to_path_buf(),
                    counters.path.clone(),
                ];
                Ok(Store {
                    backend: Backend::Json,
                    accounts: Box::new(accounts),
                    faculties: Box::new(faculties),
                    sessions: Box::new(sessions),
                    counters: Box::new(counters),
                    documents,
                })
            }
            Backend::Sqlite => {
                let conn = Rc::new(open_sqlite(workspace).with_context(|| {
                    format!("failed to open database in {}", workspace.to_string_lossy())
                })?);
                Ok(Store {
                    backend: Backend::Sqlite,
                    accounts: Box::new(SqliteCollection::<Account>::new(conn.clone())),
                    faculties: Box::new(SqliteCollection::<Faculty>::new(conn.clone())),
                    sessions: Box::new(SqliteCollection::<Session>::new(conn.clone())),
                    counters: Box::new(SqliteCounters { conn }),
                    documents: vec![workspace.join(SQLITE_FILENAME)],
                })
            }
        }
    }

    /// Files that hold this store's state, for backups.
    pub fn document_paths(&self) -> &[PathBuf] {
        &self.documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Feedback, Gender};
    use chrono::NaiveDate;

    fn faculty(id: &str, name: &str) -> Faculty {
        Faculty {
            id: id.to_string(),
            name: name.to_string(),
            gender: Gender::Female,
            email: "x@y.z".to_string(),
            designation: "Professor".to_string(),
            batch: String::new(),
            biodata: String::new(),
            created_by: "admin".to_string(),
            created_at: String::new(),
        }
    }

    fn session(id: &str) -> Session {
        Session {
            id: id.to_string(),
            date: NaiveDate::from_ymd_opt(2024, 1, 2).expect("date"),
            duration: 1.5,
            faculty_name: "A".to_string(),
            session_name: "Topic".to_string(),
            batch: "B1".to_string(),
            honorarium_paid: 100.0,
            feedback: Feedback::default(),
            created_by: "admin".to_string(),
            created_at: String::new(),
            imported: false,
        }
    }

    fn exercise(repo: &mut dyn Repository<Faculty>) {
        assert_eq!(repo.len().expect("len"), 0);
        assert!(repo.get("FAC0001").expect("get").is_none());

        repo.put(&faculty("FAC0001", "A")).expect("put");
        repo.put_many(&[faculty("FAC0002", "B"), faculty("FAC0003", "C")])
            .expect("put many");
        repo.put(&faculty("FAC0001", "A renamed")).expect("update");

        let names: Vec<String> = repo.list().expect("list").into_iter().map(|f| f.name).collect();
        assert_eq!(names, vec!["A renamed", "B", "C"]);

        assert!(repo.delete("FAC0002").expect("delete"));
        assert!(!repo.delete("FAC0002").expect("delete again"));
        assert_eq!(repo.len().expect("len"), 2);
        assert_eq!(
            repo.get("FAC0003").expect("get").map(|f| f.name),
            Some("C".to_string())
        );
        let only_a = repo
            .list_where(&|f: &Faculty| f.name.starts_with('A'))
            .expect("list where");
        assert_eq!(only_a.len(), 1);
    }

    #[test]
    fn json_collection_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut repo = JsonCollection::<Faculty>::new(dir.path());
        exercise(&mut repo);
        assert!(dir.path().join("faculties.json").is_file());
        assert!(!dir.path().join("faculties.json.writing").exists());
    }

    #[test]
    fn sqlite_collection_contract() {
        let dir = tempfile::tempdir().expect("tempdir");
        let conn = Rc::new(open_sqlite(dir.path()).expect("open"));
        let mut repo = SqliteCollection::<Faculty>::new(conn);
        exercise(&mut repo);
    }

    #[test]
    fn json_documents_keyed_by_map_key_only_are_accepted() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(
            dir.path().join("users.json"),
            r#"{ "admin": { "password": "x", "is_admin": true, "email": "a@b.c", "full_name": "Admin" } }"#,
        )
        .expect("write");
        let repo = JsonCollection::<Account>::new(dir.path());
        let admin = repo.get("admin").expect("get").expect("present");
        assert_eq!(admin.username, "admin");
        assert!(admin.is_admin);
        assert_eq!(admin.created_by, "");
    }

    #[test]
    fn sessions_roundtrip_through_both_backends() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut json_repo = JsonCollection::<Session>::new(dir.path());
        json_repo.put(&session("SES0001")).expect("put");
        assert_eq!(json_repo.get("SES0001").expect("get"), Some(session("SES0001")));

        let conn = Rc::new(open_sqlite(dir.path()).expect("open"));
        let mut sql_repo = SqliteCollection::<Session>::new(conn);
        sql_repo.put(&session("SES0001")).expect("put");
        assert_eq!(sql_repo.get("SES0001").expect("get"), Some(session("SES0001")));
    }

    #[test]
    fn counters_persist() {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut c = JsonCounters::new(dir.path());
        assert_eq!(c.get("sessions").expect("get"), None);
        c.set("sessions", 7).expect("set");
        assert_eq!(JsonCounters::new(dir.path()).get("sessions").expect("get"), Some(7));

        let conn = Rc::new(open_sqlite(dir.path()).expect("open"));
        let mut s = SqliteCounters { conn };
        s.set("faculties", 3).expect("set");
        s.set("faculties", 4).expect("set");
        assert_eq!(s.get("faculties").expect("get"), Some(4));
    }

    #[test]
    fn corrupt_document_is_an_error_not_a_reset() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::write(dir.path().join("sessions.json"), "{ not json").expect("write");
        let repo = JsonCollection::<Session>::new(dir.path());
        let e = repo.list().expect_err("must fail");
        assert!(format!("{e:#}").contains("sessions.json"));
    }
}
