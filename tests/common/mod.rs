#![allow(dead_code)]

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use quarry::db::connect_in_memory;
use quarry::import::{formats::builtin_registry, EngineOptions, ImportEngine, ImportHooks, NoHooks, Upload};
use quarry::jobs::JobRecord;
use quarry::schema::Schema;
use sqlx::SqlitePool;
use tempfile::TempDir;

pub struct Harness {
    pub engine: ImportEngine,
    pub pool: SqlitePool,
    pub dir: TempDir,
}

impl Harness {
    pub async fn new() -> Self {
        Self::with_hooks(|_| Arc::new(NoHooks)).await
    }

    pub async fn with_hooks(make: impl FnOnce(SqlitePool) -> Arc<dyn ImportHooks>) -> Self {
        let pool = connect_in_memory().await.unwrap();
        let engine = ImportEngine::new(
            pool.clone(),
            builtin_registry(),
            Schema::pieces(),
            make(pool.clone()),
            EngineOptions {
                cancel_poll_interval: Duration::from_millis(10),
            },
        );
        Self {
            engine,
            pool,
            dir: tempfile::tempdir().unwrap(),
        }
    }

    pub fn write(&self, name: &str, contents: impl AsRef<[u8]>) -> Upload {
        let path: PathBuf = self.dir.path().join(name);
        std::fs::write(&path, contents).unwrap();
        Upload {
            file_name: name.to_string(),
            path,
            remove_when_done: false,
        }
    }

    /// Imports `contents` as `name` and waits for the job to end.
    pub async fn import(&self, name: &str, contents: impl AsRef<[u8]>) -> JobRecord {
        let upload = self.write(name, contents);
        let handle = self.engine.submit(upload).await.unwrap();
        let id = handle.id;
        handle.wait().await.unwrap();
        self.engine.jobs().find(&id).await.unwrap().unwrap()
    }
}

pub fn pad(i: usize) -> String {
    format!("{:05}", i)
}

/// `rows` products with unique titles and slugs, as CSV.
pub fn products_csv(rows: usize) -> String {
    let mut csv = String::from("title,slug\n");
    for i in 0..rows {
        csv.push_str(&format!("Cheese #{},cheese-{}\n", pad(i), pad(i)));
    }
    csv
}

/// Retitles products `0..rows`, keyed on slug.
pub fn retitle_csv(rows: usize) -> String {
    let mut csv = String::from("slug:key,title\n");
    for i in 0..rows {
        csv.push_str(&format!("cheese-{},Updated Cheese #{}\n", pad(i), pad(i)));
    }
    csv
}
