#![allow(dead_code)]

use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePoolOptions};
use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};

use querai::db::{DataSourceDescriptor, DataSourceKind, RelationalConnectionParams};
use querai::embedding::{Embedder, EmbeddingError};
use querai::llm::{IntentClassifier, LlmError, QueryIntentResult};

const BUCKETS: usize = 32;

/// Bag-of-words embedder: each lowercase word lands in a fixed bucket.
pub struct HashEmbedder;

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_name(&self) -> &str {
        "hash-bow"
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        Ok(texts.iter().map(|t| bag_of_words(t)).collect())
    }
}

fn bag_of_words(text: &str) -> Vec<f32> {
    let mut vector = vec![0.0; BUCKETS];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let bucket = word
            .to_lowercase()
            .bytes()
            .fold(7usize, |h, b| h.wrapping_mul(31).wrapping_add(b as usize))
            % BUCKETS;
        vector[bucket] += 1.0;
    }
    vector
}

/// Returns one canned reply and records what it was asked.
pub struct ScriptedLlm {
    reply: QueryIntentResult,
    calls: AtomicUsize,
    last_schema: Mutex<Option<String>>,
}

impl ScriptedLlm {
    pub fn new(reply: QueryIntentResult) -> Self {
        Self {
            reply,
            calls: AtomicUsize::new(0),
            last_schema: Mutex::new(None),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    pub fn last_schema(&self) -> Option<String> {
        self.last_schema.lock().unwrap().clone()
    }
}

#[async_trait]
impl IntentClassifier for ScriptedLlm {
    async fn classify_and_generate(
        &self,
        _question: &str,
        schema: &str,
    ) -> Result<QueryIntentResult, LlmError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        *self.last_schema.lock().unwrap() = Some(schema.to_string());
        Ok(self.reply.clone())
    }
}

/// Creates a small shop database at `path`.
pub async fn create_shop_db(path: &Path) {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap();

    for statement in [
        "CREATE TABLE customers (id INTEGER PRIMARY KEY, name TEXT NOT NULL, email TEXT)",
        "CREATE TABLE orders (id INTEGER PRIMARY KEY, customer_id INTEGER, amount REAL, placed_on TEXT)",
        "INSERT INTO customers VALUES (1, 'Ada', 'ada@example.com'), (2, 'Grace', NULL)",
        "INSERT INTO orders VALUES (1, 1, 12.5, '2024-01-03'), (2, 1, 30.0, '2024-02-11'), (3, 2, 7.25, '2024-02-12')",
    ] {
        sqlx::query(statement).execute(&pool).await.unwrap();
    }
    pool.close().await;
}

pub fn sqlite_descriptor(path: &Path) -> DataSourceDescriptor {
    DataSourceDescriptor::relational(
        DataSourceKind::Sqlite,
        RelationalConnectionParams {
            database: Some(path.to_string_lossy().into_owned()),
            ..Default::default()
        },
    )
}
