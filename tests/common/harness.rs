//! Test harness for isolated pipeline execution.

#![allow(dead_code)]

use std::sync::Arc;

use serde_json::Value;

use orderflow::catalog::{CatalogSku, Customer, InMemoryCatalog};
use orderflow::db::document_repo::DocumentRow;
use orderflow::db::Database;
use orderflow::embedding::InMemoryIndex;
use orderflow::error::LlmError;
use orderflow::intake::{register, IntakeItem};
use orderflow::llm::FixtureModel;
use orderflow::matcher::MatchConfig;
use orderflow::pipeline::PipelineConfig;
use orderflow::worker::{Job, JobResult, WorkerDeps, WorkerPool};

pub const ORG: &str = "org-1";

/// Isolated environment: in-memory database, in-memory catalog and
/// embedding index, and a single-worker pool driven by a fixture model.
pub struct TestHarness {
    pub db: Database,
    pub catalog: Arc<InMemoryCatalog>,
    pub index: Arc<InMemoryIndex>,
    pub matching: MatchConfig,
}

impl TestHarness {
    pub fn new() -> Self {
        Self {
            db: Database::open_in_memory().expect("in-memory database"),
            catalog: Arc::new(InMemoryCatalog::new()),
            index: Arc::new(InMemoryIndex::new()),
            matching: MatchConfig::default(),
        }
    }

    pub fn seed_sku(&self, sku: &str, description: &str) {
        self.catalog.add_sku(CatalogSku {
            org_id: ORG.to_string(),
            sku: sku.to_string(),
            description: description.to_string(),
        });
    }

    pub fn seed_customer(&self, id: &str, name: &str, email: Option<&str>) {
        self.catalog.add_customer(Customer {
            id: id.to_string(),
            org_id: ORG.to_string(),
            name: name.to_string(),
            email: email.map(str::to_string),
            erp_number: None,
            address: None,
        });
    }

    fn pipeline_config(&self) -> Arc<PipelineConfig> {
        Arc::new(PipelineConfig {
            org_id: ORG.to_string(),
            extraction: Default::default(),
            matching: self.matching.clone(),
            detection: Default::default(),
        })
    }

    fn pool_with_model(&self, model: FixtureModel) -> WorkerPool {
        let index: Arc<dyn orderflow::embedding::EmbeddingIndex> = self.index.clone();
        let deps = WorkerDeps {
            db: self.db.clone(),
            model: Arc::new(model),
            catalog: self.catalog.clone(),
            index: Some(index),
            broadcaster: None,
        };
        WorkerPool::new(self.pipeline_config(), deps, 1)
    }

    /// Registers bytes as a document and runs them through a one-worker
    /// pool whose model returns `payload`.
    pub fn process(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
        payload: Value,
    ) -> (DocumentRow, JobResult) {
        self.process_with_model(file_name, mime_type, bytes, FixtureModel::new(payload))
    }

    pub fn process_failing(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
        make_error: fn() -> LlmError,
    ) -> (DocumentRow, JobResult) {
        self.process_with_model(file_name, mime_type, bytes, FixtureModel::failing(make_error))
    }

    fn process_with_model(
        &self,
        file_name: &str,
        mime_type: &str,
        bytes: &[u8],
        model: FixtureModel,
    ) -> (DocumentRow, JobResult) {
        let item = IntakeItem {
            file_name: file_name.to_string(),
            mime_type: mime_type.to_string(),
            bytes: bytes.to_vec(),
            mail: None,
        };
        let (doc, duplicate) = register(&self.db, ORG, "upload", &item).expect("register");
        assert!(!duplicate, "fixture document registered twice");

        let pool = self.pool_with_model(model);
        pool.submit(Job::from_intake(&item, &doc)).expect("submit");
        let result = pool.recv_result().expect("worker result");
        pool.shutdown();
        pool.wait();

        (doc, result)
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}
