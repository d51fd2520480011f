pub mod broadcast;
pub mod catalog;
pub mod config;
pub mod db;
pub mod detector;
pub mod embedding;
pub mod error;
pub mod export;
pub mod extractor;
pub mod fingerprint;
pub mod intake;
pub mod llm;
pub mod logging;
pub mod matcher;
pub mod model;
pub mod pipeline;
pub mod uom;
pub mod validator;
pub mod worker;

pub use broadcast::{RunPhase, RunProgressBroadcaster, RunProgressEvent};
pub use catalog::{CatalogReader, CatalogSku, Customer, InMemoryCatalog};
pub use config::{load_config, Config};
pub use detector::{CustomerDetector, CustomerScore, IdentitySignals};
pub use embedding::{EmbeddingHit, EmbeddingIndex, InMemoryIndex};
pub use error::{
    ConfigError, ExportError, ExtractError, IntakeError, LlmError, MatchError, OrderflowError,
    Result, ValidateError, WorkerError,
};
pub use extractor::{CanonicalContent, Extractor, ExtractorRegistry};
pub use llm::{FixtureModel, ModelReply, ModelRequest, ModelUsage, OrderModel};
pub use matcher::{MatchConfig, MatchEngine, MappingStore, SkuMatch};
pub use pipeline::{Pipeline, PipelineConfig, PipelineContext};
pub use validator::{ExtractionOutput, OrderHeader, OrderLine, ValidationWarning};
