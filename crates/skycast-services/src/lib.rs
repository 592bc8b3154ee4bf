pub mod journal;
pub mod llm;
pub mod predictor;
pub mod retry;
pub mod store;

pub use journal::{JournalClient, RunJournal, RunOutcome, RunPhase, RunRecord, TriggerKind};
pub use llm::LlmClient;
pub use predictor::Predictor;
pub use retry::RetryConfig;
pub use store::{MemoryStore, MongoStore, WeatherStore};
