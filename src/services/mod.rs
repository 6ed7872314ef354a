pub mod artifacts;
pub mod distributor;
pub mod membership;
pub mod messages;
pub mod orchestrator;
pub mod resolver;
pub mod translator;

pub use artifacts::{ArtifactStore, InsertResult, MemoryArtifactStore, PgArtifactStore};
pub use distributor::Distributor;
pub use membership::{ParticipantDirectory, PgParticipantDirectory, StaticParticipantDirectory};
pub use messages::MessageService;
pub use orchestrator::TranslationOrchestrator;
pub use resolver::LanguageResolver;
pub use translator::{HttpTranslationClient, TranslationBackend};
