pub mod context;
pub mod error;
pub mod library;
pub mod naming;
pub mod packaging;
pub mod phases;

pub use context::{
    ChatContext, ChatMessage, ChatReply, ChatRole, ChatRequest, ContextAssembler, GeneratedDocument,
    GenerationContext, GenerationStatus, Suggestion, SuggestionPriority, SuggestionSet,
};
pub use error::EngineError;
pub use library::AssetLibrary;
pub use packaging::{PackagePreview, PackageSummary, PackagingConfig, PackagingEngine, PhasePreview};
pub use phases::{PhaseCompletion, ProgressReport, SessionService};
