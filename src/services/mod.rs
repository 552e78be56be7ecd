pub mod adjudicator;
pub mod consensus;
pub mod debug_writer;
pub mod file_lister;
pub mod git_digest;
pub mod lm_client;
pub mod merger;
pub mod structure;
pub mod tier_cache;
pub mod worker_pool;

pub use consensus::ConsensusController;
pub use lm_client::{ChatCompletion, ChatMessage, CompletionOptions, LmClient};
pub use tier_cache::TierCache;
