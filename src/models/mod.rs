pub mod config;
pub mod error;
pub mod ranking;

pub use config::QuickConfig;
pub use error::ConsensusError;
pub use ranking::{
    Analysis, ConsensusResult, FileCategory, FileRanking, Progress, ProgressSink, Tier,
    WorkerOutput,
};
