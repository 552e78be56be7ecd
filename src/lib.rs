//! Loco - local LM ensemble-consensus repository analyzer.
//!
//! Loco ranks the files that matter for understanding a repository without
//! reading their contents: a crowd of small language-model workers scores
//! file paths in parallel, a vote-weighted merge folds their answers, and a
//! second adjudication pass collapses the crowd into a final ranking or a
//! templated project summary. Everything runs against an OpenAI-compatible
//! endpoint on the local host.

pub mod cli;
pub mod models;
pub mod services;
