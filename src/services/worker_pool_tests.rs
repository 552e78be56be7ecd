use super::*;
use crate::services::lm_client::CompletionOptions;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use std::sync::atomic::{AtomicUsize, Ordering};

struct ScriptedClient {
    replies: Mutex<std::collections::VecDeque<Result<String, ConsensusError>>>,
    calls: AtomicUsize,
}

impl ScriptedClient {
    fn new(replies: Vec<Result<String, ConsensusError>>) -> Self {
        Self {
            replies: Mutex::new(replies.into_iter().collect()),
            calls: AtomicUsize::new(0),
        }
    }

    fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl ChatCompletion for ScriptedClient {
    async fn complete(
        &self,
        _messages: &[ChatMessage],
        _options: &CompletionOptions,
    ) -> Result<String, ConsensusError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.replies
            .lock()
            .pop_front()
            .unwrap_or(Err(ConsensusError::EmptyResponse))
    }
}

fn task<'a>(paths: &'a [String], focus: &'a str) -> WorkerTask<'a> {
    WorkerTask {
        index: 0,
        focus,
        structure_summary: "Top directories:\n  src: 2 files\n",
        paths,
        take_top: 5,
        nl_mode: false,
        word_limit: 200,
        retries: 1,
        options: CompletionOptions::default(),
    }
}

fn tracked(paths: &[String]) -> HashSet<String> {
    paths.iter().cloned().collect()
}

// --- JSON array extraction ---

#[test]
fn extracts_bare_array() {
    let raw = r#"[{"path":"a.rs","importance":5}]"#;
    assert_eq!(extract_json_array(raw).unwrap(), raw);
}

#[test]
fn extracts_array_from_prose_and_fences() {
    let raw = "Sure! Here are the rankings:\n```json\n[{\"path\":\"a.rs\"}]\n```\nHope that helps.";
    assert_eq!(extract_json_array(raw).unwrap(), r#"[{"path":"a.rs"}]"#);
}

#[test]
fn extraction_balances_nested_arrays() {
    let raw = r#"noise [[1,2],[3,4]] trailing"#;
    assert_eq!(extract_json_array(raw).unwrap(), "[[1,2],[3,4]]");
}

#[test]
fn extraction_ignores_brackets_inside_strings() {
    let raw = r#"[{"path":"src/a[0].rs","reason":"weird ] name"}]"#;
    assert_eq!(extract_json_array(raw).unwrap(), raw);
}

#[test]
fn extraction_fails_without_array() {
    assert!(extract_json_array("no json here").is_err());
    assert!(extract_json_array("[{\"path\":\"a\"").is_err());
}

// --- Worker output parsing ---

#[test]
fn parse_normalizes_entries() {
    let raw = format!(
        r#"[
            {{"path":"src/main.rs","importance":15,"reason":"{}","category":"ENTRY"}},
            {{"path":"src/lib.rs","importance":0.2,"reason":"core","category":"mystery"}},
            {{"path":"src/main.rs","importance":9,"reason":"dupe","category":"entry"}}
        ]"#,
        "long ".repeat(40)
    );
    let rankings = parse_worker_rankings(&raw, 10).unwrap();
    assert_eq!(rankings.len(), 2);
    assert_eq!(rankings[0].path, "src/main.rs");
    assert_eq!(rankings[0].importance, 10.0);
    assert!(rankings[0].reason.chars().count() <= 120);
    assert_eq!(rankings[0].category, crate::models::ranking::FileCategory::Entry);
    assert_eq!(rankings[1].importance, 1.0);
    assert_eq!(rankings[1].category, crate::models::ranking::FileCategory::Other);
}

#[test]
fn parse_respects_take_top() {
    let raw = r#"[
        {"path":"a.rs","importance":9},
        {"path":"b.rs","importance":8},
        {"path":"c.rs","importance":7}
    ]"#;
    let rankings = parse_worker_rankings(raw, 2).unwrap();
    assert_eq!(rankings.len(), 2);
}

#[test]
fn parse_rejects_non_array_payload() {
    assert!(parse_worker_rankings(r#"{"path":"a.rs"}"#, 5).is_err());
    assert!(parse_worker_rankings("[1, 2, 3]", 5).is_err());
}

// --- Prompt construction ---

#[test]
fn ranking_prompt_carries_contract_and_focus() {
    let paths = vec!["src/main.rs".to_string(), "README.md".to_string()];
    let t = task(&paths, "entry/init");
    let messages = build_ranking_prompt(&t);
    assert_eq!(messages[0].role, "system");
    assert!(messages[0].content.contains("valid JSON only"));
    let user = &messages[1].content;
    assert!(user.contains("Focus: entry/init"));
    assert!(user.contains("at most 5 objects"));
    assert!(user.contains("10: application entrypoint"));
    assert!(user.contains("src/main.rs\nREADME.md"));
    assert!(user.contains("Top directories:"));
}

#[test]
fn summary_prompt_carries_word_limit() {
    let paths = vec!["src/main.rs".to_string()];
    let mut t = task(&paths, "core/domain");
    t.nl_mode = true;
    t.word_limit = 150;
    let messages = build_summary_prompt(&t);
    assert!(messages[0].content.contains("plain prose"));
    assert!(messages[1].content.contains("at most 150 words"));
    assert!(messages[1].content.contains("Focus: core/domain"));
}

// --- Worker runs ---

#[tokio::test]
async fn worker_succeeds_first_attempt() {
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![Ok(
        r#"[{"path":"src/main.rs","importance":10,"reason":"entry","category":"entry"}]"#
            .to_string(),
    )]);
    let t = task(&paths, "entry/init");
    let out = run_worker(
        &client,
        &t,
        &tracked(&paths),
        &CancellationToken::new(),
        &DebugWriter::disabled(),
    )
    .await
    .unwrap();
    assert!(!out.failed());
    assert_eq!(out.rankings.len(), 1);
    assert_eq!(client.calls(), 1);
}

#[tokio::test]
async fn worker_retries_once_after_garbled_reply() {
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![
        Ok("I cannot rank these files.".to_string()),
        Ok(r#"[{"path":"src/main.rs","importance":8,"reason":"r","category":"core"}]"#.to_string()),
    ]);
    let t = task(&paths, "core/domain");
    let out = run_worker(
        &client,
        &t,
        &tracked(&paths),
        &CancellationToken::new(),
        &DebugWriter::disabled(),
    )
    .await
    .unwrap();
    assert!(!out.failed());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn worker_reports_failure_after_exhausted_retries() {
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![
        Err(ConsensusError::Timeout { elapsed_ms: 10 }),
        Ok("still not json".to_string()),
    ]);
    let t = task(&paths, "core/domain");
    let out = run_worker(
        &client,
        &t,
        &tracked(&paths),
        &CancellationToken::new(),
        &DebugWriter::disabled(),
    )
    .await
    .unwrap();
    assert!(out.failed());
    assert!(out.rankings.is_empty());
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn worker_drops_untracked_paths_after_parse() {
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![Ok(r#"[
        {"path":"src/main.rs","importance":9,"reason":"r","category":"core"},
        {"path":"invented/ghost.rs","importance":8,"reason":"r","category":"core"}
    ]"#
    .to_string())]);
    let t = task(&paths, "core/domain");
    let out = run_worker(
        &client,
        &t,
        &tracked(&paths),
        &CancellationToken::new(),
        &DebugWriter::disabled(),
    )
    .await
    .unwrap();
    assert_eq!(out.rankings.len(), 1);
    assert_eq!(out.rankings[0].path, "src/main.rs");
}

#[tokio::test]
async fn nl_worker_treats_empty_reply_as_failure() {
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![
        Ok("   ".to_string()),
        Ok("A small CLI project centered on src/main.rs.".to_string()),
    ]);
    let mut t = task(&paths, "core/domain");
    t.nl_mode = true;
    let out = run_worker(
        &client,
        &t,
        &tracked(&paths),
        &CancellationToken::new(),
        &DebugWriter::disabled(),
    )
    .await
    .unwrap();
    assert!(!out.failed());
    assert_eq!(
        out.summary.as_deref(),
        Some("A small CLI project centered on src/main.rs.")
    );
    assert_eq!(client.calls(), 2);
}

#[tokio::test]
async fn cancelled_token_stops_the_worker_immediately() {
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![Ok("[]".to_string())]);
    let cancel = CancellationToken::new();
    cancel.cancel();
    let t = task(&paths, "core/domain");
    let err = run_worker(
        &client,
        &t,
        &tracked(&paths),
        &cancel,
        &DebugWriter::disabled(),
    )
    .await
    .unwrap_err();
    assert!(err.is_cancellation());
    assert_eq!(client.calls(), 0);
}

#[tokio::test]
async fn debug_bundle_keeps_attempt_keyed_artifacts() {
    let dir = tempfile::TempDir::new().unwrap();
    let writer = DebugWriter::new(dir.path(), true);
    let paths = vec!["src/main.rs".to_string()];
    let client = ScriptedClient::new(vec![
        Ok("garbage".to_string()),
        Ok(r#"[{"path":"src/main.rs","importance":8,"reason":"r","category":"core"}]"#.to_string()),
    ]);
    let t = task(&paths, "core/domain");
    run_worker(&client, &t, &tracked(&paths), &CancellationToken::new(), &writer)
        .await
        .unwrap();

    let bundle = writer.dir().unwrap();
    assert!(bundle.join("worker_0_attempt_1_prompt.txt").exists());
    assert!(bundle.join("worker_0_attempt_1_error.txt").exists());
    assert!(bundle.join("worker_0_attempt_2_raw.txt").exists());
    assert!(bundle.join("worker_0_rankings.json").exists());
    // Legacy un-keyed artifact names are gone.
    assert!(!bundle.join("worker_0_prompt.txt").exists());
    assert!(!bundle.join("worker_0_raw.txt").exists());
}
