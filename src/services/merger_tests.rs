use super::*;
use crate::models::ranking::{FileCategory, FileRanking, WorkerOutput};
use pretty_assertions::assert_eq;

fn ranking(path: &str, importance: f64, reason: &str, category: FileCategory) -> FileRanking {
    FileRanking {
        path: path.to_string(),
        importance,
        reason: reason.to_string(),
        category,
        vote_count: 1,
    }
}

fn output(index: usize, rankings: Vec<FileRanking>) -> WorkerOutput {
    WorkerOutput {
        index,
        focus: "core/domain".to_string(),
        rankings,
        summary: None,
        error: None,
    }
}

#[test]
fn merged_importance_is_the_unweighted_mean() {
    let outputs = vec![
        output(0, vec![ranking("src/main.rs", 6.0, "r0", FileCategory::Entry)]),
        output(1, vec![ranking("src/main.rs", 7.0, "r1", FileCategory::Entry)]),
        output(2, vec![ranking("src/main.rs", 8.0, "r2", FileCategory::Entry)]),
    ];
    let merged = merge_worker_rankings(&outputs, 20);
    assert_eq!(merged.len(), 1);
    assert!((merged[0].importance - 7.0).abs() < 1e-9);
    assert_eq!(merged[0].vote_count, 3);
}

#[test]
fn reason_follows_the_strongest_voter() {
    let outputs = vec![
        output(0, vec![ranking("a.rs", 5.0, "weak", FileCategory::Core)]),
        output(1, vec![ranking("a.rs", 9.0, "strong", FileCategory::Core)]),
    ];
    let merged = merge_worker_rankings(&outputs, 20);
    assert_eq!(merged[0].reason, "strong");

    // A blank reason never replaces, even at higher importance.
    let outputs = vec![
        output(0, vec![ranking("a.rs", 5.0, "kept", FileCategory::Core)]),
        output(1, vec![ranking("a.rs", 9.0, "   ", FileCategory::Core)]),
    ];
    let merged = merge_worker_rankings(&outputs, 20);
    assert_eq!(merged[0].reason, "kept");
}

#[test]
fn category_upgrades_from_other_only() {
    let outputs = vec![
        output(0, vec![ranking("a.rs", 5.0, "r", FileCategory::Other)]),
        output(1, vec![ranking("a.rs", 6.0, "r", FileCategory::Core)]),
        output(2, vec![ranking("a.rs", 7.0, "r", FileCategory::Test)]),
    ];
    let merged = merge_worker_rankings(&outputs, 20);
    // Upgraded once from other, then pinned.
    assert_eq!(merged[0].category, FileCategory::Core);
}

#[test]
fn per_worker_top_limits_each_list() {
    let list = vec![
        ranking("low.rs", 2.0, "r", FileCategory::Util),
        ranking("high.rs", 9.0, "r", FileCategory::Core),
        ranking("mid.rs", 5.0, "r", FileCategory::Util),
    ];
    let merged = merge_worker_rankings(&[output(0, list)], 2);
    let paths: Vec<&str> = merged.iter().map(|r| r.path.as_str()).collect();
    // Top 2 by importance survive.
    assert!(paths.contains(&"high.rs"));
    assert!(paths.contains(&"mid.rs"));
    assert!(!paths.contains(&"low.rs"));
}

#[test]
fn empty_worker_lists_are_skipped() {
    let outputs = vec![
        output(0, vec![]),
        output(1, vec![ranking("a.rs", 5.0, "r", FileCategory::Core)]),
    ];
    let merged = merge_worker_rankings(&outputs, 20);
    assert_eq!(merged.len(), 1);
    assert_eq!(merged[0].vote_count, 1);
}

#[test]
fn crowd_ordering_is_votes_then_importance_then_path() {
    let outputs = vec![
        output(
            0,
            vec![
                ranking("solo_high.rs", 9.9, "r", FileCategory::Core),
                ranking("b_shared.rs", 5.0, "r", FileCategory::Core),
                ranking("a_shared.rs", 5.0, "r", FileCategory::Core),
            ],
        ),
        output(
            1,
            vec![
                ranking("b_shared.rs", 5.0, "r", FileCategory::Core),
                ranking("a_shared.rs", 5.0, "r", FileCategory::Core),
            ],
        ),
    ];
    let merged = merge_worker_rankings(&outputs, 20);
    let paths: Vec<&str> = merged.iter().map(|r| r.path.as_str()).collect();
    assert_eq!(paths, vec!["a_shared.rs", "b_shared.rs", "solo_high.rs"]);
}

#[test]
fn crowd_lines_are_capped_and_bounded() {
    let outputs: Vec<WorkerOutput> = (0..4)
        .map(|w| {
            output(
                w,
                (0..50)
                    .map(|i| {
                        ranking(
                            &format!("dir{w}/file{i}.rs"),
                            5.0,
                            &"r".repeat(119),
                            FileCategory::Util,
                        )
                    })
                    .collect(),
            )
        })
        .collect();
    let merged = merge_worker_rankings(&outputs, 50);
    let lines = render_crowd_lines(&merged);
    assert!(lines.lines().count() <= 150);
    for line in lines.lines() {
        assert!(line.chars().count() <= 200);
        assert!(line.contains("votes:"));
        assert!(line.contains("imp:"));
    }
}
