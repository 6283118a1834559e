use super::*;
use tokio::sync::mpsc;

#[test]
fn progress_is_clamped() {
    let progress = IndexingProgress::new(IndexingPhase::Saving, 250, "saving");
    assert_eq!(progress.progress, 100);
    assert_eq!(progress.message, "saving");
}

#[test]
fn terminal_phases() {
    assert!(IndexingPhase::Completed.is_terminal());
    assert!(IndexingPhase::Error.is_terminal());
    assert!(!IndexingPhase::Starting.is_terminal());
    assert!(!IndexingPhase::Embedding.is_terminal());
}

#[test]
fn phase_display_and_serde() {
    assert_eq!(IndexingPhase::Chunking.to_string(), "Chunking");
    let json = serde_json::to_string(&IndexingPhase::Embedding).expect("can serialize json");
    assert_eq!(json, "\"embedding\"");
}

#[tokio::test]
async fn channel_observer_forwards_reports() {
    let (tx, mut rx) = mpsc::unbounded_channel();

    tx.notify(IndexingProgress::new(IndexingPhase::Starting, 0, "go"));
    tx.notify(IndexingProgress::new(IndexingPhase::Completed, 100, "done"));
    drop(tx);

    let mut phases = Vec::new();
    while let Some(progress) = rx.recv().await {
        phases.push(progress.phase);
    }
    assert_eq!(
        phases,
        vec![IndexingPhase::Starting, IndexingPhase::Completed]
    );
}

#[test]
fn closed_channel_is_ignored() {
    let (tx, rx) = mpsc::unbounded_channel::<IndexingProgress>();
    drop(rx);
    tx.notify(IndexingProgress::new(IndexingPhase::Error, 100, "late"));
}

#[test]
fn noop_observer_accepts_reports() {
    NoopObserver.notify(IndexingProgress::new(IndexingPhase::Chunking, 10, "x"));
}
