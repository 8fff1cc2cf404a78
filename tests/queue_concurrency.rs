//! Concurrency behavior of the draft registry.

use push_helper::queue::PushQueue;
use std::sync::Arc;
use teloxide::types::MessageId;

#[tokio::test]
async fn concurrent_ensure_creates_one_draft() {
    let queue = Arc::new(PushQueue::new());
    let id = MessageId(42);

    let tasks: Vec<_> = (0..16)
        .map(|n| {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.ensure(id, || format!("https://u/{n}")).await })
        })
        .collect();

    let mut created = 0;
    for task in tasks {
        if task.await.expect("task completes") {
            created += 1;
        }
    }

    assert_eq!(created, 1);
    assert_eq!(queue.len().await, 1);
    // Everyone observes the single winner's draft.
    let draft = queue.get(id).await.expect("draft queued");
    assert!(draft.source_url.starts_with("https://u/"));
}

#[tokio::test]
async fn drain_races_with_inserts_without_losing_entries() {
    let queue = Arc::new(PushQueue::new());
    for n in 0..50 {
        queue.ensure(MessageId(n), || format!("https://u/{n}")).await;
    }

    let inserter = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move {
            for n in 50..100 {
                queue.ensure(MessageId(n), || format!("https://u/{n}")).await;
                tokio::task::yield_now().await;
            }
        })
    };
    let drainer = {
        let queue = Arc::clone(&queue);
        tokio::spawn(async move { queue.snapshot_and_clear().await })
    };

    let drained = drainer.await.expect("drain completes");
    inserter.await.expect("inserts complete");

    // Every entry landed exactly once: in the drained map or the queue.
    let remaining = queue.snapshot().await;
    assert_eq!(drained.len() + remaining.len(), 100);
    for n in 0..100 {
        let id = MessageId(n);
        let in_drained = drained.contains_key(&id);
        let in_queue = remaining.iter().any(|(rid, _)| *rid == id);
        assert!(in_drained ^ in_queue, "message {n} lost or duplicated");
    }
}

#[tokio::test]
async fn toggle_twice_restores_the_draft() {
    let queue = PushQueue::new();
    let id = MessageId(7);
    queue.ensure(id, || "https://u".to_string()).await;

    assert_eq!(queue.toggle_tag(id, 2).await, Some(true));
    assert_eq!(queue.toggle_tag(id, 2).await, Some(false));
    assert_eq!(queue.toggle_target(id, 0).await, Some(true));
    assert_eq!(queue.toggle_target(id, 0).await, Some(false));

    let draft = queue.get(id).await.expect("draft queued");
    assert!(draft.tag_indices.is_empty());
    assert!(draft.target_indices.is_empty());
}

#[tokio::test]
async fn concurrent_toggles_on_one_draft_never_lose_updates() {
    let queue = Arc::new(PushQueue::new());
    let id = MessageId(3);
    queue.ensure(id, || "https://u".to_string()).await;

    // Toggle each of 8 distinct indices an odd number of times.
    let tasks: Vec<_> = (0..8)
        .flat_map(|index| {
            let queue = Arc::clone(&queue);
            (0..3).map(move |_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.toggle_tag(id, index).await })
            })
        })
        .collect();
    for task in tasks {
        assert!(task.await.expect("task completes").is_some());
    }

    let draft = queue.get(id).await.expect("draft queued");
    assert_eq!(draft.tag_indices.len(), 8, "odd toggle count must select");
}
