//! Librarian extraction tests against a mock completions API

use std::time::Duration;

use parley_context::{BatchOutcome, Librarian, LibrarianSettings, fact_turn};
use parley_types::{SamplingParams, Turn};

use crate::common::{
    LIBRARIAN_MODEL, fast_client, message_contents, mount_completion, mount_payload,
    requests_for, server_error_body, start_openai_mock,
};

fn settings(batch_size: usize) -> LibrarianSettings {
    let mut settings = LibrarianSettings::new(SamplingParams::new(LIBRARIAN_MODEL, 0.2, 1.0));
    settings.batch_size = batch_size;
    settings.settle_delay = Duration::ZERO;
    settings
}

fn transcript() -> Vec<Turn> {
    vec![
        Turn::user("Zonaxx (2023-04-01T12:00:00.000000+00:00): I just got back from orbit"),
        Turn::assistant("Parley (2023-04-01T12:00:05.000000+00:00): How was it?"),
    ]
}

#[tokio::test]
async fn exhausted_retries_drop_the_batch() {
    let server = start_openai_mock().await;
    mount_payload(&server, LIBRARIAN_MODEL, 500, server_error_body(), u64::MAX).await;

    let mut librarian = Librarian::new(fast_client(&server), settings(2));

    assert_eq!(
        librarian.observe(transcript()).await,
        BatchOutcome::Accumulating { notifications: 1 }
    );
    assert_eq!(librarian.observe(transcript()).await, BatchOutcome::Dropped);

    assert_eq!(requests_for(&server, LIBRARIAN_MODEL).await.len(), 3);
    assert_eq!(librarian.store().fact_count(), 0);

    // Counters reset: the next notification starts a new batch.
    assert_eq!(
        librarian.observe(transcript()).await,
        BatchOutcome::Accumulating { notifications: 1 }
    );
}

#[tokio::test]
async fn chatty_extraction_output_is_tolerated() {
    let server = start_openai_mock().await;
    mount_completion(
        &server,
        LIBRARIAN_MODEL,
        "Sure! Here are the facts:\n\nuser:Zonaxx:Has been to orbit\n  user:Zonaxx:  Tells good stories \nThat's all.",
    )
    .await;

    let mut librarian = Librarian::new(fast_client(&server), settings(1));
    let outcome = librarian.observe(transcript()).await;

    assert_eq!(outcome, BatchOutcome::Extracted { parsed: 2, added: 2 });
    assert_eq!(
        librarian.reader().get_for_user("Zonaxx"),
        vec!["Has been to orbit", "Tells good stories"]
    );
}

#[tokio::test]
async fn injected_fact_turns_are_not_sent_for_extraction() {
    let server = start_openai_mock().await;
    mount_completion(&server, LIBRARIAN_MODEL, "user:Zonaxx:Has been to orbit").await;

    let mut librarian = Librarian::new(fast_client(&server), settings(1));
    let mut snapshot = transcript();
    let known = vec!["Collects meteorites".to_string()];
    snapshot.insert(1, fact_turn("Zonaxx", &known).unwrap());

    librarian.observe(snapshot).await;

    let requests = requests_for(&server, LIBRARIAN_MODEL).await;
    assert_eq!(requests.len(), 1);
    let contents = message_contents(&requests[0]);
    assert_eq!(contents.len(), 2);
    assert!(contents[0].contains("user:"));
    assert!(contents[1].contains("I just got back from orbit"));
    assert!(!contents[1].contains("Collects meteorites"));
}
