//! End-to-end chat pipeline tests against a mock completions API

use std::time::Duration;

use parley_context::{FactStore, Librarian, LibrarianSettings, NO_FACTS_REPORT};
use parley_engine::{APOLOGY, ChatOrchestrator, ChatSettings, MessageFilter};
use parley_types::SamplingParams;

use crate::common::{
    BOT_ID, CHANNEL, CHAT_MODEL, LIBRARIAN_MODEL, RecordingChannel, fast_client, inbound,
    message_contents, mount_completion, mount_payload, requests_for, server_error_body,
    start_openai_mock, wait_until,
};

fn chat_settings() -> ChatSettings {
    let mut settings = ChatSettings::new(
        "Parley",
        "You are Parley.",
        SamplingParams::new(CHAT_MODEL, 0.7, 1.0).with_penalties(0.0, 0.0),
        2048,
    );
    settings.message_interval = Duration::ZERO;
    settings
}

fn librarian_settings() -> LibrarianSettings {
    let mut settings = LibrarianSettings::new(SamplingParams::new(LIBRARIAN_MODEL, 0.2, 1.0));
    settings.batch_size = 3;
    settings.settle_delay = Duration::ZERO;
    settings
}

#[tokio::test]
async fn facts_learned_by_librarian_reach_later_prompts() {
    let server = start_openai_mock().await;
    mount_completion(&server, CHAT_MODEL, "Parley (2023-04-01T12:00:00+00:00): Sounds fun!").await;
    mount_completion(
        &server,
        LIBRARIAN_MODEL,
        "user:Zonaxx:Loves space travel\nuser:Zonaxx:Owns a telescope",
    )
    .await;

    let librarian = Librarian::new(fast_client(&server), librarian_settings());
    let facts = librarian.reader();
    let (librarian_handle, librarian_task) = librarian.spawn();

    let channel = RecordingChannel::default();
    let orchestrator = ChatOrchestrator::new(
        fast_client(&server),
        channel.clone(),
        MessageFilter::new(BOT_ID, CHANNEL),
        chat_settings(),
        facts.clone(),
    )
    .with_librarian(librarian_handle);
    let (inbox, chat_task) = orchestrator.spawn();

    for text in ["I love space travel", "I even own a telescope", "Saturn is my favourite"] {
        inbox.send(inbound("Zonaxx", text)).unwrap();
    }
    wait_until("three replies", || channel.sent().len() == 3).await;
    wait_until("extracted facts", || facts.fact_count() == 2).await;
    assert!(channel.sent().iter().all(|reply| reply == " Sounds fun!"));

    inbox.send(inbound("bob", "!facts")).unwrap();
    wait_until("facts report", || channel.sent().len() == 4).await;
    assert_eq!(
        channel.sent()[3],
        "Zonaxx:\n  - Loves space travel\n  - Owns a telescope"
    );

    inbox.send(inbound("Zonaxx", "What do you know about me?")).unwrap();
    wait_until("fourth reply", || channel.sent().len() == 5).await;

    let chat_requests = requests_for(&server, CHAT_MODEL).await;
    assert_eq!(chat_requests.len(), 4, "!facts never calls the API");
    let last_prompt = message_contents(&chat_requests[3]);
    assert_eq!(last_prompt[0], "You are Parley.");
    assert_eq!(
        last_prompt.last().map(String::as_str),
        Some("Facts about Zonaxx:\nLoves space travel\nOwns a telescope")
    );
    assert_eq!(chat_requests[3]["presence_penalty"], 0.0);

    let librarian_requests = requests_for(&server, LIBRARIAN_MODEL).await;
    assert_eq!(librarian_requests.len(), 1);
    let extraction = message_contents(&librarian_requests[0]);
    assert!(extraction[1].contains("I love space travel"));
    assert!(extraction[1].contains("Saturn is my favourite"));
    assert!(
        librarian_requests[0].get("presence_penalty").is_none(),
        "librarian sends no penalties"
    );

    drop(inbox);
    chat_task.await.unwrap();
    let store = librarian_task.await.unwrap();
    assert_eq!(store.fact_count(), 2);
}

#[tokio::test]
async fn server_errors_are_retried_before_replying() {
    let server = start_openai_mock().await;
    mount_payload(&server, CHAT_MODEL, 500, server_error_body(), 2).await;
    mount_completion(&server, CHAT_MODEL, "Back online").await;

    let channel = RecordingChannel::default();
    let mut orchestrator = ChatOrchestrator::new(
        fast_client(&server),
        channel.clone(),
        MessageFilter::new(BOT_ID, CHANNEL),
        chat_settings(),
        FactStore::new().reader(),
    );

    orchestrator.handle(&inbound("alice", "hello?")).await.unwrap();

    assert_eq!(channel.sent(), vec!["Back online"]);
    assert_eq!(requests_for(&server, CHAT_MODEL).await.len(), 3);
    assert_eq!(orchestrator.window().len(), 2);
}

#[tokio::test]
async fn malformed_responses_end_in_apology() {
    let server = start_openai_mock().await;
    mount_payload(
        &server,
        CHAT_MODEL,
        400,
        serde_json::json!({"error": {"type": "invalid_request_error", "message": "bad"}}),
        u64::MAX,
    )
    .await;

    let channel = RecordingChannel::default();
    let mut orchestrator = ChatOrchestrator::new(
        fast_client(&server),
        channel.clone(),
        MessageFilter::new(BOT_ID, CHANNEL),
        chat_settings(),
        FactStore::new().reader(),
    );

    orchestrator.handle(&inbound("alice", "hello?")).await.unwrap();

    assert_eq!(channel.sent(), vec![APOLOGY]);
    assert_eq!(requests_for(&server, CHAT_MODEL).await.len(), 3);
    // The user turn is kept; no assistant turn is recorded.
    assert_eq!(orchestrator.window().len(), 1);
}

#[tokio::test]
async fn facts_command_with_empty_store() {
    let server = start_openai_mock().await;
    let channel = RecordingChannel::default();
    let mut orchestrator = ChatOrchestrator::new(
        fast_client(&server),
        channel.clone(),
        MessageFilter::new(BOT_ID, CHANNEL),
        chat_settings(),
        FactStore::new().reader(),
    );

    orchestrator.handle(&inbound("alice", "!facts")).await.unwrap();

    assert_eq!(channel.sent(), vec![NO_FACTS_REPORT]);
    assert!(requests_for(&server, CHAT_MODEL).await.is_empty());
}

#[tokio::test]
async fn long_replies_are_split_for_the_channel() {
    let server = start_openai_mock().await;
    let reply = "x".repeat(4500);
    mount_completion(&server, CHAT_MODEL, &reply).await;

    let channel = RecordingChannel::default();
    let mut orchestrator = ChatOrchestrator::new(
        fast_client(&server),
        channel.clone(),
        MessageFilter::new(BOT_ID, CHANNEL),
        chat_settings(),
        FactStore::new().reader(),
    );

    orchestrator.handle(&inbound("alice", "go on")).await.unwrap();

    let sent = channel.sent();
    assert_eq!(
        sent.iter().map(|s| s.chars().count()).collect::<Vec<_>>(),
        vec![2000, 2000, 500]
    );
    assert_eq!(sent.concat(), reply);
}
