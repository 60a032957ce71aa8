//! Configuration loading and wiring tests

use std::io::Write;
use std::time::Duration;

use parley_config::{ConfigError, ParleyConfig};
use parley_providers::CompletionClient;
use parley_types::TypingPolicy;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(content.as_bytes()).unwrap();
    file
}

#[test]
fn loads_file_and_builds_clients() {
    let file = write_config(
        r#"
[chat]
system_message = "You are Parley."
channel = "lounge"
client_timeout = 15
typing = "always"

[librarian]
batch_size = 4

[api]
key = "sk-config"
base_url = "http://127.0.0.1:9/v1"
"#,
    );

    let config = ParleyConfig::load_from(file.path()).unwrap();
    assert_eq!(config.chat.channel, "lounge");
    assert_eq!(config.chat.timeout(), Duration::from_secs(15));
    assert_eq!(config.chat.typing, TypingPolicy::Always);
    assert_eq!(config.librarian.batch_size, 4);

    let key = config.api.resolve_key().unwrap();
    let client = CompletionClient::new(key, &config.api.resolve_base_url(), config.chat.timeout())
        .unwrap();
    assert_eq!(client.endpoint(), "http://127.0.0.1:9/v1/chat/completions");
}

#[test]
fn invalid_values_name_the_file() {
    let file = write_config("[chat]\nsystem_message = \"hi\"\nmax_tokens = 0\n");

    let err = ParleyConfig::load_from(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Invalid { .. }));
    assert_eq!(err.path(), Some(file.path()));
    assert!(err.to_string().contains("max_tokens"));
}
