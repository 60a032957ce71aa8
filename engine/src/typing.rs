//! Typing indicator policy around an in-flight completion call.

use std::future::Future;
use std::time::Duration;

use parley_types::TypingPolicy;

use crate::channel::ChatChannel;

pub const DEFAULT_TYPING_DEADLINE: Duration = Duration::from_millis(1500);
pub const DEFAULT_MIN_TYPING: Duration = Duration::from_secs(2);

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TypingTiming {
    /// `delayed`: how long a call may run before the indicator is shown.
    pub deadline: Duration,
    /// `always`: how long the indicator is held at minimum.
    pub minimum: Duration,
}

impl Default for TypingTiming {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_TYPING_DEADLINE,
            minimum: DEFAULT_MIN_TYPING,
        }
    }
}

async fn show_typing<O: ChatChannel>(channel: &O) {
    if let Err(err) = channel.typing().await {
        tracing::warn!("Failed to show typing indicator: {err:#}");
    }
}

/// Drive `work` to completion while applying the typing policy.
pub async fn with_typing<O, F>(
    channel: &O,
    policy: TypingPolicy,
    timing: TypingTiming,
    work: F,
) -> F::Output
where
    O: ChatChannel,
    F: Future,
{
    match policy {
        TypingPolicy::Always => {
            show_typing(channel).await;
            let (output, ()) = tokio::join!(work, tokio::time::sleep(timing.minimum));
            output
        }
        TypingPolicy::Delayed => {
            let mut work = std::pin::pin!(work);
            match tokio::time::timeout(timing.deadline, &mut work).await {
                Ok(output) => output,
                Err(_elapsed) => {
                    show_typing(channel).await;
                    work.await
                }
            }
        }
    }
}
