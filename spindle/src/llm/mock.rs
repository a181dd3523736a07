//! Mock oracle for tests: scripted replies, recorded prompts.

use std::collections::VecDeque;
use std::sync::Mutex;

use async_trait::async_trait;

use super::{Oracle, OracleError};

/// Oracle that replays a fixed script of responses.
///
/// Replies are consumed in order; once the script is exhausted the last
/// reply repeats, so a single-reply mock answers every call identically.
/// Every prompt is recorded for assertions.
///
/// **Interaction**: Drop-in for `Arc<dyn Oracle>` anywhere the runtime wants
/// an LLM; tests inspect `prompts()` to verify what each component asked.
pub struct MockOracle {
    replies: Mutex<VecDeque<String>>,
    last: Mutex<String>,
    prompts: Mutex<Vec<String>>,
}

impl MockOracle {
    /// Mock that answers every call with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        let reply = reply.into();
        Self {
            replies: Mutex::new(VecDeque::new()),
            last: Mutex::new(reply),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Mock that answers with each reply in turn, then repeats the last one.
    pub fn with_replies(replies: Vec<String>) -> Self {
        let last = replies.last().cloned().unwrap_or_default();
        Self {
            replies: Mutex::new(replies.into()),
            last: Mutex::new(last),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// Prompts seen so far, in call order.
    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().unwrap().clone()
    }

    /// Number of calls made.
    pub fn call_count(&self) -> usize {
        self.prompts.lock().unwrap().len()
    }
}

#[async_trait]
impl Oracle for MockOracle {
    async fn generate(&self, prompt: &str) -> Result<String, OracleError> {
        self.prompts.lock().unwrap().push(prompt.to_string());
        let next = self.replies.lock().unwrap().pop_front();
        match next {
            Some(reply) => {
                *self.last.lock().unwrap() = reply.clone();
                Ok(reply)
            }
            None => Ok(self.last.lock().unwrap().clone()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// **Scenario**: A single-reply mock repeats and records prompts.
    #[tokio::test]
    async fn single_reply_repeats_and_records() {
        let oracle = MockOracle::new("hello");
        assert_eq!(oracle.generate("a").await.unwrap(), "hello");
        assert_eq!(oracle.generate("b").await.unwrap(), "hello");
        assert_eq!(oracle.prompts(), vec!["a", "b"]);
    }

    /// **Scenario**: Scripted replies are consumed in order, then the last repeats.
    #[tokio::test]
    async fn scripted_replies_in_order() {
        let oracle = MockOracle::with_replies(vec!["one".into(), "two".into()]);
        assert_eq!(oracle.generate("p").await.unwrap(), "one");
        assert_eq!(oracle.generate("p").await.unwrap(), "two");
        assert_eq!(oracle.generate("p").await.unwrap(), "two");
        assert_eq!(oracle.call_count(), 3);
    }
}
