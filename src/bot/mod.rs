use async_trait::async_trait;

pub mod telegram;

pub type MessageId = i64;

/// The message could not be delivered.
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PublishError {
    /// The chat service could not be reached or kept failing.
    #[error("transport failure: {0}")]
    Transport(String),
    /// The chat service answered and refused the request.
    #[error("rejected: {0}")]
    Rejected(String),
}

/// Where finished messages go.
#[async_trait]
pub trait Publisher: Send + Sync {
    /// Sends `text`; when `pin` is set the message is pinned afterwards.
    /// A failed pin never fails the publish.
    async fn publish(&self, text: &str, pin: bool) -> Result<MessageId, PublishError>;

    async fn pin(&self, message_id: MessageId) -> Result<(), PublishError>;
}

#[cfg(test)]
pub(crate) mod tests {
    use std::sync::Mutex;

    use super::*;

    /// Records every call instead of talking to a chat service.
    #[derive(Default)]
    pub(crate) struct RecordingPublisher {
        pub published: Mutex<Vec<(String, bool)>>,
        pub pinned: Mutex<Vec<MessageId>>,
        pub fail_with: Option<PublishError>,
    }

    impl RecordingPublisher {
        pub(crate) fn failing(error: PublishError) -> Self {
            RecordingPublisher {
                fail_with: Some(error),
                ..Default::default()
            }
        }

        pub(crate) fn messages(&self) -> Vec<(String, bool)> {
            self.published.lock().unwrap().clone()
        }

        pub(crate) fn pins(&self) -> Vec<MessageId> {
            self.pinned.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl Publisher for RecordingPublisher {
        async fn publish(&self, text: &str, pin: bool) -> Result<MessageId, PublishError> {
            if let Some(error) = &self.fail_with {
                return Err(error.clone());
            }

            let id = {
                let mut published = self.published.lock().unwrap();
                published.push((text.to_string(), pin));
                published.len() as MessageId
            };

            if pin {
                let _ = self.pin(id).await;
            }

            Ok(id)
        }

        async fn pin(&self, message_id: MessageId) -> Result<(), PublishError> {
            self.pinned.lock().unwrap().push(message_id);
            Ok(())
        }
    }
}
