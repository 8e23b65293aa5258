use std::time::Duration;

use async_trait::async_trait;
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use tokio_retry::{
    strategy::{jitter, ExponentialBackoff},
    RetryIf,
};

use crate::{
    bot::{MessageId, PublishError, Publisher},
    config,
    logging::Logger,
    util::http,
};

static LOGGER: Lazy<Logger> = Lazy::new(|| Logger::new("telegram"));

/// Tries per Bot API call when the transport fails.
const SEND_ATTEMPTS: usize = 3;

pub struct Telegram {
    api_base: String,
    token: String,
    chat_id: String,
    unpin_before_pin: bool,
    timeout: Duration,
}

#[derive(Serialize)]
struct SendMessageRequest<'a> {
    chat_id: &'a str,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct PinChatMessageRequest<'a> {
    chat_id: &'a str,
    message_id: MessageId,
    disable_notification: bool,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    chat_id: &'a str,
}

#[derive(Deserialize, Debug)]
struct ApiResponse<T> {
    ok: bool,
    #[serde(default = "Option::default")]
    result: Option<T>,
    #[serde(default)]
    error_code: Option<i64>,
    #[serde(default)]
    description: Option<String>,
}

#[derive(Deserialize, Debug)]
struct Message {
    message_id: MessageId,
}

impl Telegram {
    pub fn new(setting: &config::Telegram, timeout: Duration) -> Self {
        Telegram {
            api_base: setting.api_base.trim_end_matches('/').to_string(),
            token: setting.token.clone(),
            chat_id: setting.chat_id.clone(),
            unpin_before_pin: setting.unpin_before_pin,
            timeout,
        }
    }

    fn method_url(&self, method: &str) -> String {
        format!("{}/bot{}/{}", self.api_base, self.token, method)
    }

    /// Calls one Bot API method, retrying transport failures only.
    async fn call<REQ, RES>(&self, method: &str, req: &REQ) -> Result<RES, PublishError>
    where
        REQ: Serialize + Sync,
        RES: serde::de::DeserializeOwned,
    {
        let url = self.method_url(method);
        let strategy = ExponentialBackoff::from_millis(100)
            .map(jitter)
            .take(SEND_ATTEMPTS - 1);

        RetryIf::start(
            strategy,
            || self.call_once::<REQ, RES>(method, &url, req),
            |why: &PublishError| {
                LOGGER.warn(format!("{} failed: {}", method, why));
                matches!(why, PublishError::Transport(_))
            },
        )
        .await
    }

    async fn call_once<REQ, RES>(&self, method: &str, url: &str, req: &REQ) -> Result<RES, PublishError>
    where
        REQ: Serialize + Sync,
        RES: serde::de::DeserializeOwned,
    {
        let res = http::post_json(url, req, self.timeout)
            .await
            .map_err(|why| PublishError::Transport(why.message))?;

        if res.status == 429 || res.status >= 500 {
            return Err(PublishError::Transport(format!(
                "{} answered HTTP {}",
                method, res.status
            )));
        }

        let body: ApiResponse<RES> = serde_json::from_str(&res.body).map_err(|why| {
            PublishError::Rejected(format!("{} returned HTTP {} with {:?}", method, res.status, why))
        })?;

        if !body.ok {
            return Err(PublishError::Rejected(format!(
                "{} error {}: {}",
                method,
                body.error_code.unwrap_or(i64::from(res.status)),
                body.description.unwrap_or_default()
            )));
        }

        body.result
            .ok_or_else(|| PublishError::Rejected(format!("{} returned no result", method)))
    }
}

#[async_trait]
impl Publisher for Telegram {
    async fn publish(&self, text: &str, pin: bool) -> Result<MessageId, PublishError> {
        let payload = SendMessageRequest {
            chat_id: &self.chat_id,
            text,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };

        let message: Message = self.call("sendMessage", &payload).await?;
        LOGGER.info(format!("sendMessage ok, message_id {}", message.message_id));

        if pin {
            if let Err(why) = self.pin(message.message_id).await {
                LOGGER.warn(format!("Failed to pin message {} because {}", message.message_id, why));
            }
        }

        Ok(message.message_id)
    }

    async fn pin(&self, message_id: MessageId) -> Result<(), PublishError> {
        if self.unpin_before_pin {
            let req = ChatRequest {
                chat_id: &self.chat_id,
            };
            if let Err(why) = self.call::<_, bool>("unpinAllChatMessages", &req).await {
                LOGGER.warn(format!("unpinAllChatMessages ignored: {}", why));
            }
        }

        let req = PinChatMessageRequest {
            chat_id: &self.chat_id,
            message_id,
            disable_notification: true,
        };
        self.call::<_, bool>("pinChatMessage", &req).await.map(|_| ())
    }
}

#[cfg(test)]
mod tests {
    use serde_json::json;
    use wiremock::{
        matchers::{body_partial_json, method, path},
        Mock, MockServer, ResponseTemplate,
    };

    use super::*;

    fn client(server: &MockServer, unpin_before_pin: bool) -> Telegram {
        let setting = config::Telegram {
            token: "123:ABC".to_string(),
            chat_id: "-1001".to_string(),
            pin: true,
            unpin_before_pin,
            api_base: server.uri(),
        };
        Telegram::new(&setting, Duration::from_secs(5))
    }

    async fn mount_send_ok(server: &MockServer, message_id: i64) {
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .and(body_partial_json(json!({"chat_id": "-1001", "parse_mode": "HTML"})))
            .respond_with(ResponseTemplate::new(200).set_body_json(
                json!({"ok": true, "result": {"message_id": message_id, "text": "x"}}),
            ))
            .expect(1)
            .mount(server)
            .await;
    }

    fn ok_true() -> ResponseTemplate {
        ResponseTemplate::new(200).set_body_json(json!({"ok": true, "result": true}))
    }

    #[tokio::test]
    async fn test_publish_and_pin() {
        let server = MockServer::start().await;
        mount_send_ok(&server, 42).await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/unpinAllChatMessages"))
            .respond_with(ok_true())
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/pinChatMessage"))
            .and(body_partial_json(json!({"message_id": 42, "disable_notification": true})))
            .respond_with(ok_true())
            .expect(1)
            .mount(&server)
            .await;

        let id = client(&server, true).publish("<b>DAX</b> : <b>07</b>", true).await.unwrap();
        assert_eq!(id, 42);
    }

    #[tokio::test]
    async fn test_publish_without_pin() {
        let server = MockServer::start().await;
        mount_send_ok(&server, 7).await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/pinChatMessage"))
            .respond_with(ok_true())
            .expect(0)
            .mount(&server)
            .await;

        assert_eq!(client(&server, true).publish("warning", false).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_pin_failure_is_swallowed() {
        let server = MockServer::start().await;
        mount_send_ok(&server, 9).await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/pinChatMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false, "error_code": 400, "description": "Bad Request: not enough rights"
            })))
            .expect(1)
            .mount(&server)
            .await;

        assert_eq!(client(&server, false).publish("text", true).await.unwrap(), 9);
    }

    #[tokio::test]
    async fn test_rejected_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .respond_with(ResponseTemplate::new(400).set_body_json(json!({
                "ok": false, "error_code": 400, "description": "Bad Request: chat not found"
            })))
            .expect(1)
            .mount(&server)
            .await;

        match client(&server, false).publish("text", false).await {
            Err(PublishError::Rejected(message)) => assert!(message.contains("chat not found")),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_transport_failure_is_retried() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/bot123:ABC/sendMessage"))
            .respond_with(ResponseTemplate::new(502))
            .expect(3)
            .mount(&server)
            .await;

        assert!(matches!(
            client(&server, false).publish("text", false).await,
            Err(PublishError::Transport(_))
        ));
    }
}
