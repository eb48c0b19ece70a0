//! Bot API transport against a mock HTTP server.

use mockito::{Matcher, Server};
use secrecy::SecretString;
use serde_json::json;
use tokio_util::sync::CancellationToken;

use sharebot::config::Credentials;
use sharebot::transport::{BotApiTransport, Connection, Delivery, Transport, TransportError};
use sharebot::update::UpdateKind;

const TOKEN: &str = "123:abc";

fn credentials(token: &str) -> Credentials {
    Credentials {
        api_id: 12345,
        api_hash: SecretString::new("hash".to_owned()),
        bot_token: SecretString::new(token.to_owned()),
    }
}

fn path(method: &str) -> String {
    format!("/bot{TOKEN}/{method}")
}

async fn connect(server: &Server) -> std::sync::Arc<dyn Connection> {
    BotApiTransport::new(server.url(), 5)
        .connect(&credentials(TOKEN))
        .await
        .expect("well-formed token should connect")
}

#[tokio::test]
async fn get_me_returns_the_identity() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", path("getMe").as_str())
        .with_header("content-type", "application/json")
        .with_body(
            json!({
                "ok": true,
                "result": {"id": 99, "is_bot": true, "first_name": "ShareBot", "username": "share_bot"}
            })
            .to_string(),
        )
        .create_async()
        .await;

    let conn = connect(&server).await;
    let me = conn.get_me().await.expect("getMe should succeed");

    assert_eq!(me.id, 99);
    assert_eq!(me.first_name, "ShareBot");
    assert_eq!(me.username.as_deref(), Some("share_bot"));
    mock.assert_async().await;
}

#[tokio::test]
async fn rejected_token_is_an_auth_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path("getMe").as_str())
        .with_status(401)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":false,"error_code":401,"description":"Unauthorized"}"#)
        .create_async()
        .await;

    let conn = connect(&server).await;
    let err = conn.get_me().await.expect_err("401 should fail");

    assert!(matches!(err, TransportError::Auth(ref d) if d == "Unauthorized"), "got {err:?}");
}

#[tokio::test]
async fn server_error_is_a_connection_error() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path("getMe").as_str())
        .with_status(500)
        .with_header("content-type", "application/json")
        .with_body(r#"{"ok":false,"error_code":500,"description":"Internal Server Error"}"#)
        .create_async()
        .await;

    let conn = connect(&server).await;
    let err = conn.get_me().await.expect_err("500 should fail");

    assert!(matches!(err, TransportError::Connection(_)), "got {err:?}");
}

#[tokio::test]
async fn unreachable_api_is_a_connection_error() {
    let conn = BotApiTransport::new("http://127.0.0.1:1", 5)
        .connect(&credentials(TOKEN))
        .await
        .expect("connect does no network I/O");

    let err = conn.get_me().await.expect_err("nothing listens on port 1");

    assert!(matches!(err, TransportError::Connection(_)), "got {err:?}");
    assert!(!err.to_string().contains(TOKEN), "token leaked: {err}");
}

#[tokio::test]
async fn malformed_token_is_rejected_before_any_request() {
    let server = Server::new_async().await;
    let result = BotApiTransport::new(server.url(), 5)
        .connect(&credentials("not-a-token"))
        .await;

    assert!(matches!(result, Err(TransportError::Auth(_))));
}

#[tokio::test]
async fn polling_delivery_clears_the_webhook() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", path("deleteWebhook").as_str())
        .match_body(Matcher::PartialJson(json!({"drop_pending_updates": false})))
        .with_body(r#"{"ok":true,"result":true}"#)
        .expect(1)
        .create_async()
        .await;

    let conn = connect(&server).await;
    conn.configure(&Delivery::Polling)
        .await
        .expect("deleteWebhook should succeed");

    mock.assert_async().await;
}

#[tokio::test]
async fn webhook_delivery_registers_url_and_secret() {
    let mut server = Server::new_async().await;
    let mock = server
        .mock("POST", path("setWebhook").as_str())
        .match_body(Matcher::PartialJson(json!({
            "url": "https://bot.example.com/webhook",
            "secret_token": "s3cret"
        })))
        .with_body(r#"{"ok":true,"result":true}"#)
        .expect(1)
        .create_async()
        .await;

    let conn = connect(&server).await;
    conn.configure(&Delivery::Webhook {
        url: Some("https://bot.example.com/webhook".to_owned()),
        secret: Some(SecretString::new("s3cret".to_owned())),
    })
    .await
    .expect("setWebhook should succeed");

    mock.assert_async().await;
}

#[tokio::test]
async fn webhook_delivery_without_url_makes_no_call() {
    let server = Server::new_async().await;
    let conn = connect(&server).await;

    conn.configure(&Delivery::Webhook {
        url: None,
        secret: None,
    })
    .await
    .expect("nothing to register");
}

#[tokio::test]
async fn pull_skips_malformed_elements_and_acks_on_disconnect() {
    let mut server = Server::new_async().await;
    let poll = server
        .mock("POST", path("getUpdates").as_str())
        .match_body(Matcher::Json(json!({"timeout": 5})))
        .with_body(
            json!({
                "ok": true,
                "result": [
                    {"update_id": 1, "message": {"message_id": 1, "chat": {"id": 42}, "text": "a"}},
                    {"update_id": 2},
                    "junk",
                    {"update_id": 3, "edited_message": {"message_id": 1, "chat": {"id": 42}, "text": "b"}}
                ]
            })
            .to_string(),
        )
        .expect(1)
        .create_async()
        .await;
    let ack = server
        .mock("POST", path("getUpdates").as_str())
        .match_body(Matcher::PartialJson(json!({"offset": 4, "timeout": 0, "limit": 1})))
        .with_body(r#"{"ok":true,"result":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let conn = connect(&server).await;
    let cancel = CancellationToken::new();

    let first = conn.pull(&cancel).await.expect("first update");
    assert_eq!(first.update_id(), Some(1));
    assert_eq!(first.kind(), &UpdateKind::Message);

    let second = conn.pull(&cancel).await.expect("second update");
    assert_eq!(second.update_id(), Some(3));
    assert_eq!(second.kind(), &UpdateKind::EditedMessage);

    conn.disconnect().await;
    conn.disconnect().await;

    poll.assert_async().await;
    ack.assert_async().await;
}

#[tokio::test]
async fn buffered_updates_stay_unconfirmed_on_disconnect() {
    let mut server = Server::new_async().await;
    server
        .mock("POST", path("getUpdates").as_str())
        .match_body(Matcher::Json(json!({"timeout": 5})))
        .with_body(
            json!({
                "ok": true,
                "result": [
                    {"update_id": 7, "message": {"chat": {"id": 1}, "text": "a"}},
                    {"update_id": 8, "message": {"chat": {"id": 1}, "text": "b"}}
                ]
            })
            .to_string(),
        )
        .create_async()
        .await;
    let ack = server
        .mock("POST", path("getUpdates").as_str())
        .match_body(Matcher::PartialJson(json!({"offset": 8, "timeout": 0})))
        .with_body(r#"{"ok":true,"result":[]}"#)
        .expect(1)
        .create_async()
        .await;

    let conn = connect(&server).await;
    let cancel = CancellationToken::new();
    let update = conn.pull(&cancel).await.expect("one update");
    assert_eq!(update.update_id(), Some(7));

    conn.disconnect().await;

    ack.assert_async().await;
}

#[tokio::test]
async fn cancelled_pull_returns_none() {
    let server = Server::new_async().await;
    let conn = connect(&server).await;
    let cancel = CancellationToken::new();
    cancel.cancel();

    assert!(conn.pull(&cancel).await.is_none());
}

#[tokio::test]
async fn closed_connection_refuses_calls() {
    let server = Server::new_async().await;
    let conn = connect(&server).await;

    // Nothing was polled, so there is no offset to confirm.
    conn.disconnect().await;

    assert!(matches!(conn.get_me().await, Err(TransportError::Closed)));
    assert!(conn.pull(&CancellationToken::new()).await.is_none());
}
