//! End-to-end pipeline tests against a local websocket server speaking the
//! chat protocol.

use std::sync::Arc;
use std::time::Duration;

use chzzk_chat::{Chat, ChannelCredentials, ChatPipeline, ConnectionState, PipelineConfig};
use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::watch;
use tokio::time::timeout;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{WebSocketStream, accept_async};

const WAIT: Duration = Duration::from_secs(5);

type ServerSocket = WebSocketStream<TcpStream>;

async fn listener() -> (TcpListener, String) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}/chat", listener.local_addr().unwrap());
    (listener, url)
}

fn config(url: String) -> PipelineConfig {
    PipelineConfig {
        server_url: url,
        max_visible: 10,
        tick_interval: Duration::from_millis(10),
        reconnect_delay: Duration::from_millis(50),
        ..PipelineConfig::default()
    }
}

fn credentials() -> ChannelCredentials {
    ChannelCredentials {
        chat_channel_id: "chat-chan".into(),
        access_token: "secret-token".into(),
    }
}

async fn accept(listener: &TcpListener) -> ServerSocket {
    let (stream, _) = timeout(WAIT, listener.accept())
        .await
        .expect("client never connected")
        .unwrap();
    accept_async(stream).await.unwrap()
}

async fn next_json(ws: &mut ServerSocket) -> Value {
    loop {
        let message = timeout(WAIT, ws.next())
            .await
            .expect("client sent nothing")
            .expect("client closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

async fn send_json(ws: &mut ServerSocket, value: Value) {
    ws.send(Message::Text(value.to_string().into())).await.unwrap();
}

fn record(msg: &str, type_code: i64, status: &str, time: i64) -> Value {
    json!({
        "cid": "chat-chan",
        "msgTypeCode": type_code,
        "msgStatusType": status,
        "msg": msg,
        "msgTime": time,
        "profile": json!({ "nickname": "viewer", "userIdHash": "abc" }).to_string(),
        "extras": json!({ "emojis": {} }).to_string(),
    })
}

fn backlog_record(content: &str, status: &str, time: i64) -> Value {
    json!({
        "channelId": "chat-chan",
        "messageTypeCode": 1,
        "messageStatusType": status,
        "content": content,
        "messageTime": time,
        "profile": json!({ "nickname": "old-viewer" }).to_string(),
        "extras": "null",
    })
}

async fn wait_visible(rx: &mut watch::Receiver<Arc<Vec<Chat>>>, len: usize) -> Vec<String> {
    let chats = timeout(WAIT, rx.wait_for(|chats| chats.len() == len))
        .await
        .expect("visible list never reached expected length")
        .expect("pipeline gone")
        .clone();
    chats.iter().map(|c| c.message.clone()).collect()
}

/// Drive the handshake up to the backlog request; returns the request frame.
async fn handshake(ws: &mut ServerSocket, sid: &str) -> Value {
    let connect = next_json(ws).await;
    assert_eq!(connect["cmd"], 100);
    send_json(ws, json!({ "ver": "2", "cmd": 10100, "retCode": 0, "bdy": { "sid": sid } })).await;
    next_json(ws).await
}

#[tokio::test]
async fn handshake_backlog_and_live_chat() {
    let (listener, url) = listener().await;
    let pipeline = ChatPipeline::spawn(config(url), credentials());
    let mut visible = pipeline.visible();
    let mut state = pipeline.connection_state();

    let mut ws = accept(&listener).await;

    let connect = next_json(&mut ws).await;
    assert_eq!(connect["cmd"], 100);
    assert_eq!(connect["ver"], "2");
    assert_eq!(connect["tid"], 1);
    assert_eq!(connect["cid"], "chat-chan");
    assert_eq!(connect["svcid"], "game");
    assert_eq!(connect["bdy"]["accTkn"], "secret-token");
    assert_eq!(connect["bdy"]["auth"], "READ");
    assert_eq!(connect["bdy"]["devType"], 2001);

    send_json(&mut ws, json!({ "ver": "2", "cmd": 10100, "bdy": { "sid": "sid-1" } })).await;
    let request = next_json(&mut ws).await;
    assert_eq!(request["cmd"], 5101);
    assert_eq!(request["tid"], 2);
    assert_eq!(request["sid"], "sid-1");
    assert_eq!(request["bdy"]["recentMessageCount"], 10);

    send_json(
        &mut ws,
        json!({
            "ver": "2",
            "cmd": 15101,
            "bdy": { "messageList": [
                backlog_record("later", "NORMAL", 200),
                backlog_record("blinded", "HIDDEN", 150),
                backlog_record("earlier", "NORMAL", 100),
            ]},
        }),
    )
    .await;
    assert_eq!(wait_visible(&mut visible, 2).await, vec!["earlier", "later"]);
    timeout(WAIT, state.wait_for(|s| *s == ConnectionState::Live))
        .await
        .expect("never went live")
        .unwrap();

    // Server ping is answered before anything else.
    send_json(&mut ws, json!({ "ver": "2", "cmd": 0 })).await;
    assert_eq!(next_json(&mut ws).await["cmd"], 10000);

    send_json(
        &mut ws,
        json!({
            "ver": "2",
            "cmd": 93101,
            "bdy": [
                record("hello", 1, "NORMAL", 300),
                record("donation", 10, "NORMAL", 301),
                record("moderated", 1, "HIDDEN", 302),
                record("world", 1, "NORMAL", 303),
            ],
        }),
    )
    .await;
    assert_eq!(
        wait_visible(&mut visible, 4).await,
        vec!["earlier", "later", "hello", "world"]
    );

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.records.accepted, 4);
    assert_eq!(snapshot.records.hidden, 2);
    assert_eq!(snapshot.records.filtered, 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn reconnects_after_server_drop() {
    let (listener, url) = listener().await;
    let pipeline = ChatPipeline::spawn(config(url), credentials());
    let mut visible = pipeline.visible();

    let mut first = accept(&listener).await;
    handshake(&mut first, "sid-1").await;
    send_json(
        &mut first,
        json!({ "cmd": 15101, "bdy": { "messageList": [backlog_record("before", "NORMAL", 1)] } }),
    )
    .await;
    wait_visible(&mut visible, 1).await;
    drop(first);

    let mut second = accept(&listener).await;
    let request = handshake(&mut second, "sid-2").await;
    assert_eq!(request["sid"], "sid-2");

    send_json(
        &mut second,
        json!({ "cmd": 15101, "bdy": { "messageList": [
            backlog_record("a", "NORMAL", 1),
            backlog_record("b", "NORMAL", 2),
        ] } }),
    )
    .await;
    assert_eq!(wait_visible(&mut visible, 2).await, vec!["a", "b"]);

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.connection.started, 2);
    assert!(snapshot.connection.reconnects_scheduled >= 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn unanswered_keepalive_forces_reconnect() {
    let (listener, url) = listener().await;
    let config = PipelineConfig {
        keepalive_interval: Duration::from_millis(200),
        liveness_timeout: Some(Duration::from_millis(200)),
        ..config(url)
    };
    let pipeline = ChatPipeline::spawn(config, credentials());

    let mut first = accept(&listener).await;
    assert_eq!(next_json(&mut first).await["cmd"], 100);
    // Stay silent: the next thing the client sends is its own keepalive ping.
    assert_eq!(next_json(&mut first).await["cmd"], 0);

    let mut second = accept(&listener).await;
    assert_eq!(next_json(&mut second).await["cmd"], 100);

    let snapshot = pipeline.metrics().snapshot();
    assert_eq!(snapshot.connection.liveness_timeouts, 1);
    assert!(snapshot.connection.pings_sent >= 1);

    pipeline.shutdown().await;
}

#[tokio::test]
async fn restart_clears_visible_and_opens_new_session() {
    let (listener, url) = listener().await;
    let pipeline = ChatPipeline::spawn(config(url), credentials());
    let mut visible = pipeline.visible();

    let mut first = accept(&listener).await;
    handshake(&mut first, "sid-1").await;
    send_json(
        &mut first,
        json!({ "cmd": 15101, "bdy": { "messageList": [backlog_record("x", "NORMAL", 1)] } }),
    )
    .await;
    wait_visible(&mut visible, 1).await;

    pipeline.restart(Some(ChannelCredentials {
        chat_channel_id: "other-chan".into(),
        access_token: "fresh-token".into(),
    }));
    wait_visible(&mut visible, 0).await;

    let mut second = accept(&listener).await;
    let connect = next_json(&mut second).await;
    assert_eq!(connect["cid"], "other-chan");
    assert_eq!(connect["bdy"]["accTkn"], "fresh-token");

    pipeline.shutdown().await;
}
