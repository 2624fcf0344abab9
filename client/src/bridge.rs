//! Line-delimited JSON protocol between the core and a presentation layer.
//!
//! The presentation side sends `request` envelopes; every request gets one
//! `response` with the same id. Live changes are pushed as `event`
//! envelopes on the `conversations`, `feed` and `contacts` topics.

use anyhow::Result;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tokio::io::{AsyncBufRead, AsyncBufReadExt, AsyncWrite, AsyncWriteExt};
use tracing::{debug, info, warn};

use crate::client::{ChatClient, Update};
use crate::error::ChatError;
use crate::model::ConversationKind;
use crate::view::contact_rows;

pub const PARSE_ERROR: i32 = -32700;
pub const UNKNOWN_METHOD: i32 = -32601;
pub const INVALID_PARAMS: i32 = -32602;
pub const INTERNAL_ERROR: i32 = -32603;

/// Kind of envelope used in the JSON protocol.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Kind {
    Request,
    Response,
    Event,
}

/// Standard RPC style error object.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct RpcError {
    pub code: i32,
    pub message: String,
}

impl RpcError {
    fn new(code: i32, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }
}

impl From<ChatError> for RpcError {
    fn from(err: ChatError) -> Self {
        Self::new(err.code(), err.to_string())
    }
}

/// Top level envelope exchanged with the presentation layer.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct Envelope {
    pub id: Option<String>,
    pub kind: Kind,
    pub method: Option<String>,
    pub params: Option<Value>,
    pub result: Option<Value>,
    pub error: Option<RpcError>,
    pub topic: Option<String>,
    pub payload: Option<Value>,
}

impl Envelope {
    fn empty(kind: Kind) -> Self {
        Self {
            id: None,
            kind,
            method: None,
            params: None,
            result: None,
            error: None,
            topic: None,
            payload: None,
        }
    }

    pub fn request(id: impl Into<String>, method: impl Into<String>, params: Value) -> Self {
        Self {
            id: Some(id.into()),
            method: Some(method.into()),
            params: Some(params),
            ..Self::empty(Kind::Request)
        }
    }

    pub fn response(id: Option<String>, outcome: std::result::Result<Value, RpcError>) -> Self {
        let (result, error) = match outcome {
            Ok(v) => (Some(v), None),
            Err(e) => (None, Some(e)),
        };
        Self {
            id,
            result,
            error,
            ..Self::empty(Kind::Response)
        }
    }

    pub fn event(topic: impl Into<String>, payload: Value) -> Self {
        Self {
            topic: Some(topic.into()),
            payload: Some(payload),
            ..Self::empty(Kind::Event)
        }
    }
}

/// Write a single envelope as line-delimited JSON to the writer.
pub async fn write_envelope<W: AsyncWrite + Unpin>(writer: &mut W, env: &Envelope) -> Result<()> {
    let s = serde_json::to_string(env)?;
    writer.write_all(s.as_bytes()).await?;
    writer.write_all(b"\n").await?;
    writer.flush().await?;
    Ok(())
}

#[derive(Deserialize)]
struct IdParams {
    id: String,
}

#[derive(Deserialize)]
struct UserParams {
    uid: String,
}

#[derive(Deserialize)]
struct SendParams {
    id: String,
    text: String,
}

#[derive(Deserialize)]
struct CreateParams {
    name: String,
    #[serde(default)]
    description: String,
    #[serde(default)]
    link: String,
}

#[derive(Deserialize)]
struct ListParams {
    kind: ConversationKind,
}

#[derive(Deserialize)]
struct SearchParams {
    query: String,
}

fn parse<T: DeserializeOwned>(params: Value) -> std::result::Result<T, RpcError> {
    serde_json::from_value(params).map_err(|e| RpcError::new(INVALID_PARAMS, e.to_string()))
}

fn to_value<T: Serialize>(value: T) -> std::result::Result<Value, RpcError> {
    serde_json::to_value(value).map_err(|e| RpcError::new(INTERNAL_ERROR, e.to_string()))
}

/// Serve requests from `reader` until it closes or the session logs out.
pub async fn run<R, W>(mut client: ChatClient, reader: R, mut writer: W) -> Result<()>
where
    R: AsyncBufRead + Unpin,
    W: AsyncWrite + Unpin,
{
    let mut lines = reader.lines();
    for kind in ConversationKind::ALL {
        write_envelope(&mut writer, &conversations_event(&client, kind)).await?;
    }
    write_envelope(&mut writer, &contacts_event(&client)).await?;

    let mut logout_id: Option<String> = None;
    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else {
                    debug!("presentation closed the bridge");
                    break;
                };
                if line.trim().is_empty() {
                    continue;
                }
                let env: Envelope = match serde_json::from_str(line.trim()) {
                    Ok(env) => env,
                    Err(err) => {
                        let err = RpcError::new(PARSE_ERROR, err.to_string());
                        write_envelope(&mut writer, &Envelope::response(None, Err(err))).await?;
                        continue;
                    }
                };
                if env.kind != Kind::Request {
                    continue;
                }
                let method = env.method.unwrap_or_default();
                if method == "session.logout" {
                    logout_id = env.id;
                    break;
                }
                let outcome = dispatch(&mut client, &method, env.params.unwrap_or(Value::Null)).await;
                if let Err(err) = &outcome {
                    warn!(%method, code = err.code, message = %err.message, "request failed");
                }
                write_envelope(&mut writer, &Envelope::response(env.id, outcome)).await?;
            }
            change = client.next_change() => {
                let Some(change) = change else {
                    warn!("live subscriptions closed");
                    break;
                };
                match client.apply(change).await {
                    Ok(update) => push(&client, update, &mut writer).await?,
                    Err(err) => warn!(%err, "live change could not be applied"),
                }
            }
        }
    }

    let outcome = client
        .logout()
        .await
        .map(|()| json!({}))
        .map_err(RpcError::from);
    info!("bridge stopped");
    if logout_id.is_some() {
        write_envelope(&mut writer, &Envelope::response(logout_id, outcome)).await?;
    } else if let Err(err) = outcome {
        warn!(message = %err.message, "logout failed");
    }
    Ok(())
}

async fn dispatch(
    client: &mut ChatClient,
    method: &str,
    params: Value,
) -> std::result::Result<Value, RpcError> {
    match method {
        "chat.open" => {
            let p: IdParams = parse(params)?;
            let items = client.open_conversation(&p.id).await?;
            let conversation = client.conversation(&p.id)?;
            let book = client.contact_book();
            let view = client.view(&book);
            Ok(json!({
                "conversation": view.conversation_rows(std::slice::from_ref(&conversation)).pop(),
                "feed": view.feed_rows(&items),
            }))
        }
        "chat.open_private" => {
            let p: UserParams = parse(params)?;
            let (conversation, items) = client.open_private(&p.uid).await?;
            let book = client.contact_book();
            let view = client.view(&book);
            Ok(json!({
                "conversation": view.conversation_rows(std::slice::from_ref(&conversation)).pop(),
                "feed": view.feed_rows(&items),
            }))
        }
        "chat.send" => {
            let p: SendParams = parse(params)?;
            let message = client.send_text(&p.id, &p.text).await?;
            to_value(message)
        }
        "chat.create_group" => {
            let p: CreateParams = parse(params)?;
            let conversation = client.create_group(&p.name, &p.description).await?;
            let book = client.contact_book();
            to_value(client.view(&book).conversation_rows(&[conversation]).pop())
        }
        "chat.create_channel" => {
            let p: CreateParams = parse(params)?;
            let conversation = client
                .create_channel(&p.name, &p.description, &p.link)
                .await?;
            let book = client.contact_book();
            to_value(client.view(&book).conversation_rows(&[conversation]).pop())
        }
        "chat.list" => {
            let p: ListParams = parse(params)?;
            let conversations = client.list(p.kind).await?;
            let book = client.contact_book();
            to_value(client.view(&book).conversation_rows(&conversations))
        }
        "users.search" => {
            let p: SearchParams = parse(params)?;
            let users = client.search_users(&p.query).await?;
            to_value(contact_rows(&users))
        }
        other => Err(RpcError::new(UNKNOWN_METHOD, format!("unknown method {other}"))),
    }
}

fn conversations_event(client: &ChatClient, kind: ConversationKind) -> Envelope {
    let book = client.contact_book();
    let rows = client
        .view(&book)
        .conversation_rows(&client.conversations(kind));
    Envelope::event("conversations", json!({ "kind": kind, "rows": rows }))
}

fn contacts_event(client: &ChatClient) -> Envelope {
    Envelope::event(
        "contacts",
        json!({ "rows": contact_rows(&client.contacts()) }),
    )
}

async fn push<W: AsyncWrite + Unpin>(
    client: &ChatClient,
    update: Update,
    writer: &mut W,
) -> Result<()> {
    match update {
        Update::Conversations(kind) => {
            write_envelope(writer, &conversations_event(client, kind)).await?;
        }
        Update::Contacts => {
            write_envelope(writer, &contacts_event(client)).await?;
            let private = conversations_event(client, ConversationKind::Private);
            write_envelope(writer, &private).await?;
        }
        Update::Feed(id) => match client.feed().await {
            Ok(items) => {
                let book = client.contact_book();
                let rows = client.view(&book).feed_rows(&items);
                let event = Envelope::event("feed", json!({ "id": id, "rows": rows }));
                write_envelope(writer, &event).await?;
            }
            Err(err) => warn!(%id, %err, "feed reload failed"),
        },
        Update::Nothing => {}
    }
    Ok(())
}
