use crate::error::{ViewerError, ViewerResult};
use crate::types::{ClientRequest, ClientStats, LogRecord};
use serde::Deserialize;

/// Raw inbound frame: the `type` discriminator plus whatever else came with it.
#[derive(Debug, Clone, Deserialize)]
struct Frame {
    #[serde(rename = "type")]
    kind: String,
    #[serde(flatten)]
    payload: serde_json::Value,
}

#[derive(Debug, Deserialize)]
struct ConnectedPayload {
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    connection_count: Option<u64>,
}

#[derive(Debug, Deserialize)]
struct ClientsListPayload {
    clients: Vec<String>,
}

#[derive(Debug, Deserialize)]
struct LogPayload {
    data: LogRecord,
    client_id: String,
}

#[derive(Debug, Deserialize)]
struct LogsDataPayload {
    #[serde(default)]
    client_id: Option<String>,
    logs: Vec<LogRecord>,
}

#[derive(Debug, Deserialize)]
struct ClientStatsPayload {
    #[serde(default)]
    client_id: Option<String>,
    stats: ClientStats,
}

/// A decoded server message.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerMessage {
    Connected {
        message: Option<String>,
        connection_count: Option<u64>,
    },
    ClientsList(Vec<String>),
    Log {
        record: LogRecord,
        client_id: String,
    },
    /// History for one client, in server order (oldest first).
    LogsData {
        client_id: Option<String>,
        logs: Vec<LogRecord>,
    },
    ClientStats {
        client_id: Option<String>,
        stats: ClientStats,
    },
    Unknown(String),
}

pub fn decode(text: &str) -> ViewerResult<ServerMessage> {
    let frame: Frame = serde_json::from_str(text)?;

    let message = match frame.kind.as_str() {
        "connected" => {
            let payload: ConnectedPayload = serde_json::from_value(frame.payload)?;
            ServerMessage::Connected {
                message: payload.message,
                connection_count: payload.connection_count,
            }
        }
        "clients_list" => {
            let payload: ClientsListPayload = serde_json::from_value(frame.payload)?;
            ServerMessage::ClientsList(payload.clients)
        }
        "log" => {
            let payload: LogPayload = serde_json::from_value(frame.payload)?;
            ServerMessage::Log {
                record: payload.data,
                client_id: payload.client_id,
            }
        }
        "logs_data" => {
            let payload: LogsDataPayload = serde_json::from_value(frame.payload)?;
            ServerMessage::LogsData {
                client_id: payload.client_id,
                logs: payload.logs,
            }
        }
        "client_stats" => {
            let payload: ClientStatsPayload = serde_json::from_value(frame.payload)?;
            ServerMessage::ClientStats {
                client_id: payload.client_id,
                stats: payload.stats,
            }
        }
        _ => ServerMessage::Unknown(frame.kind),
    };

    Ok(message)
}

pub fn encode(request: &ClientRequest) -> ViewerResult<String> {
    serde_json::to_string(request).map_err(|e| ViewerError::ProtocolError(e.to_string()))
}
