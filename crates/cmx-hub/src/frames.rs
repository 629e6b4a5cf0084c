//! JSON text frames, internally tagged by `"type"`.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use cmx_schemas::{Conversation, Message};

/// Client → server.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    JoinRoom { room_id: Uuid },
    LeaveRoom { room_id: Uuid },
    SendMessage { room_id: Uuid, content: String },
}

/// Server → client.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerFrame {
    JoinedRoom { room_id: Uuid },
    LeftRoom { room_id: Uuid },
    /// Room broadcast of a newly posted message.
    Message { message: Message },
    /// Acknowledgement to the sender of `send_message`.
    MessageSent { message: Message },
    ConversationClosed { conversation: Conversation },
    Error { status: u16, message: String },
    Shutdown,
}

impl ServerFrame {
    pub fn error(status: u16, message: impl Into<String>) -> Self {
        ServerFrame::Error {
            status,
            message: message.into(),
        }
    }

    pub fn to_json(&self) -> String {
        // Plain data only; the fallback is unreachable in practice.
        serde_json::to_string(self).unwrap_or_else(|_| {
            r#"{"type":"error","status":500,"message":"internal error"}"#.to_string()
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn client_frames_parse_from_snake_case_tags() {
        let id = Uuid::new_v4();
        let f: ClientFrame =
            serde_json::from_value(json!({"type": "join_room", "room_id": id})).unwrap();
        assert_eq!(f, ClientFrame::JoinRoom { room_id: id });

        let f: ClientFrame = serde_json::from_value(
            json!({"type": "send_message", "room_id": id, "content": "hi"}),
        )
        .unwrap();
        assert_eq!(
            f,
            ClientFrame::SendMessage {
                room_id: id,
                content: "hi".to_string()
            }
        );

        assert!(serde_json::from_value::<ClientFrame>(json!({"type": "nope"})).is_err());
    }

    #[test]
    fn server_frames_carry_type_tag() {
        let v: serde_json::Value = serde_json::from_str(&ServerFrame::Shutdown.to_json()).unwrap();
        assert_eq!(v, json!({"type": "shutdown"}));

        let v: serde_json::Value =
            serde_json::from_str(&ServerFrame::error(403, "Access denied").to_json()).unwrap();
        assert_eq!(
            v,
            json!({"type": "error", "status": 403, "message": "Access denied"})
        );
    }
}
