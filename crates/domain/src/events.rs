//! WebSocket 协议事件
//!
//! 客户端与服务端之间的全部消息类型。序列化使用 `type` 字段作为判别标签，
//! 事件名为 kebab-case，字段名为 camelCase。

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::entities::message::ChatMessage;
use crate::value_objects::{RoomId, UserId};

/// 客户端发往服务端的消息
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ClientEvent {
    /// 加入房间
    JoinRoom { room_id: RoomId },
    /// 离开房间
    LeaveRoom { room_id: RoomId },
    /// 向房间发送消息
    SendMessage {
        room_id: RoomId,
        content: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        reply_to: Option<u64>,
    },
    /// 输入状态
    Typing { room_id: RoomId, is_typing: bool },
}

/// 服务端推送给客户端的事件
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "kebab-case", rename_all_fields = "camelCase")]
pub enum ServerEvent {
    /// 用户加入房间（通知房间内其他成员）
    UserJoined {
        room_id: RoomId,
        user_id: UserId,
        username: String,
        joined_at: DateTime<Utc>,
    },
    /// 用户离开房间
    UserLeft {
        room_id: RoomId,
        user_id: UserId,
        username: String,
        left_at: DateTime<Utc>,
    },
    /// 房间新消息
    NewMessage {
        #[serde(flatten)]
        message: ChatMessage,
    },
    /// 输入状态变更
    UserTyping {
        room_id: RoomId,
        user_id: UserId,
        username: String,
        is_typing: bool,
    },
    /// 在线人数更新（广播给所有连接）
    OnlineUsersUpdated { count: usize },
    /// REST 侧资源创建
    ResourceCreated {
        resource: String,
        payload: serde_json::Value,
    },
    /// REST 侧资源更新
    ResourceUpdated {
        resource: String,
        payload: serde_json::Value,
    },
    /// REST 侧资源删除
    ResourceDeleted {
        resource: String,
        payload: serde_json::Value,
    },
    /// 消息表情回应新增
    ReactionAdded {
        room_id: RoomId,
        message_id: u64,
        user_id: UserId,
        emoji: String,
    },
    /// 消息表情回应移除
    ReactionRemoved {
        room_id: RoomId,
        message_id: u64,
        user_id: UserId,
        emoji: String,
    },
    /// 权限变更（定向推送给受影响用户）
    PermissionChanged {
        user_id: UserId,
        payload: serde_json::Value,
    },
    /// 已读回执
    ReadReceipt {
        room_id: RoomId,
        user_id: UserId,
        message_id: u64,
    },
    /// 私信（定向推送给接收者）
    PrivateMessage {
        sender_id: UserId,
        payload: serde_json::Value,
    },
    /// 私信已读（定向推送给发送者）
    PrivateMessageRead {
        reader_id: UserId,
        message_id: u64,
    },
    /// 错误
    Error { code: String, message: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_client_event_wire_format() {
        let json = r#"{"type":"send-message","roomId":"42","content":"hello"}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::SendMessage {
                room_id: RoomId::from("42"),
                content: "hello".to_string(),
                reply_to: None,
            }
        );

        let json = r#"{"type":"typing","roomId":"42","isTyping":true}"#;
        let event: ClientEvent = serde_json::from_str(json).unwrap();
        assert_eq!(
            event,
            ClientEvent::Typing {
                room_id: RoomId::from("42"),
                is_typing: true,
            }
        );
    }

    #[test]
    fn test_server_event_wire_format() {
        let event = ServerEvent::OnlineUsersUpdated { count: 3 };
        let value = serde_json::to_value(&event).unwrap();
        assert_eq!(value["type"], "online-users-updated");
        assert_eq!(value["count"], 3);
    }

    #[test]
    fn test_new_message_is_flattened() {
        let message = ChatMessage {
            id: 7,
            room_id: RoomId::from("42"),
            sender_id: UserId::random(),
            sender_username: "alice".to_string(),
            content: "hello".to_string(),
            reply_to: None,
            sent_at: Utc::now(),
        };
        let value = serde_json::to_value(ServerEvent::NewMessage { message }).unwrap();
        assert_eq!(value["type"], "new-message");
        assert_eq!(value["content"], "hello");
        assert_eq!(value["id"], 7);
        assert_eq!(value["roomId"], "42");
    }
}
