//! 事件桥
//!
//! 为非 WebSocket 入口（REST 处理器、后台任务）提供统一的实时事件出口。
//! 桥在进程启动早期即可被引用，但在 `initialize` 注入 `ChatHub` 之前
//! 所有发布调用都是静默的空操作，只留一条 debug 日志。
//! 注入通过 `OnceCell` 完成，只生效一次，重复注入会被忽略并告警。
//! 桥本身经由 `Arc` 注入处理器，不提供进程级单例。

use std::sync::Arc;

use once_cell::sync::OnceCell;

use domain::{RoomId, ServerEvent, UserId};

use crate::hub::ChatHub;

/// 实时事件桥
pub struct EventBridge {
    hub: OnceCell<Arc<ChatHub>>,
}

impl EventBridge {
    pub fn new() -> Self {
        Self {
            hub: OnceCell::new(),
        }
    }

    /// 注入 Hub，使桥开始实际投递。只允许注入一次。
    pub fn initialize(&self, hub: Arc<ChatHub>) {
        if self.hub.set(hub).is_err() {
            tracing::warn!("event bridge already initialized, ignoring duplicate hub");
        }
    }

    fn hub(&self) -> Option<&Arc<ChatHub>> {
        let hub = self.hub.get();
        if hub.is_none() {
            tracing::debug!("event bridge not initialized, dropping event");
        }
        hub
    }

    async fn emit(&self, room: Option<&RoomId>, event: ServerEvent) {
        let Some(hub) = self.hub() else { return };
        match room {
            Some(room_id) => {
                hub.send_to_room(room_id, event).await;
            }
            None => hub.broadcast_all(event).await,
        }
    }

    async fn emit_to_user(&self, user_id: UserId, event: ServerEvent) {
        let Some(hub) = self.hub() else { return };
        hub.send_to_user(user_id, event).await;
    }

    /// 资源创建通知。`room` 为空时全局广播。
    pub async fn resource_created(
        &self,
        resource: impl Into<String>,
        payload: serde_json::Value,
        room: Option<&RoomId>,
    ) {
        self.emit(
            room,
            ServerEvent::ResourceCreated {
                resource: resource.into(),
                payload,
            },
        )
        .await;
    }

    pub async fn resource_updated(
        &self,
        resource: impl Into<String>,
        payload: serde_json::Value,
        room: Option<&RoomId>,
    ) {
        self.emit(
            room,
            ServerEvent::ResourceUpdated {
                resource: resource.into(),
                payload,
            },
        )
        .await;
    }

    pub async fn resource_deleted(
        &self,
        resource: impl Into<String>,
        payload: serde_json::Value,
        room: Option<&RoomId>,
    ) {
        self.emit(
            room,
            ServerEvent::ResourceDeleted {
                resource: resource.into(),
                payload,
            },
        )
        .await;
    }

    pub async fn reaction_added(
        &self,
        room: &RoomId,
        message_id: u64,
        user_id: UserId,
        emoji: impl Into<String>,
    ) {
        self.emit(
            Some(room),
            ServerEvent::ReactionAdded {
                room_id: room.clone(),
                message_id,
                user_id,
                emoji: emoji.into(),
            },
        )
        .await;
    }

    pub async fn reaction_removed(
        &self,
        room: &RoomId,
        message_id: u64,
        user_id: UserId,
        emoji: impl Into<String>,
    ) {
        self.emit(
            Some(room),
            ServerEvent::ReactionRemoved {
                room_id: room.clone(),
                message_id,
                user_id,
                emoji: emoji.into(),
            },
        )
        .await;
    }

    /// 权限变更只推送给当事用户本人
    pub async fn permission_changed(&self, user_id: UserId, payload: serde_json::Value) {
        self.emit_to_user(user_id, ServerEvent::PermissionChanged { user_id, payload })
            .await;
    }

    pub async fn read_receipt(&self, room: &RoomId, user_id: UserId, message_id: u64) {
        self.emit(
            Some(room),
            ServerEvent::ReadReceipt {
                room_id: room.clone(),
                user_id,
                message_id,
            },
        )
        .await;
    }

    /// 私信推送给接收者的在线连接
    pub async fn private_message(
        &self,
        recipient: UserId,
        sender_id: UserId,
        payload: serde_json::Value,
    ) {
        self.emit_to_user(recipient, ServerEvent::PrivateMessage { sender_id, payload })
            .await;
    }

    pub async fn private_message_read(
        &self,
        sender: UserId,
        reader_id: UserId,
        message_id: u64,
    ) {
        self.emit_to_user(
            sender,
            ServerEvent::PrivateMessageRead {
                reader_id,
                message_id,
            },
        )
        .await;
    }
}

impl Default for EventBridge {
    fn default() -> Self {
        Self::new()
    }
}
