//! 在线状态与房间注册表
//!
//! `ChatHub` 独占持有所有连接相关的可变状态：连接表、用户在线映射、
//! 房间成员映射。每个映射由一把 `tokio::sync::RwLock` 保护，
//! 修改时先收集目标再投递，不在持锁期间 `await` 发送。
//! Hub 通过 `Arc` 注入各处理器，不是模块级单例。
//!
//! 在线映射保持"每用户至多一个连接"：同一用户建立第二个连接会覆盖映射，
//! 定向推送只到达最新连接，而房间广播仍到达该用户加入的所有连接。
//! 单会话还是多会话属于未定论的设计问题，这里保留覆盖语义并在日志中留痕。

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU64, Ordering};

use chrono::Utc;
use tokio::sync::mpsc;

use domain::{ChatMessage, ConnectionId, ConnectionInfo, RoomId, ServerEvent, UserId};

/// 注册表操作错误
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum HubError {
    #[error("connection not registered")]
    NotConnected,
    #[error("connection has not joined room {0}")]
    NotInRoom(RoomId),
}

struct ConnectionHandle {
    info: ConnectionInfo,
    sender: mpsc::UnboundedSender<ServerEvent>,
}

/// 在线状态与房间注册表
pub struct ChatHub {
    /// 全部活跃连接
    connections: tokio::sync::RwLock<HashMap<ConnectionId, ConnectionHandle>>,
    /// 用户 → 最新连接。每用户至多一条。
    presence: tokio::sync::RwLock<HashMap<UserId, ConnectionId>>,
    /// 房间 → 成员连接集合。与每个连接的 joined_rooms 保持对称。
    rooms: tokio::sync::RwLock<HashMap<RoomId, HashSet<ConnectionId>>>,
    /// 进程级消息 id 计数器。全局有序，单个房间内不一定连续。
    next_message_id: AtomicU64,
}

impl ChatHub {
    pub fn new() -> Self {
        Self {
            connections: tokio::sync::RwLock::new(HashMap::new()),
            presence: tokio::sync::RwLock::new(HashMap::new()),
            rooms: tokio::sync::RwLock::new(HashMap::new()),
            next_message_id: AtomicU64::new(0),
        }
    }

    /// 注册新连接并广播在线人数。
    /// 同一用户已有连接时覆盖其在线映射，旧连接仍保留在已加入的房间里。
    pub async fn register(
        &self,
        info: ConnectionInfo,
        sender: mpsc::UnboundedSender<ServerEvent>,
    ) {
        let connection_id = info.connection_id;
        let user_id = info.user_id;

        {
            let mut connections = self.connections.write().await;
            connections.insert(connection_id, ConnectionHandle { info, sender });
        }

        {
            let mut presence = self.presence.write().await;
            if let Some(previous) = presence.insert(user_id, connection_id) {
                tracing::warn!(
                    user_id = %user_id,
                    previous_connection = %previous,
                    new_connection = %connection_id,
                    "presence mapping overwritten by newer connection"
                );
            }
        }

        tracing::info!(connection_id = %connection_id, user_id = %user_id, "连接已注册");
        self.broadcast_online_count().await;
    }

    /// 加入房间并通知其他成员。重复加入是幂等的（不重复通知）。
    pub async fn join_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), HubError> {
        let (user_id, username, newly_joined) = {
            let mut connections = self.connections.write().await;
            let handle = connections
                .get_mut(&connection_id)
                .ok_or(HubError::NotConnected)?;
            handle.info.update_activity();
            (
                handle.info.user_id,
                handle.info.username.clone(),
                handle.info.join_room(room_id.clone()),
            )
        };

        if !newly_joined {
            return Ok(());
        }

        {
            let mut rooms = self.rooms.write().await;
            rooms
                .entry(room_id.clone())
                .or_default()
                .insert(connection_id);
        }

        // 两把锁之间可能插入 disconnect：它清理房间索引时本条目尚不存在，
        // 此后上面的插入会留下指向已移除连接的幽灵成员。复查注册状态，
        // 连接已不在则撤销刚插入的条目，且不广播 user-joined。
        let still_connected = self.connections.read().await.contains_key(&connection_id);
        if !still_connected {
            self.remove_from_room_index(connection_id, &room_id).await;
            return Err(HubError::NotConnected);
        }

        tracing::info!(connection_id = %connection_id, room_id = %room_id, "连接加入房间");

        self.send_to_room_except(
            &room_id,
            Some(connection_id),
            ServerEvent::UserJoined {
                room_id: room_id.clone(),
                user_id,
                username,
                joined_at: Utc::now(),
            },
        )
        .await;
        Ok(())
    }

    /// 离开房间并通知剩余成员。未加入的房间直接忽略。
    pub async fn leave_room(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
    ) -> Result<(), HubError> {
        let (user_id, username, was_member) = {
            let mut connections = self.connections.write().await;
            let handle = connections
                .get_mut(&connection_id)
                .ok_or(HubError::NotConnected)?;
            handle.info.update_activity();
            (
                handle.info.user_id,
                handle.info.username.clone(),
                handle.info.leave_room(&room_id),
            )
        };

        if !was_member {
            return Ok(());
        }

        self.remove_from_room_index(connection_id, &room_id).await;

        tracing::info!(connection_id = %connection_id, room_id = %room_id, "连接离开房间");

        self.send_to_room(
            &room_id,
            ServerEvent::UserLeft {
                room_id: room_id.clone(),
                user_id,
                username,
                left_at: Utc::now(),
            },
        )
        .await;
        Ok(())
    }

    /// 向房间内所有连接投递事件。尽力而为：
    /// 单个接收队列已关闭不影响其他接收者，接收者之间无顺序保证，
    /// 同一连接的事件保持发送顺序（底层是无界 FIFO 队列）。
    pub async fn send_to_room(&self, room_id: &RoomId, event: ServerEvent) -> usize {
        self.send_to_room_except(room_id, None, event).await
    }

    async fn send_to_room_except(
        &self,
        room_id: &RoomId,
        except: Option<ConnectionId>,
        event: ServerEvent,
    ) -> usize {
        let targets: Vec<ConnectionId> = {
            let rooms = self.rooms.read().await;
            match rooms.get(room_id) {
                Some(members) => members
                    .iter()
                    .copied()
                    .filter(|id| Some(*id) != except)
                    .collect(),
                None => return 0,
            }
        };

        let connections = self.connections.read().await;
        let mut delivered = 0;
        for target in targets {
            if let Some(handle) = connections.get(&target) {
                if handle.sender.send(event.clone()).is_ok() {
                    delivered += 1;
                }
            }
        }
        delivered
    }

    /// 定向推送给某个用户当前的在线连接（存在多连接时只到达最新一个）。
    pub async fn send_to_user(&self, user_id: UserId, event: ServerEvent) -> bool {
        let connection_id = {
            let presence = self.presence.read().await;
            match presence.get(&user_id) {
                Some(id) => *id,
                None => return false,
            }
        };

        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .map(|handle| handle.sender.send(event).is_ok())
            .unwrap_or(false)
    }

    /// 向所有连接广播
    pub async fn broadcast_all(&self, event: ServerEvent) {
        let connections = self.connections.read().await;
        for handle in connections.values() {
            let _ = handle.sender.send(event.clone());
        }
    }

    /// 发送房间消息：取进程级计数器的下一个值作为消息 id，
    /// 构造消息记录并向房间扇出（包括发送者本身）。
    pub async fn send_message(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        content: String,
        reply_to: Option<u64>,
    ) -> Result<ChatMessage, HubError> {
        let (user_id, username) = {
            let connections = self.connections.read().await;
            let handle = connections
                .get(&connection_id)
                .ok_or(HubError::NotConnected)?;
            if !handle.info.is_in_room(&room_id) {
                return Err(HubError::NotInRoom(room_id));
            }
            (handle.info.user_id, handle.info.username.clone())
        };

        let id = self.next_message_id.fetch_add(1, Ordering::Relaxed) + 1;
        let message = ChatMessage {
            id,
            room_id: room_id.clone(),
            sender_id: user_id,
            sender_username: username,
            content,
            reply_to,
            sent_at: Utc::now(),
        };

        self.send_to_room(
            &room_id,
            ServerEvent::NewMessage {
                message: message.clone(),
            },
        )
        .await;
        Ok(message)
    }

    /// 输入状态通知，发给房间内除本人以外的成员
    pub async fn typing(
        &self,
        connection_id: ConnectionId,
        room_id: RoomId,
        is_typing: bool,
    ) -> Result<(), HubError> {
        let (user_id, username) = {
            let connections = self.connections.read().await;
            let handle = connections
                .get(&connection_id)
                .ok_or(HubError::NotConnected)?;
            if !handle.info.is_in_room(&room_id) {
                return Err(HubError::NotInRoom(room_id));
            }
            (handle.info.user_id, handle.info.username.clone())
        };

        self.send_to_room_except(
            &room_id,
            Some(connection_id),
            ServerEvent::UserTyping {
                room_id: room_id.clone(),
                user_id,
                username,
                is_typing,
            },
        )
        .await;
        Ok(())
    }

    /// 断开连接：从所有已加入的房间移除并通知成员，
    /// 在线映射仅在仍指向本连接时移除（不清掉同一用户更新的连接），
    /// 最后广播在线人数。重复调用是幂等的。
    pub async fn disconnect(&self, connection_id: ConnectionId) {
        let handle = {
            let mut connections = self.connections.write().await;
            connections.remove(&connection_id)
        };
        let Some(handle) = handle else {
            return;
        };
        let info = handle.info;

        for room_id in &info.joined_rooms {
            self.remove_from_room_index(connection_id, room_id).await;
        }

        {
            let mut presence = self.presence.write().await;
            if presence.get(&info.user_id) == Some(&connection_id) {
                presence.remove(&info.user_id);
            }
        }

        for room_id in info.joined_rooms {
            self.send_to_room(
                &room_id,
                ServerEvent::UserLeft {
                    room_id: room_id.clone(),
                    user_id: info.user_id,
                    username: info.username.clone(),
                    left_at: Utc::now(),
                },
            )
            .await;
        }

        tracing::info!(connection_id = %connection_id, user_id = %info.user_id, "连接已断开，状态已清理");
        self.broadcast_online_count().await;
    }

    async fn remove_from_room_index(&self, connection_id: ConnectionId, room_id: &RoomId) {
        let mut rooms = self.rooms.write().await;
        if let Some(members) = rooms.get_mut(room_id) {
            members.remove(&connection_id);
            if members.is_empty() {
                rooms.remove(room_id);
            }
        }
    }

    async fn broadcast_online_count(&self) {
        let count = self.online_count().await;
        self.broadcast_all(ServerEvent::OnlineUsersUpdated { count })
            .await;
    }

    /// 当前连接数
    pub async fn online_count(&self) -> usize {
        self.connections.read().await.len()
    }

    /// 查询连接状态快照
    pub async fn connection(&self, connection_id: ConnectionId) -> Option<ConnectionInfo> {
        let connections = self.connections.read().await;
        connections
            .get(&connection_id)
            .map(|handle| handle.info.clone())
    }

    /// 查询用户的在线连接
    pub async fn presence_of(&self, user_id: UserId) -> Option<ConnectionId> {
        self.presence.read().await.get(&user_id).copied()
    }

    /// 查询房间成员
    pub async fn room_members(&self, room_id: &RoomId) -> Vec<ConnectionId> {
        let rooms = self.rooms.read().await;
        rooms
            .get(room_id)
            .map(|members| members.iter().copied().collect())
            .unwrap_or_default()
    }

    /// 计数器的当前值（最近分配的消息 id）
    pub fn current_message_id(&self) -> u64 {
        self.next_message_id.load(Ordering::Relaxed)
    }
}

impl Default for ChatHub {
    fn default() -> Self {
        Self::new()
    }
}
