//! WebSocket 连接实体
//!
//! 连接由在线状态注册表独占拥有：握手成功时创建，断开时销毁。

use std::collections::HashSet;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::value_objects::{ConnectionId, RoomId, UserId};

/// 单个连接的状态
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionInfo {
    /// 连接唯一标识
    pub connection_id: ConnectionId,
    /// 连接所属用户
    pub user_id: UserId,
    /// 用户名（用于房间通知）
    pub username: String,
    /// 已加入的房间集合，与注册表的房间成员映射保持对称
    pub joined_rooms: HashSet<RoomId>,
    /// 建立时间
    pub connected_at: DateTime<Utc>,
    /// 最后活动时间
    pub last_active: DateTime<Utc>,
}

impl ConnectionInfo {
    pub fn new(user_id: UserId, username: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            connection_id: ConnectionId::random(),
            user_id,
            username: username.into(),
            joined_rooms: HashSet::new(),
            connected_at: now,
            last_active: now,
        }
    }

    /// 加入房间。重复加入同一房间是幂等的，返回是否真正新增。
    pub fn join_room(&mut self, room_id: RoomId) -> bool {
        self.joined_rooms.insert(room_id)
    }

    /// 离开房间。未加入的房间直接忽略，返回是否真正移除。
    pub fn leave_room(&mut self, room_id: &RoomId) -> bool {
        self.joined_rooms.remove(room_id)
    }

    pub fn is_in_room(&self, room_id: &RoomId) -> bool {
        self.joined_rooms.contains(room_id)
    }

    pub fn room_count(&self) -> usize {
        self.joined_rooms.len()
    }

    pub fn update_activity(&mut self) {
        self.last_active = Utc::now();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_join_and_leave_room() {
        let mut conn = ConnectionInfo::new(UserId::random(), "testuser");
        let room = RoomId::from("42");

        assert!(conn.join_room(room.clone()));
        assert!(conn.is_in_room(&room));
        assert_eq!(conn.room_count(), 1);

        // 重复加入幂等
        assert!(!conn.join_room(room.clone()));
        assert_eq!(conn.room_count(), 1);

        assert!(conn.leave_room(&room));
        assert!(!conn.is_in_room(&room));

        // 离开未加入的房间幂等
        assert!(!conn.leave_room(&room));
    }
}
