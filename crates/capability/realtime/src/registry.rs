//! 连接注册表：主表 + 房间索引 + 用户索引。

use crate::RealtimeError;
use crate::sink::ConnectionSink;
use api_contract::ConnectionStatsDto;
use domain::{DEFAULT_ROOM, now_epoch_ms};
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use tracing::{debug, info};

/// 连接句柄（进程内单调递增）。
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct ConnectionId(pub u64);

impl fmt::Display for ConnectionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "conn-{}", self.0)
    }
}

/// 连接元信息（对外只读快照）。
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ConnectionInfo {
    pub id: ConnectionId,
    pub user_id: Option<String>,
    pub room: String,
    pub connected_at_ms: i64,
    pub last_seen_ms: i64,
    pub messages_sent: u64,
    pub messages_received: u64,
    /// 为空表示接收全部传感器数据。
    pub subscriptions: HashSet<i64>,
}

/// 扇出快照中的一个接收方。
#[derive(Clone)]
pub struct Recipient {
    pub id: ConnectionId,
    pub sink: Arc<dyn ConnectionSink>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoomInfo {
    pub room: String,
    pub connections: usize,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserInfo {
    pub user_id: String,
    pub connections: usize,
}

struct Entry {
    info: ConnectionInfo,
    sink: Arc<dyn ConnectionSink>,
}

impl Entry {
    fn recipient(&self) -> Recipient {
        Recipient {
            id: self.info.id,
            sink: self.sink.clone(),
        }
    }
}

#[derive(Default)]
struct RegistryState {
    connections: HashMap<ConnectionId, Entry>,
    rooms: HashMap<String, HashSet<ConnectionId>>,
    users: HashMap<String, HashSet<ConnectionId>>,
    total_connections: u64,
    rooms_created: u64,
}

impl RegistryState {
    fn join_room(&mut self, room: &str, id: ConnectionId) {
        if !self.rooms.contains_key(room) {
            self.rooms_created += 1;
        }
        self.rooms.entry(room.to_string()).or_default().insert(id);
    }

    fn leave_room(&mut self, room: &str, id: ConnectionId) {
        if let Some(members) = self.rooms.get_mut(room) {
            members.remove(&id);
            if members.is_empty() {
                self.rooms.remove(room);
            }
        }
    }

    fn leave_user(&mut self, user_id: &str, id: ConnectionId) {
        if let Some(members) = self.users.get_mut(user_id) {
            members.remove(&id);
            if members.is_empty() {
                self.users.remove(user_id);
            }
        }
    }

    fn collect<'a>(&self, ids: impl IntoIterator<Item = &'a ConnectionId>) -> Vec<Recipient> {
        ids.into_iter()
            .filter_map(|id| self.connections.get(id))
            .map(Entry::recipient)
            .collect()
    }
}

/// 连接注册表。
///
/// 主表与两个二级索引由同一把 `RwLock` 保护：每个变更只取一次写锁，
/// 快照只取一次读锁，因此快照总是某一时刻的一致视图。
/// 发送端的 `close()` 总是在锁外调用。
pub struct ConnectionRegistry {
    state: RwLock<RegistryState>,
    next_id: AtomicU64,
    messages_sent: AtomicU64,
    messages_failed: AtomicU64,
    closing: AtomicBool,
}

impl Default for ConnectionRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionRegistry {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(RegistryState::default()),
            next_id: AtomicU64::new(1),
            messages_sent: AtomicU64::new(0),
            messages_failed: AtomicU64::new(0),
            closing: AtomicBool::new(false),
        }
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, RegistryState>, RealtimeError> {
        self.state.read().map_err(|_| RealtimeError::Poisoned)
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, RegistryState>, RealtimeError> {
        self.state.write().map_err(|_| RealtimeError::Poisoned)
    }

    /// 注册新连接。房间为空时归入默认房间。
    pub fn register(
        &self,
        sink: Arc<dyn ConnectionSink>,
        user_id: Option<String>,
        room: Option<String>,
    ) -> Result<ConnectionInfo, RealtimeError> {
        let room = room
            .map(|room| room.trim().to_string())
            .filter(|room| !room.is_empty())
            .unwrap_or_else(|| DEFAULT_ROOM.to_string());
        let user_id = user_id.filter(|user| !user.is_empty());
        let id = ConnectionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let now = now_epoch_ms();
        let info = ConnectionInfo {
            id,
            user_id: user_id.clone(),
            room: room.clone(),
            connected_at_ms: now,
            last_seen_ms: now,
            messages_sent: 0,
            messages_received: 0,
            subscriptions: HashSet::new(),
        };

        {
            let mut state = self.write()?;
            // close_all 先置位再取写锁，锁内判断才不会漏掉并发关闭。
            if self.is_closing() {
                drop(state);
                sink.close();
                return Err(RealtimeError::Closed);
            }
            state.connections.insert(
                id,
                Entry {
                    info: info.clone(),
                    sink,
                },
            );
            state.join_room(&room, id);
            if let Some(user_id) = &user_id {
                state.users.entry(user_id.clone()).or_default().insert(id);
            }
            state.total_connections += 1;
        }

        iot_telemetry::record_connection_opened();
        info!(
            target: "iot.realtime",
            connection_id = id.0,
            room = %room,
            user_id = user_id.as_deref().unwrap_or(""),
            "connection_registered"
        );
        Ok(info)
    }

    /// 注销连接，从三处结构中一次性移除。重复注销返回 false。
    pub fn unregister(&self, id: ConnectionId) -> bool {
        let removed = match self.write() {
            Ok(mut state) => match state.connections.remove(&id) {
                Some(entry) => {
                    state.leave_room(&entry.info.room, id);
                    if let Some(user_id) = &entry.info.user_id {
                        state.leave_user(user_id, id);
                    }
                    Some(entry)
                }
                None => None,
            },
            Err(_) => None,
        };

        let Some(entry) = removed else {
            return false;
        };
        entry.sink.close();
        iot_telemetry::record_connection_closed();
        info!(
            target: "iot.realtime",
            connection_id = id.0,
            room = %entry.info.room,
            "connection_unregistered"
        );
        true
    }

    /// 切换房间，返回原房间。
    pub fn change_room(&self, id: ConnectionId, room: &str) -> Result<String, RealtimeError> {
        let room = room.trim();
        if room.is_empty() {
            return Err(RealtimeError::EmptyRoom);
        }
        let mut state = self.write()?;
        let previous = match state.connections.get_mut(&id) {
            Some(entry) => std::mem::replace(&mut entry.info.room, room.to_string()),
            None => return Err(RealtimeError::UnknownConnection(id)),
        };
        if previous != room {
            state.leave_room(&previous, id);
            state.join_room(room, id);
        }
        drop(state);
        debug!(target: "iot.realtime", connection_id = id.0, from = %previous, to = %room, "room_changed");
        Ok(previous)
    }

    pub fn subscribe(&self, id: ConnectionId, sensor_ids: &[i64]) -> Result<(), RealtimeError> {
        let mut state = self.write()?;
        let entry = state
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::UnknownConnection(id))?;
        entry.info.subscriptions.extend(sensor_ids.iter().copied());
        Ok(())
    }

    pub fn unsubscribe(&self, id: ConnectionId, sensor_ids: &[i64]) -> Result<(), RealtimeError> {
        let mut state = self.write()?;
        let entry = state
            .connections
            .get_mut(&id)
            .ok_or(RealtimeError::UnknownConnection(id))?;
        for sensor_id in sensor_ids {
            entry.info.subscriptions.remove(sensor_id);
        }
        Ok(())
    }

    /// 记录一次入站控制帧。
    pub fn touch(&self, id: ConnectionId) {
        if let Ok(mut state) = self.write() {
            if let Some(entry) = state.connections.get_mut(&id) {
                entry.info.last_seen_ms = now_epoch_ms();
                entry.info.messages_received += 1;
            }
        }
    }

    pub(crate) fn record_delivered(&self, ids: &[ConnectionId]) {
        if ids.is_empty() {
            return;
        }
        self.messages_sent
            .fetch_add(ids.len() as u64, Ordering::Relaxed);
        if let Ok(mut state) = self.write() {
            for id in ids {
                if let Some(entry) = state.connections.get_mut(id) {
                    entry.info.messages_sent += 1;
                }
            }
        }
    }

    pub(crate) fn record_failed(&self, count: usize) {
        self.messages_failed
            .fetch_add(count as u64, Ordering::Relaxed);
    }

    pub fn snapshot_all(&self, exclude: &[ConnectionId]) -> Vec<Recipient> {
        match self.read() {
            Ok(state) => state
                .connections
                .values()
                .filter(|entry| !exclude.contains(&entry.info.id))
                .map(Entry::recipient)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot_room(&self, room: &str) -> Vec<Recipient> {
        match self.read() {
            Ok(state) => match state.rooms.get(room) {
                Some(members) => state.collect(members),
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot_user(&self, user_id: &str) -> Vec<Recipient> {
        match self.read() {
            Ok(state) => match state.users.get(user_id) {
                Some(members) => state.collect(members),
                None => Vec::new(),
            },
            Err(_) => Vec::new(),
        }
    }

    /// 订阅集合为空或包含该传感器的连接。
    pub fn snapshot_sensor(&self, sensor_id: i64) -> Vec<Recipient> {
        match self.read() {
            Ok(state) => state
                .connections
                .values()
                .filter(|entry| {
                    entry.info.subscriptions.is_empty()
                        || entry.info.subscriptions.contains(&sensor_id)
                })
                .map(Entry::recipient)
                .collect(),
            Err(_) => Vec::new(),
        }
    }

    pub fn snapshot_one(&self, id: ConnectionId) -> Option<Recipient> {
        self.read()
            .ok()
            .and_then(|state| state.connections.get(&id).map(Entry::recipient))
    }

    pub fn connection(&self, id: ConnectionId) -> Option<ConnectionInfo> {
        self.read()
            .ok()
            .and_then(|state| state.connections.get(&id).map(|entry| entry.info.clone()))
    }

    pub fn stats(&self) -> ConnectionStatsDto {
        let mut stats = ConnectionStatsDto {
            messages_sent: self.messages_sent.load(Ordering::Relaxed),
            messages_failed: self.messages_failed.load(Ordering::Relaxed),
            ..ConnectionStatsDto::default()
        };
        if let Ok(state) = self.read() {
            stats.total_connections = state.total_connections;
            stats.active_connections = state.connections.len();
            stats.active_rooms = state.rooms.len();
            stats.active_users = state.users.len();
            stats.rooms_created = state.rooms_created;
        }
        stats
    }

    pub fn room_info(&self) -> Vec<RoomInfo> {
        let mut rooms: Vec<RoomInfo> = match self.read() {
            Ok(state) => state
                .rooms
                .iter()
                .map(|(room, members)| RoomInfo {
                    room: room.clone(),
                    connections: members.len(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        rooms.sort_by(|a, b| a.room.cmp(&b.room));
        rooms
    }

    pub fn user_info(&self) -> Vec<UserInfo> {
        let mut users: Vec<UserInfo> = match self.read() {
            Ok(state) => state
                .users
                .iter()
                .map(|(user_id, members)| UserInfo {
                    user_id: user_id.clone(),
                    connections: members.len(),
                })
                .collect(),
            Err(_) => Vec::new(),
        };
        users.sort_by(|a, b| a.user_id.cmp(&b.user_id));
        users
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::Acquire)
    }

    /// 关闭全部连接并拒绝后续注册，返回关闭的连接数。
    pub fn close_all(&self) -> usize {
        self.closing.store(true, Ordering::Release);
        let drained: Vec<Entry> = match self.write() {
            Ok(mut state) => {
                state.rooms.clear();
                state.users.clear();
                state.connections.drain().map(|(_, entry)| entry).collect()
            }
            Err(_) => Vec::new(),
        };
        for entry in &drained {
            entry.sink.close();
            iot_telemetry::record_connection_closed();
        }
        info!(target: "iot.realtime", closed = drained.len(), "registry_closed");
        drained.len()
    }

    /// 校验主表与二级索引互相一致。
    #[cfg(test)]
    pub(crate) fn assert_consistent(&self) {
        let state = self.state.read().expect("registry lock");
        for (id, entry) in &state.connections {
            assert_eq!(*id, entry.info.id);
            assert!(state.rooms.get(&entry.info.room).is_some_and(|m| m.contains(id)));
            if let Some(user_id) = &entry.info.user_id {
                assert!(state.users.get(user_id).is_some_and(|m| m.contains(id)));
            }
        }
        for (room, members) in &state.rooms {
            assert!(!members.is_empty());
            for id in members {
                assert_eq!(state.connections.get(id).map(|e| e.info.room.as_str()), Some(room.as_str()));
            }
        }
        for (user_id, members) in &state.users {
            assert!(!members.is_empty());
            for id in members {
                let owner = state.connections.get(id).and_then(|e| e.info.user_id.as_deref());
                assert_eq!(owner, Some(user_id.as_str()));
            }
        }
    }
}
