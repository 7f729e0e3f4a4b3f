// SPDX-FileCopyrightText: 2026 Stan Grams <sjg@haxx.space>
//
// SPDX-License-Identifier: BSD-2-Clause

//! Per-connection session bookkeeping.
//!
//! One entry per open socket. Each entry is written only by the handler
//! that owns the connection; the table itself exists so the listener can
//! inject it into handlers and the stats tick can count live sessions.

use std::collections::HashMap;
use std::net::SocketAddr;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// State of one tracker connection.
#[derive(Debug, Clone)]
pub struct Session {
    pub id: Uuid,
    pub peer: SocketAddr,
    /// Device id bound by the first successful login, if any.
    pub device_id: Option<String>,
    pub connected_at: DateTime<Utc>,
    pub last_activity: DateTime<Utc>,
}

/// All live sessions, keyed by connection id.
#[derive(Default)]
pub struct SessionTable {
    inner: Mutex<HashMap<Uuid, Session>>,
}

impl SessionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly accepted connection.
    pub fn open(&self, peer: SocketAddr) -> Uuid {
        let id = Uuid::new_v4();
        let now = Utc::now();
        let session = Session {
            id,
            peer,
            device_id: None,
            connected_at: now,
            last_activity: now,
        };
        self.lock().insert(id, session);
        id
    }

    /// Record the device identity asserted by a login frame.
    pub fn bind_device(&self, id: Uuid, device_id: &str) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.device_id = Some(device_id.to_string());
            session.last_activity = Utc::now();
        }
    }

    /// Re-arm the inactivity clock for a connection.
    pub fn touch(&self, id: Uuid) {
        if let Some(session) = self.lock().get_mut(&id) {
            session.last_activity = Utc::now();
        }
    }

    /// Drop the entry for a closed connection, returning its final state.
    pub fn close(&self, id: Uuid) -> Option<Session> {
        self.lock().remove(&id)
    }

    pub fn active_count(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<Uuid, Session>> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
