//! Mock notification transport for testing

#![allow(dead_code)]

use async_trait::async_trait;
use mq_refinery::error::{Error, Result};
use mq_refinery::notify::{Notification, Notifier};
use std::sync::Mutex;

/// Records notifications; can be told to fail
#[derive(Default)]
pub struct MockNotifier {
    sent: Mutex<Vec<Notification>>,
    error: Mutex<Option<String>>,
}

impl MockNotifier {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `send` fail
    pub fn fail_send(&self, msg: &str) {
        *self.error.lock().unwrap() = Some(msg.to_string());
    }

    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }
}

#[async_trait]
impl Notifier for MockNotifier {
    async fn send(&self, notification: &Notification) -> Result<()> {
        let error = self.error.lock().unwrap().clone();
        if let Some(msg) = error {
            return Err(Error::Notify(msg));
        }
        self.sent.lock().unwrap().push(notification.clone());
        Ok(())
    }
}
