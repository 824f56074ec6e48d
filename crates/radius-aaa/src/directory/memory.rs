//! In-memory directory seeded from the configuration file

use super::{NasDirectory, SubscriberDirectory};
use crate::config::Config;
use crate::error::StoreError;
use crate::models::{Nas, Subscriber, SubscriberUpdate};
use async_trait::async_trait;
use dashmap::DashMap;
use std::net::IpAddr;

/// NAS and subscriber records held in concurrent maps.
#[derive(Debug, Default)]
pub struct MemoryDirectory {
    nas: DashMap<IpAddr, Nas>,
    subscribers: DashMap<String, Subscriber>,
}

impl MemoryDirectory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_config(config: &Config) -> Self {
        let directory = Self::new();
        for nas in &config.nas {
            directory.add_nas(nas.clone());
        }
        for subscriber in &config.subscribers {
            directory.add_subscriber(subscriber.clone());
        }
        directory
    }

    pub fn add_nas(&self, nas: Nas) {
        self.nas.insert(nas.ipaddr, nas);
    }

    pub fn add_subscriber(&self, subscriber: Subscriber) {
        self.subscribers.insert(subscriber.username.clone(), subscriber);
    }

    /// Snapshot of a subscriber record.
    pub fn subscriber(&self, username: &str) -> Option<Subscriber> {
        self.subscribers.get(username).map(|entry| entry.clone())
    }

    pub fn nas_count(&self) -> usize {
        self.nas.len()
    }

    pub fn subscriber_count(&self) -> usize {
        self.subscribers.len()
    }
}

#[async_trait]
impl NasDirectory for MemoryDirectory {
    async fn find_nas_by_ip(&self, ip: IpAddr) -> Result<Option<Nas>, StoreError> {
        Ok(self.nas.get(&ip).map(|entry| entry.clone()))
    }

    async fn find_nas_by_identifier(&self, identifier: &str) -> Result<Option<Nas>, StoreError> {
        Ok(self
            .nas
            .iter()
            .find(|entry| entry.identifier == identifier)
            .map(|entry| entry.clone()))
    }
}

#[async_trait]
impl SubscriberDirectory for MemoryDirectory {
    async fn find_by_username(&self, username: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self.subscriber(username))
    }

    async fn find_by_mac(&self, macaddr: &str) -> Result<Option<Subscriber>, StoreError> {
        Ok(self
            .subscribers
            .iter()
            .find(|entry| entry.macaddr.eq_ignore_ascii_case(macaddr))
            .map(|entry| entry.clone()))
    }

    async fn update_fields(&self, username: &str, update: &SubscriberUpdate) -> Result<(), StoreError> {
        match self.subscribers.get_mut(username) {
            Some(mut entry) => {
                entry.apply(update);
                Ok(())
            }
            None => Err(StoreError::Unavailable(format!("subscriber {} not found", username))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_update_fields() {
        let dir = MemoryDirectory::new();
        dir.add_subscriber(Subscriber::new("alice"));

        let update = SubscriberUpdate {
            macaddr: Some("aa:bb:cc:dd:ee:ff".to_string()),
            vlanid1: Some(100),
            vlanid2: None,
        };
        dir.update_fields("alice", &update).await.unwrap();

        let alice = dir.subscriber("alice").unwrap();
        assert_eq!(alice.macaddr, "aa:bb:cc:dd:ee:ff");
        assert_eq!(alice.vlanid1, 100);
        assert_eq!(alice.vlanid2, 0);

        assert!(dir.update_fields("ghost", &update).await.is_err());
    }

    #[tokio::test]
    async fn test_find_by_mac_is_case_insensitive() {
        let dir = MemoryDirectory::new();
        let mut sub = Subscriber::new("cam-1");
        sub.macaddr = "AA:BB:CC:DD:EE:01".to_string();
        dir.add_subscriber(sub);

        let found = dir.find_by_mac("aa:bb:cc:dd:ee:01").await.unwrap();
        assert_eq!(found.unwrap().username, "cam-1");
    }

    #[tokio::test]
    async fn test_bind_verification_unsupported() {
        let dir = MemoryDirectory::new();
        assert!(matches!(
            dir.verify_bind("uid=a", "pw").await,
            Err(StoreError::Unsupported(_))
        ));
    }

    #[test]
    fn test_from_config() {
        let config = Config::example();
        let dir = MemoryDirectory::from_config(&config);
        assert_eq!(dir.nas_count(), 1);
        assert_eq!(dir.subscriber_count(), 1);
        assert!(dir.subscriber("alice").is_some());
    }
}
