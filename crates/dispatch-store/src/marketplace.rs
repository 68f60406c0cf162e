//! Users and jobs stored as two JSON arrays.

use crate::document::{load, save};
use crate::keys;
use async_trait::async_trait;
use dispatch_types::{Job, KvStore, MarketplaceStore, StoreError, User};
use std::sync::Arc;
use tokio::sync::Mutex;

pub struct KvMarketplaceStore {
    kv: Arc<dyn KvStore>,
    write_lock: Mutex<()>,
}

impl KvMarketplaceStore {
    pub fn new(kv: Arc<dyn KvStore>) -> Self {
        Self {
            kv,
            write_lock: Mutex::new(()),
        }
    }
}

#[async_trait]
impl MarketplaceStore for KvMarketplaceStore {
    async fn get_users(&self) -> Result<Vec<User>, StoreError> {
        load(self.kv.as_ref(), keys::USERS).await
    }

    async fn save_user(&self, user: &User) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut users = self.get_users().await?;
        match users.iter_mut().find(|u| u.id == user.id) {
            Some(existing) => *existing = user.clone(),
            None => users.push(user.clone()),
        }
        save(self.kv.as_ref(), keys::USERS, &users).await
    }

    async fn get_jobs(&self) -> Result<Vec<Job>, StoreError> {
        load(self.kv.as_ref(), keys::JOBS).await
    }

    async fn get_job_by_id(&self, id: &str) -> Result<Option<Job>, StoreError> {
        Ok(self.get_jobs().await?.into_iter().find(|j| j.id == id))
    }

    async fn save_job(&self, job: &Job) -> Result<(), StoreError> {
        let _guard = self.write_lock.lock().await;
        let mut jobs = self.get_jobs().await?;
        match jobs.iter_mut().find(|j| j.id == job.id) {
            Some(existing) => *existing = job.clone(),
            None => jobs.push(job.clone()),
        }
        save(self.kv.as_ref(), keys::JOBS, &jobs).await
    }
}
