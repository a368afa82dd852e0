//! Task mutations with real-time fan-out.
//!
//! Persistence sits behind [`TaskStore`]. [`TaskService`] runs each mutation
//! for the current session and, once it has committed, hands a change event
//! to the broadcaster on a detached task.

pub mod model;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::debug;

use crate::error::{TaskwireError, TaskwireResult};
use crate::event::{ChangeEvent, EntityRef, TaskCreated, TaskStatusChanged, TaskUpdated};
use crate::notifier::{spawn_broadcast, Broadcaster};
use crate::session::{SessionLookup, SessionUser};
use model::{NewTask, Task, TaskChanges};

/// Storage collaborator for tasks. Every call is scoped to the owning user.
#[async_trait]
pub trait TaskStore: Send + Sync {
    async fn create_task(&self, owner_id: &str, input: &NewTask) -> TaskwireResult<Task>;

    async fn update_task(&self, owner_id: &str, task_id: &str, changes: &TaskChanges) -> TaskwireResult<Task>;

    async fn update_task_status(&self, owner_id: &str, task_id: &str, status_id: &str) -> TaskwireResult<Task>;

    async fn delete_task(&self, owner_id: &str, task_id: &str) -> TaskwireResult<()>;
}

/// Runs task mutations and broadcasts what changed.
#[derive(Clone)]
pub struct TaskService {
    store: Arc<dyn TaskStore>,
    sessions: Arc<dyn SessionLookup>,
    broadcaster: Arc<dyn Broadcaster>,
}

impl TaskService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        sessions: Arc<dyn SessionLookup>,
        broadcaster: Arc<dyn Broadcaster>,
    ) -> Self {
        Self {
            store,
            sessions,
            broadcaster,
        }
    }

    async fn require_user(&self) -> TaskwireResult<SessionUser> {
        self.sessions
            .current_user()
            .await
            .ok_or(TaskwireError::Unauthorized)
    }

    fn emit(&self, user: SessionUser, event: ChangeEvent) {
        debug!(kind = %event.kind(), user_id = %user.id, "Scheduling broadcast");
        // Detached: the mutation's result does not depend on delivery.
        let _ = spawn_broadcast(self.broadcaster.clone(), Some(user), event);
    }

    /// Create a task.
    pub async fn create_task(&self, input: NewTask) -> TaskwireResult<Task> {
        if input.title.trim().is_empty() {
            return Err(TaskwireError::validation("task title must not be empty"));
        }
        let user = self.require_user().await?;
        let task = self.store.create_task(&user.id, &input).await?;

        self.emit(
            user,
            ChangeEvent::TaskCreated(TaskCreated {
                id: task.id.clone(),
                title: Some(task.title.clone()),
                status_id: Some(task.status_id.clone()),
            }),
        );
        Ok(task)
    }

    /// Apply a partial update.
    pub async fn update_task(&self, task_id: &str, changes: TaskChanges) -> TaskwireResult<Task> {
        let user = self.require_user().await?;
        let task = self.store.update_task(&user.id, task_id, &changes).await?;

        self.emit(
            user,
            ChangeEvent::TaskUpdated(TaskUpdated {
                id: task_id.to_string(),
                changes: changes.to_map(),
            }),
        );
        Ok(task)
    }

    /// Move a task to another status column.
    pub async fn update_task_status(&self, task_id: &str, status_id: &str) -> TaskwireResult<Task> {
        let user = self.require_user().await?;
        let task = self
            .store
            .update_task_status(&user.id, task_id, status_id)
            .await?;

        self.emit(
            user,
            ChangeEvent::TaskStatusChanged(TaskStatusChanged {
                id: task_id.to_string(),
                status_id: status_id.to_string(),
            }),
        );
        Ok(task)
    }

    /// Delete a task.
    pub async fn delete_task(&self, task_id: &str) -> TaskwireResult<()> {
        let user = self.require_user().await?;
        self.store.delete_task(&user.id, task_id).await?;

        self.emit(user, ChangeEvent::TaskDeleted(EntityRef::new(task_id)));
        Ok(())
    }
}
