//! In-memory post store.

use async_trait::async_trait;
use parking_lot::RwLock;
use shared_types::{Post, PostId, UserId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};

use crate::error::ServiceError;
use crate::ports::PostRepository;

#[derive(Debug)]
pub struct InMemoryPostRepository {
    posts: RwLock<HashMap<PostId, Post>>,
    available: AtomicBool,
}

impl Default for InMemoryPostRepository {
    fn default() -> Self {
        Self {
            posts: RwLock::new(HashMap::new()),
            available: AtomicBool::new(true),
        }
    }
}

impl InMemoryPostRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulate a database outage.
    pub fn set_available(&self, available: bool) {
        self.available.store(available, Ordering::SeqCst);
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.posts.read().len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn online(&self) -> Result<(), ServiceError> {
        if self.available.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(ServiceError::Infrastructure("post store offline".into()))
        }
    }
}

#[async_trait]
impl PostRepository for InMemoryPostRepository {
    async fn insert(&self, post: Post) -> Result<(), ServiceError> {
        self.online()?;
        self.posts.write().insert(post.id.clone(), post);
        Ok(())
    }

    async fn get(&self, id: &PostId) -> Result<Option<Post>, ServiceError> {
        self.online()?;
        Ok(self.posts.read().get(id).cloned())
    }

    async fn delete_owned(
        &self,
        id: &PostId,
        owner: &UserId,
    ) -> Result<Option<Post>, ServiceError> {
        self.online()?;
        let mut posts = self.posts.write();
        match posts.get(id) {
            Some(post) if &post.user_id == owner => Ok(posts.remove(id)),
            _ => Ok(None),
        }
    }

    async fn page(&self, offset: usize, limit: usize) -> Result<(Vec<Post>, usize), ServiceError> {
        self.online()?;
        let posts = self.posts.read();
        let mut all: Vec<&Post> = posts.values().collect();
        all.sort_by(|a, b| b.created_at.cmp(&a.created_at).then_with(|| a.id.cmp(&b.id)));
        let page = all.into_iter().skip(offset).take(limit).cloned().collect();
        Ok((page, posts.len()))
    }
}
