//! In-memory user storage.
//!
//! [`UserStore`] owns the ordered user collection shared by the CRUD handlers
//! and every pagination session. Each operation takes the lock only for its
//! own duration; in particular [`UserStore::slice`] reads the collection as it
//! is *now*, so a session sees writes that land between two of its chunks.

use parking_lot::RwLock;
use rand::{Rng, distr::Alphanumeric};
use userhub_core::{
    Error, Result,
    pagination::PageDescriptor,
    proto::{CreateUserDto, SocialMedia, UpdateUserDto, User},
};
use uuid::Uuid;

#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<Vec<User>>,
}

impl UserStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a store holding `count` users with random credentials.
    pub fn seeded(count: usize) -> Self {
        let store = Self::new();
        let mut rng = rand::rng();
        for _ in 0..count {
            let username: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(10)
                .map(char::from)
                .collect();
            let password: String = (&mut rng)
                .sample_iter(Alphanumeric)
                .take(16)
                .map(char::from)
                .collect();
            store.create(CreateUserDto {
                username: username.to_lowercase(),
                password,
                age: rng.random_range(18..=99),
            });
        }
        store
    }

    /// Appends a new, unsubscribed user with a fresh id.
    pub fn create(&self, dto: CreateUserDto) -> User {
        let user = User {
            id: Uuid::new_v4().to_string(),
            username: dto.username,
            password: dto.password,
            age: dto.age,
            subscribed: false,
            social_media: Some(SocialMedia::default()),
        };
        self.users.write().push(user.clone());
        user
    }

    /// Returns every user in insertion order.
    pub fn find_all(&self) -> Vec<User> {
        self.users.read().clone()
    }

    pub fn find_one(&self, id: &str) -> Result<User> {
        self.users
            .read()
            .iter()
            .find(|user| user.id == id)
            .cloned()
            .ok_or_else(|| not_found(id))
    }

    /// Merges `dto` into the stored user. Only fields present in the update
    /// are replaced.
    pub fn update(&self, dto: UpdateUserDto) -> Result<User> {
        let mut users = self.users.write();
        let user = users
            .iter_mut()
            .find(|user| user.id == dto.id)
            .ok_or_else(|| not_found(&dto.id))?;
        if let Some(social_media) = dto.social_media {
            user.social_media = Some(social_media);
        }
        Ok(user.clone())
    }

    pub fn remove(&self, id: &str) -> Result<User> {
        let mut users = self.users.write();
        let index = users
            .iter()
            .position(|user| user.id == id)
            .ok_or_else(|| not_found(id))?;
        Ok(users.remove(index))
    }

    pub fn len(&self) -> usize {
        self.users.read().len()
    }

    /// Copies out the users selected by `descriptor`, clamped to the current
    /// length of the collection.
    pub fn slice(&self, descriptor: &PageDescriptor) -> Vec<User> {
        let users = self.users.read();
        users[descriptor.bounds(users.len())].to_vec()
    }
}

fn not_found(id: &str) -> Error {
    Error::NotFound { id: id.to_string() }
}
