//! `directus_users` as a service of its own.
//!
//! Integrity requests are attached by the items pipeline for every write to
//! users and roles, so each `ItemsService` operation is exposed as-is.

use std::ops::Deref;

use models::schema::USERS_COLLECTION;

use crate::context::ServiceContext;
use crate::items::ItemsService;
use crate::permissions::Accountability;

#[derive(Clone)]
pub struct UsersService {
    items: ItemsService,
}

impl UsersService {
    pub fn new(services: ServiceContext) -> Self { Self { items: ItemsService::new(USERS_COLLECTION, services) } }

    pub fn with_accountability(mut self, accountability: Accountability) -> Self {
        self.items = self.items.with_accountability(accountability);
        self
    }

    pub fn items(&self) -> &ItemsService { &self.items }
}

impl Deref for UsersService {
    type Target = ItemsService;

    fn deref(&self) -> &ItemsService { &self.items }
}
