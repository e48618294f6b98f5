//! The blog's entities: schema, access policy and typed record for each.

pub mod post;
pub mod user;

pub use post::Post;
pub use user::User;

use crate::registry::EntityRegistry;

/// Registry with every entity the service exposes
pub fn registry() -> EntityRegistry {
    EntityRegistry::new()
        .register(user::schema())
        .register(post::schema())
}
