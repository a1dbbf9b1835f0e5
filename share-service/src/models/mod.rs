//! Persisted entities for the sharing pipeline.

mod invitation;
mod outbox;
mod resource;

pub use invitation::{AccessCode, Invitation, InvitationStatus};
pub use outbox::OutboxEmail;
pub use resource::{AccessLevel, ResourceScope, ResourceType};
