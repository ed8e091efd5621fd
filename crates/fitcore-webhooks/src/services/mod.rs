//! Business logic services for the webhook subsystem.

pub mod delivery_service;
pub mod event_publisher;
pub mod event_router;
pub mod subscription_service;
