//! Application Layer
//!
//! Use cases orchestrating domain services and ports.

pub mod notification_dispatcher;

pub use notification_dispatcher::{
    DispatchConfig, DispatchError, NewCampaign, NotificationDispatcher,
};
