//! Solar ephemeris, rainbow model, prediction pipeline, users,
//! notifications, and report sinks.

pub mod coordinator;
pub mod notification;
pub mod rainbow;
pub mod reporter;
pub mod sink;
pub mod solar;
pub mod timing;
pub mod user;

pub use coordinator::{Coordinator, CoordinatorResponse, PredictionOutcome, ResponseType};
pub use notification::{LogDispatcher, NotificationCenter, NotificationDispatcher};
#[cfg(feature = "webhook")]
pub use notification::WebhookDispatcher;
pub use timing::{predict, PredictionSettings};
pub use user::UserStore;
