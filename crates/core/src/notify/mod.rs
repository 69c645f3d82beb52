//! Outbound notifications to the embedding parent.
//!
//! Every terminal event of a session is reported as exactly one
//! `Notification`, wrapped in an envelope that carries the session's
//! correlation identifier. Notifications travel through an async channel; the
//! receiving side decides how to deliver them.

mod handle;
mod types;

pub use handle::{create_notification_channel, NotificationHandle};
pub use types::{
    outbound_name, Notification, NotificationEnvelope, OutboundFile, COMPRESSED_SUFFIX,
    COMPRESSED_MEDIA_TYPE,
};
