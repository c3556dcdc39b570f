//! Canonical structured event names used across `amqp-publisher`.

// Channel lifecycle events.
pub const CHANNEL_CREATE_START: &str = "channel_create_start";
pub const CHANNEL_CREATED: &str = "channel_created";
pub const CHANNEL_RECREATED: &str = "channel_recreated";
pub const CHANNEL_CREATE_FAILED: &str = "channel_create_failed";
pub const CHANNEL_CREATE_CANCELLED: &str = "channel_create_cancelled";
pub const CHANNEL_RECOVERY_FAILED: &str = "channel_recovery_failed";
pub const CHANNEL_SHUTDOWN_DETECTED: &str = "channel_shutdown_detected";
pub const CHANNEL_SHUTDOWN_EXPECTED: &str = "channel_shutdown_expected";
pub const CHANNEL_CLOSE_FAILED: &str = "channel_close_failed";
pub const CHANNEL_MANAGER_DISPOSED: &str = "channel_manager_disposed";

// Broker connection events (emitted by client adapters).
pub const CONNECTION_OPENED: &str = "connection_opened";
pub const CONNECTION_OPEN_FAILED: &str = "connection_open_failed";
pub const CONNECTION_LOST: &str = "connection_lost";

// Publish events.
pub const PUBLISH_OK: &str = "publish_ok";
pub const PUBLISH_FAILED: &str = "publish_failed";
pub const PUBLISH_UNROUTABLE: &str = "publish_unroutable";
pub const PUBLISH_CANCELLED: &str = "publish_cancelled";
pub const PUBLISH_REJECTED_DISPOSED: &str = "publish_rejected_disposed";
pub const PUBLISHER_DISPOSED: &str = "publisher_disposed";

// Job event helper.
pub const JOB_EVENT_PUBLISHED: &str = "job_event_published";
