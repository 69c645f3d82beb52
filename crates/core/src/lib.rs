pub mod classifier;
pub mod config;
pub mod controller;
pub mod engine;
pub mod metrics;
pub mod notify;
pub mod policy;
pub mod testing;

pub use classifier::{
    Classification, DurationProbe, FfprobeDurationProbe, InputClassifier, ProbeError, SourceFile,
    ValidationError, MAX_VIDEO_DURATION_SECS,
};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, NotificationConfig,
    ServerConfig,
};
pub use controller::{
    Admission, CompressionStats, ControllerError, ControllerSnapshot, HandledFileLedger, Job, JobController,
    JobOutcome, JobStatus, StatusMessage,
};
pub use engine::{
    CoreLocation, EngineConfig, EngineError, EngineEvent, EngineFactory, FfmpegEngine,
    FfmpegEngineFactory, LoadState, TranscodeEngine,
};
pub use notify::{
    create_notification_channel, outbound_name, Notification, NotificationEnvelope,
    NotificationHandle, OutboundFile, COMPRESSED_MEDIA_TYPE, COMPRESSED_SUFFIX,
};
pub use policy::EncodingProfile;
