pub mod clock;
pub mod config;
pub mod controller;
pub mod dispatch;
pub mod metrics;
pub mod model;
pub mod review;
pub mod store;
pub mod testing;

pub use clock::{Clock, SystemClock};
pub use config::{
    load_config, load_config_from_str, validate_config, Config, ConfigError, JobConfig,
    SanitizedConfig, StoreBackend,
};
pub use controller::{
    CancelledVotePolicy, Controller, ControllerConfig, ControllerDeps, ControllerError,
    ControllerRunner, RunnerStatus,
};
pub use dispatch::{
    create_local_dispatcher, DispatchError, DispatchWorker, DispatcherConfig, EnqueueOptions,
    LocalDispatcher, Task, TaskDispatcher, TaskHandler,
};
pub use metrics::{MetricPoint, MetricsError, MetricsSink, PrometheusSink};
pub use model::{ChangeKey, ChangeRecord, JobRecord, JobStatus};
pub use review::{GerritClient, ReviewClient, ReviewError};
pub use store::{MemoryStateStore, SqliteStateStore, StateStore, StoreError};
