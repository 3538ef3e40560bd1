pub mod application;
pub mod domain;
pub mod infrastructure;

pub use application::bootstrap::{BootstrapResult, bootstrap_workspace};
pub use application::lifecycle::{
    AlarmLifecycle, FireOutcome, NowProvider, RestoreFailure, RestoreReport,
};
pub use application::registry::{SchedulePolicy, ScheduleError, ScheduleOutcome, TimerRegistry};
pub use domain::holiday::{is_holiday, is_holiday_ymd};
pub use domain::models::{Activation, Alarm, weekday_index};
pub use domain::recurrence::{Resolution, ResolveError, WeeklyOccurrence, resolve};
pub use infrastructure::alarm_repository::{
    AlarmRepository, InMemoryAlarmRepository, SqliteAlarmRepository,
};
pub use infrastructure::error::InfraError;
pub use infrastructure::fire_sink::{CollectingFireSink, FireSink};
pub use infrastructure::wake_timer::{
    InMemoryWakeTimer, PermissionDenied, TimerKey, TimerKind, WakeTimer,
};
