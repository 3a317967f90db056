//! Rate limiting logic and state management.

mod admission;
mod backend;
mod checker;
mod clock;
mod declaration;
mod key;
mod memory;
mod options;
mod redis;
pub mod resolver;

pub use admission::AdmissionController;
pub use backend::{EventLog, WindowEvent};
pub use checker::{RateChecker, SlidingWindowChecker};
pub use clock::{Clock, ManualClock, Sleeper, SystemClock, TokioSleeper};
pub use declaration::{DeclaredPolicy, IntervalSpec, RateLimited, RetrySpec};
pub use key::{CallContext, DefaultKeyResolver, KeyResolver, TYPE_ONLY_EXPRESSION};
pub use memory::InMemoryEventLog;
pub use options::{Interval, Options, RetryPolicy, TimeUnit};
pub use self::redis::{RedisEventLog, DEFAULT_KEY_PREFIX};
pub use resolver::{
    DeclarationOptionsResolver, DelegatingOptionsResolver, FlatProperties, MissingOptions,
    OptionsResolver, PropertyOptionsResolver, PropertySource,
};
