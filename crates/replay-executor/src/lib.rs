//! Replay executor workspace: drives trace-tests through the SUT over
//! HTTP (component C8), partitions them by recorded environment (C9), and
//! assembles the suite-wide span pool consumed by the matching engine
//! (C10).

pub mod crash;
pub mod environment;
pub mod executor;
pub mod filter;
pub mod http_client;
pub mod suite_loader;

pub use crash::{backoff_delay, batch_looks_crashed, looks_like_crash};
pub use environment::{group, EnvSnapshot};
pub use executor::{Executor, ExecutorError, Summary};
pub use filter::{FilterError, FilterKey, TestFilter};
pub use http_client::{HttpClient, HttpClientError, RawResponse};
pub use suite_loader::{load_suite_pool, JsonlSpanSource, SuiteLoadReport, SuiteSpanSource};

pub use replay_common::ExecutorConfig;
