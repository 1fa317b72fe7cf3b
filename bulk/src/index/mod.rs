//! Observation of the search indexer's rebuild cycles.

mod observer;

pub use observer::{
    DataSourceProbe, IndexCycleFinished, IndexCycleObserver, IndexCycleWindow, JobScheduler,
    index_job_name,
};
