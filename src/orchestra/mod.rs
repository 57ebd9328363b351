mod actor;
mod aggregator;
mod builder;
mod orchestrator;
mod participant;
mod replica;
mod report;

pub use actor::{Broadcast, Collect, ReplicaActor, TrainEpoch};
pub use aggregator::{Aggregator, LocalUpdate, Weighting};
pub use builder::{build_optimizer, build_replicas, DynOptimizer};
pub use orchestrator::{Orchestrator, Phase, RoundConfig};
pub use participant::Participant;
pub use replica::WorkerReplica;
pub use report::{JsonLinesSink, LogSink, MemorySink, ReportSink, RoundReport, WorkerReport};
