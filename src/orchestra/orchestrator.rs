use std::{collections::HashSet, future::Future, num::NonZeroUsize, time::Duration};

use actix::{dev::ToEnvelope, prelude::*};
use futures::future::join_all;
use log::{info, warn};

use super::{
    actor::{Broadcast, Collect, ReplicaActor, TrainEpoch},
    Aggregator, Participant, ReportSink, RoundReport, Weighting, WorkerReport,
};
use crate::{arch::ParamSet, FedErr, Result};

/// Where the orchestrator stands within its rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Phase {
    Idle,
    Broadcasting,
    Training,
    Aggregating,
    /// Every configured round completed.
    Done,
    /// A round failed, no further rounds run.
    Aborted,
}

/// How the orchestrator runs its rounds.
#[derive(Debug, Clone, PartialEq)]
pub struct RoundConfig {
    pub rounds: NonZeroUsize,
    /// The delta every epsilon is reported against.
    pub delta: f64,
    /// When set, a worker going over this epsilon stops the federation before the next round.
    pub max_epsilon: Option<f64>,
    /// When set, a worker that takes longer than this to answer a message fails the round.
    pub round_timeout: Option<Duration>,
    pub weighting: Weighting,
}

impl RoundConfig {
    pub fn new(rounds: NonZeroUsize, delta: f64) -> Self {
        Self {
            rounds,
            delta,
            max_epsilon: None,
            round_timeout: None,
            weighting: Weighting::Uniform,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(self.delta > 0.0 && self.delta < 1.0) {
            return Err(FedErr::InvalidConfig(format!(
                "delta must be in (0, 1), got {}",
                self.delta
            )));
        }

        if let Some(limit) = self.max_epsilon {
            if !limit.is_finite() || limit <= 0.0 {
                return Err(FedErr::InvalidConfig(format!(
                    "the epsilon limit must be positive, got {limit}"
                )));
            }
        }

        if self.round_timeout.is_some_and(|t| t.is_zero()) {
            return Err(FedErr::InvalidConfig("the round timeout can't be zero".into()));
        }

        Ok(())
    }
}

struct WorkerHandle<P: Participant + Unpin + 'static> {
    id: String,
    addr: Addr<ReplicaActor<P>>,
    arbiter: Arbiter,
}

/// Drives the federation: broadcast, local training and aggregation, once per round.
///
/// Every worker runs inside its own actor on its own arbiter thread, the orchestrator alone
/// owns the global model.
pub struct Orchestrator<P: Participant + Unpin + 'static> {
    global: ParamSet,
    workers: Vec<WorkerHandle<P>>,
    config: RoundConfig,
    aggregator: Aggregator,
    sink: Box<dyn ReportSink>,
    phase: Phase,
    round: usize,
    history: Vec<RoundReport>,
    over_budget: Option<(String, f64)>,
}

impl<P: Participant + Unpin + 'static> Orchestrator<P> {
    /// Creates a new `Orchestrator` and starts one actor per participant.
    ///
    /// Must be called from within a running actix system.
    ///
    /// # Arguments
    /// * `global` - The initial global model.
    /// * `participants` - The workers, each with its own partition.
    /// * `config` - How to run the rounds.
    /// * `sink` - Receives every worker report.
    ///
    /// # Returns
    /// An error if the configuration is invalid, there are no participants, two of them
    /// share an id or any of them holds parameters laid out differently from `global`.
    pub fn new(
        global: ParamSet,
        participants: Vec<P>,
        config: RoundConfig,
        sink: Box<dyn ReportSink>,
    ) -> Result<Self> {
        config.validate()?;

        if participants.is_empty() {
            return Err(FedErr::InvalidConfig(
                "a federation needs at least one worker".into(),
            ));
        }

        let mut ids = HashSet::new();
        for participant in &participants {
            if !ids.insert(participant.id().to_string()) {
                return Err(FedErr::InvalidConfig(format!(
                    "worker id {} is used more than once",
                    participant.id()
                )));
            }

            global.layout().check_compatible(participant.params().layout())?;
        }

        let workers = participants
            .into_iter()
            .map(|participant| {
                let id = participant.id().to_string();
                let arbiter = Arbiter::new();
                let addr = ReplicaActor::start_in_arbiter(&arbiter.handle(), move |_| {
                    ReplicaActor::new(participant)
                });

                WorkerHandle { id, addr, arbiter }
            })
            .collect::<Vec<_>>();

        info!(
            workers = workers.len(),
            rounds = config.rounds.get(),
            params = global.len();
            "orchestrator started"
        );

        Ok(Self {
            aggregator: Aggregator::new(config.weighting),
            global,
            workers,
            config,
            sink,
            phase: Phase::Idle,
            round: 0,
            history: Vec::new(),
            over_budget: None,
        })
    }

    pub fn phase(&self) -> Phase {
        self.phase
    }

    /// The amount of completed rounds.
    pub fn round(&self) -> usize {
        self.round
    }

    pub fn global(&self) -> &ParamSet {
        &self.global
    }

    /// The reports of every completed round.
    pub fn reports(&self) -> &[RoundReport] {
        &self.history
    }

    pub fn worker_ids(&self) -> impl Iterator<Item = &str> {
        self.workers.iter().map(|w| w.id.as_str())
    }

    /// Runs a single round: broadcast, local training and aggregation.
    ///
    /// # Returns
    /// The round's report, or an error that leaves the orchestrator `Aborted` with the
    /// global model, the round count and the history untouched. A failing sink may have
    /// received part of the round's reports. Calling this once `Done` or `Aborted` fails with
    /// `RoundsExhausted`.
    pub async fn run_round(&mut self) -> Result<RoundReport> {
        if matches!(self.phase, Phase::Done | Phase::Aborted) {
            return Err(FedErr::RoundsExhausted { rounds: self.round });
        }

        let round = self.round + 1;

        if let (Some((worker_id, epsilon)), Some(limit)) =
            (self.over_budget.clone(), self.config.max_epsilon)
        {
            self.phase = Phase::Aborted;
            warn!(
                worker_id = worker_id.as_str(),
                round = round,
                epsilon = epsilon;
                "refusing round, privacy budget exhausted"
            );
            return Err(FedErr::PrivacyExhausted {
                worker_id,
                round,
                epsilon,
                limit,
            });
        }

        info!(round = round; "round started");

        match self.execute_round(round).await {
            Ok(report) => {
                self.round = round;
                self.phase = if round == self.config.rounds.get() {
                    Phase::Done
                } else {
                    Phase::Idle
                };

                info!(
                    round = round,
                    mean_loss = report.mean_loss(),
                    max_epsilon = report.max_epsilon();
                    "round finished"
                );
                Ok(report)
            }
            Err(e) => {
                self.phase = Phase::Aborted;
                warn!(round = round; "round aborted: {e}");
                Err(e)
            }
        }
    }

    /// Runs every remaining round.
    ///
    /// # Returns
    /// The first error a round hits, if any.
    pub async fn run(&mut self) -> Result<()> {
        while self.phase != Phase::Done {
            self.run_round().await?;
        }

        Ok(())
    }

    /// Stops every worker's arbiter.
    ///
    /// # Returns
    /// The final global model.
    pub fn shutdown(self) -> ParamSet {
        info!(rounds = self.round; "orchestrator shutting down");
        self.global.clone()
    }

    async fn execute_round(&mut self, round: usize) -> Result<RoundReport> {
        self.phase = Phase::Broadcasting;
        let global = &self.global;
        self.fan_out(round, || Broadcast(global.clone())).await?;

        self.phase = Phase::Training;
        let losses = self.fan_out(round, || TrainEpoch).await?;

        self.phase = Phase::Aggregating;
        let delta = self.config.delta;
        let collected = self.fan_out(round, || Collect { delta }).await?;
        let (updates, spent): (Vec<_>, Vec<_>) = collected.into_iter().unzip();

        let mut next = self.global.clone();
        self.aggregator.aggregate(&mut next, &updates)?;

        let workers = updates
            .iter()
            .zip(losses)
            .zip(spent)
            .map(|((update, mean_loss), spent)| WorkerReport {
                worker_id: update.worker_id.clone(),
                round,
                mean_loss,
                epsilon: spent.epsilon,
                delta: spent.delta,
                best_alpha: spent.best_alpha,
            })
            .collect::<Vec<_>>();

        for worker in &workers {
            self.sink.report(worker)?;
        }

        // Nothing below can fail, the round is committed as a whole.
        self.global = next;

        if let Some(limit) = self.config.max_epsilon {
            if let Some(worst) = workers.iter().find(|w| w.epsilon > limit) {
                warn!(
                    worker_id = worst.worker_id.as_str(),
                    epsilon = worst.epsilon,
                    limit = limit;
                    "privacy budget exceeded"
                );
                self.over_budget = Some((worst.worker_id.clone(), worst.epsilon));
            }
        }

        let report = RoundReport { round, workers };
        self.history.push(report.clone());

        Ok(report)
    }

    /// Sends one message to every worker concurrently and waits for all the answers.
    ///
    /// # Returns
    /// The answers in worker order, or the first failure wrapped in `WorkerFailure`.
    async fn fan_out<M, T, F>(&self, round: usize, make: F) -> Result<Vec<T>>
    where
        M: Message<Result = Result<T>> + Send + 'static,
        T: Send + 'static,
        F: Fn() -> M,
        ReplicaActor<P>: Handler<M>,
        <ReplicaActor<P> as Actor>::Context: ToEnvelope<ReplicaActor<P>, M>,
    {
        let timeout = self.config.round_timeout;
        let answers = join_all(
            self.workers
                .iter()
                .map(|w| deliver(timeout, w.addr.send(make()))),
        )
        .await;

        answers
            .into_iter()
            .zip(&self.workers)
            .map(|(answer, w)| {
                answer.map_err(|cause| FedErr::WorkerFailure {
                    worker_id: w.id.clone(),
                    round,
                    cause: Box::new(cause),
                })
            })
            .collect()
    }
}

impl<P: Participant + Unpin + 'static> Drop for Orchestrator<P> {
    fn drop(&mut self) {
        for worker in &self.workers {
            worker.arbiter.stop();
        }
    }
}

/// Awaits an actor's answer, giving up after `timeout` if there's one.
async fn deliver<T, F>(timeout: Option<Duration>, answer: F) -> Result<T>
where
    F: Future<Output = std::result::Result<Result<T>, MailboxError>>,
{
    let answer = match timeout {
        Some(after) => tokio::time::timeout(after, answer)
            .await
            .map_err(|_| FedErr::TimedOut(after))?,
        None => answer.await,
    };

    answer?
}
