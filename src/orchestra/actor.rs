use actix::prelude::*;
use log::debug;

use super::{LocalUpdate, Participant};
use crate::{arch::ParamSet, privacy::PrivacySpent};

/* -------------------------------------------------------------------------- */
/*                               Actix messages                               */
/* -------------------------------------------------------------------------- */

/// orchestrator -> worker, overwrite the local model.
#[derive(Message)]
#[rtype(result = "crate::Result<()>")]
pub struct Broadcast(pub ParamSet);

/// orchestrator -> worker, train one local epoch and answer with its mean loss.
#[derive(Message)]
#[rtype(result = "crate::Result<f32>")]
pub struct TrainEpoch;

/// orchestrator -> worker, hand back the local parameters and the privacy spent.
#[derive(Message)]
#[rtype(result = "crate::Result<(LocalUpdate, PrivacySpent)>")]
pub struct Collect {
    pub delta: f64,
}

/* -------------------------------------------------------------------------- */
/*                                Replica actor                               */
/* -------------------------------------------------------------------------- */

/// One actor per worker, it exclusively owns the worker's model, data and accountant.
pub struct ReplicaActor<P> {
    participant: P,
}

impl<P> ReplicaActor<P> {
    pub fn new(participant: P) -> Self {
        Self { participant }
    }
}

impl<P: Participant + Unpin + 'static> Actor for ReplicaActor<P> {
    type Context = Context<Self>;

    fn started(&mut self, _ctx: &mut Self::Context) {
        debug!(worker_id = self.participant.id(); "replica actor started");
    }
}

impl<P: Participant + Unpin + 'static> Handler<Broadcast> for ReplicaActor<P> {
    type Result = crate::Result<()>;

    fn handle(&mut self, msg: Broadcast, _ctx: &mut Self::Context) -> Self::Result {
        debug!(worker_id = self.participant.id(); "received global parameters");
        self.participant.receive(&msg.0)
    }
}

impl<P: Participant + Unpin + 'static> Handler<TrainEpoch> for ReplicaActor<P> {
    type Result = crate::Result<f32>;

    fn handle(&mut self, _msg: TrainEpoch, _ctx: &mut Self::Context) -> Self::Result {
        self.participant.train_one_epoch()
    }
}

impl<P: Participant + Unpin + 'static> Handler<Collect> for ReplicaActor<P> {
    type Result = crate::Result<(LocalUpdate, PrivacySpent)>;

    fn handle(&mut self, msg: Collect, _ctx: &mut Self::Context) -> Self::Result {
        let spent = self.participant.privacy_spent(msg.delta)?;
        let update = LocalUpdate {
            worker_id: self.participant.id().to_string(),
            params: self.participant.params().clone(),
            num_samples: self.participant.num_samples(),
        };

        Ok((update, spent))
    }
}
