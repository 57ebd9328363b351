use std::{env, fs::File, io::BufWriter};

use actix::System;
use anyhow::Context;
use log::info;
use rand::{rngs::StdRng, Rng, SeedableRng};
use rand_distr::{Distribution, Normal};

use dp_orchestra::{
    arch::{layers::Dense, loss::Mse, Model, Sequential},
    config::FederationConfig,
    data::Dataset,
    orchestra::{build_replicas, JsonLinesSink, LogSink, Orchestrator, ReportSink},
};

const SAMPLES: usize = 4096;

/// Noisy samples of `y = 2x + 1` with `x` in `[-1, 1)`.
fn synthetic_dataset(seed: u64) -> anyhow::Result<Dataset> {
    let mut rng = StdRng::seed_from_u64(seed);
    let noise = Normal::new(0.0f32, 0.05)?;

    let data = (0..SAMPLES)
        .flat_map(|_| {
            let x: f32 = rng.random_range(-1.0..1.0);
            let y = 2. * x + 1. + noise.sample(&mut rng);
            [x, y]
        })
        .collect();

    Ok(Dataset::new(data, 1, 1)?)
}

fn main() -> anyhow::Result<()> {
    env_logger::init();

    let mut args = env::args().skip(1);
    let config = match args.next() {
        Some(path) => FederationConfig::from_path(&path)
            .with_context(|| format!("failed to load config from {path}"))?,
        None => FederationConfig::default(),
    };

    let sink: Box<dyn ReportSink> = match args.next() {
        Some(path) => {
            let file = File::create(&path).with_context(|| format!("failed to create {path}"))?;
            Box::new(JsonLinesSink::new(BufWriter::new(file)))
        }
        None => Box::new(LogSink),
    };

    let dataset = synthetic_dataset(config.seed)?;
    let mut model = Sequential::new([Dense::new((1, 1), None)])?;
    model.init(config.init, &mut StdRng::seed_from_u64(config.seed))?;

    let replicas = build_replicas(&config, &model, &Mse, &dataset)?;
    let global = model.params().clone();
    let round_config = config.round_config();

    info!(
        workers = config.workers.get(),
        rounds = config.rounds.get(),
        samples = dataset.len();
        "starting federation"
    );

    let (global, reports) = System::new().block_on(async move {
        let mut orchestrator = Orchestrator::new(global, replicas, round_config, sink)?;
        orchestrator.run().await?;
        let reports = orchestrator.reports().to_vec();
        Ok::<_, dp_orchestra::FedErr>((orchestrator.shutdown(), reports))
    })?;

    for report in &reports {
        println!(
            "round {:>3}  loss {:.5}  epsilon {:.4}",
            report.round,
            report.mean_loss(),
            report.max_epsilon()
        );
    }

    for (spec, tensor) in global.iter() {
        println!("{} {:?} = {}", spec.name, spec.shape, tensor);
    }

    Ok(())
}
