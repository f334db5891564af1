//! Pipeline driver.
//!
//! Owns the canonical [`Frame`] between frames and runs the per-frame
//! pipeline: predict, partition, dispatch, aggregate. The previous frame is
//! kept for comparison until the next step replaces it.

use crate::aggregator::{Aggregator, FrameReport};
use crate::batcher::{validate_partition, DynamicBatcher, Partition};
use crate::config::EngineConfig;
use crate::error::EngineError;
use crate::predictor::{CostModel, PredictionRecord, Predictor};
use crate::scheduler::{CancelToken, WorkerPool};
use crate::state::Frame;
use crate::update::UpdateFn;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn};

/// A running simulation.
pub struct Engine {
    config: EngineConfig,
    predictor: Predictor,
    batcher: DynamicBatcher,
    pool: WorkerPool,
    aggregator: Aggregator,
    current: Arc<Frame>,
    previous: Option<Arc<Frame>>,
    last_predictions: Vec<PredictionRecord>,
    last_partition: Partition,
    cancel: CancelToken,
}

impl Engine {
    /// Validates `config`, spawns the worker pool and installs `initial` as
    /// the canonical frame.
    ///
    /// `model` is ignored when the predictor is disabled.
    pub fn new(
        config: EngineConfig,
        initial: Frame,
        update_fn: Arc<dyn UpdateFn>,
        model: Option<Arc<dyn CostModel>>,
    ) -> Result<Self, EngineError> {
        config.validate()?;

        let predictor = if config.predictor_enabled {
            Predictor::new(model)
        } else {
            Predictor::heuristic_only()
        };
        let batcher = DynamicBatcher::new(config.worker_count, config.constraints())?;
        let pool = WorkerPool::new(config.worker_count, update_fn)?;

        info!(
            workers = config.worker_count,
            update = pool.update_name(),
            model = predictor.model_version().unwrap_or("heuristic"),
            objects = initial.objects().len(),
            "engine started"
        );

        Ok(Self {
            aggregator: Aggregator::new(config.quarantine_after),
            config,
            predictor,
            batcher,
            pool,
            current: Arc::new(initial),
            previous: None,
            last_predictions: Vec::new(),
            last_partition: Partition::default(),
            cancel: CancelToken::new(),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The canonical frame.
    pub fn current_frame(&self) -> &Frame {
        &self.current
    }

    /// The frame the last step started from.
    pub fn previous_frame(&self) -> Option<&Frame> {
        self.previous.as_deref()
    }

    /// Predictions made for the last step.
    pub fn last_predictions(&self) -> &[PredictionRecord] {
        &self.last_predictions
    }

    /// Batches dispatched in the last step.
    pub fn last_partition(&self) -> &Partition {
        &self.last_partition
    }

    /// Handle for cancelling the run from another thread.
    pub fn cancel_token(&self) -> CancelToken {
        self.cancel.clone()
    }

    /// Advances the simulation by one frame.
    ///
    /// Object failures, timeouts and cancellation degrade the report but
    /// still produce a frame. Only an invalid partition (or a dead pool)
    /// aborts.
    pub fn step(&mut self, dt: f64) -> Result<FrameReport, EngineError> {
        let span = info_span!("frame", index = self.current.index() + 1);
        let _enter = span.enter();

        let predictions = self.predictor.predict_frame(&self.current);
        let partition = self.batcher.partition(&predictions);
        if partition.ceiling_overflows > 0 {
            warn!(
                overflows = partition.ceiling_overflows,
                "batch ceilings exceeded to place every object"
            );
        }

        let active = self.current.active_ids();
        if let Err(e) = validate_partition(&partition.batches, &active, self.batcher.worker_count()) {
            error!(error = %e, "invalid batch partition");
            return Err(e.into());
        }
        debug!(
            batches = partition.batches.len(),
            max_cost = partition.max_cost(),
            imbalance = partition.imbalance(),
            "partitioned"
        );

        let mut execution = self.pool.run_frame(
            &self.current,
            &partition.batches,
            dt,
            self.config.frame_deadline,
            &self.cancel,
        )?;

        let results = std::mem::take(&mut execution.results);
        let (next, mut report) = self.aggregator.aggregate(&self.current, results);
        report.record_predictions(&predictions);
        report.record_partition(&partition);
        report.record_execution(&execution);

        if report.timed_out > 0 {
            warn!(objects = report.timed_out, "frame deadline exceeded");
        }
        info!(
            objects = report.object_count,
            succeeded = report.succeeded,
            failed = report.failed,
            timed_out = report.timed_out,
            fallback = report.fallback_predicted,
            elapsed_us = report.elapsed_us,
            "frame complete"
        );

        self.previous = Some(std::mem::replace(&mut self.current, Arc::new(next)));
        self.last_predictions = predictions;
        self.last_partition = partition;
        Ok(report)
    }

    /// Runs up to `frames` steps, stopping early once cancelled.
    pub fn run(&mut self, frames: usize, dt: f64) -> Result<Vec<FrameReport>, EngineError> {
        let mut reports = Vec::with_capacity(frames);
        for _ in 0..frames {
            reports.push(self.step(dt)?);
            if self.cancel.is_cancelled() {
                warn!(frame = self.current.index(), "run cancelled");
                break;
            }
        }
        Ok(reports)
    }
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("config", &self.config)
            .field("predictor", &self.predictor)
            .field("frame", &self.current.index())
            .finish()
    }
}
