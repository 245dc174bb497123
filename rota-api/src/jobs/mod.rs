//! Background jobs for the ROTA service layer.
//!
//! One job today: the extraction worker, which runs vision-model inference
//! off the request path. Work is handed over as a message on a queue; the
//! dispatching call returns immediately with a task id, and callers poll a
//! status registry. There is no cancellation once dispatched - a poller
//! abandoning its task leaves the unit running to completion or failure.
//!
//! # Usage
//!
//! ```ignore
//! use rota_api::jobs::{ExtractionQueue, ExtractionWorkerDeps};
//! use tokio::sync::watch;
//!
//! let (shutdown_tx, shutdown_rx) = watch::channel(false);
//! let (queue, handle) = ExtractionQueue::start(deps, shutdown_rx);
//!
//! let task_id = queue.dispatch(&identity, image_bytes, "image/png");
//! // ... later, from the status poll:
//! let state = queue.status(task_id);
//!
//! // On shutdown
//! let _ = shutdown_tx.send(true);
//! ```

pub mod extraction;

pub use extraction::{
    extraction_worker, ExtractionQueue, ExtractionTask, ExtractionWorkerDeps,
};
