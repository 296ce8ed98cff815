//! Worker process supervision for evalrun.
//!
//! Launches the external evaluation worker and streams its stdout and stderr
//! into a [`LogSink`] as chunks arrive.
//!
//! # Example
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use evalrun_supervisor::{LogSink, SupervisorError, WorkerCommand};
//! use tokio_util::sync::CancellationToken;
//!
//! struct Stdout;
//!
//! #[async_trait::async_trait]
//! impl LogSink for Stdout {
//!     async fn append(&self, chunk: &str) -> Result<(), SupervisorError> {
//!         print!("{chunk}");
//!         Ok(())
//!     }
//! }
//!
//! async fn run() -> Result<(), SupervisorError> {
//!     let worker = WorkerCommand::new("python3")
//!         .args(["agentified_main.py", "launch", "--tasks", "safety-ssrf"])
//!         .spawn()?;
//!
//!     let report = worker.supervise(Arc::new(Stdout), CancellationToken::new()).await?;
//!     println!("exit code: {:?}", report.exit_code);
//!     Ok(())
//! }
//! ```

mod command;
mod error;
mod process;
mod sink;

pub use command::WorkerCommand;
pub use error::SupervisorError;
pub use process::{ExitReport, WorkerProcess};
pub use sink::LogSink;
pub use tokio_util::sync::CancellationToken;
