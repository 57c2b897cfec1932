// 14.0: execution orchestrator. one request in, fresh prices, accrual,
// settlement, pricing and limit checks on copies, then the invariant check
// and a single commit. deterministic with no external I/O.

mod accrual;
mod config;
mod core;
mod positions;
mod requests;
mod results;

pub use config::EngineConfig;
pub use core::Engine;
pub use requests::{Request, RequestKind};
pub use results::{AccrualResult, EngineError, ExecutionResult};
