//! Function execution: schema validation, capability composition, local
//! handler execution and remote invocation of deployed functions.

mod handler;
mod invocation;
mod local;
mod remote;
pub mod schema;

pub use handler::{async_handler_fn, handler_fn, AsyncFnHandler, FnHandler};
pub use invocation::FunctionInvocationService;
pub use local::LocalFunctionExecutor;
pub use remote::RemoteFunctionClient;
