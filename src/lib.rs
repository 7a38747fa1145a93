#![warn(clippy::pedantic)]
// Noisy doc/signature lints — would require annotating hundreds of pub functions
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::must_use_candidate)]
// Style preference — keeping format!("{}", x) over format!("{x}") for readability with complex exprs
#![allow(clippy::uninlined_format_args)]
// Module structure — our tool module has foo::FooDef/FooBuilder pattern by design
#![allow(clippy::module_name_repetitions)]

//! `toolkernel`: a host-agnostic execution kernel for exposing LLM-callable
//! tools over the Model Context Protocol.
//!
//! A host builds up [`tool::ToolDef`]s with [`tool::ToolBuilder`], registers
//! them on a [`registry::KernelBuilder`], optionally attaches a
//! [`policy::PolicyEngine`] for state-sync decoration, then calls
//! [`registry::KernelBuilder::finalize`] to compile a read-only
//! [`registry::Kernel`]. From there every call is `kernel.dispatch(route,
//! args, ctx, progress)`.

pub mod context;
pub mod error;
pub mod handler;
pub mod middleware;
pub mod observability;
pub mod pipeline;
pub mod policy;
pub mod presenter;
pub mod progress;
pub mod prompts;
pub mod registry;
pub mod response;
pub mod result;
pub mod schema;
pub mod tool;

pub use context::ExecutionContext;
pub use error::{ErrorBuilder, ErrorDescriptor, KernelError, KernelResult, Severity};
pub use handler::{DirectHandler, FnHandler, GenerativeHandler, Handler, HandlerOutput};
pub use middleware::{compile_chain, Middleware, NextFn};
pub use observability::{KernelObserver, NullKernelObserver};
pub use policy::{CacheControl, PolicyEngine, SyncPolicy};
pub use presenter::{Presenter, PresenterBuilder};
pub use progress::{ProgressEvent, ProgressObserver, ProgressSink};
pub use prompts::{PromptArgDef, PromptDef, PromptRegistry};
pub use registry::{Exposition, Kernel, KernelBuilder, KernelConfig, ToolDescriptor};
pub use response::{ContentBlock, WireResponse};
pub use result::Outcome;
pub use schema::{ParamDef, ParamSpec, ParamType, ValidatedArgs};
pub use tool::{ActionAnnotations, ActionBuilder, ActionDef, ToolBuilder, ToolDef};

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
