//! Delivery services
//!
//! Routing, call state and the context that wires them to the shared store,
//! the transport and the external collaborators.

pub mod calls;
pub mod context;
pub mod error;
pub mod router;

pub use calls::{CallSessionRegistry, InviteRequest, SignalKind};
pub use context::{ServiceContext, ServiceContextBuilder};
pub use error::{CallError, ServiceError, ServiceResult};
pub use router::{Delivery, FanoutRouter, RouteReport};
