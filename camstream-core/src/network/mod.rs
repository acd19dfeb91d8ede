//! Outbound side of the link: framed writer, hand-off queue, and the
//! manager that ties them to one TCP connection.

pub mod manager;
pub mod outbox;
pub mod sender;

pub use manager::{CaptureRequest, ConnectionManager};
pub use outbox::{DispatchError, Outbox};
pub use sender::WireSender;
