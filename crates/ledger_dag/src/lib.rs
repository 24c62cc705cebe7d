pub mod edge_view;
pub mod error;

pub use edge_view::{EdgeView, Reachable};
pub use error::TraversalError;
