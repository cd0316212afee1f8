//! Request handlers for API endpoints

pub mod batch;
pub mod content;
pub mod metrics;

pub use batch::*;
pub use content::*;
pub use metrics::*;
