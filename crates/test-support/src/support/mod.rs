pub mod bridge;
pub mod span;
