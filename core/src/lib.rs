pub mod baseline;
pub mod decision;
pub mod error;
pub mod pattern;
pub mod signals;
