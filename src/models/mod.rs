pub mod job;
pub mod reference;
