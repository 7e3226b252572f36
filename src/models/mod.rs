pub mod diagnosis;
pub mod job;
pub mod taxonomy;
