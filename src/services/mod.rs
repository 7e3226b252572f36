pub mod chroma;
pub mod classifier;
pub mod diagnosis;
pub mod fetch;
pub mod knowledge;
pub mod llm;
pub mod queue;
pub mod report;
pub mod retrieval;
pub mod storage;
pub mod taxonomy;
