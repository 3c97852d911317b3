pub mod archive;
pub mod browser;
pub mod extractor;
pub mod fetcher;
pub mod orchestrator;
pub mod variants;
