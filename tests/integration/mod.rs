//! Integration tests for the disk ingestion pipeline

mod duplicates;
mod scan_pipeline;
mod support;
mod sync_engine;
