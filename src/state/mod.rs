//! State module for tracking job progress
//!
//! # Components
//!
//! - `JobStatus`: The lifecycle status of a crawl job and its transition table

mod job_status;

// Re-export main types
pub use job_status::JobStatus;
