//! Utility modules for Plane Image Fetch
//!
//! This module contains various utility functions organized by functionality:
//! - `files`: Output directory setup and input file discovery
//! - `filename`: Mapping image URLs to local filenames
//! - `http`: HTTP download of a single image

pub mod filename;
pub mod files;
pub mod http;
