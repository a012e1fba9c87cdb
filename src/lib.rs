// src/lib.rs

//! CATENA review-time harvester library.
//!
//! Walks the journal's volume index and listings, reads each article's
//! publication history and derives review days (received to accepted).

pub mod error;
pub mod models;
pub mod pipeline;
pub mod services;
pub mod storage;
pub mod utils;
