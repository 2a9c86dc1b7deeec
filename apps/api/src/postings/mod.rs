//! Read-only dashboard views over stored postings and their current matches.

pub mod handlers;
