pub mod match_result;
pub mod posting;
pub mod profile;
