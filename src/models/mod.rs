pub mod ballots;
pub mod census;
pub mod results;
