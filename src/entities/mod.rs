
pub mod authorization;
pub mod delegation;
pub mod election;
pub mod election_question;
pub mod election_vote;
pub mod participant;
pub mod ponderation;
pub mod response_option;
pub mod setting;
pub mod user;
pub mod vote_audit_entry;
