pub mod association;
pub mod fusion;
pub mod history;
pub mod track_state;
pub mod track_state_store;
