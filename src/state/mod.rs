pub mod team_store;

pub use team_store::TeamStore;
