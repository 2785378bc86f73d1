pub mod clean;
pub mod local;
pub mod mock;
pub mod provider;
pub mod remote;
