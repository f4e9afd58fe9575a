pub mod compat;
pub mod constants;
pub mod discovery;
pub mod error;
pub mod identity;
pub mod name;
pub mod role;
pub mod wire;
