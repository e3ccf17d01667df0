pub mod backup;
pub mod core;
pub mod fees;
pub mod reference;
pub mod setup;
