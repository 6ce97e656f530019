pub mod claim;
pub mod contract;
pub mod conversation;
