pub mod binding;
pub mod cache;
pub mod dpop;
pub mod replay;
