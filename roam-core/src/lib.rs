pub mod gateway;
pub mod identity;
pub mod lifecycle;
pub mod publish;
pub mod repository;
