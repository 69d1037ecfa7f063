pub mod app_config;
pub mod booking_repo;
pub mod database;
pub mod events;
pub mod memory;
pub mod redis_repo;
pub mod session_repo;
pub mod vehicle_repo;

pub use booking_repo::PgBookingStore;
pub use database::DbClient;
pub use events::{EventProducer, KafkaEventPublisher};
pub use redis_repo::RedisClient;
pub use session_repo::PgPaymentSessionStore;
pub use vehicle_repo::PgVehicleCatalog;
