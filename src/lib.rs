pub mod api_router;
pub mod config;
pub mod financial;
pub mod queues;
pub mod server;
pub mod shared;
pub mod tickets;
pub mod users;
