pub mod listener_pool;

pub use listener_pool::ListenerPool;
