pub mod change_queue;
pub mod watcher;
pub mod window;
