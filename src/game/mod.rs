pub mod constants;
pub mod grid;
pub mod input_buffer;
pub mod instance;
pub mod map;
pub mod modes;
pub mod repository;
pub mod scheduler;
pub mod world;
