pub mod client;
pub mod multipart;

pub use client::QueueClient;
