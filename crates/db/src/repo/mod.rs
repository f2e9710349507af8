pub mod tags;
pub mod videos;
