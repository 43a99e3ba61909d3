pub mod events;
pub mod images;
pub mod pipeline;
pub mod providers;
pub mod stages;
