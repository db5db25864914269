mod image_service;
mod reconciler;
mod ticker;
pub mod translator;

pub use image_service::ImageService;
pub use reconciler::{Reconciler, RunningIndex, TickReport};
pub use ticker::Ticker;
pub use translator::{build_groups, translate};
