//! Face mask detection: locate faces, classify each crop as mask or
//! no-mask, and annotate frames from images, video files and cameras.

pub mod annotation;
pub mod classification;
pub mod detection;
pub mod pipeline;
pub mod shared;
pub mod video;
