//! HTTP front end for deepfake detection on images and videos.

pub mod api;
pub mod error;
pub mod upload;
