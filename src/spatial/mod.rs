pub mod downloader;
pub mod error;
pub mod overpass;
pub mod roads;
pub mod source;
