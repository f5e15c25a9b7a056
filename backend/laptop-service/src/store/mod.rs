//! In-memory stores backing the catalog and identity services
//!
//! - `laptop_store`: laptop catalog with filtered search
//! - `rating_store`: per-laptop running score totals
//! - `image_store`: uploaded image blobs
//! - `user_store`: login identities
pub mod image_store;
pub mod laptop_store;
pub mod rating_store;
pub mod user_store;

pub use image_store::{DiskImageStore, ImageInfo, ImageStore};
pub use laptop_store::LaptopStore;
pub use rating_store::{Rating, RatingStore};
pub use user_store::{User, UserStore};
