//! Warping candidates into the reference frame and finding the region every
//! warped image covers.

pub mod overlap;
pub mod warp;

pub use overlap::{combine_masks, erode_mask, largest_component, resolve_overlap};
pub use warp::warp;
