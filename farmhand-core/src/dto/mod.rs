//! Data Transfer Objects
//!
//! Shapes that cross a boundary: parameters coming in from the pipeline layer,
//! descriptors going out to the farm, status snapshots coming back.

pub mod descriptor;
pub mod status;
pub mod submit;
