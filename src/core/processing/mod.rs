pub mod classify;
pub mod clip;
pub mod cover;
pub mod normalize;
pub mod orientation;
pub mod pipeline;
