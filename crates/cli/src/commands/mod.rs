pub mod placement;
pub mod status;
