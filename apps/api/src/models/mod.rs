pub mod feedback;
pub mod funnel;
pub mod profile;
