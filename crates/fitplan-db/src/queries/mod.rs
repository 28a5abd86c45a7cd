pub mod attempts;
pub mod checkins;
pub mod jobs;
pub mod plans;
pub mod profiles;
