pub mod bundle;
pub mod handlers;
pub mod hypotheses;
pub mod problems;
pub mod prompts;
pub mod recommender;
