pub mod normalize;
pub mod orchestrator;
pub mod predictor;
pub mod recommend;
pub mod validate;
