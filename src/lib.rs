pub mod backtest;
pub mod calibration;
pub mod cli;
pub mod data_dir;
pub mod documents;
pub mod error;
pub mod matchups;
pub mod normalize;
pub mod outcome_log;
pub mod park_weather;
pub mod reconcile;
pub mod scoring;
pub mod scoring_config;
