pub mod config;
pub mod controller;
pub mod crossing;
pub mod dispatcher;
pub mod engine;
pub mod error;
pub mod integrator;
pub mod mapper;
pub mod osc_engine;
pub mod sensor;
pub mod simulator;
pub mod smoother;
pub mod throttle;
pub mod trace_reader;
pub mod types;
