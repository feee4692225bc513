pub mod attribute_estimator;
pub mod orchestrator;
pub mod scan_config;
pub mod scan_loop;
pub mod scan_session;
