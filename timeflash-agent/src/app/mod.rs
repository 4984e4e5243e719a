pub mod agent;
pub mod policy;
pub mod scheduler;
pub mod tester;
