//! Library integration tests: whole deployments driven through the bundle launcher.

mod common;

mod deploy_tests;
mod handover_tests;
mod hook_tests;
mod multi_unit_tests;
mod upgrade_tests;
