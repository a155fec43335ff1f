//
// test_utils/mod.rs
//
// Fakes and fixtures shared by unit and integration tests
//

pub mod fakes;
pub mod fixture_project;
pub mod harness;
