mod fixtures;

pub use fixtures::{TestDataFactory, TestScenario};
