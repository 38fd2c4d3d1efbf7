//! Cross-module test suite for SRFR training
//!
//! Unit tests live next to the code they cover; this module holds the toy
//! models, mock batches and the suites that exercise several modules at once.

// Test modules
pub mod integration_tests;
pub mod loss_tests;

// Utility modules for testing
pub mod fixtures;

pub use fixtures::{IdentityExtractor, ToyDiscriminator, ToySrfrModel};
pub use mock_data::{create_natural_batches, create_synthetic_batches};
pub use test_utils::{assert_tensor_close, create_test_config, create_test_device, snapshot};
