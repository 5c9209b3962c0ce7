//! Node-group stack lifecycle: the API seam and the create/delete driver.

pub mod client;
pub mod provisioner;

pub use client::{AwsCliStackClient, CreateStackInput, StackClient, StackError};
pub use provisioner::StackProvisioner;
